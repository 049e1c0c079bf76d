//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Status report pushed to the cloud endpoint."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use shedtether_common::config::CloudConfig;
use tracing::debug;
use url::Url;

use crate::errors::Result;
use crate::report::ShedReport;

/// Response summary for a pushed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// HTTP status code returned by the endpoint.
    pub status: u16,
    /// Whether the status was in the 2xx range.
    pub accepted: bool,
}

/// Destination for status reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver one report. Any HTTP response is `Ok`; only transport and
    /// encoding failures are errors.
    async fn push(&self, report: &ShedReport) -> Result<Delivery>;
}

/// HTTP client posting reports as JSON to a fixed endpoint.
///
/// Single attempt per report: no retry, queue, or backoff. The configured
/// timeout bounds the whole request.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: Client,
    endpoint: Url,
}

impl CloudClient {
    pub fn from_config(config: &CloudConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ReportSink for CloudClient {
    async fn push(&self, report: &ShedReport) -> Result<Delivery> {
        let body = report.to_json()?;
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        debug!(endpoint = %self.endpoint, status = status.as_u16(), "report posted");
        Ok(Delivery {
            status: status.as_u16(),
            accepted: status.is_success(),
        })
    }
}

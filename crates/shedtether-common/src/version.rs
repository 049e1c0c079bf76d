//! ---
//! ems_section: "14-versioning-licensing-system"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Build and version metadata for the controller."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

const UNKNOWN: &str = "UNKNOWN";

/// Build metadata emitted by the `vergen` build script.
///
/// Fields fall back to `UNKNOWN` when the build ran outside a git checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub semver: &'static str,
    pub git_sha: &'static str,
    pub built_at: &'static str,
    pub target: &'static str,
}

impl VersionInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION"),
            git_sha: option_env!("VERGEN_GIT_SHA").unwrap_or(UNKNOWN),
            built_at: option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or(UNKNOWN),
            target: option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or(UNKNOWN),
        }
    }

    /// Multi-line report printed by `shedtetherd --version`.
    #[must_use]
    pub fn report(&self, program: &str) -> String {
        format!(
            "{program} {self}\nbuilt:  {}\ntarget: {}",
            self.built_at, self.target
        )
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.semver, self.git_sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_leads_with_program_and_version() {
        let info = VersionInfo::current();
        let report = info.report("shedtetherd");
        let first = report.lines().next().unwrap();
        assert_eq!(first, format!("shedtetherd {} ({})", info.semver, info.git_sha));
        assert!(report.contains(info.target));
    }

    #[test]
    fn display_is_semver_then_commit() {
        let info = VersionInfo {
            semver: "0.1.0",
            git_sha: "abc1234",
            built_at: UNKNOWN,
            target: UNKNOWN,
        };
        assert_eq!(info.to_string(), "0.1.0 (abc1234)");
    }
}

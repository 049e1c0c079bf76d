//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "build"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Build metadata capture for version reporting."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Missing git metadata (source tarball builds) emits placeholder values.
    EmitBuilder::builder()
        .build_timestamp()
        .cargo_target_triple()
        .git_sha(true)
        .emit()?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}

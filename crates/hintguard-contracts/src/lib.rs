//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O of the hintguard toolchain.

pub const HINTGUARD_UNIVERSE_SCHEMA_VERSION: &str = "hintguard.universe@0.1.0";
pub const HINTGUARD_UNIVERSE_SCHEMA_VERSIONS_SUPPORTED: &[&str] =
    &[HINTGUARD_UNIVERSE_SCHEMA_VERSION];

pub const HINTGUARD_DIAG_SCHEMA_VERSION: &str = "hintguard.diag@0.1.0";

pub const HINTGUARD_CODEGEN_REPORT_SCHEMA_VERSION: &str = "hintguard.codegen.report@0.1.0";
pub const HINTGUARD_CHECK_REPORT_SCHEMA_VERSION: &str = "hintguard.check.report@0.1.0";

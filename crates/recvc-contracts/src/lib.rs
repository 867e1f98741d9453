//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O of the receiver backend.

pub const RECVC_UNIT_SCHEMA_VERSION: &str = "recvc.unit@0.1.0";
pub const RECVC_UNIT_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &[RECVC_UNIT_SCHEMA_VERSION];

pub const RECVC_DIAG_SCHEMA_VERSION: &str = "recvc.diag@0.1.0";
pub const RECVC_REPORT_SCHEMA_VERSION: &str = "recvc.report@0.1.0";
pub const RECVC_PLAN_SCHEMA_VERSION: &str = "recvc.plan@0.1.0";
pub const RECVC_DISPATCH_SCHEMA_VERSION: &str = "recvc.dispatch@0.1.0";

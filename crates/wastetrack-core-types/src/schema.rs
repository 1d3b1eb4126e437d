//! Canonical schema constants for structured logging
//!
//! These constants keep field names consistent across all crates.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

// Backend and query identifiers
pub const FIELD_BACKEND: &str = "backend";
pub const FIELD_TABLE: &str = "table";
pub const FIELD_SCOPE_MODE: &str = "scope_mode";
pub const FIELD_ESTABLISHMENT_ID: &str = "establishment_id";
pub const FIELD_USER_ID: &str = "user_id";

// Collection sizes
pub const FIELD_ROWS: &str = "rows";
pub const FIELD_TOTAL: &str = "total";
pub const FIELD_PAGES: &str = "pages";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_BACKEND_SKIPPED: &str = "backend_skipped";
pub const EVENT_BACKEND_FAILED: &str = "backend_failed";
pub const EVENT_SUPERSEDED: &str = "superseded";

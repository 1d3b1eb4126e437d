//! Operation lifecycle macros
//!
//! Every public engine operation emits exactly one `start` event and then
//! either one `end` or one `end_error` event, all carrying `component`, `op`
//! and `event`. Extra `key = value` fields (table, backend, request_id, ...)
//! follow tracing's field syntax.

/// Emit the `start` event of an operation
///
/// ```
/// # use wastetrack_core::log_op_start;
/// log_op_start!("aggregate_query");
/// log_op_start!("aggregate_query", table = "units", scope_mode = "federated");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_START,
            $($($field)*)?
        );
    };
}

/// Emit the `end` event of an operation; `duration_ms` is mandatory
///
/// ```
/// # use wastetrack_core::log_op_end;
/// log_op_end!("cache_reload", duration_ms = 42, rows = 120);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)*)?
        );
    };
}

/// Emit the `end_error` event of an operation
///
/// `$err` is anything convertible into `ExError`, usually a cloned
/// `TrackError`. Its kind, stable code and message are recorded.
///
/// ```
/// # use wastetrack_core::{log_op_error, errors::TrackError};
/// let err = TrackError::NoActiveSession;
/// log_op_error!("establish_session", err, duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            err_message = ex_err.message(),
            $($($field)*)?
        );
    }};
}

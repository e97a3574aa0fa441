pub mod api_error;
pub mod constants;
pub mod fragment;
pub mod retry;
pub mod schemas;
pub mod telemetry;
pub mod time_utils;
pub mod trace_middleware;
pub mod url_utils;

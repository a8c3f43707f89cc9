//! Response helpers: plain-text CSV bodies for successful queries,
//! plain-text error bodies for failures (spec.md §6 "Errors returned
//! as 400 with plain-text message for invalid inputs; 500 on internal
//! faults").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use metricsd_core::Error;

/// An API-level error: a status code plus the plain-text message that
/// becomes the response body.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Domain errors map to 400; I/O and other unexpected faults map to
/// 500 (spec.md §7 "Propagation policy").
impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(_) => ApiError::internal(err.to_string()),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

/// Renders one response row as a CSV line: `ts,v1,v2,...\n`.
pub fn csv_row(ts: i64, values: &[f64]) -> String {
    let mut line = ts.to_string();
    for v in values {
        line.push(',');
        line.push_str(&format_value(*v));
    }
    line.push('\n');
    line
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        v.to_string()
    }
}

/// Renders a full set of rows into one CSV body, given the timestamp
/// of the first row and the fixed spacing between rows.
pub fn csv_body(first_ts: i64, spacing: i64, rows: &[Vec<f64>]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&csv_row(first_ts + spacing * i as i64, row));
    }
    out
}

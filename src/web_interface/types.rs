use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// API error payload
#[derive(Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Snapshot of the capture surfaced to the control client.
#[derive(Serialize)]
pub struct StatusResponse {
    pub armed: bool,
    pub record_count: usize,
    pub max_channel_count: u8,
    /// RFC 3339 timestamp of the current arming, absent while idle.
    pub armed_since: Option<String>,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    /// Explicit destination; a timestamped file under the configured
    /// export directory is used when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub path: String,
    pub records: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_every_field() {
        let status = StatusResponse {
            armed: true,
            record_count: 2,
            max_channel_count: 3,
            armed_since: Some("2026-01-01T00:00:00+00:00".to_string()),
        };

        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["armed"], true);
        assert_eq!(json["record_count"], 2);
        assert_eq!(json["max_channel_count"], 3);
        assert_eq!(json["armed_since"], "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn export_request_path_is_optional() {
        let request: ExportRequest = serde_json::from_str("{}").unwrap();
        assert!(request.path.is_none());

        let request: ExportRequest =
            serde_json::from_str(r#"{"path":"/tmp/out.csv"}"#).unwrap();
        assert_eq!(request.path, Some(PathBuf::from("/tmp/out.csv")));
    }
}

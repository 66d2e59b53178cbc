//! Config-fetch and long-poll payloads.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Sequence number of a namespace that has never been synced.
pub const NEVER_SYNCED: i64 = -1;

/// Body of `GET /configs/{appId}/{cluster}/{namespace}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    #[serde(default, alias = "appID")]
    pub app_id: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace_name: String,
    /// Key/value pairs of the namespace. Absent or `null` means empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub configurations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_key: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl ConfigPayload {
    /// Decode a raw response body (or fallback record).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// One entry of the notifications list exchanged with the long-poll endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub namespace_name: String,
    #[serde(default = "never_synced")]
    pub notification_id: i64,
}

fn never_synced() -> i64 {
    NEVER_SYNCED
}

impl Notification {
    pub fn new(namespace_name: impl Into<String>, notification_id: i64) -> Self {
        Self { namespace_name: namespace_name.into(), notification_id }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_config_payload() {
        let body = br#"{
            "appId": "sample",
            "cluster": "default",
            "namespaceName": "application",
            "configurations": {"timeout": "100", "name": "svc"},
            "releaseKey": "20240101-abc"
        }"#;

        let payload = ConfigPayload::from_slice(body).unwrap();
        assert_eq!(payload.app_id, "sample");
        assert_eq!(payload.namespace_name, "application");
        assert_eq!(payload.configurations.get("timeout").map(String::as_str), Some("100"));
        assert_eq!(payload.release_key.as_deref(), Some("20240101-abc"));
    }

    #[test]
    fn test_decode_accepts_legacy_app_id_casing_and_missing_map() {
        let payload = ConfigPayload::from_slice(br#"{"appID": "legacy"}"#).unwrap();
        assert_eq!(payload.app_id, "legacy");
        assert!(payload.configurations.is_empty());
    }

    #[test]
    fn test_decode_null_configurations_as_empty() {
        let payload = ConfigPayload::from_slice(
            br#"{"appId": "sample", "namespaceName": "application", "configurations": null}"#,
        )
        .unwrap();
        assert_eq!(payload.namespace_name, "application");
        assert!(payload.configurations.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ConfigPayload::from_slice(b"<html>502</html>").is_err());
    }

    #[test]
    fn test_notification_wire_shape() {
        let json = serde_json::to_value(Notification::new("application", 7)).unwrap();
        assert_eq!(json, serde_json::json!({"namespaceName": "application", "notificationId": 7}));

        let parsed: Vec<Notification> =
            serde_json::from_str(r#"[{"namespaceName":"billing"}]"#).unwrap();
        assert_eq!(parsed[0].notification_id, NEVER_SYNCED);
    }
}

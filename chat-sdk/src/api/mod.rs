use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod chat_api;
pub mod conversation_api;
pub mod emoji_api;
pub mod friend_api;
pub mod group_api;
pub mod notification_api;

/// Page cap of every `<domain>/byIds` endpoint.
pub const BY_IDS_PAGE_SIZE: usize = 50;

/// Row ids arrive as strings for uuid keyed rows and as numbers for
/// auto-increment rows; both are carried as strings.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowVersion {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub version: i64,
}

/// Answer of a `sync/<domain>` call: every row that changed since the given
/// cursor, plus the server clock at the time of the answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionDiff {
    pub versions: Vec<RowVersion>,
    pub server_timestamp: i64,
}

impl VersionDiff {
    pub fn max_version(&self) -> Option<i64> {
        self.versions.iter().map(|v| v.version).max()
    }
}

/// Composite row id used for rows keyed by two columns.
pub fn composite_id(first: &str, second: &str) -> String {
    format!("{}:{}", first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids() {
        let rows: Vec<RowVersion> =
            serde_json::from_str(r#"[{"id":"abc","version":1},{"id":42,"version":2}]"#).unwrap();
        assert_eq!(rows[0].id, "abc");
        assert_eq!(rows[1].id, "42");
        assert!(serde_json::from_str::<RowVersion>(r#"{"id":true,"version":1}"#).is_err());
    }

    #[test]
    fn composite_ids() {
        assert_eq!(composite_id("g1", "u1"), "g1:u1");
    }
}

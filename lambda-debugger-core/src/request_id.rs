//! Request ID generation

use chrono::Utc;
use uuid::Uuid;

/// Per-invocation request id
///
/// Shaped like `local-<unix millis>-<8 hex chars>` so ids sort roughly by
/// time and stay distinct within the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new request id
    pub fn new() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("local-{}-{}", millis, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();

        // IDs should be unique
        assert_ne!(id1, id2);

        let parts: Vec<&str> = id1.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "local");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_display_matches_string_form() {
        let id = RequestId::new();
        assert_eq!(id.to_string(), id.as_str());
        assert_eq!(String::from(id.clone()), id.as_str());
    }
}

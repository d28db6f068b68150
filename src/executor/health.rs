use serde::Serialize;

/// Result of a liveness probe. Probing never fails; failures are reported here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            error: None,
        }
    }

    pub fn unhealthy(error: impl ToString) -> Self {
        Self {
            healthy: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_without_empty_error() {
        assert_eq!(serde_json::to_string(&HealthStatus::healthy()).unwrap(), r#"{"healthy":true}"#);
        assert_eq!(
            serde_json::to_string(&HealthStatus::unhealthy("down")).unwrap(),
            r#"{"healthy":false,"error":"down"}"#
        );
    }
}

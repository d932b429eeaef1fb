use serde_json::Value as Json;

/// Supplies credentials for connection attempts.
///
/// Every method has a neutral default so implementors only override what
/// they need.
pub trait AuthProvider: Send + Sync {
    /// Extra headers for each transport open.
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Extra query parameters for each transport open.
    fn query(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Payload for the namespace connect packet. Overrides the configured
    /// join payload when it returns `Some`.
    fn connect_payload(&self, _namespace: &str) -> Option<Json> {
        None
    }

    /// Called when the peer refuses a namespace connect. Returning true drops
    /// the transport and runs a fresh open outside the backoff schedule.
    fn should_reconnect(&self, _namespace: &str, _data: Option<&Json>) -> bool {
        false
    }
}

/// Static bearer token sent as an `Authorization` header and as the connect
/// payload `{"token": ...}`.
pub struct TokenAuth {
    token: String,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AuthProvider for TokenAuth {
    fn headers(&self) -> Vec<(String, String)> {
        vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        )]
    }

    fn connect_payload(&self, _namespace: &str) -> Option<Json> {
        Some(serde_json::json!({ "token": self.token }))
    }
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth")
            .field("token", &format_args!("<redacted:{} bytes>", self.token.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_auth_fills_header_and_payload() {
        let auth = TokenAuth::new("s3cret");
        assert_eq!(
            auth.headers(),
            vec![("Authorization".to_string(), "Bearer s3cret".to_string())]
        );
        assert_eq!(
            auth.connect_payload("/"),
            Some(serde_json::json!({"token": "s3cret"}))
        );
        assert!(!auth.should_reconnect("/", None));
        assert!(!format!("{auth:?}").contains("s3cret"));
    }
}

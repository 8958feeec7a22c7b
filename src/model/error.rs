/// Failure taxonomy shared by every provider adapter and the request engine.
///
/// Cancellation is deliberately absent: a cancelled request ends with
/// [`StreamEvent::Cancelled`](crate::model::StreamEvent::Cancelled), never with a `ModelError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response")]
    InvalidResponse,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("unauthorized: check the API key for this service")]
    Unauthorized,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("unknown error: {0}")]
    Unknown(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ModelError {
    /// Maps an HTTP status to an error. Returns `None` for 2xx.
    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(Self::Unauthorized),
            429 => Some(Self::RateLimited),
            400..=599 => Some(Self::Server {
                status,
                body: body.to_string(),
            }),
            _ => Some(Self::Unknown(body.to_string())),
        }
    }

    /// Free-form text attached to the error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Transport(message)
            | Self::Decode(message)
            | Self::Unknown(message)
            | Self::Configuration(message) => Some(message),
            Self::Server { body, .. } => Some(body),
            Self::InvalidResponse | Self::Unauthorized | Self::RateLimited => None,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Transport(format!("request timed out: {value}"));
        }
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_table() {
        assert_eq!(ModelError::from_status(200, ""), None);
        assert_eq!(ModelError::from_status(204, ""), None);
        assert_eq!(ModelError::from_status(401, "nope"), Some(ModelError::Unauthorized));
        assert_eq!(ModelError::from_status(429, "slow"), Some(ModelError::RateLimited));
        assert_eq!(
            ModelError::from_status(403, "forbidden"),
            Some(ModelError::Server {
                status: 403,
                body: "forbidden".to_string()
            })
        );
        assert_eq!(
            ModelError::from_status(503, "busy"),
            Some(ModelError::Server {
                status: 503,
                body: "busy".to_string()
            })
        );
        assert_eq!(
            ModelError::from_status(302, "moved"),
            Some(ModelError::Unknown("moved".to_string()))
        );
    }

    #[test]
    fn detail_is_exposed_for_text_bearing_variants() {
        let err = ModelError::Server {
            status: 400,
            body: "Unknown parameter: reasoning_effort".to_string(),
        };
        assert_eq!(err.detail(), Some("Unknown parameter: reasoning_effort"));
        assert_eq!(ModelError::Unauthorized.detail(), None);
    }
}

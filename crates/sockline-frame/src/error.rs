/// Errors that can occur while decoding or encoding packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not follow the outer or polling framing rules.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The packet body (namespace, id, JSON or open info) is not valid.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A binary attachment arrived while no binary packet was pending.
    #[error("binary attachment ({size} bytes) arrived with no pending packet")]
    AttachmentOrderingViolation { size: usize },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;

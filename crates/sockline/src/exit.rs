use std::fmt;

use sockline_frame::FrameError;

pub const SUCCESS: i32 = 0;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::MalformedFrame(_)
        | FrameError::MalformedPayload(_)
        | FrameError::AttachmentOrderingViolation { .. }
        | FrameError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn json_error(context: &str, err: serde_json::Error) -> CliError {
    let code = if err.is_io() { INTERNAL } else { DATA_INVALID };
    CliError::new(code, format!("{context}: {err}"))
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Failure kinds of an offline render. Everything except `ResourceLoad`
/// halts the session; resource failures are recovered where they happen.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("session initialization failed: {0}")]
    Initialization(String),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("resource load failed: {0}")]
    ResourceLoad(String),

    #[error("upload of batch starting at frame {start_index} failed: {message}")]
    Upload { start_index: usize, message: String },

    #[error("finalize failed: {0}")]
    Finalize(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("canvas error: {0}")]
    Canvas(String),

    #[error("analysis window length {0} is not a power of two")]
    InvalidWindowSize(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceLoad(msg.into())
    }

    pub fn upload(start_index: usize, msg: impl Into<String>) -> Self {
        Self::Upload {
            start_index,
            message: msg.into(),
        }
    }

    pub fn invalid_setting(msg: impl Into<String>) -> Self {
        Self::InvalidSetting(msg.into())
    }

    pub fn canvas(msg: impl Into<String>) -> Self {
        Self::Canvas(msg.into())
    }

    pub fn finalize(msg: impl Into<String>) -> Self {
        Self::Finalize(msg.into())
    }

    /// Only background media failures are recovered locally.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ResourceLoad(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_stage() {
        assert!(RenderError::initialization("x")
            .to_string()
            .contains("session initialization failed"));
        assert!(RenderError::decode("x").to_string().contains("audio decode failed"));
        assert!(RenderError::finalize("x").to_string().contains("finalize failed"));
        assert!(RenderError::upload(60, "timeout")
            .to_string()
            .contains("starting at frame 60"));
        assert!(RenderError::InvalidWindowSize(1000)
            .to_string()
            .contains("1000"));
    }

    #[test]
    fn only_resource_errors_are_recoverable() {
        assert!(!RenderError::resource("cover").is_fatal());
        assert!(RenderError::decode("bad").is_fatal());
        assert!(RenderError::upload(0, "x").is_fatal());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to spawn interpreter '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("interpreter '{program}' was spawned without a piped {stream}")]
    MissingPipe {
        program: String,
        stream: &'static str,
    },

    #[error("interpreter is not running")]
    NotRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid {encoding}")]
    Encoding { encoding: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_display() {
        let err = ChannelError::Spawn {
            program: "pwsh".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn interpreter 'pwsh': not found"
        );
    }

    #[test]
    fn missing_pipe_display() {
        let err = ChannelError::MissingPipe {
            program: "bash".into(),
            stream: "stdin",
        };
        assert_eq!(
            err.to_string(),
            "interpreter 'bash' was spawned without a piped stdin"
        );
    }

    #[test]
    fn encoding_error_display() {
        let err = FramingError::Encoding { encoding: "UTF-16LE" };
        assert_eq!(err.to_string(), "payload is not valid UTF-16LE");
    }
}

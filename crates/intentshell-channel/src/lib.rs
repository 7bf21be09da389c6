//! Persistent interpreter subprocess with delimiter-framed request/response.

pub mod channel;
pub mod config;
pub mod dialect;
pub mod error;

pub use channel::{
    EXITED_SENTINEL, InterpreterChannel, READY_MARKER, ScriptTransport, TIMEOUT_SENTINEL,
    WRITE_FAILED_SENTINEL,
};
pub use config::ChannelConfig;
pub use dialect::Dialect;
pub use error::{ChannelError, FramingError};

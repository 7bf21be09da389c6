//! Safety pipeline: normalize, resolve, synthesize, assess, then gate
//! execution on the session's suspension state.

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod explain;
pub mod intent;
pub mod kernel;
pub mod normalize;
pub mod pipeline;

pub use audit::{AuditEntry, AuditLogger, AuditResult};
pub use cache::IntentCache;
pub use config::Config;
pub use error::{IntentDecodeError, PipelineError};
pub use explain::explain;
pub use intent::Intent;
pub use kernel::{KernelCommands, KernelScripts};
pub use normalize::normalize;
pub use pipeline::{ExecutionResult, ProcessOutcome, SafetyPipeline};

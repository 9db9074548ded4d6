//! Error handling for the batching pipeline
//!
//! Every fallible operation in the crate returns `MesherResult`. Failures are
//! propagated to the partitioner loop, which aborts the run; nothing here is
//! logged-and-continued.

use thiserror::Error;

/// Main error type for the mesher
#[derive(Debug, Error)]
pub enum MesherError {
    /// A merge would write past the fixed arena capacity
    #[error("Arena overflow: {attribute} needs {requested} slots (capacity {capacity})")]
    ArenaOverflow {
        attribute: &'static str,
        requested: usize,
        capacity: usize,
    },

    /// The arena buffers were handed to the geometry service and not reset
    #[error("Arena buffers were transferred to the geometry service; reset before merging")]
    ArenaSpent,

    /// Rebasing a mesh's ids onto the round's id counter ran past `u32::MAX`
    #[error("Id overflow in '{mesh}': id {id} + offset {offset} exceeds u32")]
    IdOverflow { mesh: String, id: u32, offset: u32 },

    /// The geometry service reported an error or lost the request
    #[error("Geometry service '{operation}' failed: {reason}")]
    GatewayFailure { operation: String, reason: String },

    #[error("Channel closed: {name}")]
    ChannelClosed { name: String },

    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results in the mesher
pub type MesherResult<T> = Result<T, MesherError>;

impl<T> From<flume::SendError<T>> for MesherError {
    fn from(_: flume::SendError<T>) -> Self {
        MesherError::ChannelClosed {
            name: "geometry_gateway".to_string(),
        }
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_mesher<F>(self, f: F) -> MesherResult<T>
    where
        F: FnOnce() -> MesherError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_mesher<F>(self, f: F) -> MesherResult<T>
    where
        F: FnOnce() -> MesherError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to foreign errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> MesherResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, msg: &str) -> MesherResult<T> {
        self.map_err(|e| MesherError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }
}

use std::io;

use thiserror::Error;

/// Height snapping error types
#[derive(Debug, Error)]
pub enum SnapError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed mesh container (bad magic, chunk tag or JSON document)
    #[error("Invalid mesh container: {0}")]
    Format(String),

    /// Vertex data could not be decoded from the container
    #[error("Vertex decode error: {0}")]
    Decode(String),

    /// Height query outside the measured terrain bounds
    #[error("Position ({x}, {z}) is outside the terrain bounds")]
    OutOfBounds { x: f32, z: f32 },

    /// Malformed placement header or transform line
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Invalid threshold or keyword configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Result type for snapping operations
pub type Result<T> = std::result::Result<T, SnapError>;

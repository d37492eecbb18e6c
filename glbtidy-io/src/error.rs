//! Error types for GLB encoding and decoding

use thiserror::Error;

/// Errors that can occur while reading or writing GLB assets
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid file format: {format}")]
    InvalidFormat { format: String },

    #[error("Write error: {message}")]
    WriteError { message: String },

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IoError> for glbtidy_core::Error {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Io(e) => glbtidy_core::Error::Io(e),
            IoError::InvalidFormat { format } => glbtidy_core::Error::UnsupportedFormat(format),
            other => glbtidy_core::Error::InvalidInput(other.to_string()),
        }
    }
}

pub type IoResult<T> = std::result::Result<T, IoError>;

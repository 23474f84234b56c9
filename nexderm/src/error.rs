//! Error Handling Module
//!
//! Defines the error taxonomy for the NexDerm library.
//! Uses thiserror for ergonomic error definitions.
//!
//! Every failure that crosses a module boundary is one of these variants;
//! decoding and validation problems are translated at the boundary nearest
//! their cause (preprocessing, checkpoint loading) instead of bubbling up
//! as generic errors. The library never terminates the process — binaries
//! decide whether to exit, retry, or surface the error to an HTTP caller.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for NexDerm operations
#[derive(Error, Debug)]
pub enum NexDermError {
    /// Checkpoint path does not exist at load time
    #[error("checkpoint artifact not found at '{0}'")]
    ArtifactNotFound(PathBuf),

    /// Checkpoint exists but is missing required fields or has an invalid class mapping
    #[error("corrupt checkpoint artifact: {0}")]
    CorruptArtifact(String),

    /// Inference attempted before a checkpoint was loaded
    #[error("model not loaded: load a checkpoint before calling predict")]
    ModelNotLoaded,

    /// Uploaded bytes cannot be decoded as an image, or cannot be coerced to RGB
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    /// Image path supplied in the offline/interactive prediction path does not exist
    #[error("image not found: '{0}'")]
    ImageNotFound(PathBuf),

    /// No training images discovered across all classes
    #[error("empty dataset: no images found for any class")]
    EmptyDataset,

    /// Checkpoint persistence failed; non-fatal during training
    #[error("failed to write checkpoint to '{path}': {reason}")]
    CheckpointWrite { path: PathBuf, reason: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for NexDerm operations
pub type Result<T> = std::result::Result<T, NexDermError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NexDermError::CorruptArtifact("missing weights".to_string());
        assert_eq!(
            format!("{}", err),
            "corrupt checkpoint artifact: missing weights"
        );
    }

    #[test]
    fn test_artifact_not_found_names_path() {
        let err = NexDermError::ArtifactNotFound(PathBuf::from("/models/best.ckpt"));
        assert!(format!("{}", err).contains("best.ckpt"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NexDermError = io.into();
        assert!(matches!(err, NexDermError::Io(_)));
    }
}

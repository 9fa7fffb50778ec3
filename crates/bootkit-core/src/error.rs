//! Errors raised while resolving configuration and decoding manifests

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// No layer supplied a manifest URL; the run cannot start
    #[error("No manifest URL configured. Use --url or provide one through managed preferences")]
    NoManifestSource,

    #[error("Failed to decode manifest: {message}")]
    ManifestDecode { message: String },

    #[error("Failed to encode manifest: {0}")]
    ManifestEncode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn manifest_decode(message: impl Into<String>) -> Self {
        Self::ManifestDecode {
            message: message.into(),
        }
    }

    /// Errors that stop the process before any phase runs
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NoManifestSource | Self::InvalidConfig { .. })
    }
}

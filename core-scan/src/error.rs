use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// An identity key that does not decode to `hex-fingerprint '#' location`.
    /// Persisted keys are engine-written, so this indicates consumer-side
    /// corruption, not an engine state to recover from.
    #[error("Malformed identity key: {0}")]
    MalformedIdentityKey(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ScanError>;

//! Asset identity: location plus content fingerprint.
//!
//! Library locations are reused by the platform across sync events, so a
//! location alone never identifies an asset. The engine pairs each location
//! with a fingerprint of the asset's thumbnail pixels; two identities are the
//! same asset exactly when their fingerprints match, wherever the asset
//! currently lives.
//!
//! Two fingerprint formats exist on disk:
//! - **Legacy (version 1)**: 32 bytes, SHA-256 of the aspect-ratio thumbnail.
//! - **Current (version 2)**: 33 bytes, a `0x01` marker followed by SHA-256 of
//!   the square thumbnail.
//!
//! The marker byte makes the two distinguishable after hex decoding, so keys
//! written by old builds still parse. Any other length is carried as
//! [`FingerprintKind::Unknown`]: the key round-trips intact, but the engine
//! has no thumbnail to recompute it from and can never verify it.

use bridge_traits::library::AssetLocation;
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, ScanError};

/// First byte of a current-format fingerprint.
const CURRENT_FORMAT_MARKER: u8 = 0x01;

const LEGACY_LEN: usize = 32;
const CURRENT_LEN: usize = 33;

/// Which thumbnail a fingerprint was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintKind {
    /// SHA-256 of the aspect-ratio thumbnail (format version 1).
    Legacy,
    /// Marker byte plus SHA-256 of the square thumbnail (format version 2).
    Current,
    /// Neither format. Preserved verbatim but never verifiable.
    Unknown,
}

/// Content fingerprint of one asset.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Current-format fingerprint from square-thumbnail pixels.
    pub fn from_square_thumbnail(pixels: &[u8]) -> Self {
        let digest = Sha256::digest(pixels);
        let mut bytes = Vec::with_capacity(CURRENT_LEN);
        bytes.push(CURRENT_FORMAT_MARKER);
        bytes.extend_from_slice(&digest);
        Self(bytes)
    }

    /// Legacy-format fingerprint from aspect-ratio-thumbnail pixels.
    pub fn from_aspect_thumbnail(pixels: &[u8]) -> Self {
        Self(Sha256::digest(pixels).to_vec())
    }

    /// Reconstruct a fingerprint from raw bytes. Any byte string is a valid
    /// fingerprint; lengths outside the two known formats classify as
    /// [`FingerprintKind::Unknown`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn kind(&self) -> FingerprintKind {
        match self.0.len() {
            LEGACY_LEN => FingerprintKind::Legacy,
            CURRENT_LEN if self.0[0] == CURRENT_FORMAT_MARKER => FingerprintKind::Current,
            _ => FingerprintKind::Unknown,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:?}, {})", self.kind(), self.to_hex())
    }
}

/// One asset's stable identity.
///
/// Equality and hashing consider the fingerprint only: the same content at a
/// new location is still the same asset.
#[derive(Debug, Clone)]
pub struct AssetIdentity {
    pub location: AssetLocation,
    pub fingerprint: Fingerprint,
}

impl AssetIdentity {
    pub fn new(location: AssetLocation, fingerprint: Fingerprint) -> Self {
        Self {
            location,
            fingerprint,
        }
    }

    /// Encode as the persisted key form: `hex(fingerprint) '#' location`.
    ///
    /// The fingerprint comes first because hex never contains `#`, while
    /// locations (platform URLs) may; the first `#` is always the separator.
    pub fn key(&self) -> String {
        format!("{}#{}", self.fingerprint.to_hex(), self.location)
    }

    /// Decode a persisted key back into an identity. Fails only on a missing
    /// separator or invalid hex; fingerprint length is not a parse concern.
    pub fn parse(key: &str) -> Result<Self> {
        let malformed = || ScanError::MalformedIdentityKey(key.to_string());
        let (fingerprint_hex, location) = key.split_once('#').ok_or_else(malformed)?;
        let bytes = hex::decode(fingerprint_hex).map_err(|_| malformed())?;
        Ok(Self {
            location: AssetLocation::from(location),
            fingerprint: Fingerprint::from_bytes(bytes),
        })
    }
}

impl PartialEq for AssetIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for AssetIdentity {}

impl Hash for AssetIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

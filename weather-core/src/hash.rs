use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::WeatherError;

/// SHA-1 digest of a snapshot's canonical JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    /// Hashes the compact JSON serialization of `snapshot`.
    ///
    /// `serde_json::Value` keeps object keys ordered, so equal content always
    /// serializes to the same bytes regardless of the order the remote sent.
    pub fn of(snapshot: &Value) -> Result<Self, WeatherError> {
        let raw = serde_json::to_vec(snapshot)?;
        Ok(Self::of_bytes(&raw))
    }

    pub fn of_bytes(raw: &[u8]) -> Self {
        let digest = Sha1::digest(raw);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

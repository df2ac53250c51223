//! Typed digest values.
//!
//! A digest is only equal to another when both the algorithm and the raw
//! bytes match. The text form is `<algorithm>:<lowercase hex>`, which is also
//! how digests are serialised into the lock file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{HashAlgorithm, HashError};

/// A computed or pinned content digest.
///
/// # Examples
///
/// ```
/// use pinfetch::hash::{Digest, HashAlgorithm};
///
/// let text = format!("sha256:{}", "ab".repeat(32));
/// let digest: Digest = text.parse()?;
/// assert_eq!(digest.algorithm(), HashAlgorithm::Sha256);
/// assert_eq!(digest.to_string(), text);
/// # Ok::<(), pinfetch::hash::HashError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    pub(crate) const fn new(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Builds a digest from raw bytes, checking the length.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::MalformedDigest`] when `bytes` is not the output
    /// length of `algorithm`.
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Result<Self, HashError> {
        if bytes.len() != algorithm.output_len() {
            return Err(HashError::MalformedDigest {
                value: hex::encode(&bytes),
                reason: format!(
                    "{algorithm} digests are {} bytes, got {}",
                    algorithm.output_len(),
                    bytes.len()
                ),
            });
        }
        Ok(Self::new(algorithm, bytes))
    }

    /// The algorithm that produced this digest.
    #[must_use]
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lower-case hex encoding of the digest bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| HashError::MalformedDigest {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        let (algorithm_name, encoded) = value
            .split_once(':')
            .ok_or_else(|| malformed("expected '<algorithm>:<hex>'"))?;
        let algorithm: HashAlgorithm = algorithm_name.parse()?;
        if encoded.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(malformed("hex must be lowercase"));
        }
        let bytes = hex::decode(encoded).map_err(|err| malformed(&err.to_string()))?;
        Self::from_bytes(algorithm, bytes).map_err(|_| malformed("wrong digest length"))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

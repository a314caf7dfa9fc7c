//! Shared value types for cairn.
//!
//! This crate defines the content identity model used across the workspace:
//! the chunk identifier ([`Digest`]) and the algorithm that produces it
//! ([`HashAlgorithm`]), the identity of one observed version of a file
//! ([`RevisionId`]), and the committed description of that version
//! ([`FileMetadata`], made of ordered [`ChunkRef`]s).
//!
//! Everything here is a plain value: no I/O, no locking.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: u32 = 4096;

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// Content-addressed identifier for a chunk: a 256-bit hash of its bytes.
///
/// Two chunks with the same digest are treated as having identical content
/// and share storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// A string could not be parsed as a [`Digest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest {0:?}: expected 64 hex characters")]
pub struct InvalidDigest(pub String);

impl FromStr for Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.as_bytes();
        if raw.len() != 64 {
            return Err(InvalidDigest(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = hex_nibble(raw[i * 2]).ok_or_else(|| InvalidDigest(s.to_string()))?;
            let lo = hex_nibble(raw[i * 2 + 1]).ok_or_else(|| InvalidDigest(s.to_string()))?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Hash algorithm
// ---------------------------------------------------------------------------

/// The 256-bit hash used to name chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// BLAKE3 (32-byte output).
    Blake3,
}

impl HashAlgorithm {
    /// Hash one block of data.
    pub fn digest(&self, data: &[u8]) -> Digest {
        match self {
            HashAlgorithm::Sha256 => Digest(sha2::Sha256::digest(data).into()),
            HashAlgorithm::Blake3 => Digest(blake3::hash(data).into()),
        }
    }

    /// Lowercase name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A string did not name a supported [`HashAlgorithm`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported hash algorithm {0:?} (expected \"sha256\" or \"blake3\")")]
pub struct UnknownHashAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnknownHashAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _ => Err(UnknownHashAlgorithm(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Revisions and metadata
// ---------------------------------------------------------------------------

/// One observed version of one file.
///
/// Two revisions are the same iff both the name and the modification time
/// are equal (at full timestamp precision).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId {
    /// Path-like name of the file.
    pub name: String,
    /// Last modification time observed for this version.
    #[serde(with = "unix_time")]
    pub mod_time: SystemTime,
}

impl RevisionId {
    pub fn new(name: impl Into<String>, mod_time: SystemTime) -> Self {
        Self {
            name: name.into(),
            mod_time,
        }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mod_time.duration_since(UNIX_EPOCH) {
            Ok(d) => write!(f, "{}@{}.{:09}", self.name, d.as_secs(), d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                write!(f, "{}@-{}.{:09}", self.name, d.as_secs(), d.subsec_nanos())
            }
        }
    }
}

/// Serde encoding of a [`SystemTime`] as signed `(seconds, nanoseconds)`
/// relative to the Unix epoch, so times before 1970 round-trip.
///
/// Seconds are floored: `epoch - 1.5s` is `(-2, 500_000_000)`.
mod unix_time {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};

    const NANOS_PER_SEC: u32 = 1_000_000_000;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => (whole_secs::<S>(d)?, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                let secs = whole_secs::<S>(d)?;
                match d.subsec_nanos() {
                    0 => (-secs, 0),
                    n => (-secs - 1, NANOS_PER_SEC - n),
                }
            }
        };
        (secs, nanos).serialize(serializer)
    }

    fn whole_secs<S: Serializer>(d: Duration) -> Result<i64, S::Error> {
        i64::try_from(d.as_secs()).map_err(<S::Error as ser::Error>::custom)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let (secs, nanos) = <(i64, u32)>::deserialize(deserializer)?;
        if nanos >= NANOS_PER_SEC {
            return Err(de::Error::custom(format!("nanoseconds out of range: {nanos}")));
        }
        let base = if secs >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_secs(secs.unsigned_abs()))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
        };
        base.and_then(|t| t.checked_add(Duration::from_nanos(u64::from(nanos))))
            .ok_or_else(|| de::Error::custom("timestamp out of range"))
    }
}

/// Reference to one chunk of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Ordinal position of this block within the file, in chunks (not bytes).
    pub offset: u64,
    /// Hash of the chunk's bytes.
    pub digest: Digest,
    /// Length of the chunk in bytes.
    pub size: u32,
}

/// A fully committed version of a file.
///
/// Concatenating the chunks in order reconstructs the file. A store never
/// exposes a `FileMetadata` before every chunk it lists is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub revision: RevisionId,
    /// Total length of the file in bytes.
    pub length: u64,
    pub chunks: Vec<ChunkRef>,
}

impl FileMetadata {
    /// Metadata for a zero-length file.
    pub fn empty(revision: RevisionId) -> Self {
        Self {
            revision,
            length: 0,
            chunks: Vec::new(),
        }
    }
}

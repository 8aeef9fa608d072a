//! Rolling hashes over the bytes a stage moves.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::StreamError;
use crate::rw::hook::{Hook, IoEvent};

/// Hash algorithms a stage can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// CRC-32 (IEEE), rendered big-endian.
    Crc32,
}

impl HashAlgorithm {
    /// Resolves a name such as `"sha256"`, `"SHA-256"` or `"crc32"`.
    pub fn from_name(name: &str) -> Result<Self, StreamError> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "crc32" => Ok(HashAlgorithm::Crc32),
            _ => Err(StreamError::UnknownHash {
                name: name.to_string(),
            }),
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Crc32 => "crc32",
        }
    }

    /// Fresh hasher state.
    pub fn hasher(&self) -> Hasher {
        Hasher(match self {
            HashAlgorithm::Sha224 => State::Sha224(sha2::Sha224::new()),
            HashAlgorithm::Sha256 => State::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => State::Sha384(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => State::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Crc32 => State::Crc32(crc32fast::Hasher::new()),
        })
    }
}

impl FromStr for HashAlgorithm {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
enum State {
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Crc32(crc32fast::Hasher),
}

/// Incremental hasher for one [`HashAlgorithm`].
#[derive(Clone)]
pub struct Hasher(State);

impl Hasher {
    /// Feeds bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            State::Sha224(h) => h.update(data),
            State::Sha256(h) => h.update(data),
            State::Sha384(h) => h.update(data),
            State::Sha512(h) => h.update(data),
            State::Crc32(h) => h.update(data),
        }
    }

    /// Lowercase hex digest of everything fed so far; the state keeps rolling.
    pub fn hex_digest(&self) -> String {
        match self.0.clone() {
            State::Sha224(h) => hex::encode(h.finalize()),
            State::Sha256(h) => hex::encode(h.finalize()),
            State::Sha384(h) => hex::encode(h.finalize()),
            State::Sha512(h) => hex::encode(h.finalize()),
            State::Crc32(h) => hex::encode(h.finalize().to_be_bytes()),
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hasher").field(&self.hex_digest()).finish()
    }
}

/// Hook feeding every transferred byte into a rolling hash.
#[derive(Debug)]
pub struct HashHook {
    algorithm: HashAlgorithm,
    state: Mutex<Hasher>,
}

impl HashHook {
    /// Creates a hook for `algorithm`.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            state: Mutex::new(algorithm.hasher()),
        }
    }

    /// Algorithm in use.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Current digest as lowercase hex.
    pub fn hex_digest(&self) -> String {
        self.state.lock().hex_digest()
    }
}

#[async_trait]
impl Hook for HashHook {
    fn name(&self) -> &'static str {
        "hash"
    }

    async fn on_io(&self, ev: &IoEvent<'_>) -> Result<(), StreamError> {
        if !ev.buf.is_empty() {
            self.state.lock().update(ev.buf);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sha256", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")]
    #[case("SHA-224", "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7")]
    #[case("crc32", "352441c2")]
    fn digests_of_abc(#[case] name: &str, #[case] expected: &str) {
        let mut h = HashAlgorithm::from_name(name).unwrap().hasher();
        h.update(b"a");
        h.update(b"bc");
        assert_eq!(h.hex_digest(), expected);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = "md5".parse::<HashAlgorithm>().unwrap_err();
        assert_eq!(err.as_label(), "stream_unknown_hash");
    }
}

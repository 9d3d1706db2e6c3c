use std::fmt::{self, Debug};
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer, Unexpected, Visitor};
use serde::ser::{Serialize, Serializer};

const HASH_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("expected hexidecimal string of 32 bytes beginning with 0x")]
pub struct HashParseError;

/// Newtype wrapper for 32-byte hash values, implementing readable `Debug`,
/// `serde::Deserialize` and `FromStr` (the latter needed to parse genesis
/// hashes out of feed command text and HTTP path segments, not just JSON).
#[derive(Hash, PartialEq, Eq, Clone, Copy)]
pub struct Hash([u8; HASH_BYTES]);

impl Hash {
    pub fn zero() -> Self {
        Hash([0; HASH_BYTES])
    }
}

struct HashVisitor;

impl<'de> Visitor<'de> for HashVisitor {
    type Value = Hash;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("hexidecimal string of 32 bytes beginning with 0x")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        value
            .parse()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(value), &self))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Hash, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(HashVisitor)
    }
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !value.starts_with("0x") {
            return Err(HashParseError);
        }

        let mut hash = [0; HASH_BYTES];

        hex::decode_to_slice(&value[2..], &mut hash).map_err(|_| HashParseError)?;

        Ok(Hash(hash))
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("0x")?;

        let mut ascii = [0; HASH_BYTES * 2];

        hex::encode_to_slice(self.0, &mut ascii)
            .expect("Encoding 32 bytes into 64 bytes of ascii; qed");

        f.write_str(std::str::from_utf8(&ascii).expect("ASCII hex encoded bytes canot fail; qed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_hash() {
        let s = format!("0x{}", "ab".repeat(32));
        let hash: Hash = s.parse().unwrap();
        assert_eq!(format!("{:?}", hash), s);
    }

    #[test]
    fn rejects_missing_prefix() {
        let s = "ab".repeat(32);
        assert!(s.parse::<Hash>().is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("0xabcd".parse::<Hash>().is_err());
    }
}

pub mod config;
pub mod logging;

#[cfg(feature = "test")]
pub mod mock;

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub fn bs58_encode(b: &[u8]) -> String {
    bs58::encode(b).into_string()
}

/// Raw bytes, written as a base58 string in human readable formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bs58Bytes(Bytes);

impl Bs58Bytes {
    pub fn new<B: Into<Bytes>>(b: B) -> Self {
        Self(b.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Display for Bs58Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58_encode(&self.0))
    }
}

impl FromStr for Bs58Bytes {
    type Err = bs58::decode::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bs58::decode(s).into_vec().map(Self::new)
    }
}

impl Serialize for Bs58Bytes {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&bs58_encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Bs58Bytes {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}

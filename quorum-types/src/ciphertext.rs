use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The per-ciphertext commitment ("gamma") participants derive their
/// partial shares from. It binds a share to exactly one ciphertext.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(Bytes);

impl Commitment {
    pub fn new<B: Into<Bytes>>(b: B) -> Self {
        Self(b.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter().take(8) {
            write!(f, "{b:02x}")?
        }
        if self.0.len() > 8 {
            f.write_str("..")?
        }
        Ok(())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({self})")
    }
}

/// Output of one encryption.
///
/// Besides the encrypted payload and the commitment it holds the session
/// values only the decryption step needs: two share-authentication tags and
/// the initialisation vector of the symmetric layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextBundle {
    payload: Bytes,
    commitment: Commitment,
    sa1: Bytes,
    sa2: Bytes,
    iv: Bytes,
}

impl CiphertextBundle {
    pub fn new<P, S1, S2, I>(payload: P, commitment: Commitment, sa1: S1, sa2: S2, iv: I) -> Self
    where
        P: Into<Bytes>,
        S1: Into<Bytes>,
        S2: Into<Bytes>,
        I: Into<Bytes>,
    {
        Self {
            payload: payload.into(),
            commitment,
            sa1: sa1.into(),
            sa2: sa2.into(),
            iv: iv.into(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn sa1(&self) -> &Bytes {
        &self.sa1
    }

    pub fn sa2(&self) -> &Bytes {
        &self.sa2
    }

    pub fn iv(&self) -> &Bytes {
        &self.iv
    }
}

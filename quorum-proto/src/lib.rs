//! Request and response messages exchanged with the threshold encryption
//! service. Every message is protobuf encoded and sent with the
//! `application/protobuf` content type.

use std::collections::BTreeMap;

use prost::Message;
use quorum_types::{CiphertextBundle, Commitment};

pub const CONTENT_TYPE: &str = "application/protobuf";

/// Generic response carrying one result blob.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Response {
    #[prost(bytes = "vec", tag = "1")]
    pub result: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct PkRequest {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub n: u64,
    /// Secret key material of the participant, if passed through.
    #[prost(bytes = "vec", tag = "3")]
    pub sk: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct EncryptRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub msg: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub pks: Vec<Vec<u8>>,
    #[prost(uint64, tag = "3")]
    pub t: u64,
    #[prost(uint64, tag = "4")]
    pub n: u64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct EncryptResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub enc: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub sa1: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub sa2: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub iv: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub gamma_g2: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct PartDecRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub gamma_g2: Vec<u8>,
    /// Secret key material of the participant, if passed through.
    #[prost(bytes = "vec", tag = "2")]
    pub sk: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct VerifyPartRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub pk: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub gamma_g2: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub part_dec: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct DecryptRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub enc: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub pks: Vec<Vec<u8>>,
    /// Partial shares keyed by participant id.
    #[prost(btree_map = "uint64, bytes", tag = "3")]
    pub parts: BTreeMap<u64, Vec<u8>>,
    #[prost(bytes = "vec", tag = "4")]
    pub gamma_g2: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub sa1: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub sa2: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub iv: Vec<u8>,
    #[prost(uint64, tag = "8")]
    pub t: u64,
    #[prost(uint64, tag = "9")]
    pub n: u64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct IsValidRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub pk: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub n: u64,
}

impl From<EncryptResponse> for CiphertextBundle {
    fn from(r: EncryptResponse) -> Self {
        CiphertextBundle::new(r.enc, Commitment::new(r.gamma_g2), r.sa1, r.sa2, r.iv)
    }
}

impl From<&CiphertextBundle> for EncryptResponse {
    fn from(b: &CiphertextBundle) -> Self {
        EncryptResponse {
            enc: b.payload().to_vec(),
            sa1: b.sa1().to_vec(),
            sa2: b.sa2().to_vec(),
            iv: b.iv().to_vec(),
            gamma_g2: b.commitment().to_vec(),
        }
    }
}

impl DecryptRequest {
    /// Fill the ciphertext related fields from a bundle.
    pub fn with_bundle(mut self, b: &CiphertextBundle) -> Self {
        self.enc = b.payload().to_vec();
        self.gamma_g2 = b.commitment().to_vec();
        self.sa1 = b.sa1().to_vec();
        self.sa2 = b.sa2().to_vec();
        self.iv = b.iv().to_vec();
        self
    }
}

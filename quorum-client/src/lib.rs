mod config;

use std::time::Duration;

use prost::Message;
use quorum_proto::{
    CONTENT_TYPE, DecryptRequest, EncryptRequest, EncryptResponse, IsValidRequest,
    PartDecRequest, PkRequest, Response, VerifyPartRequest,
};
use quorum_types::{
    CiphertextBundle, Commitment, ParticipantId, PartialShare, PublicKeyShare, ShareSet,
};
use reqwest::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

pub use config::{Config, ConfigBuilder};

static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Service routes, relative to a base URL.
pub mod route {
    pub const PUBLIC_KEY: &str = "getpk";
    pub const ENCRYPT: &str = "encrypt";
    pub const PARTIAL_DECRYPT: &str = "partdec";
    pub const VERIFY_SHARE: &str = "verifydec";
    pub const DECRYPT: &str = "decrypt";
    pub const IS_VALID: &str = "isvalid";
}

/// A client for the threshold encryption service.
///
/// Every method performs exactly one request/response exchange. No request
/// is retried.
#[derive(Debug, Clone)]
pub struct Client {
    config: Config,
    client: reqwest::Client,
}

impl Client {
    pub fn new(c: Config) -> Self {
        let r = reqwest::Client::builder()
            .timeout(c.timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("TLS and DNS resolver work");
        Self {
            config: c,
            client: r,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Fetch the public key of participant `id` in a committee of size `n`.
    pub async fn public_key(&self, id: ParticipantId, n: usize) -> Result<PublicKeyShare, Error> {
        let u = endpoint(self.config.participant_url(id), route::PUBLIC_KEY)?;
        let req = PkRequest {
            id: id.into(),
            n: n as u64,
            sk: self.secret(id),
        };
        let res: Response = self.post(u, &req).await?;
        debug!(node = %self.config.label, participant = %id, "fetched public key");
        Ok(PublicKeyShare::from(res.result))
    }

    pub async fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        t: usize,
        n: usize,
    ) -> Result<CiphertextBundle, Error> {
        let u = endpoint(self.config.combiner_url(), route::ENCRYPT)?;
        let req = EncryptRequest {
            msg: msg.to_vec(),
            pks: keys.iter().map(PublicKeyShare::to_vec).collect(),
            t: t as u64,
            n: n as u64,
        };
        let res: EncryptResponse = self.post(u, &req).await?;
        Ok(CiphertextBundle::from(res))
    }

    /// Ask participant `id` for its partial decryption of `commitment`.
    pub async fn partial_decrypt(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, Error> {
        let u = endpoint(self.config.participant_url(id), route::PARTIAL_DECRYPT)?;
        let req = PartDecRequest {
            gamma_g2: commitment.to_vec(),
            sk: self.secret(id),
        };
        let res: Response = self.post(u, &req).await?;
        Ok(PartialShare::new(id, commitment.clone(), res.result))
    }

    /// Check a partial share against its issuer's public key.
    ///
    /// Returns `Ok(false)` if the service rejects the share.
    pub async fn verify_share(
        &self,
        key: &PublicKeyShare,
        commitment: &Commitment,
        share: &PartialShare,
    ) -> Result<bool, Error> {
        let u = endpoint(self.config.combiner_url(), route::VERIFY_SHARE)?;
        let req = VerifyPartRequest {
            pk: key.to_vec(),
            gamma_g2: commitment.to_vec(),
            part_dec: share.as_bytes().to_vec(),
        };
        self.post_verdict(u, &req).await
    }

    /// Combine partial shares and recover the plaintext of `bundle`.
    pub async fn decrypt(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        shares: &ShareSet,
        t: usize,
        n: usize,
    ) -> Result<Vec<u8>, Error> {
        let u = endpoint(self.config.combiner_url(), route::DECRYPT)?;
        let req = DecryptRequest {
            pks: keys.iter().map(PublicKeyShare::to_vec).collect(),
            parts: shares
                .iter()
                .map(|(i, s)| (u64::from(i), s.as_bytes().to_vec()))
                .collect(),
            t: t as u64,
            n: n as u64,
            ..Default::default()
        }
        .with_bundle(bundle);
        let res: Response = self.post(u, &req).await?;
        Ok(res.result)
    }

    /// Ask the service whether `key` is a valid key for a committee of size `n`.
    pub async fn is_valid(&self, key: &PublicKeyShare, n: usize) -> Result<bool, Error> {
        let u = endpoint(self.config.combiner_url(), route::IS_VALID)?;
        let req = IsValidRequest {
            pk: key.to_vec(),
            n: n as u64,
        };
        self.post_verdict(u, &req).await
    }

    fn secret(&self, id: ParticipantId) -> Vec<u8> {
        self.config
            .secret(id)
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }

    async fn post<A, B>(&self, u: Url, a: &A) -> Result<B, Error>
    where
        A: Message,
        B: Message + Default,
    {
        let res = self
            .client
            .post(u.clone())
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
            .body(a.encode_to_vec())
            .send()
            .await?;

        if !res.status().is_success() {
            warn!(node = %self.config.label, url = %u, status = %res.status(), "request failed");
            return Err(Error::Status(res.status()));
        }

        let body = res.bytes().await?;
        Ok(B::decode(body)?)
    }

    /// Post a request whose answer is conveyed by the status code alone.
    ///
    /// `200` means accept and `451` means reject. Anything else is an error.
    async fn post_verdict<A: Message>(&self, u: Url, a: &A) -> Result<bool, Error> {
        let res = self
            .client
            .post(u.clone())
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
            .body(a.encode_to_vec())
            .send()
            .await?;

        match res.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => Ok(false),
            s => {
                warn!(node = %self.config.label, url = %u, status = %s, "request failed");
                Err(Error::Status(s))
            }
        }
    }
}

/// Append `route` to `base`, treating `base` as a directory.
fn endpoint(base: &Url, route: &str) -> Result<Url, Error> {
    if base.path().ends_with('/') {
        return Ok(base.join(route)?);
    }
    let mut b = base.clone();
    b.set_path(&format!("{}/", base.path()));
    Ok(b.join(route)?)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("api status: {0}")]
    Status(StatusCode),
}

impl Error {
    /// The status code of a request the service refused, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(s) => Some(*s),
            _ => None,
        }
    }
}

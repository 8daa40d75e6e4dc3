use std::io;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use prost::Message;
use quorum_client::route;
use quorum_proto::{
    self as proto, DecryptRequest, EncryptRequest, EncryptResponse, IsValidRequest,
    PartDecRequest, PkRequest, VerifyPartRequest,
};
use quorum_types::{CiphertextBundle, Commitment, ParticipantId, PublicKeyShare};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{MockEngine, MockError};

/// Serves a [`MockEngine`] over HTTP.
///
/// Participant specific requests may be sent below `p/{id}/`, which lets a
/// single server stand in for a whole committee.
#[derive(Debug, Clone)]
pub struct MockServer {
    engine: Arc<MockEngine>,
}

impl MockServer {
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<MockEngine> {
        &self.engine
    }

    /// Base URL of participant `id` on a server reachable at `base`.
    pub fn participant_url(base: &Url, id: ParticipantId) -> Result<Url, url::ParseError> {
        base.join(&format!("p/{id}/"))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&format!("/{}", route::PUBLIC_KEY), post(Self::public_key))
            .route(&format!("/{}", route::ENCRYPT), post(Self::encrypt))
            .route(&format!("/{}", route::PARTIAL_DECRYPT), post(Self::partial_decrypt))
            .route(&format!("/{}", route::VERIFY_SHARE), post(Self::verify_share))
            .route(&format!("/{}", route::DECRYPT), post(Self::decrypt))
            .route(&format!("/{}", route::IS_VALID), post(Self::is_valid))
            .route(&format!("/p/{{id}}/{}", route::PUBLIC_KEY), post(Self::participant_key))
            .route(
                &format!("/p/{{id}}/{}", route::PARTIAL_DECRYPT),
                post(Self::participant_share),
            )
            .with_state(self.clone())
    }

    pub async fn serve<A: ToSocketAddrs>(self, addr: A) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await
    }

    /// Bind to `addr` and serve in a background task.
    pub async fn spawn<A: ToSocketAddrs>(self, addr: A) -> io::Result<JoinHandle<io::Result<()>>> {
        let listener = TcpListener::bind(addr).await?;
        let router = self.router();
        Ok(tokio::spawn(async move {
            axum::serve(listener, router).await
        }))
    }

    async fn public_key(this: State<Self>, body: Bytes) -> Response {
        let req: PkRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        let key = if req.sk.is_empty() {
            this.engine
                .public_key(ParticipantId::new(req.id), req.n as usize)
        } else {
            this.engine.public_key_of(&req.sk)
        };
        respond(key.map(|k| k.to_vec()))
    }

    async fn participant_key(this: State<Self>, id: Path<u64>, body: Bytes) -> Response {
        let req: PkRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        let key = this.engine.public_key(ParticipantId::new(id.0), req.n as usize);
        respond(key.map(|k| k.to_vec()))
    }

    async fn encrypt(this: State<Self>, body: Bytes) -> Response {
        let req: EncryptRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        let keys = req
            .pks
            .into_iter()
            .map(PublicKeyShare::from)
            .collect::<Vec<_>>();
        match this
            .engine
            .encrypt(&req.msg, &keys, req.t as usize, req.n as usize)
        {
            Ok(b) => encoded(&EncryptResponse::from(&b)),
            Err(e) => refuse(e),
        }
    }

    /// Partial decryption with the secret key passed through by the caller.
    async fn partial_decrypt(this: State<Self>, body: Bytes) -> Response {
        let req: PartDecRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        respond(this.engine.partial_decrypt_with(&req.sk, &req.gamma_g2))
    }

    async fn participant_share(this: State<Self>, id: Path<u64>, body: Bytes) -> Response {
        let req: PartDecRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        let id = ParticipantId::new(id.0);
        if this.engine.is_silent(id) {
            debug!(participant = %id, "withholding share");
            std::future::pending::<()>().await
        }
        let c = Commitment::new(req.gamma_g2);
        respond(
            this.engine
                .partial_decrypt(id, &c)
                .map(|s| s.as_bytes().to_vec()),
        )
    }

    async fn verify_share(this: State<Self>, body: Bytes) -> Response {
        let req: VerifyPartRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        verdict(
            this.engine
                .verify_share(&req.pk, &req.gamma_g2, &req.part_dec),
        )
    }

    async fn decrypt(this: State<Self>, body: Bytes) -> Response {
        let req: DecryptRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        let bundle = CiphertextBundle::from(EncryptResponse {
            enc: req.enc,
            sa1: req.sa1,
            sa2: req.sa2,
            iv: req.iv,
            gamma_g2: req.gamma_g2,
        });
        let keys = req
            .pks
            .into_iter()
            .map(PublicKeyShare::from)
            .collect::<Vec<_>>();
        let parts = req
            .parts
            .iter()
            .map(|(i, s)| (ParticipantId::new(*i), s.as_slice()));
        respond(
            this.engine
                .decrypt(&bundle, &keys, parts, req.t as usize, req.n as usize),
        )
    }

    async fn is_valid(this: State<Self>, body: Bytes) -> Response {
        let req: IsValidRequest = match decode(&body) {
            Ok(r) => r,
            Err(r) => return r,
        };
        verdict(this.engine.is_valid(&req.pk, req.n as usize))
    }
}

fn decode<M: Message + Default>(body: &[u8]) -> Result<M, Response> {
    M::decode(body).map_err(|err| {
        warn!(%err, "malformed request");
        StatusCode::BAD_REQUEST.into_response()
    })
}

fn encoded<M: Message>(m: &M) -> Response {
    ([(CONTENT_TYPE, proto::CONTENT_TYPE)], m.encode_to_vec()).into_response()
}

fn respond(r: Result<Vec<u8>, MockError>) -> Response {
    match r {
        Ok(result) => encoded(&proto::Response { result }),
        Err(e) => refuse(e),
    }
}

fn refuse(e: MockError) -> Response {
    debug!(err = %e, "request refused");
    StatusCode::from_u16(e.status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

fn verdict(ok: bool) -> Response {
    if ok {
        StatusCode::OK.into_response()
    } else {
        StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS.into_response()
    }
}

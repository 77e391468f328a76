//! RFC 2617 digest credentials (MD5, optional `qop=auth`)

use md5::{Digest, Md5};
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use sipevent_sip_core::{
    Challenge, DigestCredentials, HeaderAccess, HeaderName, Request, Response, StatusCode,
};

use super::CredentialStore;
use crate::config::{Credential, UaConfig};
use crate::error::{UaError, UaResult};

/// Static username/password list keyed by realm
#[derive(Debug, Default)]
pub struct DigestCredentialStore {
    credentials: RwLock<Vec<Credential>>,
}

impl DigestCredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    pub fn from_config(config: &UaConfig) -> Self {
        Self::new(config.credentials.clone())
    }

    /// Add or replace the credential for a realm
    pub fn add(&self, credential: Credential) {
        let mut credentials = self.credentials.write();
        credentials.retain(|c| !c.realm.eq_ignore_ascii_case(&credential.realm));
        credentials.push(credential);
    }

    pub fn remove(&self, realm: &str) -> bool {
        let mut credentials = self.credentials.write();
        let before = credentials.len();
        credentials.retain(|c| !c.realm.eq_ignore_ascii_case(realm));
        credentials.len() != before
    }

    fn lookup(&self, realm: &str) -> Option<Credential> {
        self.credentials
            .read()
            .iter()
            .find(|c| c.realm.eq_ignore_ascii_case(realm))
            .cloned()
    }
}

impl CredentialStore for DigestCredentialStore {
    fn authorize(&self, challenge: &Response, request: &Request) -> UaResult<Request> {
        let (challenge_header, answer_header) = if challenge.status() == StatusCode::ProxyAuthenticationRequired {
            (HeaderName::ProxyAuthenticate, HeaderName::ProxyAuthorization)
        } else {
            (HeaderName::WwwAuthenticate, HeaderName::Authorization)
        };

        let challenges: Vec<Challenge> = challenge
            .header_values(&challenge_header)
            .into_iter()
            .filter_map(|value| value.parse().ok())
            .filter(|c: &Challenge| c.is_digest())
            .collect();
        if challenges.is_empty() {
            return Err(UaError::validation(
                challenge.status_code(),
                format!("{} without a digest challenge", challenge.status_code()),
            ));
        }

        let mut realms = Vec::new();
        for offer in &challenges {
            let realm = offer.realm().unwrap_or_default();
            match self.lookup(realm) {
                Some(credential) => {
                    let answer = answer(offer, &credential, request)?;
                    let mut authorized = request.clone();
                    authorized.set_header(answer_header, answer.to_string());
                    debug!(realm, username = %credential.username, "Computed digest credentials");
                    return Ok(authorized);
                }
                None => realms.push(realm.to_string()),
            }
        }
        Err(UaError::no_credentials(realms.join(",")))
    }
}

fn answer(challenge: &Challenge, credential: &Credential, request: &Request) -> UaResult<DigestCredentials> {
    if !challenge.algorithm().eq_ignore_ascii_case("MD5") {
        return Err(UaError::precondition(format!(
            "unsupported digest algorithm {}",
            challenge.algorithm()
        )));
    }
    let nonce = challenge
        .nonce()
        .ok_or_else(|| UaError::validation(400, "digest challenge without nonce"))?;
    let realm = challenge.realm().unwrap_or_default();
    let uri = request.uri.to_string();
    let qop = challenge
        .qop_options()
        .into_iter()
        .any(|q| q.eq_ignore_ascii_case("auth"))
        .then(|| "auth".to_string());
    let (nc, cnonce) = match qop {
        Some(_) => (Some("00000001".to_string()), Some(cnonce())),
        None => (None, None),
    };

    let response = digest_response(
        &credential.username,
        realm,
        &credential.password,
        request.method.as_str(),
        &uri,
        nonce,
        qop.as_deref().zip(nc.as_deref()).zip(cnonce.as_deref()).map(|((q, n), c)| (q, n, c)),
    );

    Ok(DigestCredentials {
        username: credential.username.clone(),
        realm: realm.to_string(),
        nonce: nonce.to_string(),
        uri,
        response,
        algorithm: Some("MD5".to_string()),
        opaque: challenge.opaque().map(str::to_string),
        qop,
        nc,
        cnonce,
    })
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn cnonce() -> String {
    let value: u64 = rand::thread_rng().r#gen();
    format!("{:016x}", value)
}

/// Digest `response` value; `qop` is `(qop, nc, cnonce)` when negotiated
pub fn digest_response(
    username: &str,
    realm: &str,
    password: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    qop: Option<(&str, &str, &str)>,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    match qop {
        Some((qop, nc, cnonce)) => md5_hex(&format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2)),
        None => md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2)),
    }
}

//! Compact HMAC-signed bearer tokens.
//!
//! Tokens use the three-part JWT compact form
//! `base64url(header).base64url(claims).base64url(signature)`, unpadded.
//! The header carries `alg` and `typ`; the claims carry the
//! [`TokenPayload`] fields.
//!
//! Verification order is fixed so that callers get a stable error for each
//! kind of failure:
//!
//! 1. three non-empty segments, decodable header (`InvalidToken`)
//! 2. `alg` is one of the HMAC algorithms (`InvalidSigningMethod`)
//! 3. signature matches (`InvalidToken`)
//! 4. claims decode (`InvalidToken`)
//! 5. `exp` is in the future (`ExpiredToken`)
//! 6. issuer matches, when configured (`InvalidToken`)
//! 7. token id is not revoked (`InvalidToken`)

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use dfs_http_core::{Error, ErrorCode, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use uuid::Uuid;

use crate::revocation::RevocationList;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const TOKEN_TYPE: &str = "JWT";

/// HMAC signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// HMAC-SHA256.
    #[default]
    HS256,
    /// HMAC-SHA384.
    HS384,
    /// HMAC-SHA512.
    HS512,
}

impl Algorithm {
    /// Returns the `alg` header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }

    /// Parses an `alg` header value. Anything outside the HMAC family is `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "HS256" => Some(Self::HS256),
            "HS384" => Some(Self::HS384),
            "HS512" => Some(Self::HS512),
            _ => None,
        }
    }

    fn sign(self, secret: &[u8], input: &[u8]) -> Result<Vec<u8>> {
        macro_rules! sign_with {
            ($digest:ty) => {{
                let mut mac = Hmac::<$digest>::new_from_slice(secret)
                    .map_err(|_| Error::internal("invalid signing key"))?;
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }};
        }
        Ok(match self {
            Self::HS256 => sign_with!(Sha256),
            Self::HS384 => sign_with!(Sha384),
            Self::HS512 => sign_with!(Sha512),
        })
    }

    fn verify(self, secret: &[u8], input: &[u8], signature: &[u8]) -> bool {
        macro_rules! verify_with {
            ($digest:ty) => {
                match Hmac::<$digest>::new_from_slice(secret) {
                    Ok(mut mac) => {
                        mac.update(input);
                        mac.verify_slice(signature).is_ok()
                    }
                    Err(_) => false,
                }
            };
        }
        match self {
            Self::HS256 => verify_with!(Sha256),
            Self::HS384 => verify_with!(Sha384),
            Self::HS512 => verify_with!(Sha512),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Claims carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Unique token id, used for revocation.
    pub id: Uuid,
    /// Login name of the holder.
    pub username: String,
    /// Stable user id of the holder.
    #[serde(rename = "sub")]
    pub subject: String,
    /// Issue time.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    /// Issuer, when the maker is configured with one.
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl TokenPayload {
    /// Returns `true` if the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Issues and verifies tokens with a shared secret.
///
/// Cloning is cheap; clones share the secret and the revocation list.
#[derive(Clone)]
pub struct TokenMaker {
    secret: Arc<[u8]>,
    algorithm: Algorithm,
    issuer: Option<String>,
    revocations: RevocationList,
}

impl TokenMaker {
    /// Creates a maker signing with HS256.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::invalid_argument(format!(
                "token secret must be at least {MIN_SECRET_LEN} bytes"
            ))
            .with_field("length", secret.len()));
        }
        Ok(Self {
            secret: secret.into(),
            algorithm: Algorithm::default(),
            issuer: None,
            revocations: RevocationList::new(),
        })
    }

    /// Signs new tokens with `algorithm`. Verification accepts any HMAC algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Stamps and requires an issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Shares an existing revocation list.
    #[must_use]
    pub fn with_revocation_list(mut self, revocations: RevocationList) -> Self {
        self.revocations = revocations;
        self
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Returns the configured issuer.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Returns the revocation list.
    #[must_use]
    pub const fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Issues a token valid for `duration`.
    ///
    /// A zero or negative duration yields a token that is already expired.
    pub fn create(
        &self,
        username: &str,
        subject: &str,
        duration: Duration,
    ) -> Result<(String, TokenPayload)> {
        // Claims carry whole seconds.
        let issued_at = Utc::now().trunc_subsecs(0);
        let payload = TokenPayload {
            id: Uuid::new_v4(),
            username: username.to_string(),
            subject: subject.to_string(),
            issued_at,
            expires_at: issued_at + duration,
            issuer: self.issuer.clone(),
        };
        let token = self.encode(&payload)?;
        Ok((token, payload))
    }

    /// Verifies a token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<TokenPayload> {
        self.verify_at(token, Utc::now())
    }

    /// Verifies a token against an explicit clock.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenPayload> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("malformed token"));
        };
        if header_b64.is_empty() || claims_b64.is_empty() || signature_b64.is_empty() {
            return Err(invalid("malformed token"));
        }

        let header: Header = decode_segment(header_b64).ok_or_else(|| invalid("malformed token header"))?;
        let Some(algorithm) = Algorithm::from_name(&header.alg) else {
            return Err(Error::new(
                ErrorCode::InvalidSigningMethod,
                format!("unexpected signing method: {}", header.alg),
            ));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("malformed token signature"))?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        if !algorithm.verify(&self.secret, signing_input.as_bytes(), &signature) {
            return Err(invalid("token signature mismatch"));
        }

        let payload: TokenPayload =
            decode_segment(claims_b64).ok_or_else(|| invalid("malformed token claims"))?;

        if payload.is_expired_at(now) {
            return Err(Error::new(ErrorCode::ExpiredToken, "token has expired"));
        }

        if let Some(expected) = &self.issuer {
            if payload.issuer.as_deref() != Some(expected.as_str()) {
                return Err(invalid("unexpected token issuer"));
            }
        }

        if self.revocations.is_revoked(&payload.id) {
            return Err(invalid("token has been revoked"));
        }

        Ok(payload)
    }

    /// Revokes a verified token until its natural expiry.
    pub fn revoke(&self, payload: &TokenPayload) {
        self.revocations.revoke(payload.id, payload.expires_at);
    }

    fn encode(&self, payload: &TokenPayload) -> Result<String> {
        let header = Header {
            alg: self.algorithm.as_str().to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        };
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
        let signing_input = format!("{header}.{claims}");
        let signature = self.algorithm.sign(&self.secret, signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

impl fmt::Debug for TokenMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMaker")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("revoked", &self.revocations.len())
            .finish()
    }
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorCode::InvalidToken, message)
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn maker() -> TokenMaker {
        TokenMaker::new(SECRET.to_vec()).unwrap()
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = TokenMaker::new(b"short".to_vec()).unwrap_err();
        assert!(err.is_code(ErrorCode::InvalidArgument));
    }

    #[test]
    fn test_create_and_verify() {
        let maker = maker();
        let (token, issued) = maker.create("alice", "u-1", Duration::minutes(15)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let verified = maker.verify(&token).unwrap();
        assert_eq!(verified, issued);
        assert_eq!(verified.username, "alice");
        assert_eq!(verified.subject, "u-1");
        let lifetime = verified.expires_at - verified.issued_at;
        assert!((lifetime - Duration::minutes(15)).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_expired_token() {
        let maker = maker();
        let (token, _) = maker.create("alice", "u-1", Duration::minutes(-1)).unwrap();
        let err = maker.verify(&token).unwrap_err();
        assert!(err.is_code(ErrorCode::ExpiredToken));
    }

    #[test]
    fn test_tampered_signature() {
        let maker = maker();
        let (token, _) = maker.create("alice", "u-1", Duration::minutes(5)).unwrap();
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        let err = maker.verify(&tampered).unwrap_err();
        assert!(err.is_code(ErrorCode::InvalidToken));
    }

    #[test]
    fn test_other_secret_rejected() {
        let (token, _) = maker().create("alice", "u-1", Duration::minutes(5)).unwrap();
        let other = TokenMaker::new(b"ffffffffffffffffffffffffffffffff".to_vec()).unwrap();
        assert!(other.verify(&token).unwrap_err().is_code(ErrorCode::InvalidToken));
    }

    #[test]
    fn test_foreign_algorithm_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#);
        let token = format!("{header}.{claims}.c2ln");
        let err = maker().verify(&token).unwrap_err();
        assert!(err.is_code(ErrorCode::InvalidSigningMethod));

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let token = format!("{header}.{claims}.c2ln");
        assert!(maker().verify(&token).unwrap_err().is_code(ErrorCode::InvalidSigningMethod));
    }

    #[test]
    fn test_hs512_tokens_verify_with_default_maker() {
        let signer = maker().with_algorithm(Algorithm::HS512);
        let (token, _) = signer.create("bob", "u-2", Duration::minutes(5)).unwrap();
        assert_eq!(maker().verify(&token).unwrap().username, "bob");
    }

    #[test]
    fn test_malformed_tokens() {
        let maker = maker();
        for token in ["", "abc", "a.b", "a.b.c.d", "..", "!!.??.##"] {
            let err = maker.verify(token).unwrap_err();
            assert!(err.is_code(ErrorCode::InvalidToken), "{token:?} gave {err}");
        }
    }

    #[test]
    fn test_issuer_must_match() {
        let signer = maker().with_issuer("dfs-a");
        let (token, payload) = signer.create("alice", "u-1", Duration::minutes(5)).unwrap();
        assert_eq!(payload.issuer.as_deref(), Some("dfs-a"));
        assert!(signer.verify(&token).is_ok());

        let other = maker().with_issuer("dfs-b");
        assert!(other.verify(&token).unwrap_err().is_code(ErrorCode::InvalidToken));
    }

    #[test]
    fn test_revoked_token_rejected() {
        let maker = maker();
        let (token, payload) = maker.create("alice", "u-1", Duration::minutes(5)).unwrap();
        maker.revoke(&payload);
        let err = maker.verify(&token).unwrap_err();
        assert!(err.is_code(ErrorCode::InvalidToken));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", maker());
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("<redacted>"));
    }

    proptest! {
        #[test]
        fn prop_any_garbage_is_rejected(token in "[A-Za-z0-9_.-]{0,64}") {
            prop_assert!(maker().verify(&token).is_err());
        }

        #[test]
        fn prop_usernames_survive_signing(username in "\\PC{1,24}") {
            let maker = maker();
            let (token, _) = maker.create(&username, "u", Duration::minutes(1)).unwrap();
            prop_assert_eq!(maker.verify(&token).unwrap().username, username);
        }
    }
}

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::debug;

use crate::auth::store::User;
use crate::config::TokenConfig;

/// Signs the access/refresh token pair with the process-wide HMAC secret.
///
/// Tokens are deterministic signatures over server-held state, not bearer
/// tokens: the same `(payload, secret)` always yields the same string, so a
/// submitted token is validated by recomputing the expected one from the
/// current user record and comparing, never by decoding. Expiry lives on the
/// record (`last_login`, `expires_in`), not inside the token.
#[derive(Clone)]
pub struct TokenSigner {
    header: Header,
    key: EncodingKey,
    access_window: i64,
    refresh_window: i64,
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    username: &'a str,
    time: i64,
}

#[derive(Serialize)]
struct RefreshClaims {
    id: i64,
    time: i64,
}

/// The pair handed to clients. `expires_in` is the absolute epoch second the
/// access token stops working.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl TokenSigner {
    pub fn new(config: &TokenConfig) -> anyhow::Result<Self> {
        let algorithm: Algorithm = config
            .algorithm
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown signing algorithm: {}", config.algorithm))?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            anyhow::bail!(
                "signing algorithm {} is not in the HMAC family",
                config.algorithm
            );
        }

        Ok(Self {
            header: Header::new(algorithm),
            key: EncodingKey::from_secret(config.secret.as_bytes()),
            access_window: config.access_window_secs,
            refresh_window: config.refresh_window_secs,
        })
    }

    pub fn access_window(&self) -> i64 {
        self.access_window
    }

    pub fn refresh_window(&self) -> i64 {
        self.refresh_window
    }

    pub fn sign_access(
        &self,
        username: &str,
        time: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&self.header, &AccessClaims { username, time }, &self.key)
    }

    pub fn sign_refresh(&self, id: i64, time: i64) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&self.header, &RefreshClaims { id, time }, &self.key)
    }

    /// Both tokens signed against the already persisted `last_login`.
    pub fn pair_for(&self, user: &User) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        let access_token = self.sign_access(&user.username, user.last_login)?;
        let refresh_token = self.sign_refresh(user.id, user.last_login)?;
        debug!(user_id = %user.id, "token pair issued");
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: user.last_login + self.access_window,
        })
    }

    /// Constant-time comparison of a submitted token against the recomputed
    /// one, so the check leaks nothing about where the mismatch sits.
    pub fn matches(submitted: &str, expected: &str) -> bool {
        let (a, b) = (submitted.as_bytes(), expected.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

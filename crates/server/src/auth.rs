//! Bearer tokens for the community backend.

use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::{Author, TokenPair},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub kind: TokenKind,
    pub exp: i64,
}

impl Claims {
    pub fn author(&self) -> Author {
        Author {
            id: UserId::new(self.sub.clone()),
            name: self.name.clone(),
            avatar: None,
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_seconds),
            refresh_ttl: Duration::seconds(refresh_ttl_seconds),
        }
    }

    pub fn issue(&self, author: &Author) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.sign(author, TokenKind::Access, self.access_ttl)?,
            refresh_token: self.sign(author, TokenKind::Refresh, self.refresh_ttl)?,
        })
    }

    /// Checks signature, expiry and that the token is of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))?;
        if data.claims.kind != kind {
            return Err(ApiError::unauthorized("wrong token kind"));
        }
        Ok(data.claims)
    }

    /// Resolves the caller from an `Authorization: Bearer` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Author, ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        Ok(self.verify(token, TokenKind::Access)?.author())
    }

    fn sign(&self, author: &Author, kind: TokenKind, ttl: Duration) -> Result<String, ApiError> {
        let claims = Claims {
            sub: author.id.to_string(),
            name: author.name.clone(),
            kind,
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| ApiError::new(ErrorCode::Internal, err.to_string()))
    }
}

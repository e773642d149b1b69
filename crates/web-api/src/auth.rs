//! 连接认证
//!
//! JWT token 的生成与验证，以及连接级认证器：凭证在握手时校验一次，
//! 解析出目录里的身份并缓存到连接上，之后的消息操作不再逐条鉴权。

use std::sync::Arc;

use axum::http::HeaderMap;
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::UserDirectory;
use domain::{Principal, PrincipalId};

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub principal_id: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, principal_id: Uuid) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            principal_id,
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::unauthorized(format!("Token generation failed: {}", err)))
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))
    }
}

/// 从 headers 中提取 bearer token
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_owned())
}

/// 连接认证器：校验凭证并通过用户目录解析出身份。
/// 任何一步失败都在握手阶段拒绝，不会产生半个连接状态。
pub struct ConnectionAuthenticator {
    jwt: JwtService,
    directory: Arc<dyn UserDirectory>,
}

impl ConnectionAuthenticator {
    pub fn new(jwt: JwtService, directory: Arc<dyn UserDirectory>) -> Self {
        Self { jwt, directory }
    }

    /// 校验 token 并解析身份（长连接握手与 REST 共用）
    pub async fn authenticate_token(&self, token: &str) -> Result<Principal, ApiError> {
        let claims = self.jwt.verify_token(token)?;
        let principal = self
            .directory
            .resolve(PrincipalId::new(claims.principal_id))
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "directory lookup failed during authentication");
                ApiError::unauthorized("authentication failed")
            })?
            .ok_or_else(|| ApiError::unauthorized("authentication failed"))?;

        Ok(principal)
    }

    /// REST 请求的 Authorization 头认证
    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let token = bearer_from_headers(headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
        self.authenticate_token(&token).await
    }
}

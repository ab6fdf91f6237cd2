//! JWT 验证模块
//!
//! 令牌由外部认证子系统签发，这里只负责验证和取出用户身份。
//! 优先从 `jwt` cookie 取令牌，兼容 Authorization Bearer 头。

use axum::http::HeaderMap;
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
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

    /// 生成 JWT token（测试和工具用，签发本身归认证子系统）
    pub fn generate_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            user_id,
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

    /// 从请求头中提取并验证用户身份，HTTP 路由用，失败即 401
    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<Uuid, ApiError> {
        let token = extract_token(headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
        let claims = self.verify_token(&token)?;
        Ok(claims.user_id)
    }

    /// WebSocket 握手用的宽松版本：缺失或无效的令牌返回 None，
    /// 连接降级为匿名而不是被拒绝。
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<Uuid> {
        let token = extract_token(headers)?;
        match self.verify_token(&token) {
            Ok(claims) => Some(claims.user_id),
            Err(_) => {
                tracing::debug!("websocket token rejected, continuing as anonymous");
                None
            }
        }
    }
}

/// cookie 优先，Bearer 头兜底
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_cookie_token(headers) {
        return Some(token);
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers
        .get(axum::http::header::COOKIE)
        .and_then(|header| header.to_str().ok())?;
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("jwt="))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

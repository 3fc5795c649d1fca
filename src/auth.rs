//! 单密码认证
//!
//! 配置了密码时，`/agent/auth` 用密码换取 token，`/agent/chat` 校验 bearer token；
//! 未配置密码时认证关闭，任何密码都能通过，也不要求 token。
//!
//! token 是 `sha256(secret ":" password)` 的十六进制，进程内固定。
//! 未配置 secret 时每次启动随机生成，重启后旧 token 失效。

use crate::config::AuthConfig;
use crate::error::RelayError;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 认证器
#[derive(Clone)]
pub struct Authenticator {
    password: Option<String>,
    token: Option<String>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Authenticator {
    pub fn new(password: Option<String>, token_secret: Option<String>) -> Self {
        let password = password.filter(|p| !p.is_empty());
        let token = password.as_ref().map(|password| {
            let secret = token_secret.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            derive_token(&secret, password)
        });
        Self { password, token }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.password.clone(), config.token_secret.clone())
    }

    /// 关闭认证
    pub fn disabled() -> Self {
        Self {
            password: None,
            token: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password.is_some()
    }

    /// 校验密码，成功时返回 token（认证关闭时为 None）
    pub fn login(&self, provided: &str) -> Result<Option<String>, RelayError> {
        let (Some(password), Some(token)) = (&self.password, &self.token) else {
            return Ok(None);
        };
        if provided.as_bytes().ct_eq(password.as_bytes()).into() {
            Ok(Some(token.clone()))
        } else {
            Err(RelayError::InvalidPassword)
        }
    }

    /// 校验 bearer token
    pub fn verify(&self, provided: Option<&str>) -> Result<(), RelayError> {
        let Some(expected) = &self.token else {
            return Ok(());
        };
        match provided {
            Some(token) if token.as_bytes().ct_eq(expected.as_bytes()).into() => Ok(()),
            _ => Err(RelayError::Unauthorized),
        }
    }

    /// 从请求头校验
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<(), RelayError> {
        self.verify(bearer_token(headers))
    }
}

fn derive_token(secret: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// 提取 `Authorization: Bearer <token>` 中的 token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

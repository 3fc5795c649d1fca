//! 客户端身份解析

use crate::logger::preview;
use axum::http::HeaderMap;

/// 无法识别身份时使用的共享桶
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// 日志中身份字段的最大字符数
const IDENTITY_LOG_CHARS: usize = 64;

/// 代理头优先级
pub const IDENTITY_HEADERS: &[&str] = &["cf-connecting-ip", "x-real-ip", "x-forwarded-for"];

/// 按优先级从代理头解析客户端身份
///
/// `x-forwarded-for` 取第一跳。全部缺失时返回 [`UNKNOWN_IDENTITY`]。
pub fn resolve_identity(headers: &HeaderMap) -> String {
    IDENTITY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

/// 日志用的身份：来自客户端可控的请求头，截断并脱敏后才能记录
pub fn identity_for_log(identity: &str) -> String {
    preview(identity, IDENTITY_LOG_CHARS)
}

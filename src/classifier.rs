//! 错误分类
//!
//! 把上游的各种失败信号（HTTP 状态码、agent 终止结果的失败子类型、本地异常文本）
//! 映射到固定的错误类别和一条可以直接展示给用户的消息。
//!
//! 规则按优先级排列，第一条命中即返回。兜底消息总是带上原始细节。

/// 上游失败信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure<'a> {
    /// 上游 HTTP 调用返回的非成功状态码（无响应体）
    HttpStatus(u16),
    /// agent 终止结果的失败子类型及细节
    ResultSubtype { subtype: &'a str, detail: &'a str },
    /// 本地异常（网络、超时、响应格式错误等）
    Exception(&'a str),
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    BudgetExceeded,
    TurnLimitExceeded,
    Authentication,
    RateLimited,
    Connectivity,
    Timeout,
    TooManyRequests,
    ServiceUnavailable,
    Unknown,
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
}

/// 关键词规则
struct KeywordRule {
    category: ErrorCategory,
    keywords: &'static [&'static str],
    message: &'static str,
}

/// 关键词规则表（优先级从高到低）
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        category: ErrorCategory::BudgetExceeded,
        keywords: &["max_budget", "budget"],
        message: "Budget limit reached for this request. Try a more focused question.",
    },
    KeywordRule {
        category: ErrorCategory::TurnLimitExceeded,
        keywords: &["max_turns", "maximum number of turns", "turn limit"],
        message: "The agent took too many steps to answer. Try a simpler or more specific question.",
    },
    KeywordRule {
        category: ErrorCategory::Authentication,
        keywords: &[
            "authentication",
            "api key",
            "api_key",
            "x-api-key",
            "unauthorized",
            "invalid bearer",
        ],
        message: "Authentication error. Please check the service configuration.",
    },
    KeywordRule {
        category: ErrorCategory::RateLimited,
        keywords: &["rate limit", "rate_limit", "too many requests", "throttl"],
        message: "Too many requests. Please wait a moment and try again.",
    },
    KeywordRule {
        category: ErrorCategory::Connectivity,
        keywords: &[
            "network",
            "fetch",
            "connect",
            "dns",
            "connection refused",
            "connection reset",
        ],
        message: "Unable to reach the AI service. Please check your connection and try again.",
    },
    KeywordRule {
        category: ErrorCategory::Timeout,
        keywords: &["timeout", "timed out"],
        message: "The request timed out. Please try a simpler question.",
    },
];

const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "The AI service is temporarily unavailable. Please try again.";

/// 分类上游失败
///
/// 永不失败，总是返回可展示的消息。
pub fn classify(failure: UpstreamFailure<'_>) -> ClassifiedError {
    match failure {
        UpstreamFailure::HttpStatus(status) => classify_status(status),
        UpstreamFailure::ResultSubtype { subtype, detail } => {
            let haystack = format!("{} {}", subtype, detail).to_lowercase();
            if let Some(rule) = match_keywords(&haystack) {
                return rule;
            }
            let raw = if detail.trim().is_empty() {
                subtype
            } else {
                detail
            };
            unknown(raw)
        }
        UpstreamFailure::Exception(text) => {
            match_keywords(&text.to_lowercase()).unwrap_or_else(|| unknown(text))
        }
    }
}

/// 便捷函数：只取消息
pub fn user_message(failure: UpstreamFailure<'_>) -> String {
    classify(failure).message
}

/// 把 HTTP 客户端错误描述成可分类的文本
///
/// reqwest 的错误文本本身不一定带关键词，这里按错误种类加上前缀，原始细节保留在后面。
pub fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timeout: {}", err)
    } else if err.is_connect() {
        format!("network connection failed: {}", err)
    } else if err.is_body() || err.is_decode() {
        format!("network stream interrupted: {}", err)
    } else {
        err.to_string()
    }
}

/// 分类 HTTP 客户端错误
pub fn classify_transport(err: &reqwest::Error) -> ClassifiedError {
    classify(UpstreamFailure::Exception(&describe_transport_error(err)))
}

fn match_keywords(haystack: &str) -> Option<ClassifiedError> {
    KEYWORD_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| haystack.contains(k)))
        .map(|rule| ClassifiedError {
            category: rule.category,
            message: rule.message.to_string(),
        })
}

fn classify_status(status: u16) -> ClassifiedError {
    match status {
        429 => ClassifiedError {
            category: ErrorCategory::TooManyRequests,
            message: TOO_MANY_REQUESTS_MESSAGE.to_string(),
        },
        500..=599 => ClassifiedError {
            category: ErrorCategory::ServiceUnavailable,
            message: SERVICE_UNAVAILABLE_MESSAGE.to_string(),
        },
        _ => ClassifiedError {
            category: ErrorCategory::Unknown,
            message: format!("Request failed with status {}", status),
        },
    }
}

fn unknown(raw: &str) -> ClassifiedError {
    let raw = raw.trim();
    let detail = if raw.is_empty() { "unknown error" } else { raw };
    ClassifiedError {
        category: ErrorCategory::Unknown,
        message: format!("Something went wrong: {}", detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(failure: UpstreamFailure<'_>) -> ErrorCategory {
        classify(failure).category
    }

    #[test]
    fn test_result_subtypes() {
        assert_eq!(
            category(UpstreamFailure::ResultSubtype {
                subtype: "error_max_budget_usd",
                detail: ""
            }),
            ErrorCategory::BudgetExceeded
        );
        assert_eq!(
            category(UpstreamFailure::ResultSubtype {
                subtype: "error_max_turns",
                detail: "Reached maximum number of turns (20)"
            }),
            ErrorCategory::TurnLimitExceeded
        );
    }

    #[test]
    fn test_priority_budget_before_rate_limit() {
        let failure = UpstreamFailure::Exception("rate limit hit while budget exhausted");
        assert_eq!(category(failure), ErrorCategory::BudgetExceeded);
    }

    #[test]
    fn test_auth_keywords() {
        let failure = UpstreamFailure::ResultSubtype {
            subtype: "error_during_execution",
            detail: "Invalid API key · Please run /login",
        };
        let classified = classify(failure);
        assert_eq!(classified.category, ErrorCategory::Authentication);
        assert!(classified.message.contains("Authentication error"));
    }

    #[test]
    fn test_exceptions() {
        assert_eq!(
            category(UpstreamFailure::Exception(
                "network connection failed: error sending request"
            )),
            ErrorCategory::Connectivity
        );
        assert_eq!(
            category(UpstreamFailure::Exception("operation timed out")),
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            category(UpstreamFailure::HttpStatus(429)),
            ErrorCategory::TooManyRequests
        );
        let classified = classify(UpstreamFailure::HttpStatus(503));
        assert_eq!(classified.category, ErrorCategory::ServiceUnavailable);
        assert!(classified.message.contains("temporarily unavailable"));
        assert_eq!(
            user_message(UpstreamFailure::HttpStatus(418)),
            "Request failed with status 418"
        );
    }

    #[test]
    fn test_unknown_keeps_raw_detail() {
        let message = user_message(UpstreamFailure::ResultSubtype {
            subtype: "error_during_execution",
            detail: "tool crashed: segfault in grep",
        });
        assert_eq!(message, "Something went wrong: tool crashed: segfault in grep");

        let message = user_message(UpstreamFailure::ResultSubtype {
            subtype: "error_weird",
            detail: "",
        });
        assert_eq!(message, "Something went wrong: error_weird");

        assert_eq!(
            user_message(UpstreamFailure::Exception("")),
            "Something went wrong: unknown error"
        );
    }
}

//! HTTP 服务
//!
//! 按 `server.role` 挂载两层路由：
//! - 转发层 `/api/chat`、`/api/auth`：校验、限流、裁剪历史，把上游字节流原样转给客户端
//! - agent 层 `/agent/chat`、`/agent/auth`：校验 token，调用 agent，把原始事件转换成线协议
//!
//! `GET /health` 总是挂载。

pub mod handlers;
pub mod response;


use crate::agent::{AgentInvoker, ClaudeCliInvoker};
use crate::auth::Authenticator;
use crate::config::RelayConfig;
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;

/// 服务启动错误
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("无法创建 HTTP 客户端: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("无法监听 {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("服务运行失败: {0}")]
    Serve(#[source] std::io::Error),
}

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub limiter: RateLimiter,
    pub http: reqwest::Client,
    pub invoker: Arc<dyn AgentInvoker>,
    pub auth: Authenticator,
}

impl AppState {
    pub fn new(config: RelayConfig, invoker: Arc<dyn AgentInvoker>) -> Result<Self, ServerError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs))
            .build()?;
        let limiter = RateLimiter::in_memory(RateLimitPolicy::from(&config.rate_limit));
        let auth = Authenticator::from_config(&config.auth);
        Ok(Self {
            config: Arc::new(config),
            limiter,
            http,
            invoker,
            auth,
        })
    }

    /// 使用 Claude CLI 运行时
    pub fn from_config(config: RelayConfig) -> Result<Self, ServerError> {
        let invoker = Arc::new(ClaudeCliInvoker::new(config.agent.clone()));
        Self::new(config, invoker)
    }

    /// 替换限流器（例如共享外部存储）
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    let role = state.config.server.role;
    let body_limit = state.config.server.body_limit_bytes;

    let mut router = Router::new().route("/health", get(handlers::health));

    if role.serves_bridge() {
        router = router
            .route("/api/chat", post(handlers::chat::bridge_chat))
            .route("/api/auth", post(handlers::auth::bridge_auth));
    }
    if role.serves_agent() {
        router = router
            .route("/agent/chat", post(handlers::agent::agent_chat))
            .route("/agent/auth", post(handlers::auth::agent_auth));
    }

    router
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

/// 启动服务，直到收到 Ctrl-C
pub async fn run_server(state: AppState) -> Result<(), ServerError> {
    let addr = state.config.server.listen_addr.clone();
    let role = state.config.server.role;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!(
        "[SERVER] 监听 {} (role={:?}, agent={}, auth={})",
        addr,
        role,
        state.invoker.name(),
        if state.auth.is_enabled() { "on" } else { "off" }
    );
    if role.serves_bridge() {
        tracing::info!("[SERVER] 转发上游: {}", state.config.upstream_base_url());
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SERVER] 无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[SERVER] 收到退出信号，停止服务");
}

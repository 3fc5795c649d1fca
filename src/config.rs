//! 配置管理
//!
//! 配置来源按优先级从低到高：
//! - 内置默认值
//! - YAML 配置文件（`RELAY_CONFIG` 指定，或 `~/.chat-relay/config.yaml`）
//! - `RELAY_*` 环境变量

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// 默认监听地址
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8787";

/// 未配置上游时，本进程 agent 层的路径前缀
pub const LOCAL_AGENT_PREFIX: &str = "/agent";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置文件解析失败: {0}")]
    Parse(String),

    #[error("配置项 {key} 的值无效: {value}")]
    InvalidValue { key: String, value: String },
}

/// 服务角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// 同时挂载 bridge 层与 agent 层
    #[default]
    All,
    /// 只做转发：校验、限流、管道
    Bridge,
    /// 只运行 agent 与流转换
    Agent,
}

impl ServerRole {
    pub fn serves_bridge(&self) -> bool {
        matches!(self, ServerRole::All | ServerRole::Bridge)
    }

    pub fn serves_agent(&self) -> bool {
        matches!(self, ServerRole::All | ServerRole::Agent)
    }
}

impl FromStr for ServerRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ServerRole::All),
            "bridge" => Ok(ServerRole::Bridge),
            "agent" => Ok(ServerRole::Agent),
            _ => Err(ConfigError::InvalidValue {
                key: "server.role".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub role: ServerRole,
    /// 请求体大小上限（字节）
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            role: ServerRole::All,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// 上游（agent 层）配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// agent 层基础地址，聊天走 `{base_url}/chat`，认证走 `{base_url}/auth`
    ///
    /// 未设置时指向本进程的 agent 层，随最终的监听地址变化。
    pub base_url: Option<String>,
    /// 连接超时（秒），只约束建连，不约束整个流
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_secs: 10,
        }
    }
}

/// Agent 运行时配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// agent CLI 可执行文件
    pub command: String,
    pub model: Option<String>,
    pub max_turns: u32,
    pub max_budget_usd: Option<f64>,
    pub allowed_tools: Vec<String>,
    /// 未指定仓库时的工作目录
    pub work_dir: PathBuf,
    /// 仓库浅克隆缓存目录
    pub checkout_dir: PathBuf,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chat-relay");
        Self {
            command: "claude".to_string(),
            model: None,
            max_turns: 20,
            max_budget_usd: Some(0.5),
            allowed_tools: vec!["Read".to_string(), "Grep".to_string(), "Glob".to_string()],
            work_dir: PathBuf::from("."),
            checkout_dir: base.join("checkouts"),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// 默认系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a code exploration assistant. \
Answer questions about the repository in the current working directory. \
Read and search the code before answering, cite file paths, and keep answers concise.";

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 5,
        }
    }
}

/// 历史窗口配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// 保留的问答对数量，消息数上限为其两倍
    pub questions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { questions: 8 }
    }
}

impl HistoryConfig {
    pub fn max_messages(&self) -> usize {
        self.questions * 2
    }
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// 访问密码，未设置时关闭认证
    pub password: Option<String>,
    /// token 派生密钥，未设置时每次启动随机生成
    pub token_secret: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 中继总配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub agent: AgentConfig,
    pub rate_limit: RateLimitConfig,
    pub history: HistoryConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// 加载配置：文件 + 环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// 加载配置，`explicit` 优先于 `RELAY_CONFIG` 与默认路径
    pub fn load_with(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = explicit.or_else(|| std::env::var("RELAY_CONFIG").ok().map(PathBuf::from));
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 从 YAML 文件读取
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 上游基础地址：显式配置优先，否则由监听地址推导出本进程的 agent 层
    pub fn upstream_base_url(&self) -> String {
        match &self.upstream.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => local_agent_url(&self.server.listen_addr),
        }
    }

    pub fn upstream_chat_url(&self) -> String {
        format!("{}/chat", self.upstream_base_url())
    }

    pub fn upstream_auth_url(&self) -> String {
        format!("{}/auth", self.upstream_base_url())
    }

    /// 应用环境变量覆盖
    ///
    /// `lookup` 抽象了环境变量读取，测试中可以直接传入闭包。
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RELAY_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("RELAY_ROLE") {
            self.server.role = v.parse()?;
        }
        if let Some(v) = lookup("RELAY_UPSTREAM_URL") {
            self.upstream.base_url = non_empty(v);
        }
        if let Some(v) = lookup("RELAY_AGENT_COMMAND") {
            self.agent.command = v;
        }
        if let Some(v) = lookup("RELAY_MODEL") {
            self.agent.model = non_empty(v);
        }
        if let Some(v) = lookup("RELAY_MAX_TURNS") {
            self.agent.max_turns = parse_value("RELAY_MAX_TURNS", &v)?;
        }
        if let Some(v) = lookup("RELAY_MAX_BUDGET_USD") {
            self.agent.max_budget_usd = Some(parse_value("RELAY_MAX_BUDGET_USD", &v)?);
        }
        if let Some(v) = lookup("RELAY_WORK_DIR") {
            self.agent.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELAY_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_value("RELAY_RATE_LIMIT_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("RELAY_RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_value("RELAY_RATE_LIMIT_MAX_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("RELAY_HISTORY_QUESTIONS") {
            self.history.questions = parse_value("RELAY_HISTORY_QUESTIONS", &v)?;
        }
        if let Some(v) = lookup("RELAY_PASSWORD") {
            self.auth.password = non_empty(v);
        }
        if let Some(v) = lookup("RELAY_TOKEN_SECRET") {
            self.auth.token_secret = non_empty(v);
        }
        if let Some(v) = lookup("RELAY_LOG") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("RELAY_LOG_JSON") {
            self.logging.json = parse_value("RELAY_LOG_JSON", &v)?;
        }
        Ok(())
    }
}

/// 监听地址对应的本地 agent 层地址
///
/// 通配地址（`0.0.0.0`、`::`）换成同协议族的回环地址；无法解析的地址（如主机名）原样使用。
fn local_agent_url(listen_addr: &str) -> String {
    let authority = match listen_addr.parse::<SocketAddr>() {
        Ok(mut addr) => {
            if addr.ip().is_unspecified() {
                let loopback = match addr.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                };
                addr.set_ip(loopback);
            }
            addr.to_string()
        }
        Err(_) => listen_addr.to_string(),
    };
    format!("http://{}{}", authority, LOCAL_AGENT_PREFIX)
}

/// 默认配置文件路径: ~/.chat-relay/config.yaml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".chat-relay").join("config.yaml"))
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

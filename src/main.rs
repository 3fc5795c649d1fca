//! chat-relay 服务入口

use anyhow::Context;
use chat_relay::config::{RelayConfig, ServerRole};
use chat_relay::logger::init_logging;
use chat_relay::server::{run_server, AppState};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "chat-relay")]
#[command(about = "Streaming chat relay for a tool-using code agent")]
struct Cli {
    /// YAML 配置文件
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// 监听地址，覆盖配置
    #[arg(long)]
    listen: Option<String>,

    /// 挂载的路由层：all、bridge 或 agent
    #[arg(long)]
    role: Option<ServerRole>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RelayConfig::load_with(cli.config).context("加载配置失败")?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(role) = cli.role {
        config.server.role = role;
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("日志初始化失败: {}", e);
    }

    let state = AppState::from_config(config).context("初始化服务失败")?;
    run_server(state).await.context("服务异常退出")?;
    Ok(())
}

//! relay-chat：终端聊天客户端
//!
//! 每行输入一个问题；`/new` 开始新对话，`/quit` 退出。

use anyhow::Context;
use chat_relay::client::{ChatClient, ChatState, ClientError, ConsumerUpdate, FinishedMessage};
use chat_relay::logger::init_stderr_logging;
use clap::Parser;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "relay-chat")]
#[command(about = "Terminal client for chat-relay")]
struct Cli {
    /// 中继地址
    #[arg(long, default_value = "http://127.0.0.1:8787", env = "RELAY_URL")]
    url: String,

    /// 认证密码
    #[arg(long, env = "RELAY_PASSWORD")]
    password: Option<String>,

    /// 要探索的仓库地址
    #[arg(long)]
    repo: Option<String>,

    /// 带入上下文的历史问题数
    #[arg(long, default_value_t = 8)]
    history: usize,

    /// 日志级别（输出到 stderr）
    #[arg(long, default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_stderr_logging(&cli.log) {
        eprintln!("日志初始化失败: {}", e);
    }

    let mut client = ChatClient::new(cli.url.clone(), cli.history);
    client.set_repo_url(cli.repo.clone());

    if let Some(password) = &cli.password {
        client
            .authenticate(password)
            .await
            .context("authentication failed")?;
    }

    eprintln!("connected to {} (type /new or /quit)", cli.url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                client.clear_history();
                eprintln!("(new conversation)");
                continue;
            }
            _ => {}
        }

        match client.send(prompt, render_update).await {
            Ok(Some(finished)) => {
                println!();
                print_summary(&finished);
            }
            Ok(None) => eprintln!("(no response)"),
            Err(ClientError::Unauthorized) => match &cli.password {
                Some(password) => {
                    eprintln!("session expired, re-authenticating");
                    client.authenticate(password).await?;
                }
                None => eprintln!("unauthorized: restart with --password"),
            },
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

fn render_update(update: &ConsumerUpdate, state: &ChatState) {
    match update {
        ConsumerUpdate::Text(delta) => {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        ConsumerUpdate::Tool(activity) => match &activity.detail {
            Some(detail) => eprintln!("\n  [{}] {}", activity.tool, detail),
            None => eprintln!("\n  [{}]", activity.tool),
        },
        ConsumerUpdate::Turn(turn) => eprintln!("  -- turn {}", turn),
        ConsumerUpdate::ResultFallback => {
            print!("{}", state.content);
            let _ = std::io::stdout().flush();
        }
        ConsumerUpdate::Error(message) => {
            print!("\n\nError: {}", message);
            let _ = std::io::stdout().flush();
        }
        ConsumerUpdate::Usage | ConsumerUpdate::ResultIgnored => {}
    }
}

fn print_summary(finished: &FinishedMessage) {
    let Some(usage) = &finished.usage else {
        return;
    };
    let cost = usage
        .total_cost_usd
        .map(|c| format!("${:.4}", c))
        .unwrap_or_else(|| "-".to_string());
    let seconds = usage.total_duration_ms.unwrap_or_default() as f64 / 1000.0;
    eprintln!(
        "  ({} tools, {} turns, {}, {:.1}s)",
        finished.tool_count,
        usage.num_turns.unwrap_or_default(),
        cost,
        seconds
    );
}

//! Claude CLI 运行时
//!
//! 以子进程方式启动 agent CLI（`stream-json` 输出），逐行读取 stdout 并解析为原始事件。
//! 指定仓库时先浅克隆到本地缓存目录，再以该目录为工作目录运行。

use super::events::RawAgentEvent;
use super::invoker::{AgentError, AgentEventStream, AgentInvoker, AgentRequest};
use super::prompt::build_prompt;
use crate::config::AgentConfig;
use crate::logger::preview;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// stderr 保留的尾部长度（字符）
const STDERR_TAIL_CHARS: usize = 2000;

/// 检出目录名中哈希前缀的字节数
const CHECKOUT_HASH_BYTES: usize = 6;

/// Claude CLI 运行时
#[derive(Debug, Clone)]
pub struct ClaudeCliInvoker {
    config: AgentConfig,
}

impl ClaudeCliInvoker {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// 构建命令行参数
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            prompt.to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--max-turns".to_string(),
            self.config.max_turns.to_string(),
        ];

        if !self.config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.config.allowed_tools.join(","));
        }
        if let Some(budget) = self.config.max_budget_usd {
            args.push("--max-budget-usd".to_string());
            args.push(budget.to_string());
        }
        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(system_prompt) = &self.config.system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(system_prompt.clone());
        }
        args
    }

    /// 确定工作目录
    ///
    /// 没有仓库地址时使用默认工作目录；有则复用或创建浅克隆。
    async fn prepare_workdir(&self, repo_url: Option<&str>) -> Result<PathBuf, AgentError> {
        let Some(repo_url) = repo_url else {
            return Ok(self.config.work_dir.clone());
        };

        let dest = self.config.checkout_dir.join(checkout_dir_name(repo_url)?);
        if dest.join(".git").exists() {
            debug!("[AGENT] 复用仓库检出: {}", dest.display());
            return Ok(dest);
        }

        tokio::fs::create_dir_all(&self.config.checkout_dir)
            .await
            .map_err(|e| AgentError::Checkout(format!("无法创建检出目录: {}", e)))?;

        // 先克隆到临时目录再改名，避免并发请求看到半成品
        let staging = self
            .config
            .checkout_dir
            .join(format!(".staging-{}", uuid::Uuid::new_v4()));

        info!("[AGENT] 浅克隆仓库: {} -> {}", repo_url, dest.display());
        let output = Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--")
            .arg(repo_url)
            .arg(&staging)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| AgentError::Checkout(format!("无法启动 git: {}", e)))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Checkout(format!(
                "git clone failed for {}: {}",
                repo_url,
                stderr.trim()
            )));
        }

        if let Err(e) = tokio::fs::rename(&staging, &dest).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            // 另一个请求抢先完成了克隆
            if !dest.join(".git").exists() {
                return Err(AgentError::Checkout(format!("无法移动检出目录: {}", e)));
            }
        }
        Ok(dest)
    }
}

/// 由仓库地址生成缓存目录名
///
/// 只接受 http(s) 地址。可读部分之后附加规范化地址的 sha256 前缀，
/// 清洗后相同的不同地址（如 `foo-bar/baz` 与 `foo/bar-baz`）不会共用目录。
pub fn checkout_dir_name(repo_url: &str) -> Result<String, AgentError> {
    let parsed = url::Url::parse(repo_url)
        .map_err(|e| AgentError::InvalidRequest(format!("invalid repoUrl {}: {}", repo_url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AgentError::InvalidRequest(format!(
            "unsupported repoUrl scheme: {}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| AgentError::InvalidRequest(format!("repoUrl has no host: {}", repo_url)))?;

    let path = parsed.path().trim_matches('/').trim_end_matches(".git");
    let normalized = match parsed.port() {
        Some(port) => format!("{}:{}/{}", host, port, path),
        None => format!("{}/{}", host, path),
    };
    let readable: String = normalized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let digest = Sha256::digest(normalized.as_bytes());
    let suffix: String = digest[..CHECKOUT_HASH_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    Ok(format!("{}-{}", readable.trim_matches('-'), suffix))
}

/// 取字符串末尾 `max_chars` 个字符
fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}

fn spawn_agent(command: &str, args: &[String], workdir: &Path) -> Result<tokio::process::Child, AgentError> {
    Command::new(command)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AgentError::Spawn(format!("{}: {}", command, e)))
}

#[async_trait]
impl AgentInvoker for ClaudeCliInvoker {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentEventStream, AgentError> {
        let workdir = self.prepare_workdir(request.repo_url.as_deref()).await?;
        let prompt = build_prompt(&request.prompt, &request.history);
        let args = self.build_args(&prompt);

        info!(
            "[AGENT] 启动 {}: workdir={}, history={}, prompt={}",
            self.config.command,
            workdir.display(),
            request.history.len(),
            preview(&request.prompt, 80)
        );

        let mut child = spawn_agent(&self.config.command, &args, &workdir)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Spawn("无法获取 stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Spawn("无法获取 stderr".to_string()))?;

        let stderr_handle = tokio::spawn(async move {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer).await;
            tail_chars(&String::from_utf8_lossy(&buffer), STDERR_TAIL_CHARS)
        });

        let stream = async_stream::stream! {
            let mut reader = BufReader::new(stdout);
            let mut buffer = Vec::new();
            let mut saw_result = false;

            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buffer);
                        match RawAgentEvent::parse_line(&line) {
                            Some(event) => {
                                if matches!(event, RawAgentEvent::Result(_)) {
                                    saw_result = true;
                                }
                                yield Ok(event);
                            }
                            None => {
                                if !line.trim().is_empty() {
                                    debug!("[AGENT] 跳过非 JSON 输出: {}", preview(&line, 120));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("[AGENT] 读取 stdout 失败: {}", e);
                        yield Err(AgentError::Io(e));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() && !saw_result => {
                    let stderr = stderr_handle.await.unwrap_or_default();
                    warn!("[AGENT] 进程异常退出: {}, stderr={}", status, preview(&stderr, 200));
                    yield Err(AgentError::Process {
                        status: status.to_string(),
                        stderr: stderr.trim().to_string(),
                    });
                }
                Ok(status) => {
                    debug!("[AGENT] 进程退出: {}", status);
                }
                Err(e) if !saw_result => {
                    yield Err(AgentError::Io(e));
                }
                Err(e) => {
                    warn!("[AGENT] 等待进程失败: {}", e);
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        &self.config.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoker() -> ClaudeCliInvoker {
        ClaudeCliInvoker::new(AgentConfig {
            model: Some("claude-sonnet-4-5".to_string()),
            max_turns: 7,
            max_budget_usd: Some(0.25),
            system_prompt: None,
            ..Default::default()
        })
    }

    #[test]
    fn test_build_args() {
        let args = invoker().build_args("hello");
        assert_eq!(
            args,
            vec![
                "-p",
                "hello",
                "--output-format",
                "stream-json",
                "--verbose",
                "--max-turns",
                "7",
                "--allowedTools",
                "Read,Grep,Glob",
                "--max-budget-usd",
                "0.25",
                "--model",
                "claude-sonnet-4-5",
            ]
        );
    }

    #[test]
    fn test_checkout_dir_name() {
        let name = checkout_dir_name("https://github.com/tokio-rs/axum.git").unwrap();
        assert!(name.starts_with("github.com-tokio-rs-axum-"));
        assert_eq!(name.len(), "github.com-tokio-rs-axum-".len() + CHECKOUT_HASH_BYTES * 2);
        assert_eq!(
            checkout_dir_name("https://github.com/a/b/").unwrap(),
            checkout_dir_name("https://github.com/a/b.git").unwrap()
        );
        assert!(checkout_dir_name("file:///etc").is_err());
        assert!(checkout_dir_name("--upload-pack=evil").is_err());
    }

    #[test]
    fn test_checkout_dir_name_keeps_distinct_repos_apart() {
        assert_ne!(
            checkout_dir_name("https://github.com/foo-bar/baz").unwrap(),
            checkout_dir_name("https://github.com/foo/bar-baz").unwrap()
        );
        assert_ne!(
            checkout_dir_name("https://git.example.com:8443/a/b").unwrap(),
            checkout_dir_name("https://git.example.com/a/b").unwrap()
        );
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_stdout_lines_and_skips_noise() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'warming up'\necho '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}'\necho '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"hi\"}'\n",
        )
        .unwrap();
        make_executable(&script);

        let invoker = ClaudeCliInvoker::new(AgentConfig {
            command: script.display().to_string(),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let events: Vec<_> = invoker
            .invoke(AgentRequest::new("q"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(RawAgentEvent::Assistant(_))));
        assert!(matches!(events[1], Ok(RawAgentEvent::Result(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_stdout_line_is_skipped() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf 'progress \\377\\376\\n'\necho '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"ok\"}'\n",
        )
        .unwrap();
        make_executable(&script);

        let invoker = ClaudeCliInvoker::new(AgentConfig {
            command: script.display().to_string(),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let events: Vec<_> = invoker
            .invoke(AgentRequest::new("q"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(RawAgentEvent::Result(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_without_result_is_process_error() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-agent.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'missing credentials' >&2\nexit 3\n").unwrap();
        make_executable(&script);

        let invoker = ClaudeCliInvoker::new(AgentConfig {
            command: script.display().to_string(),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let events: Vec<_> = invoker
            .invoke(AgentRequest::new("q"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            Err(AgentError::Process { stderr, .. }) => assert_eq!(stderr, "missing credentials"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_command_is_spawn_error() {
        let invoker = ClaudeCliInvoker::new(AgentConfig {
            command: "/nonexistent/agent-binary".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            invoker.invoke(AgentRequest::new("q")).await,
            Err(AgentError::Spawn(_))
        ));
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
    }
}

//! `git clone` subprocess driver

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use super::{Checkout, CloneError, CloneOptions};

/// Runs the system `git` binary
#[derive(Debug, Clone)]
pub struct GitCheckout {
    program: String,
}

impl GitCheckout {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Use a specific git executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitCheckout {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `git clone` under `options`
pub fn clone_args(url: &str, dest: &Path, options: &CloneOptions) -> Vec<String> {
    let mut args = Vec::new();
    if options.long_paths {
        args.push("-c".to_string());
        args.push("core.longpaths=true".to_string());
    }
    args.push("clone".to_string());
    args.push("--progress".to_string());
    if let Some(depth) = options.depth {
        args.push("--depth".to_string());
        args.push(depth.to_string());
    }
    if options.single_branch {
        args.push("--single-branch".to_string());
    }
    if options.no_checkout {
        args.push("--no-checkout".to_string());
    }
    args.push(url.to_string());
    args.push(dest.display().to_string());
    args
}

#[async_trait]
impl Checkout for GitCheckout {
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
        on_progress: &(dyn for<'s> Fn(&'s str) + Send + Sync),
    ) -> Result<(), CloneError> {
        let mut child = Command::new(&self.program)
            .args(clone_args(url, dest, options))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CloneError::Spawn(e.to_string()))?;

        let mut output = OutputTail::new(options.output_buffer_bytes);
        if let Some(mut stderr) = child.stderr.take() {
            let mut buf = [0u8; 4096];
            let mut line = Vec::new();
            loop {
                let n = stderr
                    .read(&mut buf)
                    .await
                    .map_err(|e| CloneError::Spawn(e.to_string()))?;
                if n == 0 {
                    break;
                }
                for &byte in &buf[..n] {
                    // git rewrites progress lines in place with '\r'
                    if byte == b'\r' || byte == b'\n' {
                        if !line.is_empty() {
                            let text = String::from_utf8_lossy(&line).into_owned();
                            on_progress(text.as_str());
                            output.push_line(&text);
                            line.clear();
                        }
                    } else {
                        line.push(byte);
                    }
                }
            }
            if !line.is_empty() {
                let text = String::from_utf8_lossy(&line).into_owned();
                on_progress(text.as_str());
                output.push_line(&text);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| CloneError::Spawn(e.to_string()))?;

        if status.success() {
            debug!(url = %redact(url), dest = %dest.display(), "git clone finished");
            Ok(())
        } else {
            Err(CloneError::Failed {
                code: status.code(),
                output: redact(&output.into_string()),
            })
        }
    }
}

/// Keeps the last `capacity` bytes of output, dropping progress noise
struct OutputTail {
    text: String,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity: capacity.max(1),
        }
    }

    fn push_line(&mut self, line: &str) {
        if line.contains('%') && !line.contains("error") && !line.contains("fatal") {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line);
        if self.text.len() > self.capacity {
            let mut cut = self.text.len() - self.capacity;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    fn into_string(self) -> String {
        self.text.trim().to_string()
    }
}

/// Strip credentials embedded in an https URL
pub fn redact(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("https://") {
        let (before, after) = rest.split_at(pos + "https://".len());
        out.push_str(before);
        let end = after
            .find(|c: char| c.is_whitespace() || c == '/' || c == '\'')
            .unwrap_or(after.len());
        match after[..end].rfind('@') {
            Some(at) => {
                out.push_str("***@");
                rest = &after[at + 1..];
            }
            None => rest = after,
        }
    }
    out.push_str(rest);
    out
}

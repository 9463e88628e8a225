//! # Presentation
//!
//! How ceremony progress reaches the person at the keyboard. The flow emits
//! three signals (`loading`, `error`, `success`); how they look is up to the
//! [`StatusSink`] implementation.
//!
//! The terminal pieces also live here: a shared stdin [`LineSource`] (the
//! command loop and the presence prompt read from the same stream) and
//! [`TerminalPresence`], the "touch your authenticator" prompt.

use crate::platform::software::{PresenceRequest, UserPresence};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};

/// Receiver of ceremony status signals
pub trait StatusSink: Send + Sync {
    /// A ceremony has started
    fn loading(&self, ceremony: &str, username: &str);

    /// A ceremony was aborted; `detail` is the diagnostic text
    fn error(&self, message: &str, detail: &str);

    /// A ceremony finished with a positive server verdict
    fn success(&self, ceremony: &str, username: &str);
}

/// Prints status lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalStatus;

impl StatusSink for TerminalStatus {
    fn loading(&self, ceremony: &str, username: &str) {
        println!("[..] {} for '{}' in progress", ceremony, username);
    }

    fn error(&self, message: &str, detail: &str) {
        println!("[error] {}", message);
        if !detail.is_empty() {
            println!("        exception: {}", detail);
        }
    }

    fn success(&self, ceremony: &str, username: &str) {
        println!("[ok] {} for '{}' succeeded", ceremony, username);
    }
}

/// Lines typed by the user, shared between everything that reads stdin
#[derive(Clone)]
pub struct LineSource {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl LineSource {
    /// Spawn a reader task forwarding stdin lines until EOF
    pub fn stdin() -> Self {
        let (sender, receiver) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if sender.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        });
        Self::from_receiver(receiver)
    }

    pub fn from_receiver(receiver: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Next line, or `None` once input is closed
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

/// Asks on the terminal before the software authenticator uses a key
pub struct TerminalPresence {
    lines: LineSource,
}

impl TerminalPresence {
    pub fn new(lines: LineSource) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl UserPresence for TerminalPresence {
    async fn confirm(&self, request: &PresenceRequest) -> bool {
        let user = request
            .user_name
            .as_deref()
            .map(|name| format!(" as '{}'", name))
            .unwrap_or_default();
        print!(
            "Authenticator: {} for {}{}? [y/N] ",
            request.operation, request.rp_id, user
        );
        std::io::stdout().flush().ok();

        // Dropped unanswered when the ceremony times out while we wait
        let pending = PendingPrompt::new();
        let answer = self.lines.next_line().await;
        pending.settle();

        answer.map_or(false, |answer| is_yes(&answer))
    }
}

/// Tells the user when a presence prompt is abandoned before they answer
struct PendingPrompt {
    answered: bool,
}

impl PendingPrompt {
    fn new() -> Self {
        Self { answered: false }
    }

    fn settle(mut self) {
        self.answered = true;
    }
}

impl Drop for PendingPrompt {
    fn drop(&mut self) {
        if !self.answered {
            println!();
            println!("Authenticator prompt expired; the request was cancelled.");
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

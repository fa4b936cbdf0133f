//! The agent runs on its own task; front-ends talk to it over channels.
//!
//! Requests go through a bounded queue and each carries a oneshot for its
//! reply, so a slow model call never blocks the microphone loop or the
//! Telegram dispatcher. Progress messages produced while a request is being
//! handled travel on a separate announcement channel, and a `watch` channel
//! tells every front-end when the shutdown protocol has run.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::actions::Outcome;
use crate::agent::Agent;

/// Sends progress messages to whoever speaks or prints them. Never blocks:
/// when the channel is full the message is dropped.
#[derive(Clone, Debug, Default)]
pub struct Announcer {
    tx: Option<mpsc::Sender<String>>,
}

impl Announcer {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// An announcer that discards everything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn announce(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("📢 {message}");
        let Some(tx) = &self.tx else { return };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(m)) => {
                log::debug!("Announcement queue full, dropping: {m}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

struct Request {
    command: String,
    reply: oneshot::Sender<Outcome>,
}

/// Cheap handle used by front-ends to submit commands.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<Request>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl AgentHandle {
    /// Submit a command and wait for its outcome.
    pub async fn ask(&self, command: impl Into<String>) -> Result<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request {
                command: command.into(),
                reply,
            })
            .await
            .map_err(|_| anyhow!("agent worker has stopped"))?;
        rx.await.map_err(|_| anyhow!("agent worker dropped the request"))
    }

    /// Receiver that flips to `true` once the shutdown protocol has run.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Tell every front-end to stop, e.g. on Ctrl-C.
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Move the agent onto its own task. The task ends when every handle is
/// dropped or after a request asks for shutdown.
pub fn spawn(mut agent: Agent, capacity: usize) -> (AgentHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Request>(capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let worker_shutdown = shutdown_tx.clone();

    let task = tokio::spawn(async move {
        while let Some(Request { command, reply }) = rx.recv().await {
            let outcome = agent.handle(&command).await;
            let shutdown = outcome.shutdown;
            if reply.send(outcome).is_err() {
                log::debug!("Requester went away before the reply to '{command}'");
            }
            if shutdown {
                log::info!("Shutdown requested, stopping agent worker");
                worker_shutdown.send_replace(true);
                break;
            }
        }
        log::debug!("Agent worker finished");
    });

    (
        AgentHandle {
            tx,
            shutdown_tx,
            shutdown: shutdown_rx,
        },
        task,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_announcement_queue_drops_messages() {
        let (announcer, mut rx) = Announcer::channel(1);
        announcer.announce("primeira");
        announcer.announce("segunda");
        assert_eq!(rx.recv().await.as_deref(), Some("primeira"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn external_shutdown_reaches_every_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::Config::from_lookup(|_| None);
        config.workspace = dir.path().to_path_buf();
        let agent = Agent::new(config, std::sync::Arc::new(crate::desktop::RecordingDesktop::new()));
        let (handle, task) = spawn(agent, 4);
        let other = handle.clone();
        let mut signal = other.shutdown_signal();

        assert_eq!(
            handle.ask("conte uma piada").await.unwrap().text,
            "IA não disponível. Configure a API key."
        );
        handle.request_shutdown();
        signal.changed().await.unwrap();
        assert!(other.is_shut_down());

        drop(handle);
        drop(other);
        task.await.unwrap();
    }

    #[test]
    fn silent_announcer_accepts_anything() {
        Announcer::silent().announce("nada");
    }
}

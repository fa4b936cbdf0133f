//! Terminal front-end: one command per line.

use std::io::BufRead;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::actions::Outcome;
use crate::jarvis_io::{JarvisIO, Status};
use crate::worker::AgentHandle;

const EXIT_WORDS: &[&str] = &["sair", "exit", "quit"];

pub fn is_exit(line: &str) -> bool {
    EXIT_WORDS.contains(&line.trim().to_lowercase().as_str())
}

pub fn render(outcome: &Outcome) -> String {
    let mut text = format!("🤖 Jarvis: {}", outcome.text);
    if let Some(detail) = &outcome.detail {
        text.push_str("\n\n");
        text.push_str(detail);
    }
    text
}

async fn prompt() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all("\nVocê: ".as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Stdin lines, read on a plain thread. A read blocked there does not hold
/// up runtime teardown, unlike `tokio::io::stdin`, whose blocking read keeps
/// the process alive until Enter is pressed.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    let reader = std::thread::Builder::new()
        .name("jarvis-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Stopped reading stdin: {e}");
                        break;
                    }
                }
            }
        });
    if let Err(e) = reader {
        log::error!("Could not start the stdin reader: {e}");
    }
    rx
}

/// Read commands from stdin until `sair`, end of input or shutdown.
pub async fn run(
    handle: AgentHandle,
    announcements: mpsc::Receiver<String>,
    io: Option<JarvisIO>,
) -> Result<()> {
    run_lines(handle, announcements, io, stdin_lines()).await
}

/// [`run`] over any source of lines.
pub async fn run_lines(
    handle: AgentHandle,
    mut announcements: mpsc::Receiver<String>,
    io: Option<JarvisIO>,
    mut lines: mpsc::Receiver<String>,
) -> Result<()> {
    let mut shutdown = handle.shutdown_signal();
    let status = |s: Status| {
        if let Some(io) = &io {
            io.write_status(s);
        }
    };

    println!("J.A.R.V.I.S. pronto. Digite um comando ('sair' para encerrar).");
    loop {
        if handle.is_shut_down() {
            break;
        }
        prompt().await?;
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = shutdown.changed() => break,
        };
        let Some(line) = line else { break };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if is_exit(command) {
            println!("🤖 Jarvis: Até logo, mestre.");
            break;
        }
        if let Some(io) = &io {
            io.write_heard(command);
        }
        status(Status::Processing);

        let ask = handle.ask(command);
        tokio::pin!(ask);
        let outcome = loop {
            tokio::select! {
                outcome = &mut ask => break outcome?,
                Some(message) = announcements.recv() => println!("📢 {message}"),
            }
        };
        while let Ok(message) = announcements.try_recv() {
            println!("📢 {message}");
        }
        println!("{}", render(&outcome));
        if let Some(io) = &io {
            io.write_spoken(&outcome.text);
        }
        status(Status::Idle);
        if outcome.shutdown {
            break;
        }
    }
    status(Status::Idle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent::Agent;
    use crate::config::Config;
    use crate::desktop::RecordingDesktop;
    use crate::worker::{self, Announcer};

    fn spawn_agent(dir: &std::path::Path) -> AgentHandle {
        let mut config = Config::from_lookup(|_| None);
        config.workspace = dir.to_path_buf();
        let (handle, _task) = worker::spawn(Agent::new(config, Arc::new(RecordingDesktop::new())), 4);
        handle
    }

    #[tokio::test]
    async fn shutdown_ends_the_console_while_input_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_agent(dir.path());
        let (_announcer, announcements) = Announcer::channel(4);
        let (input, lines) = mpsc::channel::<String>(4);

        let console = tokio::spawn(run_lines(handle.clone(), announcements, None, lines));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.request_shutdown();

        tokio::time::timeout(Duration::from_secs(2), console)
            .await
            .expect("console still waiting for input")
            .unwrap()
            .unwrap();
        assert!(!input.is_closed());
    }

    #[tokio::test]
    async fn exit_word_ends_the_console() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_agent(dir.path());
        let (_announcer, announcements) = Announcer::channel(4);
        let (input, lines) = mpsc::channel::<String>(4);
        input.send("que horas são".into()).await.unwrap();
        input.send("sair".into()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), run_lines(handle, announcements, None, lines))
            .await
            .expect("console did not stop")
            .unwrap();
    }

    #[test]
    fn exit_words() {
        assert!(is_exit("Sair"));
        assert!(is_exit(" exit "));
        assert!(!is_exit("sair do modo gamer"));
    }

    #[test]
    fn detail_follows_reply() {
        let outcome = Outcome::say("Pronto.").with_detail("linha 1\nlinha 2");
        assert_eq!(render(&outcome), "🤖 Jarvis: Pronto.\n\nlinha 1\nlinha 2");
        assert_eq!(render(&Outcome::say("Oi")), "🤖 Jarvis: Oi");
    }
}

//! Waiting on child processes without deadlocking on their pipes.
//!
//! A child that writes more than the pipe buffer blocks until someone reads,
//! so stdout and stderr are drained on their own threads while we wait.
//! Output that is not valid UTF-8 is kept lossily instead of dropped.

use std::io::{self, Read};
use std::process::{Child, ExitStatus};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

/// How long to wait for the pipes to close once the child has exited.
/// A forked grandchild can keep them open indefinitely.
const PIPE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<mpsc::Receiver<Vec<u8>>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::debug!("Pipe read stopped early: {e}");
        }
        let _ = tx.send(buf);
    });
    Some(rx)
}

fn collect(rx: Option<mpsc::Receiver<Vec<u8>>>) -> String {
    rx.and_then(|rx| rx.recv_timeout(PIPE_GRACE).ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Wait up to `timeout` for `child`, capturing whatever it printed.
/// `Ok(None)` means it timed out and was killed.
pub fn wait_captured(child: &mut Child, timeout: Duration) -> io::Result<Option<Captured>> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        return Ok(None);
    };
    Ok(Some(Captured {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::{Command, Stdio};
    use std::time::Instant;

    use super::*;

    fn sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[test]
    fn output_larger_than_a_pipe_buffer_is_collected() {
        let mut child = sh("head -c 300000 /dev/zero | tr '\\0' x; echo fim >&2");
        let started = Instant::now();
        let captured = wait_captured(&mut child, Duration::from_secs(10)).unwrap().unwrap();
        assert!(captured.status.success());
        assert_eq!(captured.stdout.len(), 300_000);
        assert_eq!(captured.stderr.trim(), "fim");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn invalid_utf8_is_kept() {
        let mut child = sh("printf 'ol\\341 mundo'");
        let captured = wait_captured(&mut child, Duration::from_secs(10)).unwrap().unwrap();
        assert!(captured.stdout.starts_with("ol"));
        assert!(captured.stdout.ends_with(" mundo"));
    }

    #[test]
    fn slow_child_is_killed() {
        let mut child = sh("sleep 5");
        let started = Instant::now();
        assert!(wait_captured(&mut child, Duration::from_millis(200)).unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

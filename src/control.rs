use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::error::Result;
use crate::queue::JobQueue;

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStage {
    /// First request: finish the current conversion, then exit between jobs
    Graceful,
    /// Second request while the first is pending: exit immediately
    Forced,
}

/// Process-wide control flags shared between the connection handlers, the
/// worker loop and the process supervisor. Pause and stop are last-write-wins
/// cells: a rapid pause/resume/pause sequence coalesces and only the value
/// seen at the next supervisor poll matters.
pub struct ControlState {
    pause: AtomicBool,
    threads: AtomicI32,
    stop_requested: AtomicBool,
}

impl ControlState {
    pub fn new(threads: i32) -> Self {
        Self {
            pause: AtomicBool::new(false),
            threads: AtomicI32::new(threads),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn set_pause(&self, pause: bool) {
        self.pause.store(pause, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn set_threads(&self, threads: i32) {
        self.threads.store(threads, Ordering::SeqCst);
    }

    pub fn threads(&self) -> i32 {
        self.threads.load(Ordering::SeqCst)
    }

    /// Record a stop request and report which stage it reached.
    pub fn request_stop(&self) -> ShutdownStage {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            ShutdownStage::Forced
        } else {
            ShutdownStage::Graceful
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Act on a stop request coming from the control protocol or an OS signal.
/// The second request terminates the process on the spot, leaving in-flight
/// encoder processes and mounts behind; that abruptness is intentional.
pub fn handle_stop_request(control: &ControlState) {
    match control.request_stop() {
        ShutdownStage::Graceful => {
            info!("Shutting down gracefully, waiting for the current conversion to finish");
        }
        ShutdownStage::Forced => {
            info!("Shutting down forcefully after second request");
            std::process::exit(0);
        }
    }
}

/// Handle one control connection: read the whole request, then either run a
/// single `--` command or enqueue every non-blank line as a path, answering
/// one response line per path. Queue access never outlives the enqueue call,
/// so the worker is only ever blocked for the queue-mutation critical
/// section.
pub async fn handle_connection<S>(stream: S, queue: &JobQueue, control: &ControlState) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    let body = String::from_utf8_lossy(&buf);
    let body = body.trim_matches(|c| c == '\n' || c == ' ');

    let lines: Vec<&str> = body.split('\n').collect();
    if lines.len() == 1 {
        if let Some(stripped) = lines[0].strip_prefix("--") {
            dispatch_command(stripped, &mut writer, queue, control).await?;
            writer.shutdown().await?;
            return Ok(());
        }
    }

    for line in &lines {
        if line.is_empty() {
            continue;
        }
        let response = if queue.enqueue(line) {
            format!("added to queue: {}\n", line)
        } else {
            format!("already in queue: {}\n", line)
        };
        writer.write_all(response.as_bytes()).await?;
    }
    writer.shutdown().await?;

    Ok(())
}

async fn dispatch_command<W>(
    input: &str,
    writer: &mut W,
    queue: &JobQueue,
    control: &ControlState,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut parts = input.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    match command {
        "list" => {
            let snapshot = queue.snapshot();
            writer
                .write_all(format!("working on: {}\n", snapshot.current).as_bytes())
                .await?;
            for path in &snapshot.pending {
                writer.write_all(format!("{}\n", path).as_bytes()).await?;
            }
        }
        "pause" => {
            info!("Got pause message from client");
            writer.write_all(b"received pause command\n").await?;
            control.set_pause(true);
        }
        "resume" => {
            info!("Got resume message from client");
            writer.write_all(b"received resume command\n").await?;
            control.set_pause(false);
        }
        "stop" => {
            handle_stop_request(control);
        }
        // only the first token after the command counts, trailing junk is ignored
        "threads" => match argument
            .and_then(|a| a.split_whitespace().next())
            .and_then(|a| a.parse::<i32>().ok())
        {
            Some(threads) => {
                control.set_threads(threads);
                info!("Setting number of threads to {}", threads);
                writer
                    .write_all(format!("setting number of threads to {}\n", threads).as_bytes())
                    .await?;
            }
            None => {
                writer
                    .write_all(b"[*] number of threads must be an integer\n")
                    .await?;
            }
        },
        "clear" => {
            info!("Clearing the pending queue");
            queue.clear();
        }
        other => {
            // unrecognized commands are ignored, no response
            warn!("Ignoring unknown command: {}", other);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run the handler against an in-memory stream and return its response.
    async fn roundtrip(request: &str, queue: &JobQueue, control: &ControlState) -> String {
        let (mut client, server) = tokio::io::duplex(4096);

        client.write_all(request.as_bytes()).await.expect("write");
        client.shutdown().await.expect("shutdown");

        handle_connection(server, queue, control)
            .await
            .expect("handle");

        let mut response = String::new();
        client.read_to_string(&mut response).await.expect("read");
        response
    }

    #[tokio::test]
    async fn test_paths_are_acknowledged_in_input_order() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("/a\n/b\n/a\n", &queue, &control).await;
        assert_eq!(
            response,
            "added to queue: /a\nadded to queue: /b\nalready in queue: /a\n"
        );
        assert_eq!(queue.snapshot().pending, vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn test_submission_matching_current_reports_duplicate() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);
        queue.enqueue("/a");
        queue.dequeue();

        let response = roundtrip("/a\n", &queue, &control).await;
        assert_eq!(response, "already in queue: /a\n");
    }

    #[tokio::test]
    async fn test_list_reports_current_then_pending() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);
        queue.enqueue("/a");
        queue.enqueue("/b");
        queue.enqueue("/c");
        queue.dequeue();

        let response = roundtrip("--list", &queue, &control).await;
        assert_eq!(response, "working on: /a\n/b\n/c\n");
    }

    #[tokio::test]
    async fn test_list_with_idle_worker() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("--list\n", &queue, &control).await;
        assert_eq!(response, "working on: \n");
    }

    #[tokio::test]
    async fn test_pause_and_resume_toggle_the_flag() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("--pause", &queue, &control).await;
        assert_eq!(response, "received pause command\n");
        assert!(control.pause_requested());

        let response = roundtrip("--resume", &queue, &control).await;
        assert_eq!(response, "received resume command\n");
        assert!(!control.pause_requested());
    }

    #[tokio::test]
    async fn test_threads_requires_an_integer() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("--threads abc", &queue, &control).await;
        assert_eq!(response, "[*] number of threads must be an integer\n");
        assert_eq!(control.threads(), 2);

        let response = roundtrip("--threads", &queue, &control).await;
        assert_eq!(response, "[*] number of threads must be an integer\n");
        assert_eq!(control.threads(), 2);

        let response = roundtrip("--threads 4", &queue, &control).await;
        assert_eq!(response, "setting number of threads to 4\n");
        assert_eq!(control.threads(), 4);
    }

    #[tokio::test]
    async fn test_threads_takes_first_token_after_command() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("--threads 4 5", &queue, &control).await;
        assert_eq!(response, "setting number of threads to 4\n");
        assert_eq!(control.threads(), 4);

        let response = roundtrip("--threads  6", &queue, &control).await;
        assert_eq!(response, "setting number of threads to 6\n");
        assert_eq!(control.threads(), 6);
    }

    #[tokio::test]
    async fn test_clear_empties_pending_without_response() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);
        queue.enqueue("/a");
        queue.enqueue("/b");
        queue.dequeue();

        let response = roundtrip("--clear", &queue, &control).await;
        assert_eq!(response, "");

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.current, "/a");
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("--bogus", &queue, &control).await;
        assert_eq!(response, "");
        assert!(queue.snapshot().pending.is_empty());
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_is_trimmed() {
        let queue = JobQueue::new();
        let control = ControlState::new(2);

        let response = roundtrip("\n  /a\n\n", &queue, &control).await;
        assert_eq!(response, "added to queue: /a\n");
    }

    #[test]
    fn test_two_stage_stop_request() {
        let control = ControlState::new(2);
        assert!(!control.stop_requested());
        assert_eq!(control.request_stop(), ShutdownStage::Graceful);
        assert!(control.stop_requested());
        assert_eq!(control.request_stop(), ShutdownStage::Forced);
    }

    #[test]
    fn test_pause_cell_is_last_write_wins() {
        let control = ControlState::new(2);
        control.set_pause(true);
        control.set_pause(false);
        control.set_pause(true);
        assert!(control.pause_requested());
    }
}

//! Worker running as a child process, speaking JSON lines over stdio.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;

use reprsim_protocol::{Outcome, WorkerResponse};

use crate::error::WorkerError;
use crate::link::{WorkerLink, link};

/// A worker child process.
///
/// Each request is written to the child's stdin as one JSON line; each line
/// the child prints on stdout must be a response. Lines that do not decode
/// are dropped with a warning. When the child exits, the bridge side sees a
/// [`WorkerEvent::Failure`](crate::WorkerEvent::Failure).
#[derive(Debug)]
pub struct ProcessWorker {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl ProcessWorker {
    pub fn spawn(mut command: Command) -> Result<(WorkerLink, ProcessWorker), WorkerError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(WorkerError::Spawn)?;
        let stdin = child.stdin.take().ok_or(WorkerError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(WorkerError::MissingPipe("stdout"))?;
        let pid = child.id();
        tracing::info!(pid = ?pid, "worker process started");

        let (link, endpoint) = link();
        let (mut requests, responder) = endpoint.into_parts();

        let writer_responder = responder.clone();
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(request) = requests.recv().await {
                let line = match request.to_json() {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(job_id = %request.id, error = %e, "failed to encode request");
                        writer_responder.respond(
                            request.id,
                            Outcome::error(format!("failed to encode request: {e}")),
                        );
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut stdin, &line).await {
                    tracing::error!(pid = ?pid, error = %e, "failed to write to worker process");
                    writer_responder.fail(format!("failed to write to worker process: {e}"));
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match WorkerResponse::from_json(&line) {
                            Ok(response) => {
                                responder.deliver(response);
                            }
                            Err(e) => {
                                tracing::warn!(pid = ?pid, error = %e, "dropping malformed line from worker process");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(pid = ?pid, error = %e, "failed to read from worker process");
                        break;
                    }
                }
            }

            let reason = match child.wait().await {
                Ok(status) => format!("worker process exited: {status}"),
                Err(e) => format!("worker process lost: {e}"),
            };
            tracing::error!(pid = ?pid, "{reason}");
            responder.fail(reason);
        });

        Ok((link, ProcessWorker { writer, reader }))
    }

    /// Stop talking to the child and kill it.
    pub fn shutdown(self) {
        self.writer.abort();
        self.reader.abort();
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use reprsim_core::JobId;
    use reprsim_protocol::{FetchRepr, Task, WorkerRequest};

    use crate::link::WorkerEvent;

    /// Answers every request with success, after one garbage line.
    const ECHO_WORKER: &str = r#"
echo 'not json'
while IFS= read -r line; do
  id=${line#*'"id":"'}
  id=${id%%'"'*}
  printf '{"id":"%s","data":{"status":"success"}}\n' "$id"
done
"#;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn round_trips_through_child_process() {
        let (link, worker) = ProcessWorker::spawn(sh(ECHO_WORKER)).unwrap();
        let (requests, mut events) = link.into_parts();

        let id = JobId::new();
        let task = Task::from(FetchRepr {
            url: "http://localhost/representations/a/SD15/50/mid_block.bin".to_string(),
            n: 8,
            m: 1280,
        });
        requests.send(WorkerRequest::new(id, task)).unwrap();

        match events.recv().await {
            Some(WorkerEvent::Message(response)) => {
                assert_eq!(response.id, id);
                assert_eq!(response.data, Outcome::done());
            }
            other => panic!("expected a response, got {other:?}"),
        }
        worker.shutdown();
    }

    #[tokio::test]
    async fn child_exit_is_reported_as_failure() {
        let (link, _worker) = ProcessWorker::spawn(sh("exit 3")).unwrap();
        let (_requests, mut events) = link.into_parts();

        match events.recv().await {
            Some(WorkerEvent::Failure(reason)) => assert!(reason.contains("exited"), "{reason}"),
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let err = ProcessWorker::spawn(Command::new("/nonexistent/reprsim-worker")).unwrap_err();
        assert!(matches!(err, WorkerError::Spawn(_)));
    }
}

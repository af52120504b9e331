//! Job supervisor: runs an external fetch worker, relays its progress
//! without exceeding the sink's update budget, and resolves to a terminal
//! outcome.
//!
//! State machine: Idle -> Launching -> Streaming -> {Succeeded, Failed,
//! Cancelled, EmptyOutput}. One reader loop per job; progress flows through
//! a single live message that is edited in place, with delete-and-repost as
//! the fallback when the transport refuses the edit.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use regex::Regex;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    worker::{JobSpec, ProcessHandle, ProcessRunner},
    Result,
};

/// Relay at most one progress update per this many stdout reads. The workers
/// emit heartbeat-style lines far faster than any messenger will accept
/// edits; swallowed updates still feed the latest-line tracking.
const RELAY_BUDGET_READS: u64 = 25;

/// Keep draining stdout for this many loop iterations after exit is first
/// observed, so the last lines are captured before the terminal state is
/// declared.
const DRAIN_ITERATIONS: u32 = 10;

/// Pause between polls once stdout has gone quiet.
const QUIET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal outcome of one supervised job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    /// Nonzero exit, or stderr content with no usable output. The literal
    /// exit code and captured stderr are reported verbatim.
    Failed { code: Option<i32>, stderr: String },
    /// The worker was killed by an operator-initiated cancel.
    Cancelled,
    /// Exit 0 but no usable result was produced. Distinct from `Failed` so
    /// the caller does not imply a fetch bug.
    EmptyOutput,
}

/// What to run and where the usable output is expected to land.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub spec: JobSpec,
    /// File the worker is expected to produce; `None` for jobs whose output
    /// is not a single file (exit 0 alone counts as success).
    pub output_path: Option<std::path::PathBuf>,
}

/// Everything the caller needs for its final status message.
#[derive(Clone, Debug)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub lines_seen: u64,
    pub last_line: Option<String>,
    pub elapsed: Duration,
}

pub struct JobSupervisor {
    runner: Arc<dyn ProcessRunner>,
    active: Mutex<HashMap<u64, CancellationToken>>,
    next_job: AtomicU64,
}

impl JobSupervisor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            active: Mutex::new(HashMap::new()),
            next_job: AtomicU64::new(1),
        }
    }

    pub async fn is_running(&self) -> bool {
        !self.active.lock().await.is_empty()
    }

    /// Cancel every running job. Returns whether anything was running.
    /// The reader loops observe the token within one polling interval and
    /// kill their workers (plus same-named sibling helpers).
    pub async fn cancel(&self) -> bool {
        let active = self.active.lock().await;
        for token in active.values() {
            token.cancel();
        }
        !active.is_empty()
    }

    /// Run one job to its terminal state, streaming progress into a live
    /// message on `sink`.
    pub async fn run(
        &self,
        req: JobRequest,
        chat_id: ChatId,
        sink: Arc<dyn MessagingPort>,
    ) -> Result<JobReport> {
        let job_id = self.next_job.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        self.active.lock().await.insert(job_id, token.clone());

        let result = self.drive(&req, chat_id, sink, &token).await;

        self.active.lock().await.remove(&job_id);
        result
    }

    async fn drive(
        &self,
        req: &JobRequest,
        chat_id: ChatId,
        sink: Arc<dyn MessagingPort>,
        token: &CancellationToken,
    ) -> Result<JobReport> {
        let started = Instant::now();

        // Launching. A missing/unexecutable worker is reported immediately.
        let mut handle = self.runner.spawn(&req.spec).await?;
        tracing::info!(
            program = %req.spec.program.display(),
            args = ?req.spec.args,
            "worker launched"
        );

        // Streaming.
        let mut progress = LiveProgress::new(chat_id);
        let mut reads: u64 = 0;
        let mut lines_seen: u64 = 0;
        let mut last_relayed: Option<String> = None;
        let mut last_relay_read: Option<u64> = None;
        let mut latest: Option<String> = None;
        let mut exit_code: Option<i32> = None;
        let mut drain = 0u32;
        let mut cancelled = false;

        loop {
            let step = tokio::select! {
                _ = token.cancelled() => None,
                maybe = handle.read_line() => Some(maybe),
            };

            let Some(maybe) = step else {
                cancelled = true;
                break;
            };
            let line = match maybe {
                Ok(v) => v,
                Err(e) => {
                    let _ = handle.kill().await;
                    return Err(e);
                }
            };

            match line {
                Some(line) => {
                    reads += 1;
                    let line = line.trim_end().to_string();
                    if !line.is_empty() {
                        lines_seen += 1;
                        let changed = last_relayed.as_deref() != Some(line.as_str());
                        let budget_open =
                            last_relay_read.map_or(true, |r| reads - r >= RELAY_BUDGET_READS);
                        if changed && budget_open {
                            progress.update(sink.as_ref(), &line).await;
                            last_relayed = Some(line.clone());
                            last_relay_read = Some(reads);
                        }
                        latest = Some(line);
                    }
                }
                None => {
                    // stdout closed; wait out the exit below.
                    tokio::time::sleep(QUIET_POLL_INTERVAL).await;
                }
            }

            if exit_code.is_none() {
                exit_code = handle.poll()?;
            }
            if exit_code.is_some() {
                drain += 1;
                if drain >= DRAIN_ITERATIONS {
                    break;
                }
            }
        }

        if cancelled {
            let _ = handle.kill().await;
            if let Some(name) = req.spec.program.file_name().and_then(|s| s.to_str()) {
                let _ = self.runner.kill_by_name(name).await;
            }
        }

        // Intermediate updates may have been swallowed by the budget; make
        // sure the live message ends on the latest observed line.
        if !cancelled {
            if let Some(latest_line) = &latest {
                if last_relayed.as_deref() != Some(latest_line.as_str()) {
                    progress.update(sink.as_ref(), latest_line).await;
                }
            }
        }

        let outcome = if cancelled {
            JobOutcome::Cancelled
        } else {
            match exit_code {
                Some(0) => self.classify_success(req, handle.as_mut()).await,
                code => JobOutcome::Failed {
                    code,
                    stderr: handle.stderr_tail().await,
                },
            }
        };

        if outcome != JobOutcome::Succeeded {
            cleanup_fragments(&req.spec.cwd);
        }
        tracing::info!(?outcome, lines_seen, "worker finished");

        Ok(JobReport {
            outcome,
            lines_seen,
            last_line: latest,
            elapsed: started.elapsed(),
        })
    }

    async fn classify_success(
        &self,
        req: &JobRequest,
        handle: &mut dyn ProcessHandle,
    ) -> JobOutcome {
        let Some(output) = &req.output_path else {
            return JobOutcome::Succeeded;
        };

        let usable = std::fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
        if usable {
            return JobOutcome::Succeeded;
        }

        let stderr = handle.stderr_tail().await;
        if stderr.trim().is_empty() {
            JobOutcome::EmptyOutput
        } else {
            JobOutcome::Failed {
                code: Some(0),
                stderr,
            }
        }
    }
}

/// Single live progress message. Edits in place; a rejected edit falls back
/// to delete-and-repost so updates keep flowing on transports that refuse
/// edits of missing or stale messages.
pub struct LiveProgress {
    chat_id: ChatId,
    current: Option<MessageRef>,
}

impl LiveProgress {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            current: None,
        }
    }

    pub fn message(&self) -> Option<MessageRef> {
        self.current
    }

    pub async fn update(&mut self, sink: &dyn MessagingPort, text: &str) {
        match self.current {
            None => match sink.send(self.chat_id, text).await {
                Ok(msg) => self.current = Some(msg),
                Err(e) => tracing::warn!("progress post failed: {e}"),
            },
            Some(msg) => match sink.edit(msg, text).await {
                Ok(()) => {}
                Err(Error::TransportRejected(_)) => {
                    let _ = sink.delete(msg).await;
                    match sink.send(self.chat_id, text).await {
                        Ok(new_msg) => self.current = Some(new_msg),
                        Err(e) => tracing::warn!("progress repost failed: {e}"),
                    }
                }
                Err(e) => tracing::warn!("progress edit failed: {e}"),
            },
        }
    }
}

/// Remove the worker's intermediate `log{n}.txt` fragments. Called on every
/// non-success path; a successful worker sweeps them itself.
fn cleanup_fragments(dir: &Path) {
    let pattern = Regex::new(r"^log\d+\.txt$").expect("valid regex");
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };
    for ent in rd.flatten() {
        let name = ent.file_name().to_string_lossy().to_string();
        if pattern.is_match(&name) {
            let _ = std::fs::remove_file(ent.path());
        }
    }
}

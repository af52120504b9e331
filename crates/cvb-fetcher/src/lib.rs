//! Fetch-worker adapter.
//!
//! Implements the core process ports over `tokio::process` for the external
//! FileFetcher-style workers: piped stdout, a bounded stderr tail for
//! failure reporting, and platform process sweeping for stray siblings.

use std::{collections::VecDeque, process::Stdio, sync::Arc};

use async_trait::async_trait;

use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdout, Command},
    sync::Mutex,
};

use cvb_core::{
    errors::Error,
    worker::{JobSpec, ProcessHandle, ProcessRunner},
    Result,
};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_tail: Arc<Mutex<StderrTail>>,
}

#[async_trait]
impl ProcessHandle for WorkerProcess {
    async fn read_line(&mut self) -> Result<Option<String>> {
        self.stdout.next_line().await.map_err(Error::Io)
    }

    fn poll(&mut self) -> Result<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(exit_code_of(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        // If it already exited, `try_wait` reaps it.
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await?;
        let _ = self.child.wait().await?;
        Ok(())
    }

    async fn stderr_tail(&self) -> String {
        self.stderr_tail.lock().await.snapshot()
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(-1)
}

#[derive(Clone, Debug, Default)]
pub struct FetcherRunner;

#[async_trait]
impl ProcessRunner for FetcherRunner {
    async fn spawn(&self, spec: &JobSpec) -> Result<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {e}", spec.program.display())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("worker stdout was not captured".to_string()))?;
        let stderr = child.stderr.take();

        let stderr_tail: Arc<Mutex<StderrTail>> = Arc::default();
        // Drain stderr in background to avoid blocking on a full pipe.
        if let Some(stderr) = stderr {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut r = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tail.lock().await.push_line(line);
                }
            });
        }

        Ok(Box::new(WorkerProcess {
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr_tail,
        }))
    }

    async fn kill_by_name(&self, name: &str) -> Result<()> {
        // The workers sometimes leave same-named helpers behind; sweep them
        // with the platform process killer.
        #[cfg(unix)]
        let status = Command::new("pkill").args(["-x", name]).status().await;
        #[cfg(windows)]
        let status = Command::new("taskkill").args(["/F", "/IM", name]).status().await;

        status.map(|_| ()).map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> JobSpec {
        JobSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn streams_stdout_lines_and_reports_exit() {
        let runner = FetcherRunner;
        let mut handle = runner.spawn(&sh("printf 'a\\nb\\n'")).await.unwrap();

        assert_eq!(handle.read_line().await.unwrap(), Some("a".to_string()));
        assert_eq!(handle.read_line().await.unwrap(), Some("b".to_string()));
        assert_eq!(handle.read_line().await.unwrap(), None);

        // The exit status may take a moment to become visible after EOF.
        let mut code = None;
        for _ in 0..50 {
            code = handle.poll().unwrap();
            if code.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn nonzero_exit_and_stderr_are_captured() {
        let runner = FetcherRunner;
        let mut handle = runner
            .spawn(&sh("echo boom >&2; exit 3"))
            .await
            .unwrap();

        while handle.read_line().await.unwrap().is_some() {}

        let mut code = None;
        for _ in 0..50 {
            code = handle.poll().unwrap();
            if code.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(code, Some(3));

        // Stderr drains on a background task.
        let mut tail = String::new();
        for _ in 0..50 {
            tail = handle.stderr_tail().await;
            if !tail.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(tail, "boom");
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let runner = FetcherRunner;
        let spec = JobSpec {
            program: PathBuf::from("/nonexistent/worker-binary"),
            args: vec![],
            cwd: std::env::temp_dir(),
        };
        let err = runner.spawn(&spec).await.unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let mut tail = StderrTail::default();
        for i in 0..500 {
            tail.push_line(format!("line {i}"));
        }
        assert!(tail.lines.len() <= STDERR_TAIL_MAX_LINES);
        assert!(tail.bytes <= STDERR_TAIL_MAX_BYTES + 256);
        assert!(tail.snapshot().ends_with("line 499"));
    }
}

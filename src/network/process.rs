/// Child-process transport
///
/// Spawns the backend as a child process and exchanges frames over its
/// stdin/stdout. The child's stderr is forwarded to the log.

use crate::error::{BridgeError, Result};
use crate::network::codec::{Frame, FrameCodec, DEFAULT_MAX_FRAME_LEN};
use crate::network::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frame transport over a spawned backend's stdio
pub struct ProcessTransport {
    program: String,
    codec: FrameCodec,
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl ProcessTransport {
    /// Spawn `program` with `args` and extra environment variables
    pub fn spawn(
        program: impl Into<String>,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        Self::spawn_with_limit(program, args, env, DEFAULT_MAX_FRAME_LEN)
    }

    /// Same as [`ProcessTransport::spawn`] with an explicit frame size limit
    pub fn spawn_with_limit(
        program: impl Into<String>,
        args: &[String],
        env: &HashMap<String, String>,
        max_frame_len: usize,
    ) -> Result<Self> {
        let program = program.into();
        info!("Spawning backend process: {} {:?}", program, args);

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::TransportUnavailable(format!("failed to spawn '{}': {}", program, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Internal("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Internal("failed to capture stdout".to_string()))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let label = program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", label, line);
                }
            })
        });

        Ok(Self {
            program,
            codec: FrameCodec::new(max_frame_len),
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            stderr_task,
        })
    }

    /// OS process id, if the child is still running
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.id()
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn send(&self, frame: Frame) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            BridgeError::TransportUnavailable(format!("stdin of '{}' is closed", self.program))
        })?;

        self.codec.write_frame(stdin, &frame).await.map_err(|e| match e {
            BridgeError::IoError(io) => BridgeError::TransportUnavailable(format!(
                "write to '{}' failed: {}",
                self.program, io
            )),
            other => other,
        })
    }

    async fn recv(&self) -> Result<Option<Frame>> {
        let mut stdout = self.stdout.lock().await;
        let frame = self.codec.read_frame(&mut *stdout).await?;

        if frame.is_none() {
            info!("Backend process '{}' closed its stdout", self.program);
        }
        Ok(frame)
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Err(e) = stdin.shutdown().await {
                warn!("Error closing stdin of '{}': {}", self.program, e);
            }
        }

        let mut child = self.child.lock().await;
        if let Ok(None) = child.try_wait() {
            info!("Stopping backend process '{}'", self.program);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill '{}': {}", self.program, e);
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("process://{}", self.program)
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = ProcessTransport::spawn(
            "definitely-not-a-real-backend-binary",
            &[],
            &HashMap::new(),
        );

        assert!(matches!(result, Err(BridgeError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_echo_backend_round_trip() {
        // `cat` echoes every frame back unchanged
        let transport = ProcessTransport::spawn("cat", &[], &HashMap::new()).unwrap();
        assert!(transport.pid().await.is_some());

        let frame = Frame::ok(Uuid::new_v4(), json!({ "balance": 500 }));
        transport.send(frame.clone()).await.unwrap();

        let echoed = transport.recv().await.unwrap();
        assert_eq!(echoed, Some(frame));

        transport.close().await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stderr_does_not_reach_frames() {
        let args = vec![
            "-c".to_string(),
            "echo noise >&2; echo '{\"kind\":\"event\",\"event\":\"ready\"}'".to_string(),
        ];
        let transport = ProcessTransport::spawn("sh", &args, &HashMap::new()).unwrap();

        let frame = transport.recv().await.unwrap();
        assert_eq!(frame, Some(Frame::event("ready", serde_json::Value::Null)));
        assert_eq!(transport.recv().await.unwrap(), None);
    }
}

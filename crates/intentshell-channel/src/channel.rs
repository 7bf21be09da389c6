use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::ChannelConfig;
use crate::dialect::Dialect;
use crate::error::ChannelError;

/// Appended to partial output when no delimiter arrives within the budget.
pub const TIMEOUT_SENTINEL: &str = "ERROR: TIMEOUT waiting for response";
/// Returned when the request line could not be written.
pub const WRITE_FAILED_SENTINEL: &str = "ERROR: Write failed";
/// Appended when the interpreter closed its output mid-request.
pub const EXITED_SENTINEL: &str = "ERROR: interpreter exited before responding";
/// Printed by the bring-up script once the session is usable.
pub const READY_MARKER: &str = "SESSION_READY";

/// Anything that can run one framed script and hand back its output.
///
/// Implementations never fail: transport faults come back as `ERROR:` lines.
pub trait ScriptTransport: Send {
    /// Run `script` and return its output without the delimiter line.
    fn submit(&mut self, script: &str, is_bring_up: bool) -> impl Future<Output = String> + Send;

    /// Dialect scripts must be written in.
    fn dialect(&self) -> Dialect;
}

async fn pump_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        }
    }
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
    readers: [JoinHandle<()>; 2],
    /// Delimiters still owed by requests that timed out.
    owed_delimiters: usize,
}

impl Session {
    fn spawn(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let program = config.program().to_owned();
        let mut command = Command::new(&program);
        command
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ChannelError::Spawn {
            program: program.clone(),
            source,
        })?;

        let missing = |stream| ChannelError::MissingPipe {
            program: program.clone(),
            stream,
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let (tx, lines) = mpsc::channel(config.queue_capacity.max(1));
        let readers = [
            tokio::spawn(pump_lines(stdout, tx.clone())),
            tokio::spawn(pump_lines(stderr, tx)),
        ];

        tracing::info!(program = %program, pid = child.id(), "interpreter started");
        Ok(Self {
            child,
            stdin,
            lines,
            readers,
            owed_delimiters: 0,
        })
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    /// Drop lines left over from earlier requests, settling owed delimiters.
    fn discard_stale(&mut self, delimiter: &str) -> usize {
        let mut discarded = 0;
        while let Ok(line) = self.lines.try_recv() {
            if self.owed_delimiters > 0 && line.trim() == delimiter {
                self.owed_delimiters -= 1;
            }
            discarded += 1;
        }
        discarded
    }

    async fn shutdown(mut self) {
        for reader in &self.readers {
            reader.abort();
        }
        drop(self.stdin);
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "interpreter already gone");
        }
    }
}

/// One long-lived interpreter subprocess with delimiter framing.
///
/// `submit` takes `&mut self`, so a channel serves one request at a time.
pub struct InterpreterChannel {
    config: ChannelConfig,
    delimiter: String,
    session: Option<Session>,
}

impl InterpreterChannel {
    /// Spawn the interpreter and run the bring-up script.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the interpreter cannot be spawned. A failed
    /// readiness check is only logged.
    pub async fn start(config: ChannelConfig) -> Result<Self, ChannelError> {
        let mut channel = Self {
            config,
            delimiter: format!("END_OF_RESPONSE_{}", Uuid::new_v4().simple()),
            session: None,
        };
        channel.respawn().await?;
        Ok(channel)
    }

    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// OS process id of the current interpreter, if one is attached.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(|s| s.child.id())
    }

    pub fn is_running(&mut self) -> bool {
        self.session.as_mut().is_some_and(Session::is_running)
    }

    /// Run `script` and collect its output up to the delimiter line.
    ///
    /// Respawns the interpreter first if it is no longer running. Never
    /// fails: faults, timeouts and write errors come back as `ERROR:` lines.
    pub async fn submit(&mut self, script: &str, is_bring_up: bool) -> String {
        if !self.is_running() {
            tracing::warn!("interpreter not running, respawning");
            if let Err(e) = self.respawn().await {
                tracing::error!(error = %e, "interpreter respawn failed");
                return format!("ERROR: {e}");
            }
        }
        let timeout = if is_bring_up {
            self.config.bring_up_timeout()
        } else {
            self.config.read_timeout()
        };
        self.exchange(script, timeout).await
    }

    /// Stop the readers and terminate the interpreter.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
        tracing::info!("interpreter channel closed");
    }

    fn bring_up_script(&self) -> String {
        let dialect = self.config.dialect;
        let mut parts = vec![dialect.preamble().to_owned()];
        if !self.config.bring_up_script.trim().is_empty() {
            parts.push(self.config.bring_up_script.clone());
        }
        parts.push(dialect.print_line(READY_MARKER));
        parts.join("\n")
    }

    async fn respawn(&mut self) -> Result<(), ChannelError> {
        if let Some(old) = self.session.take() {
            old.shutdown().await;
        }
        self.session = Some(Session::spawn(&self.config)?);

        let script = self.bring_up_script();
        let response = self.exchange(&script, self.config.bring_up_timeout()).await;
        if response.lines().any(|line| line.trim() == READY_MARKER) {
            tracing::debug!(pid = self.pid(), "interpreter session ready");
        } else {
            tracing::warn!(%response, "interpreter bring-up did not report readiness");
        }
        Ok(())
    }

    async fn exchange(&mut self, script: &str, timeout: Duration) -> String {
        let line = self.config.dialect.frame(script, &self.delimiter);
        let Some(session) = self.session.as_mut() else {
            return format!("ERROR: {}", ChannelError::NotRunning);
        };

        let stale = session.discard_stale(&self.delimiter);
        if stale > 0 {
            tracing::debug!(stale, "discarded stale interpreter output");
        }

        if let Err(e) = session.write_line(&line).await {
            tracing::warn!(error = %e, "write to interpreter failed");
            if let Some(dead) = self.session.take() {
                dead.shutdown().await;
            }
            return WRITE_FAILED_SENTINEL.to_owned();
        }

        let deadline = Instant::now() + timeout;
        let mut output: Vec<String> = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, session.lines.recv()).await {
                Ok(Some(line)) => {
                    if line.trim() != self.delimiter {
                        output.push(line);
                    } else if session.owed_delimiters > 0 {
                        // tail of a request that timed out earlier
                        session.owed_delimiters -= 1;
                        output.clear();
                    } else {
                        return output.join("\n");
                    }
                }
                Ok(None) => {
                    tracing::warn!("interpreter output closed mid-request");
                    output.push(EXITED_SENTINEL.to_owned());
                    return output.join("\n");
                }
                Err(_) => {
                    session.owed_delimiters += 1;
                    tracing::warn!(
                        timeout_secs = timeout.as_secs_f64(),
                        "timed out waiting for interpreter response"
                    );
                    output.push(TIMEOUT_SENTINEL.to_owned());
                    return output.join("\n");
                }
            }
        }
    }
}

impl ScriptTransport for InterpreterChannel {
    fn submit(&mut self, script: &str, is_bring_up: bool) -> impl Future<Output = String> + Send {
        InterpreterChannel::submit(self, script, is_bring_up)
    }

    fn dialect(&self) -> Dialect {
        self.config.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_with_missing_program_fails() {
        let config = ChannelConfig {
            program: Some("/nonexistent/intentshell-interpreter".into()),
            ..ChannelConfig::for_dialect(Dialect::Posix)
        };
        let err = InterpreterChannel::start(config).await.err().unwrap();
        assert!(matches!(err, ChannelError::Spawn { .. }));
    }

    #[test]
    fn bring_up_script_orders_preamble_user_script_probe() {
        let channel = InterpreterChannel {
            config: ChannelConfig {
                bring_up_script: "Import-Module ./Kernel.psm1".into(),
                ..ChannelConfig::default()
            },
            delimiter: "END_OF_RESPONSE_x".into(),
            session: None,
        };
        let script = channel.bring_up_script();
        let preamble = script.find("$ErrorActionPreference").unwrap();
        let user = script.find("Import-Module").unwrap();
        let probe = script.find("Write-Output").unwrap();
        assert!(preamble < user && user < probe);
    }

    #[test]
    fn bring_up_script_skips_blank_user_script() {
        let channel = InterpreterChannel {
            config: ChannelConfig {
                bring_up_script: "   ".into(),
                ..ChannelConfig::for_dialect(Dialect::Posix)
            },
            delimiter: "END_OF_RESPONSE_x".into(),
            session: None,
        };
        assert_eq!(channel.bring_up_script().lines().count(), 2);
    }

    #[tokio::test]
    async fn exchange_without_session_reports_not_running() {
        let mut channel = InterpreterChannel {
            config: ChannelConfig::for_dialect(Dialect::Posix),
            delimiter: "END_OF_RESPONSE_x".into(),
            session: None,
        };
        assert!(!channel.is_running());
        assert_eq!(channel.pid(), None);
        let out = channel.exchange("echo hi", Duration::from_secs(1)).await;
        assert_eq!(out, "ERROR: interpreter is not running");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delimiter_is_unique_per_channel() {
        let a = InterpreterChannel::start(ChannelConfig::for_dialect(Dialect::Posix))
            .await
            .unwrap();
        let b = InterpreterChannel::start(ChannelConfig::for_dialect(Dialect::Posix))
            .await
            .unwrap();
        assert!(a.delimiter().starts_with("END_OF_RESPONSE_"));
        assert_ne!(a.delimiter(), b.delimiter());
        a.close().await;
        b.close().await;
    }
}

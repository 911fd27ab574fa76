//! PTY wrapper using portable-pty.
//!
//! A [`PtySession`] owns one child process attached to a pseudo-terminal.
//! Output leaves through two channels returned alongside it: an ordered
//! stream of byte chunks and a one-shot exit signal. Three helper threads
//! do the blocking work: a reader, a writer fed from a bounded queue, and a
//! waiter that owns the child. The waiter also carries out kill requests,
//! since only the owning [`Child`] handle escalates from SIGHUP to SIGKILL.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{
    channel, sync_channel, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tws_core::{TerminalOptions, TwsError, TwsResult};

pub const PTY_READ_BUFFER_SIZE: usize = 4096;
pub const PTY_INPUT_QUEUE_SIZE: usize = 1024;
const PTY_WRITE_CHUNK_SIZE: usize = 512;
/// How often the waiter checks for exit between kill requests.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How `createTerminal` options turn into a command line.
#[derive(Debug, Clone)]
pub struct SpawnPolicy {
    /// Interactive shell; `None` means `$SHELL`, then `/bin/sh`.
    pub shell: Option<String>,
    /// Arguments for the shell (login flag by default).
    pub shell_args: Vec<String>,
    pub tmux: String,
    pub term: String,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: vec!["-l".to_string()],
            tmux: "tmux".to_string(),
            term: "xterm-256color".to_string(),
        }
    }
}

impl SpawnPolicy {
    pub fn shell_program(&self) -> String {
        self.shell
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "/bin/sh".to_string())
    }

    /// Build the spawn request for `options`, rooted at `cwd`.
    pub fn spec_for(&self, options: &TerminalOptions, cwd: &Path) -> SpawnSpec {
        let (cols, rows) = options.size();
        let mut env = vec![
            ("TERM".to_string(), self.term.clone()),
            ("COLORTERM".to_string(), "truecolor".to_string()),
        ];

        let (program, args, unset_env) = match options.tmux_target() {
            Some(target) => (
                self.tmux.clone(),
                vec!["attach".to_string(), "-t".to_string(), target],
                // tmux refuses to attach from inside another tmux client.
                vec!["TMUX".to_string()],
            ),
            None => {
                if options.kind.as_deref() == Some("tmux") {
                    debug!("tmux terminal requested without a session; starting a shell");
                }
                let shell = self.shell_program();
                env.push(("SHELL".to_string(), shell.clone()));
                (shell, self.shell_args.clone(), Vec::new())
            }
        };

        SpawnSpec {
            program,
            args,
            cwd: cwd.to_path_buf(),
            cols,
            rows,
            env,
            unset_env,
        }
    }
}

/// Everything needed to start one PTY-backed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub env: Vec<(String, String)>,
    pub unset_env: Vec<String>,
}

/// Outbound side of a session: ordered output chunks, then one exit code.
pub struct PtyOutput {
    pub data: mpsc::UnboundedReceiver<Vec<u8>>,
    pub exit: oneshot::Receiver<u32>,
}

/// A live PTY-backed child process.
pub struct PtySession {
    label: String,
    master: Box<dyn MasterPty + Send>,
    kill_tx: Sender<()>,
    kill_requested: bool,
    input_tx: SyncSender<Vec<u8>>,
    exited: Arc<AtomicBool>,
    pid: Option<u32>,
    cols: u16,
    rows: u16,
}

impl PtySession {
    /// Open a PTY and start `spec.program` on it.
    pub fn spawn(label: &str, spec: &SpawnSpec) -> TwsResult<(Self, PtyOutput)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TwsError::Spawn(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.cwd(&spec.cwd);
        for key in &spec.unset_env {
            cmd.env_remove(key);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TwsError::Spawn(format!("{}: {e}", spec.program)))?;
        // Only the child may hold the slave, or the reader never sees EOF.
        drop(pair.slave);

        let pid = child.process_id();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TwsError::Spawn(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TwsError::Spawn(format!("failed to take PTY writer: {e}")))?;

        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (input_tx, input_rx) = sync_channel(PTY_INPUT_QUEUE_SIZE);
        let (kill_tx, kill_rx) = channel();
        let exited = Arc::new(AtomicBool::new(false));

        spawn_reader_thread(label, reader, data_tx)?;
        spawn_writer_thread(label, writer, input_rx)?;

        let waiter_label = label.to_string();
        let waiter_exited = exited.clone();
        std::thread::Builder::new()
            .name(format!("pty-wait-{label}"))
            .spawn(move || {
                let code = wait_for_exit(&waiter_label, child, kill_rx);
                waiter_exited.store(true, Ordering::SeqCst);
                info!(session_id = %waiter_label, code, "PTY child exited");
                let _ = exit_tx.send(code);
            })
            .map_err(|e| TwsError::Spawn(format!("failed to start waiter thread: {e}")))?;

        info!(
            session_id = %label,
            program = %spec.program,
            cwd = %spec.cwd.display(),
            cols = spec.cols,
            rows = spec.rows,
            "PTY spawned"
        );

        Ok((
            Self {
                label: label.to_string(),
                master: pair.master,
                kill_tx,
                kill_requested: false,
                input_tx,
                exited,
                pid,
                cols: spec.cols,
                rows: spec.rows,
            },
            PtyOutput {
                data: data_rx,
                exit: exit_rx,
            },
        ))
    }

    /// Queue bytes for the child's input. Never blocks.
    pub fn write(&self, data: &[u8]) -> TwsResult<()> {
        if !self.is_alive() {
            return Err(TwsError::SessionDead(self.label.clone()));
        }
        match self.input_tx.try_send(data.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TwsError::Other(format!(
                "input queue full for {}",
                self.label
            ))),
            Err(TrySendError::Disconnected(_)) => Err(TwsError::SessionDead(self.label.clone())),
        }
    }

    /// Resize the PTY window.
    pub fn resize(&mut self, cols: u16, rows: u16) -> TwsResult<()> {
        if !self.is_alive() {
            return Err(TwsError::SessionDead(self.label.clone()));
        }
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TwsError::Other(format!("PTY resize failed: {e}")))?;
        self.cols = cols;
        self.rows = rows;
        debug!(session_id = %self.label, cols, rows, "PTY resized");
        Ok(())
    }

    /// Terminate the child: SIGHUP first, SIGKILL if it lingers. Returns at
    /// once; the exit arrives on [`PtyOutput::exit`]. Killing a dead or
    /// already killed child is a no-op.
    pub fn kill(&mut self) {
        if self.kill_requested || !self.is_alive() {
            return;
        }
        self.kill_requested = true;
        if self.kill_tx.send(()).is_err() {
            debug!(session_id = %self.label, "PTY waiter already finished");
        }
    }

    /// Block until the child has been reaped or `deadline` passes.
    pub fn wait_exited(&self, deadline: Instant) -> bool {
        while self.is_alive() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
        true
    }

    pub fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current terminal size.
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Reap `child`, killing it when asked. Runs on the waiter thread.
fn wait_for_exit(
    label: &str,
    mut child: Box<dyn Child + Send + Sync>,
    kill_rx: Receiver<()>,
) -> u32 {
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {}
            Err(e) => break Err(e),
        }
        match kill_rx.recv_timeout(WAIT_POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            // Explicit kill, or the session handle was dropped.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                // SIGHUP, then SIGKILL once a short grace period runs out.
                if let Err(e) = child.kill() {
                    debug!(session_id = %label, error = %e, "PTY child kill failed");
                }
                break child.wait();
            }
        }
    };
    match status {
        Ok(status) => status.exit_code(),
        Err(e) => {
            warn!(session_id = %label, error = %e, "waiting for PTY child failed");
            u32::MAX
        }
    }
}

fn spawn_reader_thread(
    label: &str,
    mut reader: Box<dyn Read + Send>,
    data_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> TwsResult<()> {
    let session_id = label.to_string();
    std::thread::Builder::new()
        .name(format!("pty-read-{label}"))
        .spawn(move || {
            let mut buf = [0u8; PTY_READ_BUFFER_SIZE];
            let mut total: usize = 0;
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        total += n;
                        if data_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    // Linux reports EIO once the child side is gone.
                    Err(e) => {
                        debug!(session_id = %session_id, error = %e, "PTY read ended");
                        break;
                    }
                }
            }
            debug!(session_id = %session_id, total_bytes = total, "PTY reader finished");
        })
        .map_err(|e| TwsError::Spawn(format!("failed to start reader thread: {e}")))?;
    Ok(())
}

fn spawn_writer_thread(
    label: &str,
    mut writer: Box<dyn Write + Send>,
    input_rx: Receiver<Vec<u8>>,
) -> TwsResult<()> {
    let session_id = label.to_string();
    std::thread::Builder::new()
        .name(format!("pty-write-{label}"))
        .spawn(move || {
            while let Ok(data) = input_rx.recv() {
                for chunk in data.chunks(PTY_WRITE_CHUNK_SIZE) {
                    if let Err(e) = writer.write_all(chunk).and_then(|_| writer.flush()) {
                        debug!(session_id = %session_id, error = %e, "PTY write failed");
                        return;
                    }
                }
            }
        })
        .map_err(|e| TwsError::Spawn(format!("failed to start writer thread: {e}")))?;
    Ok(())
}

//! Terminal session registry.
//!
//! Maps caller-chosen IDs to live PTY sessions. The registry is owned by a
//! single task; PTY output and exits reach it as [`RegistryEvent`]s through
//! the channel returned by [`SessionRegistry::new`], and it turns them into
//! surface events.
//!
//! Each entry carries a generation number. Events from a session that has
//! since been closed (and whose ID may already be reused) carry a stale
//! generation and are dropped, so a terminal is reported closed exactly once.

use super::pty::{PtyOutput, PtySession, SpawnPolicy};
use super::utf8::Utf8Decoder;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tws_core::{Event, TerminalOptions, TwsError, TwsResult};

/// How long to keep draining output after the child has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// How long [`SessionRegistry::shutdown`] waits for killed children. Covers
/// the SIGHUP grace period before SIGKILL.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Raw PTY activity, tagged with the entry it belongs to.
#[derive(Debug)]
pub enum RegistryEvent {
    Output {
        id: String,
        generation: u64,
        data: Vec<u8>,
    },
    Exited {
        id: String,
        generation: u64,
        code: Option<u32>,
    },
}

struct Entry {
    generation: u64,
    pty: PtySession,
    decoder: Utf8Decoder,
}

pub struct SessionRegistry {
    sessions: HashMap<String, Entry>,
    policy: SpawnPolicy,
    next_generation: u64,
    events_tx: mpsc::UnboundedSender<RegistryEvent>,
}

impl SessionRegistry {
    pub fn new(policy: SpawnPolicy) -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: HashMap::new(),
                policy,
                next_generation: 0,
                events_tx,
            },
            events_rx,
        )
    }

    /// Spawn a terminal under `id`. Fails if `id` is already live.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(&mut self, id: &str, options: &TerminalOptions, cwd: &Path) -> TwsResult<()> {
        if self.contains(id) {
            return Err(TwsError::DuplicateSession(id.to_string()));
        }

        let spec = self.policy.spec_for(options, cwd);
        let (pty, output) = PtySession::spawn(id, &spec)?;

        self.next_generation += 1;
        let generation = self.next_generation;
        tokio::spawn(pump(
            id.to_string(),
            generation,
            output,
            self.events_tx.clone(),
        ));

        self.sessions.insert(
            id.to_string(),
            Entry {
                generation,
                pty,
                decoder: Utf8Decoder::new(),
            },
        );
        info!(session_id = %id, generation, live = self.sessions.len(), "terminal created");
        Ok(())
    }

    /// Forward input to `id`. Returns false when there is no such terminal.
    pub fn input(&mut self, id: &str, data: &[u8]) -> bool {
        let Some(entry) = self.sessions.get(id) else {
            debug!(session_id = %id, "input for unknown terminal ignored");
            return false;
        };
        if let Err(e) = entry.pty.write(data) {
            debug!(session_id = %id, error = %e, "terminal input dropped");
        }
        true
    }

    /// Resize `id`. Returns false when there is no such terminal.
    pub fn resize(&mut self, id: &str, cols: u16, rows: u16) -> bool {
        let Some(entry) = self.sessions.get_mut(id) else {
            debug!(session_id = %id, "resize for unknown terminal ignored");
            return false;
        };
        if let Err(e) = entry.pty.resize(cols, rows) {
            debug!(session_id = %id, error = %e, "terminal resize failed");
        }
        true
    }

    /// Kill and forget `id`. Returns the closed event if it was live.
    pub fn close(&mut self, id: &str) -> Option<Event> {
        let mut entry = self.sessions.remove(id)?;
        entry.pty.kill();
        info!(session_id = %id, live = self.sessions.len(), "terminal closed");
        Some(Event::TerminalClosed { id: id.to_string() })
    }

    /// Turn raw PTY activity into surface events.
    pub fn handle(&mut self, event: RegistryEvent) -> Vec<Event> {
        match event {
            RegistryEvent::Output {
                id,
                generation,
                data,
            } => {
                let Some(entry) = self.live_entry(&id, generation) else {
                    return Vec::new();
                };
                let text = entry.decoder.decode(&data);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![Event::TerminalOutput { id, data: text }]
                }
            }
            RegistryEvent::Exited {
                id,
                generation,
                code,
            } => {
                if self.live_entry(&id, generation).is_none() {
                    debug!(session_id = %id, generation, "stale exit ignored");
                    return Vec::new();
                }
                let Some(mut entry) = self.sessions.remove(&id) else {
                    return Vec::new();
                };
                info!(session_id = %id, code = ?code, live = self.sessions.len(), "terminal exited");

                let mut events = Vec::with_capacity(2);
                if entry.decoder.has_pending() {
                    debug!(session_id = %id, "flushing incomplete UTF-8 tail");
                }
                let tail = entry.decoder.finish();
                if !tail.is_empty() {
                    events.push(Event::TerminalOutput {
                        id: id.clone(),
                        data: tail,
                    });
                }
                events.push(Event::TerminalClosed { id });
                events
            }
        }
    }

    /// Kill every live terminal and wait, up to [`SHUTDOWN_GRACE`], for the
    /// children to be reaped. Returns one closed event per terminal.
    ///
    /// Blocks the calling thread; only used on the way out.
    pub fn shutdown(&mut self) -> Vec<Event> {
        if self.sessions.is_empty() {
            return Vec::new();
        }
        let mut entries: Vec<(String, Entry)> = self.sessions.drain().collect();
        info!(count = entries.len(), "killing all terminals");

        for (_, entry) in &mut entries {
            entry.pty.kill();
        }
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for (id, entry) in &entries {
            if !entry.pty.wait_exited(deadline) {
                warn!(session_id = %id, pid = ?entry.pty.pid(), "terminal still running after kill");
            }
        }

        entries
            .into_iter()
            .map(|(id, _)| Event::TerminalClosed { id })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn live_entry(&mut self, id: &str, generation: u64) -> Option<&mut Entry> {
        self.sessions
            .get_mut(id)
            .filter(|entry| entry.generation == generation)
    }
}

/// Forward one session's output, then its exit, to the registry.
async fn pump(
    id: String,
    generation: u64,
    output: PtyOutput,
    events: mpsc::UnboundedSender<RegistryEvent>,
) {
    let PtyOutput {
        mut data,
        mut exit,
    } = output;

    let send_data = |bytes: Vec<u8>| {
        events
            .send(RegistryEvent::Output {
                id: id.clone(),
                generation,
                data: bytes,
            })
            .is_ok()
    };

    let code = loop {
        tokio::select! {
            biased;
            chunk = data.recv() => match chunk {
                Some(bytes) => {
                    if !send_data(bytes) {
                        return;
                    }
                }
                // Reader finished first; the exit follows.
                None => break exit.await.ok(),
            },
            status = &mut exit => {
                // The reader can lag behind the exit; collect what is left.
                loop {
                    match tokio::time::timeout(EXIT_DRAIN_GRACE, data.recv()).await {
                        Ok(Some(bytes)) => {
                            if !send_data(bytes) {
                                return;
                            }
                        }
                        Ok(None) | Err(_) => break,
                    }
                }
                break status.ok();
            }
        }
    };

    if events
        .send(RegistryEvent::Exited {
            id: id.clone(),
            generation,
            code,
        })
        .is_err()
    {
        warn!(session_id = %id, "registry gone before terminal exit was reported");
    }
}

//! The coordinating task.
//!
//! [`Host`] owns the workspace, the terminal registry and tmux discovery. It
//! runs on a single tokio task and is the only code that mutates them, so
//! none of them need locks. Transports feed it [`Inbound`] messages; PTY
//! activity arrives as [`RegistryEvent`]s. Slow work (file I/O, tmux, the
//! directory picker) goes to `spawn_blocking`, and the answer is sent
//! straight to the requesting surface or, when it has to touch host state,
//! back to this task as a [`Completion`].

use crate::command::CommandRunner;
use crate::config::HostConfig;
use crate::dialog;
use crate::session::{RegistryEvent, SessionRegistry};
use crate::tmux::TmuxDiscovery;
use crate::workspace::{dir_name, RecentDirectories, Workspace, WorkspaceCatalog};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tws_core::{Event, Failure, Frame, Notify, Reply, Request, Response, TwsError, TwsResult};

/// Identifies one connected surface.
pub type SurfaceId = u64;

/// Frames queued for one surface.
pub type Outbox = mpsc::UnboundedSender<Frame>;

/// What transports hand to the host.
#[derive(Debug)]
pub enum Inbound {
    Connected { surface: SurfaceId, outbox: Outbox },
    Frame { surface: SurfaceId, frame: Frame },
    Disconnected { surface: SurfaceId },
}

/// Background work whose result changes host state.
#[derive(Debug)]
pub enum Completion {
    DirectoryPicked {
        surface: SurfaceId,
        id: u64,
        outcome: TwsResult<Option<String>>,
    },
}

pub struct Host {
    workspace: Workspace,
    registry: SessionRegistry,
    tmux: TmuxDiscovery,
    runner: Arc<dyn CommandRunner>,
    dialog_command: Vec<String>,
    surfaces: HashMap<SurfaceId, Outbox>,
    completions_tx: mpsc::UnboundedSender<Completion>,
}

/// Receivers the host loop consumes besides transport input.
pub struct HostChannels {
    registry: mpsc::UnboundedReceiver<RegistryEvent>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl Host {
    pub fn new(config: &HostConfig, runner: Arc<dyn CommandRunner>) -> (Self, HostChannels) {
        let recent = RecentDirectories::load(
            Some(config.state_dir.join("recent.json")),
            config.recent_limit,
        );
        let mut workspace = Workspace::new(WorkspaceCatalog::new(config.extensions.clone()), recent);
        if let Some(dir) = &config.directory {
            if let Err(e) = workspace.set_root(&dir.to_string_lossy()) {
                warn!(path = %dir.display(), error = %e, "could not open startup directory");
            }
        }

        let (registry, registry_rx) = SessionRegistry::new(config.spawn.clone());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let host = Self {
            workspace,
            registry,
            tmux: TmuxDiscovery::new(runner.clone(), config.spawn.tmux.clone()),
            runner,
            dialog_command: config.dialog_command.clone(),
            surfaces: HashMap::new(),
            completions_tx,
        };
        let channels = HostChannels {
            registry: registry_rx,
            completions: completions_rx,
        };
        (host, channels)
    }

    /// Serve until every transport is gone or `shutdown` resolves, then kill
    /// all terminals.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Inbound>,
        mut channels: HostChannels,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        info!(root = ?self.workspace.root(), "host ready");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("received shutdown signal");
                    break;
                }
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_inbound(msg),
                    None => {
                        info!("all surfaces gone, shutting down");
                        break;
                    }
                },
                Some(event) = channels.registry.recv() => {
                    for event in self.registry.handle(event) {
                        self.broadcast(event);
                    }
                }
                Some(done) = channels.completions.recv() => self.handle_completion(done),
            }
        }

        self.shutdown();
    }

    /// Kill every terminal and tell surfaces they are gone.
    pub fn shutdown(&mut self) {
        for event in self.registry.shutdown() {
            self.broadcast(event);
        }
        info!("host stopped");
    }

    pub fn handle_inbound(&mut self, msg: Inbound) {
        match msg {
            Inbound::Connected { surface, outbox } => {
                info!(surface, "surface connected");
                self.surfaces.insert(surface, outbox);
            }
            Inbound::Disconnected { surface } => {
                info!(surface, live_terminals = self.registry.len(), "surface disconnected");
                self.surfaces.remove(&surface);
            }
            Inbound::Frame { surface, frame } => match frame {
                Frame::Request { id, request } => self.handle_request(surface, id, request),
                Frame::Notify { notify } => self.handle_notify(notify),
                Frame::Response { .. } | Frame::Event { .. } => {
                    warn!(surface, "ignoring host-bound response or event frame");
                }
            },
        }
    }

    fn handle_notify(&mut self, notify: Notify) {
        match notify {
            Notify::TerminalInput { id, data } => {
                self.registry.input(&id, data.as_bytes());
            }
            Notify::TerminalResize { id, cols, rows } => {
                self.registry.resize(&id, cols, rows);
            }
        }
    }

    fn handle_request(&mut self, surface: SurfaceId, id: u64, request: Request) {
        debug!(surface, id, request = ?request, "request");
        match request {
            Request::OpenDirectoryDialog => {
                let runner = self.runner.clone();
                let command = self.dialog_command.clone();
                let done = self.completions_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let outcome = dialog::pick_directory(runner.as_ref(), &command);
                    let _ = done.send(Completion::DirectoryPicked {
                        surface,
                        id,
                        outcome,
                    });
                });
            }
            Request::SetDirectory { path } => {
                let response = self.open_directory(&path);
                self.respond(surface, id, response);
            }
            Request::GetCurrentDirectory => {
                let reply = Reply::Directory {
                    path: self.workspace.root().map(path_string),
                    name: self.workspace.name(),
                };
                self.respond(surface, id, reply.into());
            }
            Request::GetRecentDirectories => {
                let reply = Reply::RecentDirectories {
                    directories: self.workspace.recent(),
                };
                self.respond(surface, id, reply.into());
            }
            Request::ListFiles { path } => {
                let root = match self.workspace.require_root() {
                    Ok(root) => root,
                    Err(e) => return self.respond(surface, id, list_failure(e)),
                };
                let catalog = self.workspace.catalog();
                self.respond_blocking(surface, id, move || {
                    match catalog.list(&root, &path) {
                        Ok(files) => Reply::Files {
                            path,
                            root: path_string(&root),
                            files,
                        }
                        .into(),
                        Err(e) => list_failure(e),
                    }
                });
            }
            Request::ReadFile { path } => {
                self.with_catalog(surface, id, move |catalog, root| {
                    let content = catalog.read(root, &path)?;
                    Ok(Reply::File { path, content })
                });
            }
            Request::SaveFile { path, content } => {
                self.with_catalog(surface, id, move |catalog, root| {
                    catalog.write(root, &path, &content)?;
                    Ok(Reply::Saved { path })
                });
            }
            Request::GetFilePath { path } => {
                self.with_catalog(surface, id, move |catalog, root| {
                    Ok(Reply::FilePath {
                        path: catalog.resolve_absolute(root, &path).as_deref().map(path_string),
                    })
                });
            }
            Request::GetFileMtime { path } => {
                self.with_catalog(surface, id, move |catalog, root| {
                    let mtime = catalog.mtime_millis(root, &path);
                    Ok(Reply::FileMtime { path, mtime })
                });
            }
            Request::CreateTerminal {
                id: terminal,
                options,
            } => {
                let cwd = self.workspace.terminal_cwd();
                let response = match self.registry.create(&terminal, &options, &cwd) {
                    Ok(()) => Reply::TerminalCreated { id: terminal }.into(),
                    Err(e) => {
                        warn!(session_id = %terminal, error = %e, "createTerminal failed");
                        e.into()
                    }
                };
                self.respond(surface, id, response);
            }
            Request::CloseTerminal { id: terminal } => {
                let closed = self.registry.close(&terminal);
                let existed = closed.is_some();
                self.respond(
                    surface,
                    id,
                    Reply::TerminalClosed {
                        id: terminal,
                        existed,
                    }
                    .into(),
                );
                if let Some(event) = closed {
                    self.broadcast(event);
                }
            }
            Request::ListTmuxSessions => {
                let tmux = self.tmux.clone();
                self.respond_blocking(surface, id, move || {
                    Reply::TmuxSessions {
                        sessions: tmux.list_sessions(),
                    }
                    .into()
                });
            }
            Request::ListTmuxWindows { session } => {
                let tmux = self.tmux.clone();
                self.respond_blocking(surface, id, move || {
                    Reply::TmuxWindows {
                        windows: tmux.list_windows(&session),
                    }
                    .into()
                });
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::DirectoryPicked {
                surface,
                id,
                outcome,
            } => {
                let response = match outcome {
                    Ok(Some(path)) => self.open_directory(&path),
                    Ok(None) => Reply::Directory {
                        path: None,
                        name: None,
                    }
                    .into(),
                    Err(e) => e.into(),
                };
                self.respond(surface, id, response);
            }
        }
    }

    /// Switch the workspace root and announce it to every surface.
    fn open_directory(&mut self, path: &str) -> Response {
        match self.workspace.set_root(path) {
            Ok(root) => {
                let path = path_string(&root);
                let name = dir_name(&root);
                self.broadcast(Event::DirectoryOpened {
                    path: path.clone(),
                    name: name.clone(),
                });
                Reply::Directory {
                    path: Some(path),
                    name: Some(name),
                }
                .into()
            }
            Err(e) => {
                debug!(path, error = %e, "setDirectory rejected");
                e.into()
            }
        }
    }

    /// Run a catalog operation off the coordinating task.
    fn with_catalog<F>(&self, surface: SurfaceId, id: u64, op: F)
    where
        F: FnOnce(&WorkspaceCatalog, &Path) -> TwsResult<Reply> + Send + 'static,
    {
        let root = match self.workspace.require_root() {
            Ok(root) => root,
            Err(e) => return self.respond(surface, id, e.into()),
        };
        let catalog = self.workspace.catalog();
        self.respond_blocking(surface, id, move || match op(&catalog, &root) {
            Ok(reply) => reply.into(),
            Err(e) => e.into(),
        });
    }

    fn respond_blocking<F>(&self, surface: SurfaceId, id: u64, work: F)
    where
        F: FnOnce() -> Response + Send + 'static,
    {
        let Some(outbox) = self.surfaces.get(&surface).cloned() else {
            debug!(surface, id, "request from unknown surface dropped");
            return;
        };
        tokio::task::spawn_blocking(move || {
            let _ = outbox.send(Frame::response(id, work()));
        });
    }

    fn respond(&self, surface: SurfaceId, id: u64, response: Response) {
        if response.is_failure() {
            debug!(surface, id, response = ?response, "request failed");
        }
        match self.surfaces.get(&surface) {
            Some(outbox) => {
                let _ = outbox.send(Frame::response(id, response));
            }
            None => debug!(surface, id, "response for departed surface dropped"),
        }
    }

    fn broadcast(&mut self, event: Event) {
        let frame = Frame::event(event);
        self.surfaces
            .retain(|_, outbox| outbox.send(frame.clone()).is_ok());
    }
}

fn list_failure(e: TwsError) -> Response {
    Response::Failure(Failure {
        error: e.to_string(),
        files: Some(Vec::new()),
    })
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

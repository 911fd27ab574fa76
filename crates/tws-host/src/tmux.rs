//! tmux session discovery.
//!
//! Every call re-invokes the tmux binary; nothing is cached. Any failure
//! (binary missing, no server running, non-zero exit) degrades to an empty
//! list.

use crate::command::CommandRunner;
use std::sync::Arc;
use tracing::{debug, warn};
use tws_core::{TmuxSessionInfo, TmuxWindowInfo, TwsError, TwsResult};

const SESSION_FORMAT: &str = "#{session_name}:#{session_windows}:#{session_attached}";
const WINDOW_FORMAT: &str = "#{window_index}:#{window_name}";

#[derive(Clone)]
pub struct TmuxDiscovery {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl TmuxDiscovery {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Sessions on the host's tmux server; empty when tmux is unavailable.
    pub fn list_sessions(&self) -> Vec<TmuxSessionInfo> {
        let args = vec!["list-sessions".into(), "-F".into(), SESSION_FORMAT.into()];
        match self.query(&args) {
            Ok(stdout) => parse_sessions(&stdout),
            Err(e) => {
                debug!(error = %e, "tmux session discovery unavailable");
                Vec::new()
            }
        }
    }

    /// Windows of one session; empty when tmux is unavailable.
    pub fn list_windows(&self, session: &str) -> Vec<TmuxWindowInfo> {
        let args = vec![
            "list-windows".into(),
            "-t".into(),
            session.to_string(),
            "-F".into(),
            WINDOW_FORMAT.into(),
        ];
        match self.query(&args) {
            Ok(stdout) => parse_windows(&stdout),
            Err(e) => {
                debug!(session, error = %e, "tmux window discovery unavailable");
                Vec::new()
            }
        }
    }

    fn query(&self, args: &[String]) -> TwsResult<String> {
        let output = self
            .runner
            .run(&self.binary, args)
            .map_err(|e| TwsError::DiscoveryUnavailable(format!("{}: {e}", self.binary)))?;
        if !output.success {
            return Err(TwsError::DiscoveryUnavailable(
                output.stderr.trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

/// Parse `name:windows:attached` lines. Session names may themselves contain
/// `:`, so fields are split from the right.
pub fn parse_sessions(stdout: &str) -> Vec<TmuxSessionInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.rsplitn(3, ':');
            let attached = parts.next()?;
            let windows = parts.next()?;
            let name = parts.next()?;
            match windows.trim().parse::<u32>() {
                Ok(windows) => Some(TmuxSessionInfo {
                    name: name.to_string(),
                    windows,
                    attached: attached.trim() == "1",
                }),
                Err(e) => {
                    warn!(line, error = %e, "skipping malformed tmux session line");
                    None
                }
            }
        })
        .collect()
}

/// Parse `index:name` lines. Window names may contain `:`.
pub fn parse_windows(stdout: &str) -> Vec<TmuxWindowInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (index, name) = line.split_once(':')?;
            let index = index.trim().parse::<u32>().ok()?;
            Some(TmuxWindowInfo {
                index,
                name: name.to_string(),
            })
        })
        .collect()
}

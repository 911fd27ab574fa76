//! Host configuration: TOML file + CLI overrides.

use crate::session::pty::SpawnPolicy;
use crate::workspace::catalog::ExtensionPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tws_core::{TwsError, TwsResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub dialog: DialogSection,
}

/// `[host]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Workspace root to open at startup.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            directory: None,
            state_dir: default_state_dir(),
            recent_limit: default_recent_limit(),
        }
    }
}

/// `[terminal]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalSection {
    /// Interactive shell. Falls back to `$SHELL`, then `/bin/sh`.
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,
    #[serde(default = "default_tmux")]
    pub tmux: String,
    #[serde(default = "default_term")]
    pub term: String,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: default_shell_args(),
            tmux: default_tmux(),
            term: default_term(),
        }
    }
}

/// `[catalog]` section: which extensions the file browser shows.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
    #[serde(default = "default_pdf_extensions")]
    pub pdf_extensions: Vec<String>,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            text_extensions: default_text_extensions(),
            pdf_extensions: default_pdf_extensions(),
            image_extensions: default_image_extensions(),
        }
    }
}

/// `[dialog]` section: external directory picker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialogSection {
    /// argv of a picker that prints the chosen directory on stdout,
    /// e.g. `["zenity", "--file-selection", "--directory"]`.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4470
}
fn default_state_dir() -> String {
    "~/.tws".to_string()
}
fn default_recent_limit() -> usize {
    10
}
fn default_shell_args() -> Vec<String> {
    vec!["-l".to_string()]
}
fn default_tmux() -> String {
    "tmux".to_string()
}
fn default_term() -> String {
    "xterm-256color".to_string()
}
fn default_text_extensions() -> Vec<String> {
    ["tex", "bib", "sty", "cls", "txt", "md"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_pdf_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}
fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "svg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Values given on the command line; `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub directory: Option<String>,
    pub stdio: bool,
}

/// Resolved host configuration (all paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind: String,
    pub port: u16,
    pub directory: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub recent_limit: usize,
    pub stdio: bool,
    pub spawn: SpawnPolicy,
    pub extensions: ExtensionPolicy,
    pub dialog_command: Vec<String>,
}

impl HostConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> TwsResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| TwsError::Other(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Ok(Self::from_file(file_config, cli))
    }

    /// Merge a parsed config file with CLI overrides.
    pub fn from_file(file: ConfigFile, cli: CliOverrides) -> Self {
        let directory = cli
            .directory
            .or(file.host.directory)
            .map(|d| expand_tilde_str(&d));

        Self {
            bind: cli.bind.unwrap_or(file.host.bind),
            port: cli.port.unwrap_or(file.host.port),
            directory,
            state_dir: expand_tilde_str(&file.host.state_dir),
            recent_limit: file.host.recent_limit,
            stdio: cli.stdio,
            spawn: SpawnPolicy {
                shell: file.terminal.shell,
                shell_args: file.terminal.shell_args,
                tmux: file.terminal.tmux,
                term: file.terminal.term,
            },
            extensions: ExtensionPolicy::new(
                &file.catalog.text_extensions,
                &file.catalog.pdf_extensions,
                &file.catalog.image_extensions,
            ),
            dialog_command: file.dialog.command,
        }
    }
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

pub fn expand_tilde_str(s: &str) -> PathBuf {
    if s == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

//! Surface <-> host message types.
//!
//! Every message on the channel is a [`Frame`]. Requests carry a caller-chosen
//! id that the host echoes in the matching response; notifications are
//! fire-and-forget; events are pushed by the host unprompted.

use crate::error::TwsError;
use serde::{Deserialize, Serialize};

/// Default terminal size when the caller does not give one.
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Top-level wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Frame {
    Request { id: u64, request: Request },
    Notify { notify: Notify },
    Response { id: u64, response: Response },
    Event { event: Event },
}

impl Frame {
    pub fn response(id: u64, response: impl Into<Response>) -> Self {
        Frame::Response {
            id,
            response: response.into(),
        }
    }

    pub fn event(event: Event) -> Self {
        Frame::Event { event }
    }
}

// ── Caller -> host ────────────────────────────────────────────────────

/// Request/response calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    OpenDirectoryDialog,
    SetDirectory {
        path: String,
    },
    GetCurrentDirectory,
    GetRecentDirectories,
    ListFiles {
        #[serde(default)]
        path: String,
    },
    ReadFile {
        path: String,
    },
    SaveFile {
        path: String,
        content: String,
    },
    GetFilePath {
        path: String,
    },
    GetFileMtime {
        path: String,
    },
    CreateTerminal {
        id: String,
        #[serde(default)]
        options: TerminalOptions,
    },
    CloseTerminal {
        id: String,
    },
    ListTmuxSessions,
    ListTmuxWindows {
        session: String,
    },
}

/// Fire-and-forget calls. The host never answers these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Notify {
    TerminalInput { id: String, data: String },
    TerminalResize { id: String, cols: u16, rows: u16 },
}

/// Options recognized by `createTerminal`.
///
/// `{type: "tmux", session}` attaches to an existing tmux session; any other
/// (or missing) `type` starts a login shell. So does `{type: "tmux"}` with no
/// or an empty `session`, since there is nothing to attach to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalOptions {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
}

impl TerminalOptions {
    /// A plain login shell.
    pub fn shell() -> Self {
        Self::default()
    }

    /// Attach to the named tmux session.
    pub fn tmux(session: impl Into<String>) -> Self {
        Self {
            kind: Some("tmux".into()),
            session: Some(session.into()),
            ..Self::default()
        }
    }

    /// The `attach -t` target, if these options ask for a tmux attach.
    /// `None` for a tmux request without a session name.
    pub fn tmux_target(&self) -> Option<String> {
        if self.kind.as_deref() != Some("tmux") {
            return None;
        }
        let session = self.session.as_deref().filter(|s| !s.is_empty())?;
        match self.window.as_deref() {
            Some(window) if !window.is_empty() => Some(format!("{session}:{window}")),
            _ => Some(session.to_string()),
        }
    }

    /// Requested size, falling back to 80x24.
    pub fn size(&self) -> (u16, u16) {
        (
            self.cols.filter(|c| *c > 0).unwrap_or(DEFAULT_COLS),
            self.rows.filter(|r| *r > 0).unwrap_or(DEFAULT_ROWS),
        )
    }
}

// ── Host -> caller ────────────────────────────────────────────────────

/// Result of a request: a success payload or an object carrying `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Failure(Failure),
    Success(Reply),
}

impl Response {
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Failure(_))
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Response::Success(reply)
    }
}

impl From<TwsError> for Response {
    fn from(e: TwsError) -> Self {
        Response::Failure(Failure {
            error: e.to_string(),
            files: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub error: String,
    /// `listFiles` failures still carry an (empty) listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
}

/// Success payloads, tagged by `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Reply {
    Directory {
        path: Option<String>,
        name: Option<String>,
    },
    RecentDirectories {
        directories: Vec<String>,
    },
    Files {
        path: String,
        root: String,
        files: Vec<FileEntry>,
    },
    File {
        path: String,
        content: String,
    },
    Saved {
        path: String,
    },
    FilePath {
        path: Option<String>,
    },
    FileMtime {
        path: String,
        mtime: Option<u64>,
    },
    TerminalCreated {
        id: String,
    },
    TerminalClosed {
        id: String,
        existed: bool,
    },
    TmuxSessions {
        sessions: Vec<TmuxSessionInfo>,
    },
    TmuxWindows {
        windows: Vec<TmuxWindowInfo>,
    },
}

/// Pushed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    DirectoryOpened { path: String, name: String },
    TerminalOutput { id: String, data: String },
    TerminalClosed { id: String },
}

// ── Shared views ──────────────────────────────────────────────────────

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    /// Path relative to the workspace root, `/`-separated.
    pub path: String,
    pub is_directory: bool,
    pub is_text: bool,
    pub is_pdf: bool,
    pub is_image: bool,
}

/// Snapshot of one session on the host's tmux server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxSessionInfo {
    pub name: String,
    pub windows: u32,
    pub attached: bool,
}

/// One window of a tmux session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxWindowInfo {
    pub index: u32,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{cbor_decode, cbor_encode};
    use serde_json::json;

    #[test]
    fn create_terminal_request_shape() {
        let frame: Frame = serde_json::from_value(json!({
            "kind": "request",
            "id": 7,
            "request": {
                "method": "createTerminal",
                "params": { "id": "t1", "options": { "type": "tmux", "session": "proj", "cols": 120 } }
            }
        }))
        .unwrap();

        let Frame::Request { id, request } = frame else {
            panic!("expected request frame");
        };
        assert_eq!(id, 7);
        let Request::CreateTerminal { id, options } = request else {
            panic!("expected createTerminal");
        };
        assert_eq!(id, "t1");
        assert_eq!(options.tmux_target().as_deref(), Some("proj"));
        assert_eq!(options.size(), (120, 24));
    }

    #[test]
    fn unit_requests_need_no_params() {
        let req: Request = serde_json::from_value(json!({ "method": "listTmuxSessions" })).unwrap();
        assert_eq!(req, Request::ListTmuxSessions);
    }

    #[test]
    fn missing_options_means_login_shell() {
        let req: Request =
            serde_json::from_value(json!({ "method": "createTerminal", "params": { "id": "a" } }))
                .unwrap();
        let Request::CreateTerminal { options, .. } = req else {
            panic!("expected createTerminal");
        };
        assert_eq!(options.tmux_target(), None);
        assert_eq!(options.size(), (DEFAULT_COLS, DEFAULT_ROWS));
    }

    #[test]
    fn tmux_without_session_is_a_shell() {
        let opts = TerminalOptions {
            kind: Some("tmux".into()),
            ..TerminalOptions::default()
        };
        assert_eq!(opts.tmux_target(), None);

        let mut with_window = TerminalOptions::tmux("build");
        with_window.window = Some("2".into());
        assert_eq!(with_window.tmux_target().as_deref(), Some("build:2"));
    }

    #[test]
    fn failure_is_an_error_object() {
        let response: Response = TwsError::NoWorkspace.into();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "error": "no directory opened" })
        );
    }

    #[test]
    fn success_and_failure_are_distinguishable_over_cbor() {
        let ok = Response::Success(Reply::Saved {
            path: "main.tex".into(),
        });
        let err = Response::Failure(Failure {
            error: "io error: not found".into(),
            files: Some(Vec::new()),
        });

        let ok_back: Response = cbor_decode(&cbor_encode(&ok).unwrap()).unwrap();
        let err_back: Response = cbor_decode(&cbor_encode(&err).unwrap()).unwrap();
        assert_eq!(ok_back, ok);
        assert_eq!(err_back, err);
        assert!(err_back.is_failure());
    }

    #[test]
    fn output_event_shape() {
        let frame = Frame::event(Event::TerminalOutput {
            id: "t1".into(),
            data: "hi".into(),
        });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "kind": "event", "event": { "event": "terminalOutput", "id": "t1", "data": "hi" } })
        );
    }

    #[test]
    fn file_entry_uses_camel_case() {
        let entry = FileEntry {
            name: "sub".into(),
            path: "sub".into(),
            is_directory: true,
            is_text: false,
            is_pdf: false,
            is_image: false,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["isDirectory"], json!(true));
    }
}

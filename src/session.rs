//! Per-session persistence for document and analysis texts.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;

/// Session identifier used when the caller supplies none.
pub const DEFAULT_SESSION: &str = "default";

/// The two text slots a session can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Extracted reference-document text.
    Document,
    /// Most recent generated analysis text.
    Analysis,
}

impl Slot {
    fn file_suffix(self) -> &'static str {
        match self {
            Self::Document => "iso",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document text"),
            Self::Analysis => write!(f, "analysis text"),
        }
    }
}

/// Errors surfaced by session stores.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested slot was never written for this session.
    #[error("no stored {slot} for session '{session}'")]
    NotFound {
        /// Session identifier as supplied by the caller.
        session: String,
        /// Slot that was requested.
        slot: Slot,
    },
    /// Underlying storage failed.
    #[error("session storage I/O failed")]
    Io(#[from] io::Error),
}

/// Key-value persistence with last-write-wins semantics per (session, slot).
///
/// Each session holds at most one live value per slot; a new put entirely
/// replaces the previous value. Concurrent writers to the same session may
/// race, and the last write observed wins; that is accepted, not corrected.
/// Entries persist until overwritten; expiry is an external policy.
pub trait SessionStore: Send + Sync {
    /// Stores `text` in `slot`, replacing any previous value.
    fn put(&self, session: &str, slot: Slot, text: &str) -> Result<(), SessionError>;

    /// Returns the latest value in `slot`, or [`SessionError::NotFound`].
    fn get(&self, session: &str, slot: Slot) -> Result<String, SessionError>;

    /// Stores the extracted reference-document text.
    fn put_document_text(&self, session: &str, text: &str) -> Result<(), SessionError> {
        self.put(session, Slot::Document, text)
    }

    /// Latest reference-document text for `session`.
    fn document_text(&self, session: &str) -> Result<String, SessionError> {
        self.get(session, Slot::Document)
    }

    /// Stores the latest generated analysis text.
    fn put_analysis_text(&self, session: &str, text: &str) -> Result<(), SessionError> {
        self.put(session, Slot::Analysis, text)
    }

    /// Latest generated analysis text for `session`.
    fn analysis_text(&self, session: &str) -> Result<String, SessionError> {
        self.get(session, Slot::Analysis)
    }
}

/// Maps a session id onto a filesystem-safe key.
///
/// Everything outside `[A-Za-z0-9._-]` becomes `_`; an id that sanitizes to
/// nothing falls back to [`DEFAULT_SESSION`]. The sanitized id is the
/// effective key of the file-backed store.
pub fn sanitize_session_id(session: &str) -> String {
    let cleaned: String = session
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_SESSION.to_string()
    } else {
        cleaned
    }
}

/// File-backed store: one UTF-8 text file per (session, slot) under a root
/// directory, named `{id}_iso.txt` and `{id}_analysis.txt`.
#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the per-session files.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn slot_path(&self, session: &str, slot: Slot) -> PathBuf {
        self.root.join(format!(
            "{}_{}.txt",
            sanitize_session_id(session),
            slot.file_suffix()
        ))
    }
}

impl SessionStore for FileSessionStore {
    fn put(&self, session: &str, slot: Slot, text: &str) -> Result<(), SessionError> {
        fs::write(self.slot_path(session, slot), text)?;
        Ok(())
    }

    fn get(&self, session: &str, slot: Slot) -> Result<String, SessionError> {
        match fs::read_to_string(self.slot_path(session, slot)) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(SessionError::NotFound {
                session: session.to_string(),
                slot,
            }),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store backed by a read-write locked map; ids are kept verbatim.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<(String, Slot), String>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, session: &str, slot: Slot, text: &str) -> Result<(), SessionError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        entries.insert((session.to_string(), slot), text.to_string());
        Ok(())
    }

    fn get(&self, session: &str, slot: Slot) -> Result<String, SessionError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poison| poison.into_inner());
        entries
            .get(&(session.to_string(), slot))
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                session: session.to_string(),
                slot,
            })
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::SessionStoreError;
use crate::paths::{current_pointer_path, session_file_name};
use crate::schema::{JsonLine, MessageEntry, MessageRole, SessionHeader, SessionMeta};

/// Append-only message log, one JSONL file per session under a root
/// directory. Operations are keyed by session id; the store itself holds no
/// per-session state, so concurrent exchanges interleave at message
/// granularity through per-call appends.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Opens a store rooted at `root`, creating the directory when absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| SessionStoreError::io("creating session root", &root, source))?;

        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a session with a fresh v4 id.
    pub fn create(&self, name: Option<&str>) -> Result<SessionMeta, SessionStoreError> {
        let session_id = Uuid::new_v4().simple().to_string();
        self.create_with_id(&session_id, name)
    }

    /// Creates a session under a caller-chosen id.
    pub fn create_with_id(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<SessionMeta, SessionStoreError> {
        validate_session_id(session_id)?;

        if self.exists(session_id) {
            return Err(SessionStoreError::DuplicateSession {
                root: self.root.clone(),
                session_id: session_id.to_string(),
            });
        }

        let created_at = now_rfc3339()?;
        let header = SessionHeader::v1(session_id, name, created_at.clone());
        self.write_header(session_id, &header)?;

        Ok(SessionMeta {
            session_id: session_id.to_string(),
            name: name.map(ToString::to_string),
            created_at: created_at.clone(),
            last_updated: created_at,
        })
    }

    #[must_use]
    pub fn exists(&self, session_id: &str) -> bool {
        validate_session_id(session_id).is_ok() && self.session_path(session_id).is_file()
    }

    /// Appends one message to a session, creating the session when absent.
    ///
    /// The message is written as a single line on an append-mode handle;
    /// storage failure is propagated, never swallowed.
    pub fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), SessionStoreError> {
        validate_session_id(session_id)?;

        if !self.exists(session_id) {
            let created_at = now_rfc3339()?;
            let header = SessionHeader::v1(session_id, None::<&str>, created_at);
            self.write_header(session_id, &header)?;
        }

        let path = self.session_path(session_id);
        let entry = MessageEntry::new(role, content, now_rfc3339()?);
        let line = serde_json::to_string(&entry)
            .map_err(|source| SessionStoreError::json_serialize(&path, source))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| {
                SessionStoreError::io("opening session file for append", &path, source)
            })?;
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(|source| SessionStoreError::io("appending message line", &path, source))?;

        Ok(())
    }

    /// Returns a session's messages in append order.
    ///
    /// With `limit`, only the most recent `limit` messages are returned. A
    /// missing session is an empty sequence, not an error.
    pub fn fetch(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MessageEntry>, SessionStoreError> {
        validate_session_id(session_id)?;

        let path = self.session_path(session_id);
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let (_, mut entries) = read_session_file(&path)?;
        if let Some(limit) = limit {
            if entries.len() > limit {
                entries.drain(0..entries.len() - limit);
            }
        }

        Ok(entries)
    }

    /// Truncates a session's log back to its header line.
    ///
    /// Destructive and intentional; returns false when the session does not
    /// exist.
    pub fn clear(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        validate_session_id(session_id)?;

        let path = self.session_path(session_id);
        if !path.is_file() {
            return Ok(false);
        }

        let (header, _) = read_session_file(&path)?;
        self.write_header(session_id, &header)?;
        Ok(true)
    }

    /// Lists up to `limit` sessions, most recently written first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionMeta>, SessionStoreError> {
        let mut sessions = Vec::new();

        let dir = fs::read_dir(&self.root)
            .map_err(|source| SessionStoreError::io("listing session root", &self.root, source))?;
        for dir_entry in dir {
            let dir_entry = dir_entry.map_err(|source| {
                SessionStoreError::io("listing session root", &self.root, source)
            })?;
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }

            let (header, _) = read_session_file(&path)?;
            let modified = dir_entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .map_err(|source| SessionStoreError::io("reading session mtime", &path, source))?;
            let last_updated = OffsetDateTime::from(modified)
                .format(&Rfc3339)
                .map_err(SessionStoreError::ClockFormat)?;

            sessions.push(SessionMeta {
                session_id: header.session_id,
                name: header.name,
                created_at: header.created_at,
                last_updated,
            });
        }

        sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Marks a session as the current default. The session must exist.
    pub fn set_current(&self, session_id: &str) -> Result<(), SessionStoreError> {
        validate_session_id(session_id)?;

        if !self.exists(session_id) {
            return Err(SessionStoreError::UnknownSession {
                root: self.root.clone(),
                session_id: session_id.to_string(),
            });
        }

        let pointer = current_pointer_path(&self.root);
        fs::write(&pointer, session_id)
            .map_err(|source| SessionStoreError::io("writing current pointer", &pointer, source))
    }

    /// Returns the current default session id, if one has been set and its
    /// session still exists.
    pub fn current_session(&self) -> Result<Option<String>, SessionStoreError> {
        let pointer = current_pointer_path(&self.root);
        if !pointer.is_file() {
            return Ok(None);
        }

        let session_id = fs::read_to_string(&pointer)
            .map_err(|source| SessionStoreError::io("reading current pointer", &pointer, source))?;
        let session_id = session_id.trim().to_string();

        if session_id.is_empty() || !self.exists(&session_id) {
            return Ok(None);
        }

        Ok(Some(session_id))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.root.join(session_file_name(session_id))
    }

    fn write_header(
        &self,
        session_id: &str,
        header: &SessionHeader,
    ) -> Result<(), SessionStoreError> {
        let path = self.session_path(session_id);
        let line = serde_json::to_string(header)
            .map_err(|source| SessionStoreError::json_serialize(&path, source))?;
        fs::write(&path, format!("{line}\n"))
            .map_err(|source| SessionStoreError::io("writing session header", &path, source))
    }
}

pub(crate) fn read_session_file(
    path: &Path,
) -> Result<(SessionHeader, Vec<MessageEntry>), SessionStoreError> {
    let file = File::open(path)
        .map_err(|source| SessionStoreError::io("opening session file", path, source))?;
    let reader = BufReader::new(file);

    let mut header: Option<SessionHeader> = None;
    let mut entries = Vec::new();

    for (line_index, line_result) in reader.lines().enumerate() {
        let line_number = line_index + 1;
        let line =
            line_result.map_err(|source| SessionStoreError::io_line(path, line_number, source))?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed = parse_json_line(path, line_number, &line)?;

        if line_number == 1 {
            match parsed {
                JsonLine::Session(parsed_header) => {
                    validate_header_line(path, line_number, &parsed_header)?;
                    header = Some(parsed_header);
                }
                JsonLine::Message(_) => {
                    return Err(SessionStoreError::InvalidHeaderRecord {
                        path: path.to_path_buf(),
                        line: line_number,
                    });
                }
            }

            continue;
        }

        match parsed {
            JsonLine::Session(_) => {
                return Err(SessionStoreError::InvalidMessageRecord {
                    path: path.to_path_buf(),
                    line: line_number,
                });
            }
            JsonLine::Message(entry) => {
                validate_message_line(path, line_number, &entry)?;
                entries.push(entry);
            }
        }
    }

    let header = header.ok_or_else(|| SessionStoreError::MissingHeader {
        path: path.to_path_buf(),
    })?;

    Ok((header, entries))
}

pub(crate) fn parse_json_line(
    path: &Path,
    line_number: usize,
    line: &str,
) -> Result<JsonLine, SessionStoreError> {
    serde_json::from_str::<JsonLine>(line)
        .map_err(|source| SessionStoreError::json_line(path, line_number, source))
}

pub(crate) fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &SessionHeader,
) -> Result<(), SessionStoreError> {
    if header.version != 1 {
        return Err(SessionStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)
}

pub(crate) fn validate_message_line(
    path: &Path,
    line_number: usize,
    entry: &MessageEntry,
) -> Result<(), SessionStoreError> {
    validate_rfc3339(path, line_number, "ts", &entry.ts)
}

pub(crate) fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SessionStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(SessionStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}

fn validate_session_id(session_id: &str) -> Result<(), SessionStoreError> {
    let invalid = session_id.trim().is_empty()
        || session_id.contains(['/', '\\'])
        || session_id == "."
        || session_id == "..";

    if invalid {
        return Err(SessionStoreError::InvalidSessionId {
            session_id: session_id.to_string(),
        });
    }

    Ok(())
}

fn now_rfc3339() -> Result<String, SessionStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(SessionStoreError::ClockFormat)
}

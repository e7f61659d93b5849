//! The directory of saved chats.
//!
//! Each saved chat is one JSON file ("slot") directly inside the history directory.  The
//! directory is created the first time a slot is written.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::error::{Error, Result};

/// How many slots `list` returns at most.
pub const LIST_LIMIT: usize = 10;

const SLOT_EXTENSION: &str = "json";

const AUTO_NAME_FORMAT: &[FormatItem<'static>] =
    format_description!("chat_[year][month][day]_[hour][minute][second]");

const MODIFIED_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// One saved chat as shown by `/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// File name within the history directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: OffsetDateTime,
}

impl SlotInfo {
    /// Modification time as `YYYY-MM-DD HH:MM` in local time.
    pub fn modified_display(&self) -> String {
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        self.modified
            .to_offset(offset)
            .format(MODIFIED_FORMAT)
            .unwrap_or_else(|_| self.modified.to_string())
    }
}

/// The fixed directory holding snapshot slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The slot name used by `/save` without an argument, e.g. `chat_20250131_140211.json`.
    pub fn auto_name(now: OffsetDateTime) -> String {
        let stem = now
            .format(AUTO_NAME_FORMAT)
            .unwrap_or_else(|_| format!("chat_{}", now.unix_timestamp()));
        format!("{stem}.{SLOT_EXTENSION}")
    }

    /// Validates a user-supplied slot name, appending `.json` unless it already ends in it.
    ///
    /// Names must stay inside the history directory: path separators and `..` components
    /// are rejected.
    pub fn slot_name(name: &str) -> Result<String> {
        let name = name.trim();
        let invalid = |why: &str| {
            Error::validation(
                format!("invalid chat name {name:?}: {why}"),
                Some("name".to_string()),
            )
        };
        if name.is_empty() || name == "." {
            return Err(invalid("name is empty"));
        }
        let path = utf8path::Path::from(name);
        if path
            .components()
            .any(|c| matches!(c, utf8path::Component::ParentDir))
        {
            return Err(invalid(".. is not allowed"));
        }
        if path
            .components()
            .any(|c| matches!(c, utf8path::Component::AppDefined))
            || name.contains(['/', '\\'])
        {
            return Err(invalid("path separators are not allowed"));
        }
        if Path::new(name).extension().and_then(|e| e.to_str()) == Some(SLOT_EXTENSION) {
            Ok(name.to_string())
        } else {
            Ok(format!("{name}.{SLOT_EXTENSION}"))
        }
    }

    /// Full path of a validated slot.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(Self::slot_name(name)?))
    }

    /// Writes `contents` to the slot, creating the directory if needed.
    ///
    /// The file is written beside its final name and renamed into place, so a crash never
    /// leaves a half-written slot.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root).map_err(|err| {
            Error::io(
                format!("failed to create {}", self.root.display()),
                err,
            )
        })?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)
            .map_err(|err| Error::io(format!("failed to write {}", tmp.display()), err))?;
        fs::rename(&tmp, &path)
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
        Ok(path)
    }

    /// Reads a slot.
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::not_found(
                format!("no saved chat at {}", path.display()),
                Some("snapshot".to_string()),
                Some(name.to_string()),
            )),
            Err(err) => Err(Error::io(format!("failed to read {}", path.display()), err)),
        }
    }

    /// Lists slots, most recently modified first, at most [`LIST_LIMIT`] of them.
    ///
    /// A history directory that does not exist yet has no slots.
    pub fn list(&self) -> Result<Vec<SlotInfo>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::io(
                    format!("failed to list {}", self.root.display()),
                    err,
                ));
            }
        };
        let mut slots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| Error::io("failed to list saved chats", err))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|err| Error::io(format!("failed to stat {}", path.display()), err))?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let modified = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            slots.push(SlotInfo {
                name: name.to_string(),
                size: metadata.len(),
                modified,
            });
        }
        slots.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.name.cmp(&a.name))
        });
        slots.truncate(LIST_LIMIT);
        Ok(slots)
    }
}

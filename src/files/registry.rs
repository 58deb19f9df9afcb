use crate::files::{FileSeed, FileStatus};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileEntry {
    pub name: String,
    pub content: String,
    pub status: FileStatus,
    pub is_selected: bool,
}

impl FileEntry {
    fn pending(name: String) -> Self {
        Self {
            name,
            content: String::new(),
            status: FileStatus::Pending,
            is_selected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    InitializeFiles(Vec<FileSeed>),
    AppendContent { path: String, chunk: String },
    SetStatus { path: String, status: FileStatus },
    SelectFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown file path: {0}")]
    UnknownPath(String),
}

/// Path-keyed generation state. Keys are only ever set by `InitializeFiles`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<String, FileEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: FileEvent) -> Result<(), RegistryError> {
        match event {
            FileEvent::InitializeFiles(files) => {
                self.entries = files
                    .into_iter()
                    .map(|seed| (seed.path, FileEntry::pending(seed.name)))
                    .collect();
                Ok(())
            }
            FileEvent::AppendContent { path, chunk } => {
                let entry = self
                    .entries
                    .get_mut(&path)
                    .ok_or(RegistryError::UnknownPath(path))?;
                entry.content.push_str(&chunk);
                entry.status = FileStatus::Generating;
                Ok(())
            }
            FileEvent::SetStatus { path, status } => {
                let entry = self
                    .entries
                    .get_mut(&path)
                    .ok_or(RegistryError::UnknownPath(path))?;
                entry.status = status;
                Ok(())
            }
            FileEvent::SelectFile(path) => {
                if !self.entries.contains_key(&path) {
                    return Err(RegistryError::UnknownPath(path));
                }
                for (key, entry) in self.entries.iter_mut() {
                    entry.is_selected = *key == path;
                }
                Ok(())
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn selected(&self) -> Option<(&str, &FileEntry)> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.is_selected)
            .map(|(path, entry)| (path.as_str(), entry))
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_with_status(&self, status: FileStatus) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.status == status)
            .count()
    }
}

/// Transitions that a successfully applied event implies. The UI follows the
/// file the backend is currently generating.
pub fn follow_up(event: &FileEvent) -> Option<FileEvent> {
    match event {
        FileEvent::SetStatus {
            path,
            status: FileStatus::Generating,
        } => Some(FileEvent::SelectFile(path.clone())),
        _ => None,
    }
}

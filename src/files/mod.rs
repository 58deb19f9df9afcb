use serde::{Deserialize, Serialize};
use std::fmt;

pub mod registry;
pub mod tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// One node of the project layout announced by the backend. `path` is the
/// join key into the registry; `name` is what the user (and the archive) sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureNode {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    #[cfg(test)]
    pub fn file(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn folder(
        path: impl Into<String>,
        name: impl Into<String>,
        children: Vec<StructureNode>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: NodeKind::Folder,
            children,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Pending,
    Generating,
    Complete,
    Error,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path and display name of a file to seed the registry with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSeed {
    pub path: String,
    pub name: String,
}

pub fn collect_files(structure: &[StructureNode]) -> Vec<FileSeed> {
    let mut files = Vec::new();
    let mut stack: Vec<&StructureNode> = structure.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.kind == NodeKind::File {
            files.push(FileSeed {
                path: node.path.clone(),
                name: node.name.clone(),
            });
        }
        stack.extend(node.children.iter().rev());
    }
    files
}

pub fn folder_paths(structure: &[StructureNode]) -> Vec<String> {
    let mut folders = Vec::new();
    let mut stack: Vec<&StructureNode> = structure.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.is_folder() {
            folders.push(node.path.clone());
            stack.extend(node.children.iter().rev());
        }
    }
    folders
}

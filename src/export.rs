use crate::files::registry::Registry;
use crate::files::{NodeKind, StructureNode};
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const FALLBACK_NAME: &str = "project";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to write archive: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Archive paths that collided with an earlier entry and were left out.
    pub skipped: Vec<String>,
}

/// One entry per file node, addressed by the node names along the way down
/// rather than by the flat `path` key. Missing registry entries export empty.
/// Names are reduced to single path segments, so nothing escapes the root.
pub fn archive_entries(structure: &[StructureNode], registry: &Registry) -> Vec<ArchiveEntry> {
    let mut entries = Vec::new();
    let mut stack: Vec<(String, &StructureNode)> = structure
        .iter()
        .rev()
        .map(|node| (archive_segment(&node.name), node))
        .collect();

    while let Some((archive_path, node)) = stack.pop() {
        match node.kind {
            NodeKind::File => entries.push(ArchiveEntry {
                content: registry
                    .get(&node.path)
                    .map(|entry| entry.content.clone())
                    .unwrap_or_default(),
                path: archive_path,
            }),
            NodeKind::Folder => {
                stack.extend(
                    node.children
                        .iter()
                        .rev()
                        .map(|child| {
                            (format!("{archive_path}/{}", archive_segment(&child.name)), child)
                        }),
                );
            }
        }
    }
    entries
}

pub fn archive_file_name(project_name: Option<&str>) -> String {
    let base = project_name
        .map(sanitize_file_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    format!("{base}.zip")
}

fn sanitize_file_stem(raw: &str) -> String {
    let stem: String = raw
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    match stem.as_str() {
        "." | ".." => "_".to_string(),
        _ => stem,
    }
}

fn archive_segment(name: &str) -> String {
    let segment = sanitize_file_stem(name);
    if segment.is_empty() {
        "_".to_string()
    } else {
        segment
    }
}

pub fn build_archive(
    structure: &[StructureNode],
    registry: &Registry,
    project_name: Option<&str>,
) -> Result<Archive, ExportError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut written = HashSet::new();
    let mut skipped = Vec::new();

    for entry in archive_entries(structure, registry) {
        if !written.insert(entry.path.clone()) {
            warn!(path = %entry.path, "duplicate archive path; keeping the first entry");
            skipped.push(entry.path);
            continue;
        }
        writer.start_file(entry.path.as_str(), options)?;
        writer.write_all(entry.content.as_bytes())?;
    }

    let bytes = writer.finish()?.into_inner();
    Ok(Archive {
        file_name: archive_file_name(project_name),
        bytes,
        skipped,
    })
}

pub fn save_archive(archive: &Archive, dir: &Path) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&archive.file_name);
    fs::write(&path, &archive.bytes)?;
    Ok(path)
}

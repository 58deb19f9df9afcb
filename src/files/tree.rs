use crate::files::registry::Registry;
use crate::files::{FileStatus, StructureNode};
use std::collections::HashSet;
use tracing::trace;

/// Deeper nesting than this is treated as malformed and not rendered.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionSet {
    expanded: HashSet<String>,
}

impl ExpansionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand_all(paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            expanded: paths.into_iter().collect(),
        }
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    pub fn toggle(&mut self, path: &str) {
        if !self.expanded.remove(path) {
            self.expanded.insert(path.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBadge {
    pub status: FileStatus,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeRow<'a> {
    pub depth: usize,
    pub node: &'a StructureNode,
    /// Only meaningful for folders.
    pub expanded: bool,
    /// `None` for folders and for files the registry does not know.
    pub file: Option<FileBadge>,
}

/// Depth-first, pre-order walk over the visible part of the structure.
pub struct TreeRows<'a> {
    stack: Vec<(usize, &'a StructureNode)>,
    seen: HashSet<&'a str>,
    expansion: &'a ExpansionSet,
    registry: &'a Registry,
}

pub fn rows<'a>(
    structure: &'a [StructureNode],
    expansion: &'a ExpansionSet,
    registry: &'a Registry,
) -> TreeRows<'a> {
    TreeRows {
        stack: structure.iter().rev().map(|node| (0, node)).collect(),
        seen: HashSet::new(),
        expansion,
        registry,
    }
}

impl<'a> Iterator for TreeRows<'a> {
    type Item = TreeRow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((depth, node)) = self.stack.pop() {
            if depth > MAX_DEPTH {
                trace!(path = %node.path, depth, "structure nested too deep; skipping");
                continue;
            }
            if !self.seen.insert(node.path.as_str()) {
                trace!(path = %node.path, "duplicate structure path; skipping");
                continue;
            }

            if node.is_folder() {
                let expanded = self.expansion.is_expanded(&node.path);
                if expanded {
                    self.stack
                        .extend(node.children.iter().rev().map(|child| (depth + 1, child)));
                }
                return Some(TreeRow {
                    depth,
                    node,
                    expanded,
                    file: None,
                });
            }

            let file = self.registry.get(&node.path).map(|entry| FileBadge {
                status: entry.status,
                selected: entry.is_selected,
            });
            return Some(TreeRow {
                depth,
                node,
                expanded: false,
                file,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::registry::FileEvent;
    use crate::files::{collect_files, folder_paths};

    fn structure() -> Vec<StructureNode> {
        vec![StructureNode::folder(
            "root",
            "proj",
            vec![
                StructureNode::folder(
                    "root/src",
                    "src",
                    vec![StructureNode::file("root/src/lib.rs", "lib.rs")],
                ),
                StructureNode::file("root/Cargo.toml", "Cargo.toml"),
            ],
        )]
    }

    fn registry_for(structure: &[StructureNode]) -> Registry {
        let mut registry = Registry::new();
        registry
            .apply(FileEvent::InitializeFiles(collect_files(structure)))
            .expect("initialize should apply");
        registry
    }

    fn visible(rows: TreeRows<'_>) -> Vec<(usize, String)> {
        rows.map(|row| (row.depth, row.node.path.clone())).collect()
    }

    #[test]
    fn fully_expanded_tree_is_preorder() {
        let structure = structure();
        let registry = registry_for(&structure);
        let expansion = ExpansionSet::expand_all(folder_paths(&structure));

        assert_eq!(
            visible(rows(&structure, &expansion, &registry)),
            vec![
                (0, "root".to_string()),
                (1, "root/src".to_string()),
                (2, "root/src/lib.rs".to_string()),
                (1, "root/Cargo.toml".to_string()),
            ]
        );
    }

    #[test]
    fn collapsing_a_folder_hides_its_subtree() {
        let structure = structure();
        let registry = registry_for(&structure);
        let mut expansion = ExpansionSet::expand_all(folder_paths(&structure));
        expansion.toggle("root/src");

        let rows: Vec<_> = rows(&structure, &expansion, &registry).collect();
        assert_eq!(rows.len(), 3);
        assert!(!rows[1].expanded);

        expansion.toggle("root/src");
        assert!(expansion.is_expanded("root/src"));
    }

    #[test]
    fn file_rows_carry_registry_state() {
        let structure = structure();
        let mut registry = registry_for(&structure);
        registry
            .apply(FileEvent::SetStatus {
                path: "root/Cargo.toml".to_string(),
                status: FileStatus::Generating,
            })
            .expect("status should apply");
        registry
            .apply(FileEvent::SelectFile("root/Cargo.toml".to_string()))
            .expect("select should apply");
        let expansion = ExpansionSet::expand_all(folder_paths(&structure));

        let row = rows(&structure, &expansion, &registry)
            .find(|row| row.node.path == "root/Cargo.toml")
            .expect("file row should be visible");
        assert_eq!(
            row.file,
            Some(FileBadge {
                status: FileStatus::Generating,
                selected: true,
            })
        );
    }

    #[test]
    fn files_missing_from_registry_still_render() {
        let structure = structure();
        let registry = Registry::new();
        let expansion = ExpansionSet::expand_all(folder_paths(&structure));
        let rows: Vec<_> = rows(&structure, &expansion, &registry).collect();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|row| row.file.is_none()));
    }

    #[test]
    fn duplicate_paths_render_once() {
        let structure = vec![
            StructureNode::file("same", "a.rs"),
            StructureNode::file("same", "b.rs"),
        ];
        let registry = Registry::new();
        let expansion = ExpansionSet::new();
        assert_eq!(rows(&structure, &expansion, &registry).count(), 1);
    }

    #[test]
    fn excessive_depth_is_cut_off() {
        let mut node = StructureNode::file("leaf", "leaf.rs");
        let mut folders = Vec::new();
        for level in 0..(MAX_DEPTH + 5) {
            let path = format!("d{level}");
            folders.push(path.clone());
            node = StructureNode::folder(path.clone(), path, vec![node]);
        }
        let structure = vec![node];
        let registry = Registry::new();
        let expansion = ExpansionSet::expand_all(folders);
        assert_eq!(
            rows(&structure, &expansion, &registry).count(),
            MAX_DEPTH + 1
        );
    }
}

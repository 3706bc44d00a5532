//! Line-of-business hierarchy per reporting form.
//!
//! Dictionaries are JSON objects keyed by line code. Each node carries a
//! label and an ordered list of child codes; the root is [`ROOT_LINE`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;
use crate::metrics::options::OptionItem;
use crate::types::ROOT_LINE;
use crate::AnalyticsResult;

/// Indent used for dropdown labels (an em space).
pub const OPTION_INDENT: &str = "\u{2003}";

/// Indent used for line labels in insurer-split tables.
pub const TABLE_INDENT: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineNode {
    pub label: String,
    #[serde(default)]
    pub children: Vec<String>,
}

/// An immutable line tree.
#[derive(Debug, Clone, Default)]
pub struct LineTree {
    nodes: HashMap<String, LineNode>,
    parents: HashMap<String, String>,
}

impl LineTree {
    pub fn from_nodes(nodes: HashMap<String, LineNode>) -> Self {
        let mut parents = HashMap::new();
        for (code, node) in &nodes {
            for child in &node.children {
                parents.entry(child.clone()).or_insert_with(|| code.clone());
            }
        }
        LineTree { nodes, parents }
    }

    pub fn from_json(json: &str) -> AnalyticsResult<Self> {
        let nodes: HashMap<String, LineNode> = serde_json::from_str(json)?;
        Ok(LineTree::from_nodes(nodes))
    }

    pub fn from_path(path: &Path) -> AnalyticsResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| AnalyticsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        LineTree::from_json(&json)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.nodes.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Label of a line, or the code itself when unknown.
    pub fn label<'a>(&'a self, code: &'a str) -> &'a str {
        self.nodes.get(code).map(|n| n.label.as_str()).unwrap_or(code)
    }

    pub fn children(&self, code: &str) -> &[String] {
        self.nodes
            .get(code)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, code: &str) -> Option<&str> {
        self.parents.get(code).map(String::as_str)
    }

    /// Children of the root.
    pub fn top_level(&self) -> &[String] {
        self.children(ROOT_LINE)
    }

    /// All descendants in DFS order.
    pub fn descendants(&self, code: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(code, 0, &mut |c, _| out.push(c.to_string()));
        out.retain(|c| c != code);
        out
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self, code: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = code;
        while let Some(parent) = self.parent(current) {
            if !seen.insert(parent) {
                break;
            }
            out.push(parent.to_string());
            current = parent;
        }
        out
    }

    /// Distance from the root.
    pub fn depth(&self, code: &str) -> usize {
        self.ancestors(code).len()
    }

    /// `(code, depth)` pairs of the whole tree in DFS order from the root.
    pub fn dfs_order(&self) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        self.walk(ROOT_LINE, 0, &mut |c, d| out.push((c.to_string(), d)));
        out
    }

    fn walk(&self, code: &str, depth: usize, visit: &mut dyn FnMut(&str, usize)) {
        let mut visited = HashSet::new();
        self.walk_inner(code, depth, visit, &mut visited);
    }

    fn walk_inner<'a>(
        &'a self,
        code: &'a str,
        depth: usize,
        visit: &mut dyn FnMut(&str, usize),
        visited: &mut HashSet<&'a str>,
    ) {
        let Some(node) = self.nodes.get(code) else {
            return;
        };
        if !visited.insert(code) {
            return;
        }
        visit(code, depth);
        for child in &node.children {
            self.walk_inner(child, depth + 1, visit, visited);
        }
    }

    /// Dropdown options: DFS from the root down to `max_depth`, labels cleaned
    /// and indented by depth.
    pub fn options(&self, max_depth: Option<usize>) -> Vec<OptionItem> {
        self.dfs_order()
            .into_iter()
            .filter(|(_, depth)| max_depth.map(|m| *depth <= m).unwrap_or(true))
            .map(|(code, depth)| OptionItem {
                label: format!("{}{}", OPTION_INDENT.repeat(depth), clean_label(self.label(&code))),
                value: code,
            })
            .collect()
    }

    /// Drops selected lines already covered by a selected ancestor. With
    /// `detailize`, each selected parent is replaced by its children instead.
    pub fn normalize_selection(&self, selected: &[String], detailize: bool) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        if detailize {
            for code in selected {
                let children = self.children(code);
                let expanded: Vec<String> = if children.is_empty() {
                    vec![code.clone()]
                } else {
                    children.to_vec()
                };
                for c in expanded {
                    if !out.contains(&c) {
                        out.push(c);
                    }
                }
            }
            return out;
        }

        let covered: HashSet<String> = selected
            .iter()
            .flat_map(|code| self.descendants(code))
            .collect();
        for code in selected {
            if !covered.contains(code) && !out.contains(code) {
                out.push(code.clone());
            }
        }
        out
    }

    /// Applies a newly added line to `previous`: its ancestors and
    /// descendants are deselected so that the selection never overlaps.
    pub fn toggle_selection(&self, previous: &[String], added: &str) -> Vec<String> {
        let ancestors: HashSet<String> = self.ancestors(added).into_iter().collect();
        let descendants: HashSet<String> = self.descendants(added).into_iter().collect();
        let mut out: Vec<String> = previous
            .iter()
            .filter(|c| !ancestors.contains(*c) && !descendants.contains(*c) && c.as_str() != added)
            .cloned()
            .collect();
        out.push(added.to_string());
        out
    }
}

/// Removes the word "Добровольное" and collapses whitespace.
pub fn clean_label(label: &str) -> String {
    label
        .replace("Добровольное", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

//! Artifact membership and artifact-to-artifact dependencies.
//!
//! [`ArtifactIndex`] maps symbols and files to the generated artifacts that
//! document them. [`ArtifactGraph`] records which artifacts must be refreshed
//! before which, and produces a dependencies-first update order.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::indexer::symbols::SymbolGraph;

pub const API_REFERENCE: &str = "api-reference";
pub const OVERVIEW: &str = "overview";
pub const ARCHITECTURE: &str = "architecture";
pub const INDEX_ARTIFACT: &str = "index";
pub const ROOT_MODULE: &str = "module-root";
const MODULE_PREFIX: &str = "module-";

/// Module artifact documenting `file_path`: `module-<parent dir slug>`, or
/// `module-root` for top-level files.
pub fn module_artifact_id(file_path: &str) -> String {
    let normalized = file_path.replace('\\', "/");
    let parent = match normalized.trim_start_matches("./").rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => return ROOT_MODULE.to_string(),
    };
    let mut slug = String::with_capacity(parent.len());
    let mut last_dash = true;
    for ch in parent.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        ROOT_MODULE.to_string()
    } else {
        format!("{MODULE_PREFIX}{slug}")
    }
}

pub fn is_module_artifact(id: &str) -> bool {
    id.starts_with(MODULE_PREFIX)
}

// ---------------------------------------------------------------------------
// Membership index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ArtifactIndex {
    by_symbol: HashMap<String, Vec<String>>,
    by_file: HashMap<String, Vec<String>>,
    artifacts: IndexSet<String>,
}

impl ArtifactIndex {
    /// Default membership for every symbol and file of a graph: the owning
    /// module page, plus the API reference for exported symbols.
    pub fn build(graph: &SymbolGraph) -> Self {
        let mut index = ArtifactIndex::default();
        for path in graph.files() {
            index.assign_file(path, &module_artifact_id(path));
        }
        for symbol in graph.symbols() {
            let id = symbol.id();
            index.assign_symbol(&id, &module_artifact_id(&symbol.file_path));
            if symbol.exported {
                index.assign_symbol(&id, API_REFERENCE);
            }
        }
        index
    }

    pub fn assign_symbol(&mut self, symbol_id: &str, artifact_id: &str) {
        let entry = self.by_symbol.entry(symbol_id.to_string()).or_default();
        if !entry.iter().any(|a| a == artifact_id) {
            entry.push(artifact_id.to_string());
        }
        self.artifacts.insert(artifact_id.to_string());
    }

    pub fn assign_file(&mut self, file_path: &str, artifact_id: &str) {
        let entry = self.by_file.entry(file_path.to_string()).or_default();
        if !entry.iter().any(|a| a == artifact_id) {
            entry.push(artifact_id.to_string());
        }
        self.artifacts.insert(artifact_id.to_string());
    }

    pub fn artifacts_for_symbol(&self, symbol_id: &str) -> &[String] {
        self.by_symbol.get(symbol_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Artifacts for a file. Files unknown to the index (deleted or not yet
    /// parsed) still map to their module page.
    pub fn artifacts_for_file(&self, file_path: &str) -> Vec<String> {
        match self.by_file.get(file_path) {
            Some(ids) => ids.clone(),
            None => vec![module_artifact_id(file_path)],
        }
    }

    /// Every artifact the index knows about, in first-assigned order.
    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Dependency graph
// ---------------------------------------------------------------------------

/// `from → to` means `to` must be refreshed before `from`.
#[derive(Debug, Clone, Default)]
pub struct ArtifactGraph {
    dependencies: IndexMap<String, Vec<String>>,
}

impl ArtifactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default dependency map for a set of artifacts: the overview depends
    /// on the architecture page and every module page on the API reference.
    pub fn with_defaults<'a>(artifacts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut graph = Self::new();
        graph.add_dependency(OVERVIEW, ARCHITECTURE);
        for id in artifacts {
            if is_module_artifact(id) {
                graph.add_dependency(id, API_REFERENCE);
            }
        }
        graph
    }

    pub fn add_dependency(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let entry = self.dependencies.entry(from.to_string()).or_default();
        if !entry.iter().any(|d| d == to) {
            entry.push(to.to_string());
        }
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dependencies-first order over `ids`. Traversal passes through
    /// artifacts outside `ids` but only emits members of it. A back edge
    /// closing a cycle is ignored.
    pub fn topological_order(&self, ids: &[String]) -> Vec<String> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut visiting: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(ids.len());

        for root in ids {
            if visited.contains(root.as_str()) {
                continue;
            }
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            visiting.insert(root.as_str());

            while let Some((current, next)) = stack.last_mut() {
                let deps = self.dependencies_of(current);
                if *next < deps.len() {
                    let dep = deps[*next].as_str();
                    *next += 1;
                    if visited.contains(dep) || visiting.contains(dep) {
                        continue;
                    }
                    visiting.insert(dep);
                    stack.push((dep, 0));
                } else {
                    let done = *current;
                    stack.pop();
                    visiting.remove(done);
                    visited.insert(done);
                    if wanted.contains(done) {
                        order.push(done.to_string());
                    }
                }
            }
        }
        order
    }

    /// Dependency level of every id: 0 when none of its dependencies are in
    /// `ids`, otherwise one more than its deepest dependency.
    pub fn levels(&self, ids: &[String]) -> HashMap<String, usize> {
        let order = self.topological_order(ids);
        let mut levels: HashMap<String, usize> = HashMap::with_capacity(order.len());
        for id in order {
            let level = self
                .dependencies_of(&id)
                .iter()
                .filter_map(|d| levels.get(d))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            levels.insert(id, level);
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedFile, ParsedSymbol, SymbolKind};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn module_ids_are_slugged_parent_dirs() {
        assert_eq!(module_artifact_id("a.ts"), "module-root");
        assert_eq!(module_artifact_id("./a.ts"), "module-root");
        assert_eq!(module_artifact_id("src/core/a.ts"), "module-src-core");
        assert_eq!(module_artifact_id("src\\Api Docs\\b.ts"), "module-src-api-docs");
    }

    #[test]
    fn exported_symbols_map_to_api_reference() {
        let mut foo = ParsedSymbol::new("Foo", SymbolKind::Class);
        foo.modifiers.push("export".into());
        let graph = SymbolGraph::build(&[ParsedFile {
            path: "src/a.ts".into(),
            symbols: vec![foo, ParsedSymbol::new("bar", SymbolKind::Function)],
        }]);
        let index = ArtifactIndex::build(&graph);
        assert_eq!(
            index.artifacts_for_symbol("src/a.ts:Foo:class"),
            ["module-src", API_REFERENCE]
        );
        assert_eq!(index.artifacts_for_symbol("src/a.ts:bar:function"), ["module-src"]);
        assert_eq!(index.artifacts_for_file("gone/x.ts"), vec!["module-gone"]);
    }

    #[test]
    fn defaults_order_dependencies_first() {
        let graph = ArtifactGraph::with_defaults(["module-a", "module-b"]);
        let order = graph.topological_order(&ids(&[
            "overview",
            "module-a",
            "api-reference",
            "architecture",
        ]));
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("architecture") < pos("overview"));
        assert!(pos("api-reference") < pos("module-a"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn cycles_are_broken_silently() {
        let mut graph = ArtifactGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");
        let order = graph.topological_order(&ids(&["a", "b", "c"]));
        assert_eq!(order, ids(&["c", "b", "a"]));
    }

    #[test]
    fn levels_skip_absent_dependencies() {
        let graph = ArtifactGraph::with_defaults(["module-a"]);
        let levels = graph.levels(&ids(&["module-a", "api-reference", "overview"]));
        assert_eq!(levels["api-reference"], 0);
        assert_eq!(levels["module-a"], 1);
        assert_eq!(levels["overview"], 0);
    }
}

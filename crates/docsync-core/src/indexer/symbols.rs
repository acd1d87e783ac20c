//! Symbol dependency tracker.
//!
//! [`SymbolGraph`] is an immutable snapshot built from parsed files: the
//! symbol map plus forward and reverse dependency edges. [`SymbolTracker`]
//! owns the current snapshot behind an `Arc` and swaps in a freshly built one
//! on every [`SymbolTracker::build_from_files`]; readers keep querying the
//! previous snapshot until the swap completes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::indexer::dependencies::extract_dependency_names;
use crate::models::{
    content_hash, symbol_id, ChangeType, ImpactLevel, ParsedFile, ParsedSymbol, SymbolChange,
    SymbolSnapshot,
};
use crate::query::guards::MAX_GRAPH_VISITED;

/// Deleting a symbol with more dependents than this is a high impact change.
const HIGH_IMPACT_DEPENDENTS: usize = 5;

// ---------------------------------------------------------------------------
// Build statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    /// Dependency names that matched no known symbol.
    pub unresolved: usize,
    /// Files or symbols skipped as malformed.
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// A transitive dependent reached by reverse-edge traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedSymbol {
    pub id: String,
    /// Hops from the starting symbol (1 = direct dependent).
    pub depth: usize,
    /// The symbol whose dependent this one is.
    pub via: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SymbolGraph {
    symbols: IndexMap<String, SymbolSnapshot>,
    by_file: IndexMap<String, Vec<String>>,
    forward: HashMap<String, Vec<String>>,
    reverse: HashMap<String, Vec<String>>,
    stats: BuildStats,
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Replace whole-identifier occurrences of `name` in `text` with a NUL.
/// Identifiers that merely contain `name` are left alone.
fn blank_identifier(text: &str, name: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut token = String::new();
    let flush = |token: &mut String, out: &mut String| {
        if token.as_str() == name {
            out.push('\u{0}');
        } else {
            out.push_str(token.as_str());
        }
        token.clear();
    };
    for c in text.chars() {
        if is_identifier_char(c) {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);
    out
}

fn hash_payload(symbol: &ParsedSymbol, include_name: bool) -> String {
    let signature = symbol.signature.as_ref().map(|s| {
        if include_name {
            s.clone()
        } else {
            blank_identifier(s, &symbol.name)
        }
    });
    let name = if include_name { symbol.name.as_str() } else { "" };
    let payload = serde_json::json!({
        "name": name,
        "kind": symbol.kind.as_str(),
        "signature": signature,
        "description": symbol.description,
        "modifiers": symbol.modifiers,
        "parameters": symbol.parameters,
        "return_type": symbol.return_type,
        "members": symbol.members,
    });
    content_hash(&payload.to_string())
}

/// Shape hash for rename matching, or `None` when the symbol carries too
/// little structure to tell it apart from any other.
fn shape_hash(symbol: &ParsedSymbol) -> Option<String> {
    let has_signature = symbol
        .signature
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    if !has_signature && symbol.parameters.is_empty() && symbol.members.is_empty() {
        return None;
    }
    Some(hash_payload(symbol, false))
}

fn snapshot_of(file_path: &str, symbol: &ParsedSymbol) -> SymbolSnapshot {
    SymbolSnapshot {
        file_path: file_path.to_string(),
        name: symbol.name.clone(),
        kind: symbol.kind,
        hash: hash_payload(symbol, true),
        shape_hash: shape_hash(symbol),
        start_line: symbol.location.start_line,
        end_line: symbol.location.end_line,
        dependencies: extract_dependency_names(symbol),
        exported: symbol.is_exported(),
        imported: symbol.is_imported(),
    }
}

impl SymbolGraph {
    /// Build a snapshot. Malformed files and symbols are skipped and recorded
    /// in the returned stats; unresolvable dependency names are dropped.
    pub fn build(files: &[ParsedFile]) -> Self {
        let mut graph = SymbolGraph::default();

        for file in files {
            let path = file.path.trim();
            if path.is_empty() {
                graph.skip("parsed file with empty path".to_string());
                continue;
            }
            if graph.by_file.contains_key(path) {
                graph.skip(format!("duplicate parsed file {path}"));
                continue;
            }
            let mut ids = Vec::with_capacity(file.symbols.len());
            for symbol in &file.symbols {
                if symbol.name.trim().is_empty() {
                    graph.skip(format!("symbol with empty name in {path}"));
                    continue;
                }
                let snapshot = snapshot_of(path, symbol);
                let id = snapshot.id();
                if graph.symbols.contains_key(&id) {
                    graph.skip(format!("duplicate symbol {id}"));
                    continue;
                }
                ids.push(id.clone());
                graph.symbols.insert(id, snapshot);
            }
            graph.by_file.insert(path.to_string(), ids);
        }

        graph.resolve_edges();
        graph.stats.files = graph.by_file.len();
        graph.stats.symbols = graph.symbols.len();
        tracing::debug!(
            files = graph.stats.files,
            symbols = graph.stats.symbols,
            edges = graph.stats.edges,
            unresolved = graph.stats.unresolved,
            skipped = graph.stats.skipped,
            "symbol graph built"
        );
        graph
    }

    fn skip(&mut self, warning: String) {
        tracing::warn!(%warning, "skipping malformed parsed input");
        self.stats.skipped += 1;
        self.stats.warnings.push(warning);
    }

    fn resolve_edges(&mut self) {
        let mut by_name: HashMap<&str, Vec<&SymbolSnapshot>> = HashMap::new();
        for snapshot in self.symbols.values() {
            by_name.entry(snapshot.name.as_str()).or_default().push(snapshot);
        }

        let mut forward: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
        let mut edges = 0usize;
        let mut unresolved = 0usize;

        for (id, snapshot) in &self.symbols {
            let mut targets: Vec<String> = Vec::new();
            for name in &snapshot.dependencies {
                let candidates = by_name.get(name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                let target = candidates
                    .iter()
                    .find(|c| c.file_path == snapshot.file_path)
                    .or_else(|| candidates.iter().find(|c| c.exported));
                match target {
                    Some(t) => {
                        let target_id = t.id();
                        if &target_id != id && !targets.contains(&target_id) {
                            targets.push(target_id);
                        }
                    }
                    None => {
                        unresolved += 1;
                        tracing::trace!(symbol = %id, dependency = %name, "unresolved dependency");
                    }
                }
            }
            for target in &targets {
                reverse.entry(target.clone()).or_default().push(id.clone());
            }
            edges += targets.len();
            if !targets.is_empty() {
                forward.insert(id.clone(), targets);
            }
        }

        self.forward = forward;
        self.reverse = reverse;
        self.stats.edges = edges;
        self.stats.unresolved = unresolved;
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn get(&self, id: &str) -> Option<&SymbolSnapshot> {
        self.symbols.get(id)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolSnapshot> {
        self.symbols.values()
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.by_file.keys().map(String::as_str)
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.by_file.contains_key(path)
    }

    /// Symbols declared in `path`, in declaration order.
    pub fn symbols_in_file(&self, path: &str) -> Vec<&SymbolSnapshot> {
        self.by_file
            .get(path)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.reverse.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transitive dependents of `id` within `depth` hops, breadth first.
    /// The start symbol itself is never included.
    pub fn affected_symbols(&self, id: &str, depth: usize) -> Vec<AffectedSymbol> {
        let mut out = Vec::new();
        if depth == 0 {
            return out;
        }
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        queue.push_back((id, 0));

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for dependent in self.dependents_of(current) {
                if visited.len() >= MAX_GRAPH_VISITED {
                    return out;
                }
                if !visited.insert(dependent.as_str()) {
                    continue;
                }
                out.push(AffectedSymbol {
                    id: dependent.clone(),
                    depth: hops + 1,
                    via: current.to_string(),
                });
                queue.push_back((dependent.as_str(), hops + 1));
            }
        }
        out
    }

    fn impact_for_deletion(&self, id: &str) -> (ImpactLevel, usize) {
        let dependents = self.dependents_of(id).len();
        let level = if dependents > HIGH_IMPACT_DEPENDENTS {
            ImpactLevel::High
        } else if dependents > 0 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        };
        (level, dependents)
    }

    /// Impact level of an added, modified or renamed symbol.
    pub fn impact_for_presence(snapshot: &SymbolSnapshot) -> ImpactLevel {
        if snapshot.exported {
            ImpactLevel::High
        } else if snapshot.kind.is_type_like() {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }

    /// Symbol-level differences from `previous` to `self`, sorted by impact
    /// (highest first) and then by change type.
    pub fn detect_changes(&self, previous: &SymbolGraph) -> Vec<SymbolChange> {
        let mut deleted: Vec<&SymbolSnapshot> = previous
            .symbols
            .iter()
            .filter(|(id, _)| !self.symbols.contains_key(*id))
            .map(|(_, s)| s)
            .collect();
        let added: Vec<&SymbolSnapshot> = self
            .symbols
            .iter()
            .filter(|(id, _)| !previous.symbols.contains_key(*id))
            .map(|(_, s)| s)
            .collect();

        let mut changes = Vec::new();

        for snapshot in added {
            let rename_of = snapshot.shape_hash.as_ref().and_then(|shape| {
                deleted.iter().position(|old| {
                    old.file_path == snapshot.file_path
                        && old.kind == snapshot.kind
                        && old.shape_hash.as_ref() == Some(shape)
                })
            });
            let id = snapshot.id();
            let (change_type, previous_name, dependents) = match rename_of {
                Some(index) => {
                    let old = deleted.remove(index);
                    (
                        ChangeType::Renamed,
                        Some(old.name.clone()),
                        previous.dependents_of(&old.id()).len(),
                    )
                }
                None => (ChangeType::Added, None, self.dependents_of(&id).len()),
            };
            changes.push(SymbolChange {
                symbol_id: id,
                file_path: snapshot.file_path.clone(),
                name: snapshot.name.clone(),
                kind: snapshot.kind,
                change_type,
                impact_level: Self::impact_for_presence(snapshot),
                dependents,
                previous_name,
            });
        }

        for (id, snapshot) in &self.symbols {
            let Some(old) = previous.symbols.get(id) else {
                continue;
            };
            if old.hash == snapshot.hash {
                continue;
            }
            changes.push(SymbolChange {
                symbol_id: id.clone(),
                file_path: snapshot.file_path.clone(),
                name: snapshot.name.clone(),
                kind: snapshot.kind,
                change_type: ChangeType::Modified,
                impact_level: Self::impact_for_presence(snapshot),
                dependents: self.dependents_of(id).len(),
                previous_name: None,
            });
        }

        for old in deleted {
            let id = old.id();
            let (impact_level, dependents) = previous.impact_for_deletion(&id);
            changes.push(SymbolChange {
                symbol_id: id,
                file_path: old.file_path.clone(),
                name: old.name.clone(),
                kind: old.kind,
                change_type: ChangeType::Deleted,
                impact_level,
                dependents,
                previous_name: None,
            });
        }

        changes.sort_by(|a, b| {
            b.impact_level
                .cmp(&a.impact_level)
                .then(a.change_type.sort_rank().cmp(&b.change_type.sort_rank()))
                .then_with(|| a.symbol_id.cmp(&b.symbol_id))
        });
        changes
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Owner of the current [`SymbolGraph`]. Builds are exclusive; queries run
/// against whichever snapshot was current when they started.
#[derive(Debug, Default)]
pub struct SymbolTracker {
    current: RwLock<Arc<SymbolGraph>>,
    build_lock: Mutex<()>,
}

impl SymbolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: &[ParsedFile]) -> Self {
        let tracker = Self::new();
        tracker.build_from_files(files);
        tracker
    }

    /// Replace the symbol map with one built from `files`.
    pub fn build_from_files(&self, files: &[ParsedFile]) -> BuildStats {
        let _guard = self.build_lock.lock();
        let graph = SymbolGraph::build(files);
        let stats = graph.stats.clone();
        *self.current.write() = Arc::new(graph);
        stats
    }

    /// The current snapshot. Holding it does not block later builds.
    pub fn snapshot(&self) -> Arc<SymbolGraph> {
        Arc::clone(&self.current.read())
    }

    pub fn detect_changes(&self, previous: &SymbolGraph) -> Vec<SymbolChange> {
        self.snapshot().detect_changes(previous)
    }

    /// Ids of symbols depending on `id`, transitively, within `depth` hops.
    pub fn get_affected_symbols(&self, id: &str, depth: usize) -> Vec<String> {
        self.snapshot()
            .affected_symbols(id, depth)
            .into_iter()
            .map(|a| a.id)
            .collect()
    }

    pub fn symbol_id_for(file_path: &str, symbol: &ParsedSymbol) -> String {
        symbol_id(file_path, &symbol.name, symbol.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedParameter, SymbolKind};

    fn exported(name: &str, kind: SymbolKind) -> ParsedSymbol {
        let mut symbol = ParsedSymbol::new(name, kind);
        symbol.modifiers.push("export".into());
        symbol
    }

    fn uses(name: &str, kind: SymbolKind, dependency: &str) -> ParsedSymbol {
        let mut symbol = ParsedSymbol::new(name, kind);
        symbol.parameters.push(ParsedParameter {
            name: "x".into(),
            type_name: Some(dependency.into()),
        });
        symbol
    }

    fn file(path: &str, symbols: Vec<ParsedSymbol>) -> ParsedFile {
        ParsedFile {
            path: path.into(),
            symbols,
        }
    }

    #[test]
    fn resolves_exported_symbols_across_files() {
        let tracker = SymbolTracker::from_files(&[
            file("a.ts", vec![exported("Foo", SymbolKind::Class)]),
            file("b.ts", vec![uses("useFoo", SymbolKind::Function, "Foo")]),
        ]);
        let graph = tracker.snapshot();
        assert_eq!(graph.dependencies_of("b.ts:useFoo:function"), ["a.ts:Foo:class"]);
        assert_eq!(graph.dependents_of("a.ts:Foo:class"), ["b.ts:useFoo:function"]);
    }

    #[test]
    fn prefers_same_file_over_exported_match() {
        let graph = SymbolGraph::build(&[
            file("a.ts", vec![exported("Item", SymbolKind::Class)]),
            file(
                "b.ts",
                vec![
                    ParsedSymbol::new("Item", SymbolKind::Class),
                    uses("make", SymbolKind::Function, "Item"),
                ],
            ),
        ]);
        assert_eq!(graph.dependencies_of("b.ts:make:function"), ["b.ts:Item:class"]);
    }

    #[test]
    fn unexported_foreign_symbols_do_not_resolve() {
        let graph = SymbolGraph::build(&[
            file("a.ts", vec![ParsedSymbol::new("Hidden", SymbolKind::Class)]),
            file("b.ts", vec![uses("f", SymbolKind::Function, "Hidden")]),
        ]);
        assert!(graph.dependencies_of("b.ts:f:function").is_empty());
        assert_eq!(graph.stats().unresolved, 1);
    }

    #[test]
    fn malformed_input_is_skipped() {
        let graph = SymbolGraph::build(&[
            file("", vec![exported("Lost", SymbolKind::Class)]),
            file("a.ts", vec![ParsedSymbol::new("  ", SymbolKind::Function)]),
            file("a.ts", vec![]),
            file("c.ts", vec![exported("Kept", SymbolKind::Class)]),
        ]);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.stats().skipped, 3);
        assert_eq!(graph.stats().warnings.len(), 3);
    }

    #[test]
    fn affected_symbols_are_depth_bounded() {
        let graph = SymbolGraph::build(&[
            file("a.ts", vec![exported("A", SymbolKind::Class)]),
            file("b.ts", vec![{
                let mut s = uses("B", SymbolKind::Class, "A");
                s.modifiers.push("export".into());
                s
            }]),
            file("c.ts", vec![{
                let mut s = uses("C", SymbolKind::Class, "B");
                s.modifiers.push("export".into());
                s
            }]),
        ]);
        let one = graph.affected_symbols("a.ts:A:class", 1);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, "b.ts:B:class");
        let two = graph.affected_symbols("a.ts:A:class", 2);
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].depth, 2);
        assert_eq!(two[1].via, "b.ts:B:class");
        assert!(graph.affected_symbols("a.ts:A:class", 0).is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let graph = SymbolGraph::build(&[file(
            "a.ts",
            vec![
                uses("A", SymbolKind::Class, "B"),
                uses("B", SymbolKind::Class, "A"),
            ],
        )]);
        let affected = graph.affected_symbols("a.ts:A:class", 6);
        assert_eq!(affected.len(), 1);
    }

    #[test]
    fn detect_changes_classifies_and_sorts() {
        let before = SymbolGraph::build(&[
            file(
                "a.ts",
                vec![
                    exported("Foo", SymbolKind::Class),
                    ParsedSymbol::new("helper", SymbolKind::Function),
                    ParsedSymbol::new("gone", SymbolKind::Function),
                ],
            ),
            file("b.ts", vec![uses("useFoo", SymbolKind::Function, "Foo")]),
        ]);
        let mut foo = exported("Foo", SymbolKind::Class);
        foo.description = Some("now documented".into());
        let after = SymbolGraph::build(&[
            file(
                "a.ts",
                vec![
                    foo,
                    ParsedSymbol::new("helper", SymbolKind::Function),
                    ParsedSymbol::new("Shape", SymbolKind::Interface),
                ],
            ),
            file("b.ts", vec![uses("useFoo", SymbolKind::Function, "Foo")]),
        ]);

        let changes = after.detect_changes(&before);
        let summary: Vec<(&str, ChangeType, ImpactLevel)> = changes
            .iter()
            .map(|c| (c.symbol_id.as_str(), c.change_type, c.impact_level))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.ts:Foo:class", ChangeType::Modified, ImpactLevel::High),
                ("a.ts:Shape:interface", ChangeType::Added, ImpactLevel::Medium),
                ("a.ts:gone:function", ChangeType::Deleted, ImpactLevel::Low),
            ]
        );
    }

    #[test]
    fn deletion_impact_scales_with_dependents() {
        let mut files = vec![file("core.ts", vec![exported("Core", SymbolKind::Class)])];
        for i in 0..6 {
            files.push(file(
                &format!("user{i}.ts"),
                vec![uses(&format!("u{i}"), SymbolKind::Function, "Core")],
            ));
        }
        let before = SymbolGraph::build(&files);
        files[0].symbols.clear();
        let after = SymbolGraph::build(&files);
        let changes = after.detect_changes(&before);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Deleted);
        assert_eq!(changes[0].impact_level, ImpactLevel::High);
        assert_eq!(changes[0].dependents, 6);
    }

    #[test]
    fn same_shape_in_same_file_is_a_rename() {
        let mut old = ParsedSymbol::new("oldName", SymbolKind::Function);
        old.signature = Some("function oldName(x: Config)".into());
        let mut new = ParsedSymbol::new("newName", SymbolKind::Function);
        new.signature = Some("function newName(x: Config)".into());
        let before = SymbolGraph::build(&[file("a.ts", vec![old])]);
        let after = SymbolGraph::build(&[file("a.ts", vec![new])]);
        let changes = after.detect_changes(&before);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Renamed);
        assert_eq!(changes[0].previous_name.as_deref(), Some("oldName"));
    }

    #[test]
    fn bare_symbols_are_never_paired_as_renames() {
        let before = SymbolGraph::build(&[file(
            "a.ts",
            vec![ParsedSymbol::new("alpha", SymbolKind::Function)],
        )]);
        let after = SymbolGraph::build(&[file(
            "a.ts",
            vec![ParsedSymbol::new("omega", SymbolKind::Function)],
        )]);
        let changes = after.detect_changes(&before);
        let summary: Vec<(&str, ChangeType)> = changes
            .iter()
            .map(|c| (c.symbol_id.as_str(), c.change_type))
            .collect();
        assert_eq!(summary.len(), 2);
        assert!(summary.contains(&("a.ts:omega:function", ChangeType::Added)));
        assert!(summary.contains(&("a.ts:alpha:function", ChangeType::Deleted)));
    }

    #[test]
    fn renamed_symbol_blanks_whole_identifiers_only() {
        let mut old = ParsedSymbol::new("get", SymbolKind::Function);
        old.signature = Some("function get(getter: Getter)".into());
        let mut new = ParsedSymbol::new("fetch", SymbolKind::Function);
        new.signature = Some("function fetch(getter: Getter)".into());
        let mut unrelated = ParsedSymbol::new("fetch", SymbolKind::Function);
        unrelated.signature = Some("function fetch(ter: Getter)".into());

        assert_eq!(blank_identifier("get(getter) get", "get"), "\u{0}(getter) \u{0}");
        assert_eq!(shape_hash(&old), shape_hash(&new));
        assert_ne!(shape_hash(&old), shape_hash(&unrelated));
    }

    #[test]
    fn readers_keep_old_snapshot_across_rebuild() {
        let tracker = SymbolTracker::from_files(&[file("a.ts", vec![exported("A", SymbolKind::Class)])]);
        let held = tracker.snapshot();
        tracker.build_from_files(&[]);
        assert_eq!(held.len(), 1);
        assert!(tracker.snapshot().is_empty());
    }
}

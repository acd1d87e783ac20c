//! Heuristic dependency-name extraction from symbol type text.
//!
//! Names are scraped from parameter, return and member type annotations plus
//! `extends` / `implements` clauses in the signature. Built-in and primitive
//! type names are dropped; the tracker resolves whatever survives.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::ParsedSymbol;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once via LazyLock)
// ---------------------------------------------------------------------------

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap());

static HERITAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:extends|implements)\b([^{]*)").unwrap());

const BUILTIN_TYPES: &[&str] = &[
    // TypeScript / JavaScript
    "string", "number", "boolean", "any", "unknown", "never", "void", "object", "null",
    "undefined", "symbol", "bigint", "this", "Array", "ReadonlyArray", "Promise", "Map",
    "Set", "WeakMap", "WeakSet", "Record", "Partial", "Required", "Readonly", "Pick", "Omit",
    "Date", "Error", "Function", "Object", "String", "Number", "Boolean", "RegExp", "keyof",
    "typeof", "extends", "implements",
    // Python / Java / Go / Rust primitives and containers
    "int", "float", "bool", "str", "bytes", "list", "dict", "tuple", "None", "Optional",
    "List", "Dict", "Tuple", "Any", "Union", "Callable", "char", "long", "short", "double",
    "byte", "Integer", "Long", "Double", "Float", "Character", "Byte", "Short", "error",
    "interface", "func", "chan", "map", "rune", "uint", "int32", "int64", "uint32", "uint64",
    "float32", "float64", "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "usize",
    "isize", "f32", "f64", "Vec", "Option", "Result", "Box", "Self",
];

static BUILTINS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| BUILTIN_TYPES.iter().copied().collect());

pub fn is_builtin_type(name: &str) -> bool {
    BUILTINS.contains(name)
}

/// Identifiers in a piece of type text that are not built-ins.
pub fn type_names(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for m in IDENT_RE.find_iter(text) {
        let name = m.as_str();
        if is_builtin_type(name) || !seen.insert(name) {
            continue;
        }
        names.push(name.to_string());
    }
    names
}

/// Every dependency name a symbol declares, de-duplicated in first-seen
/// order and never including the symbol's own name.
pub fn extract_dependency_names(symbol: &ParsedSymbol) -> Vec<String> {
    let mut texts: Vec<&str> = Vec::new();
    for param in &symbol.parameters {
        if let Some(t) = &param.type_name {
            texts.push(t);
        }
    }
    if let Some(t) = &symbol.return_type {
        texts.push(t);
    }
    for member in &symbol.members {
        if let Some(t) = &member.type_name {
            texts.push(t);
        }
        for param in &member.parameters {
            if let Some(t) = &param.type_name {
                texts.push(t);
            }
        }
        if let Some(t) = &member.return_type {
            texts.push(t);
        }
    }

    let mut clause_names: Vec<String> = Vec::new();
    if let Some(signature) = &symbol.signature {
        for caps in HERITAGE_RE.captures_iter(signature) {
            if let Some(list) = caps.get(1) {
                clause_names.extend(type_names(list.as_str()));
            }
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(symbol.name.clone());
    let mut out = Vec::new();
    for name in clause_names
        .into_iter()
        .chain(texts.into_iter().flat_map(type_names))
    {
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedMember, ParsedParameter, SymbolKind};

    #[test]
    fn builtins_are_filtered() {
        assert_eq!(type_names("Promise<Array<User>>"), vec!["User"]);
        assert_eq!(type_names("string | number"), Vec::<String>::new());
        assert_eq!(type_names("Map<string, Order | Invoice>"), vec!["Order", "Invoice"]);
    }

    #[test]
    fn collects_from_all_type_positions() {
        let mut symbol = ParsedSymbol::new("Service", SymbolKind::Class);
        symbol.signature = Some("class Service extends Base implements Runnable, Closeable {".into());
        symbol.members.push(ParsedMember {
            name: "repo".into(),
            type_name: Some("Repository".into()),
            parameters: vec![],
            return_type: None,
        });
        symbol.members.push(ParsedMember {
            name: "find".into(),
            type_name: None,
            parameters: vec![ParsedParameter {
                name: "q".into(),
                type_name: Some("Query".into()),
            }],
            return_type: Some("Promise<User[]>".into()),
        });
        let names = extract_dependency_names(&symbol);
        assert_eq!(
            names,
            vec!["Base", "Runnable", "Closeable", "Repository", "Query", "User"]
        );
    }

    #[test]
    fn own_name_and_duplicates_are_dropped() {
        let mut symbol = ParsedSymbol::new("Node", SymbolKind::Class);
        symbol.parameters.push(ParsedParameter {
            name: "next".into(),
            type_name: Some("Node".into()),
        });
        symbol.return_type = Some("Edge | Edge".into());
        assert_eq!(extract_dependency_names(&symbol), vec!["Edge"]);
    }
}

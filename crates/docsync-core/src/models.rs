//! Shared typed models used across tracking, analysis, scheduling, and storage.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Hashing / clock helpers
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of the given text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Milliseconds since the Unix epoch (0 if the clock is before the epoch).
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// 1. Impact levels and change types
// ---------------------------------------------------------------------------

/// Severity of an impact node. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    /// One hop of decay: `high → medium → low → low`.
    pub fn decay(self) -> Self {
        match self {
            ImpactLevel::High => ImpactLevel::Medium,
            ImpactLevel::Medium | ImpactLevel::Low => ImpactLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
        }
    }
}

/// Kind of change reported for a file or a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Renamed => "renamed",
        }
    }

    /// Scheduling priority of a file operation (lower runs first).
    pub fn operation_priority(self) -> u32 {
        match self {
            ChangeType::Deleted => 1,
            ChangeType::Modified => 2,
            ChangeType::Renamed => 3,
            ChangeType::Added => 4,
        }
    }

    /// Tie-break rank when sorting changes of equal impact.
    pub fn sort_rank(self) -> u8 {
        match self {
            ChangeType::Deleted => 0,
            ChangeType::Modified => 1,
            ChangeType::Renamed => 2,
            ChangeType::Added => 3,
        }
    }
}

/// A single detected file change, as reported by the version-control side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub file_path: String,
    pub change_type: ChangeType,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub old_hash: Option<String>,
    #[serde(default)]
    pub new_hash: Option<String>,
    /// Previous path for renames.
    #[serde(default)]
    pub old_path: Option<String>,
}

impl ChangeInfo {
    pub fn new(file_path: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            file_path: file_path.into(),
            change_type,
            timestamp: 0,
            old_hash: None,
            new_hash: None,
            old_path: None,
        }
    }

    pub fn with_hashes(mut self, old_hash: Option<String>, new_hash: Option<String>) -> Self {
        self.old_hash = old_hash;
        self.new_hash = new_hash;
        self
    }
}

/// Per-type counts over a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBreakdown {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub renamed: usize,
}

impl ChangeBreakdown {
    pub fn from_changes(changes: &[ChangeInfo]) -> Self {
        let mut breakdown = Self::default();
        for change in changes {
            match change.change_type {
                ChangeType::Added => breakdown.added += 1,
                ChangeType::Modified => breakdown.modified += 1,
                ChangeType::Deleted => breakdown.deleted += 1,
                ChangeType::Renamed => breakdown.renamed += 1,
            }
        }
        breakdown
    }

    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted + self.renamed
    }

    pub fn delete_ratio(&self) -> f64 {
        ratio(self.deleted, self.total())
    }

    pub fn add_ratio(&self) -> f64 {
        ratio(self.added, self.total())
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

// ---------------------------------------------------------------------------
// 2. Parsed input records
// ---------------------------------------------------------------------------

/// Symbol kind as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Interface,
    Function,
    Method,
    Property,
    Variable,
    Type,
    Enum,
    Module,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Variable => "variable",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Module => "module",
            SymbolKind::Other => "other",
        }
    }

    pub fn is_type_like(&self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Interface)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedParameter {
    pub name: String,
    #[serde(default)]
    pub type_name: Option<String>,
}

/// A member (field or method) of a class-like symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMember {
    pub name: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParsedParameter>,
    #[serde(default)]
    pub return_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub parameters: Vec<ParsedParameter>,
    #[serde(default)]
    pub return_type: Option<String>,
    #[serde(default)]
    pub members: Vec<ParsedMember>,
}

impl ParsedSymbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: None,
            description: None,
            modifiers: Vec::new(),
            location: SourceLocation::default(),
            parameters: Vec::new(),
            return_type: None,
            members: Vec::new(),
        }
    }

    pub fn is_exported(&self) -> bool {
        self.modifiers
            .iter()
            .any(|m| matches!(m.as_str(), "export" | "exported" | "pub" | "public"))
    }

    pub fn is_imported(&self) -> bool {
        self.modifiers
            .iter()
            .any(|m| matches!(m.as_str(), "import" | "imported"))
    }
}

/// Parser output for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    #[serde(default)]
    pub symbols: Vec<ParsedSymbol>,
}

// ---------------------------------------------------------------------------
// 3. Symbol snapshots and symbol-level changes
// ---------------------------------------------------------------------------

/// Stable identity string of a symbol: `file:name:kind`.
pub fn symbol_id(file_path: &str, name: &str, kind: SymbolKind) -> String {
    format!("{file_path}:{name}:{}", kind.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub file_path: String,
    pub name: String,
    pub kind: SymbolKind,
    /// Hash over everything that describes the symbol, name included.
    pub hash: String,
    /// Hash over the same content with the name left out, used for rename
    /// detection. `None` when the symbol has no signature, parameters or
    /// members, since any two such symbols would look alike.
    pub shape_hash: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub dependencies: Vec<String>,
    pub exported: bool,
    pub imported: bool,
}

impl SymbolSnapshot {
    pub fn id(&self) -> String {
        symbol_id(&self.file_path, &self.name, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolChange {
    pub symbol_id: String,
    pub file_path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub change_type: ChangeType,
    pub impact_level: ImpactLevel,
    /// Number of dependents the symbol had when the change was detected.
    pub dependents: usize,
    #[serde(default)]
    pub previous_name: Option<String>,
}

// ---------------------------------------------------------------------------
// 4. Impact model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Symbol,
    Artifact,
    Module,
}

/// Coarse classification of the file an impact originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactCategory {
    Source,
    Test,
    Document,
    Config,
}

const DOCUMENT_EXTENSIONS: &[&str] = &[".md", ".mdx", ".rst", ".txt", ".adoc"];
const CONFIG_EXTENSIONS: &[&str] = &[".json", ".toml", ".yaml", ".yml", ".ini", ".cfg"];

impl ImpactCategory {
    pub fn from_path(path: &str) -> Self {
        let lowered = path.to_lowercase().replace('\\', "/");
        let file_name = lowered.rsplit('/').next().unwrap_or(&lowered);
        let in_test_dir = lowered
            .split('/')
            .any(|segment| matches!(segment, "test" | "tests" | "__tests__" | "spec"));
        if in_test_dir
            || file_name.contains(".test.")
            || file_name.contains(".spec.")
            || file_name.starts_with("test_")
            || file_name.ends_with("_test.rs")
            || file_name.ends_with("_test.go")
        {
            return ImpactCategory::Test;
        }
        if DOCUMENT_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
            || lowered.starts_with("docs/")
        {
            return ImpactCategory::Document;
        }
        if CONFIG_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext)) {
            return ImpactCategory::Config;
        }
        ImpactCategory::Source
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactNode {
    pub id: String,
    pub kind: NodeKind,
    pub impact_level: ImpactLevel,
    pub change_type: ChangeType,
    /// Id of the impact that produced this one (empty for direct impacts).
    pub affected_by: Vec<String>,
    /// Hops away from the originating change (0 for direct impacts).
    pub depth: usize,
    pub file_path: String,
    pub category: ImpactCategory,
    #[serde(default)]
    pub symbol_id: Option<String>,
}

/// Update priority of an artifact. Ordered `Critical < High < Normal < Low`
/// so that ascending sorts put the most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePriority {
    Critical,
    High,
    Normal,
    Low,
}

impl UpdatePriority {
    pub const TIERS: [UpdatePriority; 4] = [
        UpdatePriority::Critical,
        UpdatePriority::High,
        UpdatePriority::Normal,
        UpdatePriority::Low,
    ];

    /// Priority contributed by a single impact node.
    pub fn from_impact(level: ImpactLevel, direct: bool) -> Self {
        match level {
            ImpactLevel::High => UpdatePriority::Critical,
            ImpactLevel::Medium => UpdatePriority::High,
            ImpactLevel::Low if direct => UpdatePriority::Normal,
            ImpactLevel::Low => UpdatePriority::Low,
        }
    }

    /// Scheduling rank (`critical=1 … low=4`).
    pub fn rank(self) -> u32 {
        match self {
            UpdatePriority::Critical => 1,
            UpdatePriority::High => 2,
            UpdatePriority::Normal => 3,
            UpdatePriority::Low => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePriority::Critical => "critical",
            UpdatePriority::High => "high",
            UpdatePriority::Normal => "normal",
            UpdatePriority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedArtifact {
    pub artifact_id: String,
    pub priority: UpdatePriority,
    /// Count of distinct affected symbols mapped to this artifact.
    pub estimated_changes: usize,
    pub source_files: Vec<String>,
    /// Impact node ids that touched this artifact.
    pub contributing: Vec<String>,
}

// ---------------------------------------------------------------------------
// 5. Risk model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

impl RiskSeverity {
    pub fn score(self) -> f64 {
        match self {
            RiskSeverity::Low => 1.0,
            RiskSeverity::Medium => 2.0,
            RiskSeverity::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFactorType {
    BreakingChange,
    Maintenance,
    Dependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timeframe {
    Immediate,
    ShortTerm,
    LongTerm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor_type: RiskFactorType,
    pub description: String,
    pub severity: RiskSeverity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub mitigation: String,
}

impl RiskFactor {
    pub fn new(
        factor_type: RiskFactorType,
        severity: RiskSeverity,
        confidence: f64,
        description: impl Into<String>,
        mitigation: impl Into<String>,
    ) -> Self {
        Self {
            factor_type,
            description: description.into(),
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            mitigation: mitigation.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub risk_score: f64,
    pub timeframe: Timeframe,
    pub factors: Vec<RiskFactor>,
    pub mitigations: Vec<String>,
}

// ---------------------------------------------------------------------------
// 6. Scheduling model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    SyncFile,
    RemoveFile,
    UpdateArtifact,
    UpdateIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOperation {
    pub id: String,
    pub kind: OperationKind,
    pub target: String,
    /// Lower runs first.
    pub priority: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub estimated_ms: u64,
    /// Ids of operations that must complete before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub id: String,
    pub operations: Vec<UpdateOperation>,
    /// Ids of batches that must complete before this one starts.
    pub dependencies: Vec<String>,
    pub estimated_time_ms: u64,
    /// Dependency level the batch belongs to (0 = no prerequisites).
    pub level: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batches: Vec<UpdateBatch>,
    /// Longest batch dependency chain: the minimum number of sequential waves.
    pub parallel_groups: usize,
    pub total_operations: usize,
    pub estimated_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStrategy {
    Incremental,
    Selective,
    Full,
}

impl UpdateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::Incremental => "incremental",
            UpdateStrategy::Selective => "selective",
            UpdateStrategy::Full => "full",
        }
    }
}

// ---------------------------------------------------------------------------
// 7. Diff / merge model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineType {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
    /// 1-based line number in the old text (absent for additions).
    pub old_line: Option<usize>,
    /// 1-based line number in the new text (absent for removals).
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// 1-based position in the old text where the hunk starts.
    pub old_start: usize,
    pub old_lines: usize,
    /// 1-based position in the new text where the hunk starts.
    pub new_start: usize,
    pub new_lines: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    /// 1-based line of the opening marker in the merged output.
    pub start_line: usize,
    /// 1-based line of the closing marker in the merged output.
    pub end_line: usize,
    pub ours: String,
    pub theirs: String,
    pub base: Option<String>,
    /// Half-open range of base lines (0-based) the conflict covers.
    pub base_start: usize,
    pub base_end: usize,
}

// ---------------------------------------------------------------------------
// 8. Artifacts and controller history
// ---------------------------------------------------------------------------

/// A generated document of the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Content as last generated; differs from `content` after hand edits.
    #[serde(default)]
    pub base_content: Option<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub updated_at: i64,
}

impl Artifact {
    pub fn generated(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let content = content.into();
        Self {
            title: id.clone(),
            id,
            base_content: Some(content.clone()),
            content,
            source_files: Vec::new(),
            updated_at: now_millis(),
        }
    }

    /// True when the stored content no longer matches what was last generated.
    pub fn has_local_edits(&self) -> bool {
        match &self.base_content {
            Some(base) => base != &self.content,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecord {
    pub project_size: usize,
    pub change_percentage: f64,
    pub used_incremental: bool,
    pub success: bool,
    pub update_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_decay_never_increases() {
        assert_eq!(ImpactLevel::High.decay(), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::Medium.decay(), ImpactLevel::Low);
        assert_eq!(ImpactLevel::Low.decay(), ImpactLevel::Low);
        for level in [ImpactLevel::Low, ImpactLevel::Medium, ImpactLevel::High] {
            assert!(level.decay() <= level);
        }
    }

    #[test]
    fn operation_priorities_follow_change_type() {
        assert_eq!(ChangeType::Deleted.operation_priority(), 1);
        assert_eq!(ChangeType::Modified.operation_priority(), 2);
        assert_eq!(ChangeType::Renamed.operation_priority(), 3);
        assert_eq!(ChangeType::Added.operation_priority(), 4);
    }

    #[test]
    fn symbol_id_format() {
        assert_eq!(symbol_id("a.ts", "Foo", SymbolKind::Class), "a.ts:Foo:class");
    }

    #[test]
    fn category_from_path() {
        assert_eq!(ImpactCategory::from_path("src/app.ts"), ImpactCategory::Source);
        assert_eq!(ImpactCategory::from_path("src/app.test.ts"), ImpactCategory::Test);
        assert_eq!(ImpactCategory::from_path("tests/util.rs"), ImpactCategory::Test);
        assert_eq!(ImpactCategory::from_path("README.md"), ImpactCategory::Document);
        assert_eq!(ImpactCategory::from_path("docs/guide/intro"), ImpactCategory::Document);
        assert_eq!(ImpactCategory::from_path("package.json"), ImpactCategory::Config);
    }

    #[test]
    fn priority_from_impact() {
        assert_eq!(
            UpdatePriority::from_impact(ImpactLevel::High, false),
            UpdatePriority::Critical
        );
        assert_eq!(
            UpdatePriority::from_impact(ImpactLevel::Low, true),
            UpdatePriority::Normal
        );
        assert_eq!(
            UpdatePriority::from_impact(ImpactLevel::Low, false),
            UpdatePriority::Low
        );
        assert!(UpdatePriority::Critical < UpdatePriority::Low);
    }

    #[test]
    fn breakdown_ratios() {
        let changes = vec![
            ChangeInfo::new("a", ChangeType::Added),
            ChangeInfo::new("b", ChangeType::Deleted),
            ChangeInfo::new("c", ChangeType::Modified),
            ChangeInfo::new("d", ChangeType::Modified),
        ];
        let breakdown = ChangeBreakdown::from_changes(&changes);
        assert_eq!(breakdown.total(), 4);
        assert!((breakdown.delete_ratio() - 0.25).abs() < 1e-9);
        assert!((breakdown.add_ratio() - 0.25).abs() < 1e-9);
        assert_eq!(ChangeBreakdown::default().delete_ratio(), 0.0);
    }

    #[test]
    fn local_edit_detection() {
        let mut artifact = Artifact::generated("overview", "hello\n");
        assert!(!artifact.has_local_edits());
        artifact.content.push_str("hand edit\n");
        assert!(artifact.has_local_edits());
    }

    #[test]
    fn change_info_deserialises_with_defaults() {
        let info: ChangeInfo =
            serde_json::from_str(r#"{"file_path":"a.ts","change_type":"modified"}"#).unwrap();
        assert_eq!(info.change_type, ChangeType::Modified);
        assert!(info.old_hash.is_none());
        assert_eq!(info.timestamp, 0);
    }
}

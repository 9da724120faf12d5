use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

const SHORT_ID_LENGTH: usize = 8;
const SUMMARY_DISPLAY_LENGTH: usize = 72;

/// Stable handle of a repository inside its family: the path relative to the
/// family root, `.` for the root itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(".".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }

    /// Nesting depth below the family root
    pub fn depth(&self) -> usize {
        Path::new(&self.0)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A repository taking part in the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub root: PathBuf,
}

impl Resource {
    pub fn new(id: ResourceId, root: PathBuf) -> Self {
        Self { id, root }
    }

    /// Build a resource whose id is `root` relative to `family_root`
    pub fn in_family(family_root: &Path, root: &Path) -> Self {
        let id = match root.strip_prefix(family_root) {
            Ok(relative) if relative.as_os_str().is_empty() => ResourceId::root(),
            Ok(relative) => ResourceId::new(relative.to_string_lossy().replace('\\', "/")),
            Err(_) => ResourceId::new(root.to_string_lossy()),
        };
        Self::new(id, root.to_path_buf())
    }
}

/// How a resource that git already stopped in is resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    Continue,
    Skip,
}

impl fmt::Display for ResumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeMode::Continue => write!(f, "continue"),
            ResumeMode::Skip => write!(f, "skip"),
        }
    }
}

/// The requested operation, shared by every resource of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub upstream: String,
    pub new_base: Option<String>,
    pub branch: Option<String>,
    /// Explicit override for the resource git stopped in. Only valid for one run.
    #[serde(skip)]
    pub resume_mode: Option<ResumeMode>,
}

impl OperationSpec {
    pub fn new<S: Into<String>>(upstream: S) -> Self {
        Self {
            upstream: upstream.into(),
            new_base: None,
            branch: None,
            resume_mode: None,
        }
    }

    pub fn with_new_base(mut self, new_base: Option<String>) -> Self {
        self.new_base = new_base;
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_resume_mode(mut self, mode: Option<ResumeMode>) -> Self {
        self.resume_mode = mode;
        self
    }

    /// The reference the branch ends up on top of
    pub fn base_reference(&self) -> &str {
        self.new_base.as_deref().unwrap_or(&self.upstream)
    }
}

/// The resource git stopped in, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumePoint {
    #[default]
    None,
    At {
        resource: ResourceId,
        mode: ResumeMode,
    },
}

impl ResumePoint {
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            ResumePoint::None => None,
            ResumePoint::At { resource, .. } => Some(resource),
        }
    }
}

/// Flavor of a successful rebase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessType {
    Rebased,
    UpToDate,
    FastForwarded,
}

impl SuccessType {
    pub fn parse_from_output(output: &str) -> Self {
        if output.contains("Fast-forwarded") {
            SuccessType::FastForwarded
        } else if output.contains("is up to date") {
            SuccessType::UpToDate
        } else {
            SuccessType::Rebased
        }
    }

    pub fn format_message(&self, branch: Option<&str>, base: &str) -> String {
        match (self, branch) {
            (SuccessType::Rebased, Some(branch)) => format!("Rebased {branch} on {base}"),
            (SuccessType::Rebased, None) => format!("Rebased on {base}"),
            (SuccessType::UpToDate, Some(branch)) => format!("{branch} is up-to-date with {base}"),
            (SuccessType::UpToDate, None) => format!("Current branch is up-to-date with {base}"),
            (SuccessType::FastForwarded, Some(branch)) => {
                format!("Fast-forwarded {branch} to {base}")
            }
            (SuccessType::FastForwarded, None) => format!("Fast-forwarded to {base}"),
        }
    }
}

/// A commit dropped because applying it produced no change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub id: String,
    pub short_id: String,
    pub summary: String,
}

impl SkippedItem {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        let id: String = id.into();
        let short_id = id.chars().take(SHORT_ID_LENGTH).collect();
        Self {
            id,
            short_id,
            summary: summary.into(),
        }
    }

    /// Summary cut to a single display line
    pub fn display_summary(&self) -> String {
        if self.summary.chars().count() <= SUMMARY_DISPLAY_LENGTH {
            return self.summary.clone();
        }
        let mut shortened: String = self
            .summary
            .chars()
            .take(SUMMARY_DISPLAY_LENGTH - 3)
            .collect();
        shortened.push_str("...");
        shortened
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    NotStarted,
    Success,
    Suspended,
    Error,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeKind::NotStarted => "not started",
            OutcomeKind::Success => "success",
            OutcomeKind::Suspended => "suspended",
            OutcomeKind::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Result of rebasing one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResourceOutcome {
    NotStarted,
    Success {
        success_type: SuccessType,
        skipped: Vec<SkippedItem>,
    },
    Suspended {
        skipped: Vec<SkippedItem>,
    },
    Error {
        skipped: Vec<SkippedItem>,
    },
}

impl ResourceOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ResourceOutcome::NotStarted => OutcomeKind::NotStarted,
            ResourceOutcome::Success { .. } => OutcomeKind::Success,
            ResourceOutcome::Suspended { .. } => OutcomeKind::Suspended,
            ResourceOutcome::Error { .. } => OutcomeKind::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResourceOutcome::Success { .. })
    }

    pub fn skipped(&self) -> &[SkippedItem] {
        match self {
            ResourceOutcome::NotStarted => &[],
            ResourceOutcome::Success { skipped, .. }
            | ResourceOutcome::Suspended { skipped }
            | ResourceOutcome::Error { skipped } => skipped,
        }
    }

    pub fn success_type(&self) -> Option<SuccessType> {
        match self {
            ResourceOutcome::Success { success_type, .. } => Some(*success_type),
            _ => None,
        }
    }

    /// Everything except an up-to-date success may have rewritten the work tree
    pub fn should_be_refreshed(&self) -> bool {
        self.success_type() != Some(SuccessType::UpToDate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub resource: ResourceId,
    pub outcome: ResourceOutcome,
}

/// Per-resource outcomes in the order they were first recorded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeMap(Vec<OutcomeEntry>);

impl OutcomeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome, replacing an earlier one in place
    pub fn insert(&mut self, resource: ResourceId, outcome: ResourceOutcome) {
        match self.0.iter_mut().find(|entry| entry.resource == resource) {
            Some(entry) => entry.outcome = outcome,
            None => self.0.push(OutcomeEntry { resource, outcome }),
        }
    }

    pub fn get(&self, resource: &ResourceId) -> Option<&ResourceOutcome> {
        self.0
            .iter()
            .find(|entry| &entry.resource == resource)
            .map(|entry| &entry.outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &ResourceOutcome)> {
        self.0.iter().map(|entry| (&entry.resource, &entry.outcome))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn successful(&self) -> impl Iterator<Item = (&ResourceId, SuccessType)> {
        self.iter()
            .filter_map(|(id, outcome)| outcome.success_type().map(|t| (id, t)))
    }

    /// All skipped commits, grouped by resource in recording order
    pub fn skipped_items(&self) -> Vec<(ResourceId, SkippedItem)> {
        self.iter()
            .flat_map(|(id, outcome)| {
                outcome
                    .skipped()
                    .iter()
                    .map(move |item| (id.clone(), item.clone()))
            })
            .collect()
    }
}

/// Which roots had their local changes stashed, and under which message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedChanges {
    pub message: String,
    pub roots: Vec<PathBuf>,
}

/// Resumable state of a rebase across a repository family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub family_root: PathBuf,
    pub spec: OperationSpec,
    pub resources: Vec<Resource>,
    pub outcomes: OutcomeMap,
    #[serde(default)]
    pub resume_point: ResumePoint,
    #[serde(default)]
    pub initial_branches: BTreeMap<ResourceId, String>,
    #[serde(default)]
    pub initial_heads: BTreeMap<ResourceId, String>,
    #[serde(default)]
    pub saved_changes: Option<SavedChanges>,
}

impl OrchestrationState {
    pub fn new(family_root: PathBuf, resources: Vec<Resource>, spec: OperationSpec) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            family_root,
            spec,
            resources,
            outcomes: OutcomeMap::new(),
            resume_point: ResumePoint::None,
            initial_branches: BTreeMap::new(),
            initial_heads: BTreeMap::new(),
            saved_changes: None,
        }
    }

    pub fn ongoing_resource(&self) -> Option<&ResourceId> {
        self.resume_point.resource()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|resource| &resource.id == id)
    }

    /// Resources not yet rebased successfully, in declaration order
    pub fn incomplete_resources(&self) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|resource| {
                !self
                    .outcomes
                    .get(&resource.id)
                    .is_some_and(ResourceOutcome::is_success)
            })
            .collect()
    }

    /// Copy of this state with `outcomes`, pointing the resume point at the
    /// first suspended resource
    pub fn clone_with_new_outcomes(&self, outcomes: OutcomeMap) -> Self {
        let resume_point = outcomes
            .iter()
            .find(|(_, outcome)| outcome.kind() == OutcomeKind::Suspended)
            .map(|(id, _)| ResumePoint::At {
                resource: id.clone(),
                mode: ResumeMode::Continue,
            })
            .unwrap_or_default();

        let mut spec = self.spec.clone();
        spec.resume_mode = None;

        Self {
            spec,
            outcomes,
            resume_point,
            ..self.clone()
        }
    }

    pub fn should_be_saved(&self) -> bool {
        matches!(self.resume_point, ResumePoint::At { .. })
    }
}

/// What the per-attempt detectors concluded about one `git rebase` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub cancelled_in_commit_list: bool,
    pub cancelled_in_commit_message: bool,
    pub success: bool,
    pub stopped_for_editing: bool,
    pub dirty_tree: bool,
    pub untracked_overwritten: bool,
    pub untracked_paths: Vec<PathBuf>,
    pub no_change: bool,
    pub merge_conflict: bool,
}

/// Result of one orchestrator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub aggregate: OutcomeKind,
    pub outcomes: OutcomeMap,
    pub skipped: Vec<(ResourceId, SkippedItem)>,
    pub resumable: bool,
    /// The user refused to rebase already published commits
    pub declined: bool,
}

impl RunSummary {
    pub fn not_started(outcomes: OutcomeMap, resumable: bool) -> Self {
        let skipped = outcomes.skipped_items();
        Self {
            aggregate: OutcomeKind::NotStarted,
            outcomes,
            skipped,
            resumable,
            declined: false,
        }
    }

    pub fn declined() -> Self {
        Self {
            declined: true,
            ..Self::not_started(OutcomeMap::new(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str) -> Resource {
        Resource::new(ResourceId::new(id), PathBuf::from("/work").join(id))
    }

    fn state_with(ids: &[&str]) -> OrchestrationState {
        OrchestrationState::new(
            PathBuf::from("/work"),
            ids.iter().map(|id| resource(id)).collect(),
            OperationSpec::new("main"),
        )
    }

    #[test]
    fn test_resource_ids_relative_to_family_root() {
        let family = Path::new("/work/app");
        assert_eq!(Resource::in_family(family, family).id, ResourceId::root());
        assert_eq!(
            Resource::in_family(family, Path::new("/work/app/libs/core")).id,
            ResourceId::new("libs/core")
        );
        assert_eq!(ResourceId::new("libs/core").depth(), 2);
        assert_eq!(ResourceId::root().depth(), 0);
    }

    #[test]
    fn test_success_type_parsing() {
        assert_eq!(
            SuccessType::parse_from_output("Fast-forwarded feature to main."),
            SuccessType::FastForwarded
        );
        assert_eq!(
            SuccessType::parse_from_output("Current branch feature is up to date."),
            SuccessType::UpToDate
        );
        assert_eq!(
            SuccessType::parse_from_output("Successfully rebased and updated refs/heads/feature."),
            SuccessType::Rebased
        );
    }

    #[test]
    fn test_outcome_map_keeps_insertion_order_on_replace() {
        let mut outcomes = OutcomeMap::new();
        outcomes.insert(ResourceId::new("b"), ResourceOutcome::NotStarted);
        outcomes.insert(ResourceId::new("a"), ResourceOutcome::Error { skipped: vec![] });
        outcomes.insert(
            ResourceId::new("b"),
            ResourceOutcome::Success {
                success_type: SuccessType::Rebased,
                skipped: vec![],
            },
        );

        let order: Vec<_> = outcomes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert!(outcomes.get(&ResourceId::new("b")).unwrap().is_success());
    }

    #[test]
    fn test_clone_with_new_outcomes_points_at_first_suspended() {
        let state = state_with(&["a", "b", "c"]).clone_with_new_outcomes(OutcomeMap::new());
        assert!(!state.should_be_saved());

        let mut outcomes = OutcomeMap::new();
        outcomes.insert(
            ResourceId::new("a"),
            ResourceOutcome::Success {
                success_type: SuccessType::Rebased,
                skipped: vec![],
            },
        );
        outcomes.insert(ResourceId::new("b"), ResourceOutcome::Suspended { skipped: vec![] });

        let next = state.clone_with_new_outcomes(outcomes);
        assert!(next.should_be_saved());
        assert_eq!(next.ongoing_resource(), Some(&ResourceId::new("b")));
        let incomplete: Vec<_> = next
            .incomplete_resources()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(incomplete, vec!["b", "c"]);
    }

    #[test]
    fn test_state_json_never_carries_resume_override() {
        let mut state = state_with(&["."]);
        state.spec.resume_mode = Some(ResumeMode::Skip);
        state.resume_point = ResumePoint::At {
            resource: ResourceId::root(),
            mode: ResumeMode::Continue,
        };

        let json = serde_json::to_string(&state).unwrap();
        let restored: OrchestrationState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.spec.resume_mode, None);
        assert_eq!(restored.resume_point, state.resume_point);
        assert_eq!(restored.run_id, state.run_id);
    }

    #[test]
    fn test_skipped_item_display() {
        let item = SkippedItem::new("0123456789abcdef", "x".repeat(100).as_str());
        assert_eq!(item.short_id, "01234567");
        assert_eq!(item.display_summary().chars().count(), 72);
        assert!(item.display_summary().ends_with("..."));
    }
}

//! Lifecycle stages of a single write.

use log::debug;
use std::fmt;

/// Kind of write being orchestrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    AddToRelationship,
    RemoveFromRelationship,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
            MutationKind::AddToRelationship => write!(f, "add to relationship"),
            MutationKind::RemoveFromRelationship => write!(f, "remove from relationship"),
        }
    }
}

/// Where a write currently is.
///
/// ```text
/// Initialized -> [InitializeResource] -> BeforeWrite -> Persist -> AfterWrite -> Completed
///                                                          |
///                                                          +-> Conflict
/// (any non-terminal stage) -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStage {
    Initialized,
    /// Create only
    InitializeResource,
    BeforeWrite,
    Persist,
    AfterWrite,
    /// The pipeline ran through; the caller still has to commit
    Completed,
    Conflict,
    Failed,
}

impl MutationStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MutationStage::Completed | MutationStage::Conflict | MutationStage::Failed
        )
    }

    /// Whether moving from `self` to `next` is a legal step for `kind`.
    pub fn can_advance_to(&self, next: MutationStage, kind: MutationKind) -> bool {
        use MutationStage::*;

        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Initialized, InitializeResource) => kind == MutationKind::Create,
            (Initialized, BeforeWrite) => kind != MutationKind::Create,
            (InitializeResource, BeforeWrite) => true,
            (BeforeWrite, Persist) => true,
            (Persist, AfterWrite) | (Persist, Conflict) => true,
            (AfterWrite, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MutationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the stage of one write and logs every transition.
#[derive(Debug)]
pub struct StageTracker<'a> {
    kind: MutationKind,
    resource_type: &'a str,
    request_id: &'a str,
    stage: MutationStage,
}

impl<'a> StageTracker<'a> {
    pub fn new(kind: MutationKind, resource_type: &'a str, request_id: &'a str) -> Self {
        Self {
            kind,
            resource_type,
            request_id,
            stage: MutationStage::Initialized,
        }
    }

    pub fn stage(&self) -> MutationStage {
        self.stage
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn resource_type(&self) -> &str {
        self.resource_type
    }

    /// Move to `next`. Illegal transitions are ignored and logged; they
    /// indicate a sequencing bug, not a request failure.
    pub fn advance(&mut self, next: MutationStage) {
        if !self.stage.can_advance_to(next, self.kind) {
            debug!(
                "Ignoring illegal {} stage transition {} -> {} for '{}' (request: '{}')",
                self.kind, self.stage, next, self.resource_type, self.request_id
            );
            return;
        }

        debug!(
            "{} '{}': {} -> {} (request: '{}')",
            self.kind, self.resource_type, self.stage, next, self.request_id
        );
        self.stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_path() {
        let mut tracker = StageTracker::new(MutationKind::Create, "disks", "t");
        for stage in [
            MutationStage::InitializeResource,
            MutationStage::BeforeWrite,
            MutationStage::Persist,
            MutationStage::AfterWrite,
            MutationStage::Completed,
        ] {
            tracker.advance(stage);
            assert_eq!(tracker.stage(), stage);
        }
        assert!(tracker.stage().is_terminal());
    }

    #[test]
    fn test_initialize_is_create_only() {
        assert!(!MutationStage::Initialized
            .can_advance_to(MutationStage::InitializeResource, MutationKind::Update));
        assert!(MutationStage::Initialized.can_advance_to(MutationStage::BeforeWrite, MutationKind::Delete));
        assert!(!MutationStage::Initialized.can_advance_to(MutationStage::BeforeWrite, MutationKind::Create));
    }

    #[test]
    fn test_conflict_only_from_persist() {
        assert!(MutationStage::Persist.can_advance_to(MutationStage::Conflict, MutationKind::Update));
        assert!(!MutationStage::BeforeWrite.can_advance_to(MutationStage::Conflict, MutationKind::Update));
        assert!(!MutationStage::Conflict.can_advance_to(MutationStage::Failed, MutationKind::Update));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut tracker = StageTracker::new(MutationKind::Delete, "disks", "t");
        tracker.advance(MutationStage::Completed);
        assert_eq!(tracker.stage(), MutationStage::Initialized);

        tracker.advance(MutationStage::Failed);
        assert_eq!(tracker.stage(), MutationStage::Failed);
    }
}

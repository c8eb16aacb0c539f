//! Optimistic concurrency checks.
//!
//! The detector does two things. Before a write it decides whether the
//! client's token is acceptable and which token the store's conditional write
//! must expect. After a write it translates whatever the store reported (a
//! mismatched conditional write, or a commit that lost a race) into the one
//! uniform [`EngineError::Conflict`].
//!
//! The detector never computes new tokens; the store stamps them.

use super::MutationKind;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::resource::{ConcurrencyToken, ResourceId, ResourceTypeDescriptor};
use crate::store::{ConditionalResult, StoreError};
use log::warn;

/// Stateless conflict checks, shared across requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// Gate a write on the client's token.
    ///
    /// Returns the token the conditional write must expect, or `None` for an
    /// unconditional write. Types without a token field are never checked.
    /// Updates must carry a token; deletes are checked only when they do.
    pub fn check_before_write(
        &self,
        descriptor: &ResourceTypeDescriptor,
        kind: MutationKind,
        submitted: Option<&ConcurrencyToken>,
        stored: Option<&ConcurrencyToken>,
        context: &RequestContext,
    ) -> EngineResult<Option<ConcurrencyToken>> {
        if !descriptor.uses_concurrency_token() {
            return Ok(None);
        }

        match (kind, submitted) {
            (MutationKind::Update, None) => {
                warn!(
                    "Rejecting {} of '{}' without a concurrency token (request: '{}')",
                    kind,
                    descriptor.name(),
                    context.request_id()
                );
                Err(EngineError::Conflict)
            }
            (_, None) => Ok(None),
            (_, Some(submitted)) => {
                if stored.is_some_and(|stored| stored != submitted) {
                    warn!(
                        "Stale concurrency token on {} of '{}' (request: '{}')",
                        kind,
                        descriptor.name(),
                        context.request_id()
                    );
                    return Err(EngineError::Conflict);
                }
                Ok(Some(submitted.clone()))
            }
        }
    }

    /// Map the outcome of a conditional write.
    pub fn translate<T>(
        &self,
        result: ConditionalResult<T>,
        resource_type: &str,
        id: &ResourceId,
        context: &RequestContext,
    ) -> EngineResult<T> {
        match result {
            ConditionalResult::Success(value) => Ok(value),
            ConditionalResult::VersionMismatch => {
                warn!(
                    "Version mismatch writing {}/{} (request: '{}')",
                    resource_type,
                    id,
                    context.request_id()
                );
                Err(EngineError::Conflict)
            }
            ConditionalResult::NotFound => Err(EngineError::not_found(resource_type, id)),
        }
    }

    /// Map a store failure, turning native concurrency failures into conflicts.
    pub fn translate_store_error(&self, error: StoreError, context: &RequestContext) -> EngineError {
        match error {
            StoreError::VersionMismatch { resource_type, id } => {
                warn!(
                    "Concurrent write detected on {}/{} (request: '{}')",
                    resource_type,
                    id,
                    context.request_id()
                );
                EngineError::Conflict
            }
            StoreError::NotFound { resource_type, id } => EngineError::NotFound { resource_type, id },
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disks() -> ResourceTypeDescriptor {
        ResourceTypeDescriptor::builder("disks")
            .attribute("manufacturer")
            .concurrency_token("concurrencyToken")
            .build()
    }

    fn token(value: &str) -> ConcurrencyToken {
        ConcurrencyToken::from_opaque(value)
    }

    #[test]
    fn test_update_requires_token() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");
        let result = detector.check_before_write(
            &disks(),
            MutationKind::Update,
            None,
            Some(&token("t1")),
            &context,
        );
        assert!(matches!(result, Err(EngineError::Conflict)));
    }

    #[test]
    fn test_stale_token_is_conflict() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");
        let result = detector.check_before_write(
            &disks(),
            MutationKind::Update,
            Some(&token("t1")),
            Some(&token("t2")),
            &context,
        );
        assert!(result.unwrap_err().is_conflict());
    }

    #[test]
    fn test_matching_token_becomes_expectation() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");
        let expected = detector
            .check_before_write(
                &disks(),
                MutationKind::Update,
                Some(&token("t1")),
                Some(&token("t1")),
                &context,
            )
            .unwrap();
        assert_eq!(expected, Some(token("t1")));
    }

    #[test]
    fn test_delete_token_is_optional() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");
        let expected = detector
            .check_before_write(&disks(), MutationKind::Delete, None, None, &context)
            .unwrap();
        assert_eq!(expected, None);
    }

    #[test]
    fn test_types_without_token_are_unchecked() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");
        let partitions = ResourceTypeDescriptor::builder("partitions").build();
        let expected = detector
            .check_before_write(&partitions, MutationKind::Update, None, None, &context)
            .unwrap();
        assert_eq!(expected, None);
    }

    #[test]
    fn test_translate() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");
        let id = ResourceId::Integer(1);

        assert_eq!(
            detector
                .translate(ConditionalResult::Success(5), "disks", &id, &context)
                .unwrap(),
            5
        );
        assert!(
            detector
                .translate::<()>(ConditionalResult::VersionMismatch, "disks", &id, &context)
                .unwrap_err()
                .is_conflict()
        );
        assert!(matches!(
            detector.translate::<()>(ConditionalResult::NotFound, "disks", &id, &context),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_translate_store_error() {
        let detector = ConflictDetector::new();
        let context = RequestContext::new("t");

        let error = detector.translate_store_error(StoreError::version_mismatch("disks", 1), &context);
        assert!(error.is_conflict());
        // The conflict never carries store details
        assert!(!error.to_string().contains("disks"));

        let error = detector.translate_store_error(StoreError::internal("boom"), &context);
        assert!(matches!(error, EngineError::Store(_)));
    }
}

use std::sync::Arc;

use super::cache::{Field, FieldValue, PatchKey, ResourceView};
use super::executor::{OptimisticExecutor, Settlement};
use super::intent::{RemoteOp, VoteDirection, resolve_bookmark};
use crate::error::MutationError;
use crate::remote::{GatewayError, RemoteGateway};
use crate::session::Session;
use crate::types::ResourceId;

/// Vote and bookmark entry points for the resource list.
///
/// Chains intent resolution, the optimistic executor and the matching
/// gateway write.
pub struct ResourceBoard<G> {
    executor: OptimisticExecutor,
    gateway: Arc<G>,
}

impl<G> Clone for ResourceBoard<G> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<G: RemoteGateway> ResourceBoard<G> {
    #[must_use]
    pub fn new(executor: OptimisticExecutor, gateway: Arc<G>) -> Self {
        Self { executor, gateway }
    }

    #[must_use]
    pub fn executor(&self) -> &OptimisticExecutor {
        &self.executor
    }

    #[must_use]
    pub fn view(&self, resource: &ResourceId) -> Option<ResourceView> {
        self.executor.view(resource)
    }

    /// Loads freshly fetched views. Counts only become authoritative here.
    pub fn refresh(&self, views: impl IntoIterator<Item = (ResourceId, ResourceView)>) {
        self.executor.refresh(views);
    }

    /// Presses a vote button.
    ///
    /// # Errors
    ///
    /// [`MutationError::Unauthenticated`] when signed out (nothing changes),
    /// [`MutationError::RemoteWriteFailed`] after the vote was rolled back.
    pub async fn vote(
        &self,
        resource: &ResourceId,
        direction: VoteDirection,
    ) -> Result<Settlement, MutationError> {
        let key = PatchKey::new(resource.clone(), Field::Vote);
        let settlement = self
            .executor
            .execute(
                key,
                |value| match value {
                    FieldValue::Vote(tally) => FieldValue::Vote(tally.press(direction).0),
                    other => other,
                },
                |session, next| {
                    let op = match next {
                        FieldValue::Vote(tally) => RemoteOp::for_vote(tally.state),
                        FieldValue::Bookmark(b) => RemoteOp::for_bookmark(b),
                    };
                    self.write(session, resource.clone(), op)
                },
            )
            .await?;

        tracing::debug!(resource_id = %resource, ?direction, ?settlement, "Vote settled");
        Ok(settlement)
    }

    /// Flips the bookmark flag.
    ///
    /// # Errors
    ///
    /// As for [`vote`](Self::vote).
    pub async fn toggle_bookmark(
        &self,
        resource: &ResourceId,
    ) -> Result<Settlement, MutationError> {
        let key = PatchKey::new(resource.clone(), Field::Bookmark);
        let settlement = self
            .executor
            .execute(
                key,
                |value| match value {
                    FieldValue::Bookmark(b) => FieldValue::Bookmark(resolve_bookmark(b)),
                    other => other,
                },
                |session, next| {
                    let op = match next {
                        FieldValue::Bookmark(b) => RemoteOp::for_bookmark(b),
                        FieldValue::Vote(tally) => RemoteOp::for_vote(tally.state),
                    };
                    self.write(session, resource.clone(), op)
                },
            )
            .await?;

        tracing::debug!(resource_id = %resource, ?settlement, "Bookmark settled");
        Ok(settlement)
    }

    async fn write(
        &self,
        session: Session,
        resource: ResourceId,
        op: RemoteOp,
    ) -> Result<Option<FieldValue>, GatewayError> {
        let gateway = &self.gateway;
        match op {
            RemoteOp::UpsertVote(direction) => {
                gateway.upsert_vote(&session, &resource, direction).await?;
            }
            RemoteOp::DeleteVote => gateway.delete_vote(&session, &resource).await?,
            RemoteOp::InsertBookmark => gateway.insert_bookmark(&session, &resource).await?,
            RemoteOp::DeleteBookmark => gateway.delete_bookmark(&session, &resource).await?,
        }
        // Writes return no representation; counts reconcile on refresh.
        Ok(None)
    }
}

//! Bulk reassignment of a departing subject's requests.
//!
//! Grounded on `original_source/flux/models/request.py`'s
//! `reassign_assignee` classmethod. The original hardcodes a literal
//! fallback admin UUID (`2533dc9a-0fbe-4ab7-bd10-a65e2ec07cfc`) as the new
//! owner of every orphaned request; this rewrite takes that UUID as an
//! explicit `fallback_assignee` configuration value instead of carrying
//! the magic constant forward.

use uuid::Uuid;

use flux_dispatch::{Dispatcher, PostCommitEffect};
use flux_persistence::{Store, StoreError};

/// `Request.reassign_assignee(session, id)`: every request currently
/// assigned to `departing` is handed to `fallback_assignee`, and a
/// `request:changed` event fires per reassigned request (deferred via
/// `PostCommitEffect` — the caller commits the batch, then drains these).
pub async fn reassign_assignee(
    store: &dyn Store,
    departing: Uuid,
    fallback_assignee: Uuid,
) -> Result<(Vec<Uuid>, Vec<PostCommitEffect>), StoreError> {
    let owned = store.list_requests_for_assignee(departing).await?;
    let mut reassigned = Vec::with_capacity(owned.len());
    let mut effects = Vec::with_capacity(owned.len());

    for mut request in owned {
        let (_current, mut guard) = store.load_request_for_update(request.id).await?;
        request.assignee = Some(fallback_assignee);
        store.save_request(&mut guard, &request).await?;
        guard.commit().await?;

        reassigned.push(request.id);
        effects.push(PostCommitEffect::event(
            "request:changed",
            serde_json::json!({"id": request.id}),
        ));
    }

    Ok((reassigned, effects))
}

/// Drains the batch of `reassign_assignee`'s deferred events through a real
/// dispatcher. Infrastructure failures here are logged and swallowed by the
/// caller as best-effort notifications, not surfaced here.
pub async fn dispatch_reassignment_effects(dispatcher: &dyn Dispatcher, effects: Vec<PostCommitEffect>) {
    for effect in effects {
        if let Err(error) = effect.dispatch(dispatcher).await {
            tracing::warn!(?error, "failed to dispatch request reassignment event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_persistence::{InMemoryStore, Request, RequestStatus};
    use std::collections::BTreeMap;

    fn request(assignee: Uuid, name: &str) -> Request {
        Request {
            id: Uuid::now_v7(),
            name: name.to_string(),
            status: RequestStatus::Pending,
            originator: Uuid::now_v7(),
            assignee: Some(assignee),
            creator: Uuid::now_v7(),
            template_id: None,
            slot_order: None,
            claimed: None,
            completed: None,
            attachments: vec![],
            slots: BTreeMap::new(),
            products: BTreeMap::new(),
            messages: vec![],
        }
    }

    #[tokio::test]
    async fn reassigns_every_request_owned_by_the_departing_subject() {
        let store = InMemoryStore::new();
        let departing = Uuid::now_v7();
        let fallback = Uuid::now_v7();
        let r1 = store.create_request(request(departing, "r1")).await.unwrap();
        let r2 = store.create_request(request(departing, "r2")).await.unwrap();
        let _other = store.create_request(request(Uuid::now_v7(), "r3")).await.unwrap();

        let (reassigned, effects) = reassign_assignee(&store, departing, fallback).await.unwrap();
        assert_eq!(reassigned.len(), 2);
        assert_eq!(effects.len(), 2);

        let reloaded = store.get_request(r1.id).await.unwrap();
        assert_eq!(reloaded.assignee, Some(fallback));
        let reloaded2 = store.get_request(r2.id).await.unwrap();
        assert_eq!(reloaded2.assignee, Some(fallback));
    }
}

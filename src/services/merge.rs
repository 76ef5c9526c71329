//! Identity merge: unifying a placeholder account with the real account
//! that later registered, rewriting every reference to the old identity.
//!
//! The store has no foreign keys and no cascades, so the rewrite walks
//! every entity kind that can hold a user reference: contact lists,
//! message authorship, thread membership and event membership (including
//! RSVPs), plus every read record along the way. Discovery runs outside
//! the transaction; the writes commit atomically over the discovered
//! snapshot, so a reference created concurrently is picked up by a later
//! retry rather than this commit.

use crate::error::{AppError, AppResult};
use crate::keys::{Key, Kind};
use crate::models::User;
use crate::services::notify::{self, Notification, NotificationKind};
use crate::state::AppState;
use crate::store::{run_with_retries, Entity, Query, Store, StoreTransaction};

pub struct MergeService;

impl MergeService {
    /// Merges `old` into `new`: after a successful return no stored entity
    /// references `old`, and `new` carries the union of both identities'
    /// contacts, emails and associations. Idempotent: re-running the merge
    /// leaves the dataset unchanged.
    pub async fn merge_identities(state: &AppState, old_key: &Key, new_key: &Key) -> AppResult<User> {
        if old_key == new_key {
            return Err(AppError::BadRequest(
                "cannot merge an identity into itself".into(),
            ));
        }
        if old_key.kind != Kind::User || new_key.kind != Kind::User {
            return Err(AppError::BadRequest(
                "identity merge takes two user references".into(),
            ));
        }

        let merged = run_with_retries(state.config.max_transaction_attempts, || async move {
            let store = state.store.as_ref();

            // Discovery: index lookups for everything referencing `old`.
            let holders = store.query(&Query::users_with_contact(old_key)).await?;
            let messages = store.query(&Query::messages_by_author(old_key)).await?;
            let threads = store.query(&Query::threads_with_member(old_key)).await?;
            let events = store.query(&Query::events_with_member(old_key)).await?;

            let mut tx = store.transaction().await?;
            let old_user = tx.get(old_key).await?.into_user()?;
            let mut new_user = tx.get(new_key).await?.into_user()?;

            for holder in &holders {
                let key = holder.key();
                // The merged pair is rewritten separately below.
                if key == *old_key || key == *new_key {
                    continue;
                }
                let mut user = tx.get(&key).await?.into_user()?;
                user.reassign_contact(old_key, new_key);
                tx.put(user.into());
            }

            for message in &messages {
                let mut message = tx.get(&message.key()).await?.into_message()?;
                message.reassign_author(old_key, &new_user);
                tx.put(message.into());
            }

            for thread in &threads {
                let mut thread = tx.get(&thread.key()).await?.into_thread()?;
                thread.reassign_user(old_key, &new_user);
                tx.put(thread.into());
            }

            for event in &events {
                let mut event = tx.get(&event.key()).await?.into_event()?;
                event.reassign_user(old_key, &new_user);
                tx.put(event.into());
            }

            new_user.merge_with(&old_user);

            let mut retired = old_user;
            retired.merged_into = Some(*new_key);
            retired.contact_keys.clear();
            retired.emails.clear();

            tx.put(Entity::User(retired));
            tx.put(Entity::User(new_user.clone()));
            tx.commit().await?;

            tracing::debug!(
                old = %old_key,
                new = %new_key,
                contacts = holders.len(),
                messages = messages.len(),
                threads = threads.len(),
                events = events.len(),
                "identity merge committed"
            );
            Ok(new_user)
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::IdentityMerged,
                vec![*new_key],
                &merged.full_name,
            ),
        )
        .await;
        Ok(merged)
    }
}

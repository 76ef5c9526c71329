use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::hydration::hydrate_threads;
use crate::keys::{dedupe_keys, Key};
use crate::models::{ReadState, Thread, User};
use crate::services::notify::{self, Notification, NotificationKind};
use crate::state::AppState;
use crate::store::{run_with_retries, Query, Store, StoreTransaction};

pub struct ThreadService;

impl ThreadService {
    /// Starts a thread with an initial participant list and notifies the
    /// participants.
    pub async fn create_thread(
        state: &AppState,
        owner_key: &Key,
        participant_keys: &[Key],
        subject: &str,
    ) -> AppResult<Thread> {
        let thread = run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let owner = tx.get(owner_key).await?.into_user()?;

            let keys = dedupe_keys(participant_keys);
            let fetched = tx.get_multi(&keys).await?;
            let mut participants = Vec::with_capacity(keys.len());
            for (key, slot) in keys.iter().zip(fetched) {
                match slot {
                    Some(entity) => participants.push(entity.into_user()?),
                    None => return Err(AppError::NotFound(*key)),
                }
            }

            let participant_refs: Vec<&User> = participants.iter().collect();
            let thread = Thread::new(subject, &owner, &participant_refs);
            tx.put(thread.clone().into());
            tx.commit().await?;
            Ok(thread)
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::ThreadInvitation,
                thread.user_keys.clone(),
                &thread.subject,
            ),
        )
        .await;
        Ok(thread)
    }

    pub async fn get_thread(state: &AppState, actor: &Key, thread_key: &Key) -> AppResult<Thread> {
        let mut thread = state.store.get(thread_key).await?.into_thread()?;
        if !thread.has_user(actor) {
            return Err(AppError::NotAuthorized);
        }
        hydrate_threads(state.store.as_ref(), std::slice::from_mut(&mut thread)).await?;
        Ok(thread)
    }

    /// Every thread the user participates in, hydrated with one batched
    /// fetch.
    pub async fn get_threads_by_user(state: &AppState, user_key: &Key) -> AppResult<Vec<Thread>> {
        let entities = state
            .store
            .query(&Query::threads_with_member(user_key))
            .await?;
        let mut threads = entities
            .into_iter()
            .map(|e| e.into_thread())
            .collect::<AppResult<Vec<_>>>()?;
        hydrate_threads(state.store.as_ref(), &mut threads).await?;
        Ok(threads)
    }

    /// Adds a participant. Only the owner can add.
    pub async fn add_user(
        state: &AppState,
        actor: &Key,
        thread_key: &Key,
        user_key: &Key,
    ) -> AppResult<Thread> {
        let thread = run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut thread = tx.get(thread_key).await?.into_thread()?;
            if !thread.owner_is(actor) {
                return Err(AppError::NotAuthorized);
            }
            let user = tx.get(user_key).await?.into_user()?;
            thread.add_user(&user)?;
            tx.put(thread.clone().into());
            tx.commit().await?;
            Ok(thread)
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::ThreadInvitation,
                vec![*user_key],
                &thread.subject,
            ),
        )
        .await;
        Ok(thread)
    }

    /// Removes a participant. The owner can remove anyone; a participant
    /// can remove themselves.
    pub async fn remove_user(
        state: &AppState,
        actor: &Key,
        thread_key: &Key,
        user_key: &Key,
    ) -> AppResult<Thread> {
        run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut thread = tx.get(thread_key).await?.into_thread()?;
            if !thread.owner_is(actor) && actor != user_key {
                return Err(AppError::NotAuthorized);
            }
            thread.remove_user(user_key)?;
            tx.put(thread.clone().into());
            tx.commit().await?;
            Ok(thread)
        })
        .await
    }

    /// Renames the thread subject. Owner only.
    pub async fn update_subject(
        state: &AppState,
        actor: &Key,
        thread_key: &Key,
        subject: &str,
    ) -> AppResult<Thread> {
        run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut thread = tx.get(thread_key).await?.into_thread()?;
            if !thread.owner_is(actor) {
                return Err(AppError::NotAuthorized);
            }
            thread.subject = subject.to_string();
            tx.put(thread.clone().into());
            tx.commit().await?;
            Ok(thread)
        })
        .await
    }

    /// Records that the actor viewed the thread. Single-document
    /// read-modify-write; no transaction needed.
    pub async fn mark_read(state: &AppState, actor: &Key, thread_key: &Key) -> AppResult<Thread> {
        let mut thread = state.store.get(thread_key).await?.into_thread()?;
        if !thread.has_user(actor) {
            return Err(AppError::NotAuthorized);
        }
        thread.mark_read(actor, Utc::now());
        state.store.put(&thread.clone().into()).await?;
        Ok(thread)
    }
}

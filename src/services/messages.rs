use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::hydration::hydrate_messages;
use crate::keys::Key;
use crate::models::{Message, ParentKey, ReadState};
use crate::services::notify::{self, Notification, NotificationKind};
use crate::state::AppState;
use crate::store::{run_with_retries, Entity, Query, Store, StoreTransaction};

/// Notification subjects carry at most this much of the message body.
const SUBJECT_SNIPPET_LEN: usize = 80;

pub struct MessageService;

impl MessageService {
    /// Posts a message to a thread the author participates in. The message
    /// and the parent's read-state reset commit together: everyone except
    /// the author sees the thread as unread again.
    pub async fn post_to_thread(
        state: &AppState,
        author_key: &Key,
        thread_key: &Key,
        body: &str,
    ) -> AppResult<Message> {
        if body.trim().is_empty() {
            return Err(AppError::BadRequest("message body cannot be empty".into()));
        }

        let (message, recipients) =
            run_with_retries(state.config.max_transaction_attempts, || async move {
                let mut tx = state.store.transaction().await?;
                let mut thread = tx.get(thread_key).await?.into_thread()?;
                if !thread.has_user(author_key) {
                    return Err(AppError::NotAuthorized);
                }
                let author = tx.get(author_key).await?.into_user()?;

                let message = Message::new(&author, ParentKey::Thread(thread.key), body);
                thread.clear_reads();
                thread.mark_read(author_key, Utc::now());

                let mut recipients = vec![thread.owner_key];
                recipients.extend_from_slice(&thread.user_keys);
                recipients.retain(|k| k != author_key);

                tx.put(message.clone().into());
                tx.put(thread.into());
                tx.commit().await?;
                Ok((message, recipients))
            })
            .await?;

        notify::dispatch(
            state,
            Notification::new(NotificationKind::NewMessage, recipients, snippet(body)),
        )
        .await;
        Ok(message)
    }

    /// Event counterpart of [`Self::post_to_thread`].
    pub async fn post_to_event(
        state: &AppState,
        author_key: &Key,
        event_key: &Key,
        body: &str,
    ) -> AppResult<Message> {
        if body.trim().is_empty() {
            return Err(AppError::BadRequest("message body cannot be empty".into()));
        }

        let (message, recipients) =
            run_with_retries(state.config.max_transaction_attempts, || async move {
                let mut tx = state.store.transaction().await?;
                let mut event = tx.get(event_key).await?.into_event()?;
                if !event.has_user(author_key) {
                    return Err(AppError::NotAuthorized);
                }
                let author = tx.get(author_key).await?.into_user()?;

                let message = Message::new(&author, ParentKey::Event(event.key), body);
                event.clear_reads();
                event.mark_read(author_key, Utc::now());

                let mut recipients = vec![event.owner_key];
                recipients.extend_from_slice(&event.user_keys);
                recipients.retain(|k| k != author_key);

                tx.put(message.clone().into());
                tx.put(event.into());
                tx.commit().await?;
                Ok((message, recipients))
            })
            .await?;

        notify::dispatch(
            state,
            Notification::new(NotificationKind::NewMessage, recipients, snippet(body)),
        )
        .await;
        Ok(message)
    }

    /// Messages in a thread, oldest first, with authors hydrated in one
    /// batched fetch.
    pub async fn get_thread_messages(
        state: &AppState,
        actor: &Key,
        thread_key: &Key,
    ) -> AppResult<Vec<Message>> {
        let thread = state.store.get(thread_key).await?.into_thread()?;
        if !thread.has_user(actor) {
            return Err(AppError::NotAuthorized);
        }
        Self::list_messages(state, ParentKey::Thread(thread.key)).await
    }

    /// Messages on an event, oldest first, with authors hydrated in one
    /// batched fetch.
    pub async fn get_event_messages(
        state: &AppState,
        actor: &Key,
        event_key: &Key,
    ) -> AppResult<Vec<Message>> {
        let event = state.store.get(event_key).await?.into_event()?;
        if !event.has_user(actor) {
            return Err(AppError::NotAuthorized);
        }
        Self::list_messages(state, ParentKey::Event(event.key)).await
    }

    /// Records that the actor read one specific message. Visibility follows
    /// the parent's membership.
    pub async fn mark_read(state: &AppState, actor: &Key, message_key: &Key) -> AppResult<Message> {
        let mut message = state.store.get(message_key).await?.into_message()?;
        let allowed = match state.store.get(&message.parent.key()).await? {
            Entity::Thread(thread) => thread.has_user(actor),
            Entity::Event(event) => event.has_user(actor),
            other => {
                return Err(AppError::Storage(format!(
                    "message {} has parent of kind {}",
                    message.key,
                    other.kind()
                )))
            }
        };
        if !allowed {
            return Err(AppError::NotAuthorized);
        }
        message.mark_read(actor, Utc::now());
        state.store.put(&message.clone().into()).await?;
        Ok(message)
    }

    async fn list_messages(state: &AppState, parent: ParentKey) -> AppResult<Vec<Message>> {
        let entities = state.store.query(&Query::messages_in(&parent)).await?;
        let mut messages = entities
            .into_iter()
            .map(|e| e.into_message())
            .collect::<AppResult<Vec<_>>>()?;
        messages.sort_by_key(|m| m.timestamp);
        hydrate_messages(state.store.as_ref(), &mut messages).await?;
        Ok(messages)
    }
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(SUBJECT_SNIPPET_LEN) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

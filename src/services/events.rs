use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::hydration::hydrate_events;
use crate::keys::{dedupe_keys, Key};
use crate::models::{Event, EventParams, ReadState, User};
use crate::services::notify::{self, Notification, NotificationKind};
use crate::state::AppState;
use crate::store::{run_with_retries, Query, Store, StoreTransaction};

/// Partial update applied to an event by its owner. Absent fields are left
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub place_id: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub utc_offset_seconds: Option<i32>,
}

pub struct EventService;

impl EventService {
    /// Creates an event with an initial guest list and notifies the guests.
    /// Runs in a transaction: the guest snapshot and the new event commit
    /// together.
    pub async fn create_event(
        state: &AppState,
        owner_key: &Key,
        guest_keys: &[Key],
        params: EventParams,
    ) -> AppResult<Event> {
        if params.name.trim().is_empty() {
            return Err(AppError::BadRequest("event name cannot be empty".into()));
        }
        if params.timestamp <= Utc::now() {
            return Err(AppError::BadRequest(
                "event time must be in the future".into(),
            ));
        }

        let event = run_with_retries(state.config.max_transaction_attempts, || {
            let params = params.clone();
            async move {
                let mut tx = state.store.transaction().await?;
                let owner = tx.get(owner_key).await?.into_user()?;

                let keys = dedupe_keys(guest_keys);
                let fetched = tx.get_multi(&keys).await?;
                let mut guests = Vec::with_capacity(keys.len());
                for (key, slot) in keys.iter().zip(fetched) {
                    match slot {
                        Some(entity) => guests.push(entity.into_user()?),
                        None => return Err(AppError::NotFound(*key)),
                    }
                }

                let guest_refs: Vec<&User> = guests.iter().collect();
                let event = Event::new(params, &owner, &guest_refs)?;
                tx.put(event.clone().into());
                tx.commit().await?;
                Ok(event)
            }
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::EventInvitation,
                event.user_keys.clone(),
                &event.name,
            ),
        )
        .await;
        Ok(event)
    }

    /// Fetches a single event, hydrated. Only members (owner included) can
    /// see an event.
    pub async fn get_event(state: &AppState, actor: &Key, event_key: &Key) -> AppResult<Event> {
        let mut event = state.store.get(event_key).await?.into_event()?;
        if !event.has_user(actor) {
            return Err(AppError::NotAuthorized);
        }
        hydrate_events(state.store.as_ref(), std::slice::from_mut(&mut event)).await?;
        Ok(event)
    }

    /// Every event the user belongs to, hydrated with one batched fetch.
    pub async fn get_events_by_user(state: &AppState, user_key: &Key) -> AppResult<Vec<Event>> {
        let entities = state
            .store
            .query(&Query::events_with_member(user_key))
            .await?;
        let mut events = entities
            .into_iter()
            .map(|e| e.into_event())
            .collect::<AppResult<Vec<_>>>()?;
        hydrate_events(state.store.as_ref(), &mut events).await?;
        Ok(events)
    }

    /// Invites a user. Only the owner can invite.
    pub async fn add_user(
        state: &AppState,
        actor: &Key,
        event_key: &Key,
        user_key: &Key,
    ) -> AppResult<Event> {
        let event = run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut event = tx.get(event_key).await?.into_event()?;
            if !event.owner_is(actor) {
                return Err(AppError::NotAuthorized);
            }
            let user = tx.get(user_key).await?.into_user()?;
            event.add_user(&user)?;
            tx.put(event.clone().into());
            tx.commit().await?;
            Ok(event)
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::EventInvitation,
                vec![*user_key],
                &event.name,
            ),
        )
        .await;
        Ok(event)
    }

    /// Uninvites a user. The owner can remove anyone; a guest can remove
    /// themselves. Any outstanding RSVP is revoked with the membership.
    pub async fn remove_user(
        state: &AppState,
        actor: &Key,
        event_key: &Key,
        user_key: &Key,
    ) -> AppResult<Event> {
        run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut event = tx.get(event_key).await?.into_event()?;
            if !event.owner_is(actor) && actor != user_key {
                return Err(AppError::NotAuthorized);
            }
            event.remove_user(user_key)?;
            tx.put(event.clone().into());
            tx.commit().await?;
            Ok(event)
        })
        .await
    }

    /// RSVPs the actor to an event they were invited to. The reads reset
    /// inside [`Event::add_rsvp`] makes the new attendee surface as fresh
    /// activity for every member.
    pub async fn add_rsvp(state: &AppState, actor: &Key, event_key: &Key) -> AppResult<Event> {
        let event = run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut event = tx.get(event_key).await?.into_event()?;
            let user = tx.get(actor).await?.into_user()?;
            event.add_rsvp(&user)?;
            tx.put(event.clone().into());
            tx.commit().await?;
            Ok(event)
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::RsvpAdded,
                vec![event.owner_key],
                &event.name,
            ),
        )
        .await;
        Ok(event)
    }

    /// Withdraws the actor's RSVP. Not high-signal: reads survive and
    /// nobody is notified.
    pub async fn remove_rsvp(state: &AppState, actor: &Key, event_key: &Key) -> AppResult<Event> {
        run_with_retries(state.config.max_transaction_attempts, || async move {
            let mut tx = state.store.transaction().await?;
            let mut event = tx.get(event_key).await?.into_event()?;
            event.remove_rsvp(actor)?;
            tx.put(event.clone().into());
            tx.commit().await?;
            Ok(event)
        })
        .await
    }

    /// Applies owner edits to the event details and notifies members of the
    /// update.
    pub async fn update_event(
        state: &AppState,
        actor: &Key,
        event_key: &Key,
        changes: EventChanges,
    ) -> AppResult<Event> {
        if let Some(name) = &changes.name {
            if name.trim().is_empty() {
                return Err(AppError::BadRequest("event name cannot be empty".into()));
            }
        }

        let event = run_with_retries(state.config.max_transaction_attempts, || {
            let changes = changes.clone();
            async move {
                let mut tx = state.store.transaction().await?;
                let mut event = tx.get(event_key).await?.into_event()?;
                if !event.owner_is(actor) {
                    return Err(AppError::NotAuthorized);
                }
                if let Some(name) = changes.name {
                    event.name = name;
                }
                if let Some(description) = changes.description {
                    event.description = description;
                }
                if let Some(place_id) = changes.place_id {
                    event.place_id = place_id;
                }
                if let Some(address) = changes.address {
                    event.address = address;
                }
                if let Some(lat) = changes.lat {
                    event.lat = lat;
                }
                if let Some(lng) = changes.lng {
                    event.lng = lng;
                }
                if let Some(timestamp) = changes.timestamp {
                    event.timestamp = timestamp;
                }
                if let Some(offset) = changes.utc_offset_seconds {
                    event.utc_offset_seconds = offset;
                }
                tx.put(event.clone().into());
                tx.commit().await?;
                Ok(event)
            }
        })
        .await?;

        notify::dispatch(
            state,
            Notification::new(
                NotificationKind::EventUpdated,
                event.user_keys.clone(),
                &event.name,
            ),
        )
        .await;
        Ok(event)
    }

    /// Records that the actor viewed the event. Single-document
    /// read-modify-write; no transaction needed.
    pub async fn mark_read(state: &AppState, actor: &Key, event_key: &Key) -> AppResult<Event> {
        let mut event = state.store.get(event_key).await?.into_event()?;
        if !event.has_user(actor) {
            return Err(AppError::NotAuthorized);
        }
        event.mark_read(actor, Utc::now());
        state.store.put(&event.clone().into()).await?;
        Ok(event)
    }
}

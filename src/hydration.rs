//! Batch hydration of reference lists into composites.
//!
//! Entities hold only member keys at rest. Expanding N of them for a
//! response takes exactly one batched fetch: every member list is flattened
//! into one key list while an offset table records how many keys each
//! entity contributed, then the batch result is sliced back per entity.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::AppResult;
use crate::keys::Key;
use crate::models::{Event, Message, Thread, User, UserPartial};
use crate::store::{Entity, Store};

/// Hydrates owner, members, RSVPs and per-user read status for every event
/// with a single batched fetch, regardless of how many events were passed.
pub async fn hydrate_events(store: &dyn Store, events: &mut [Event]) -> AppResult<()> {
    let mut flat: Vec<Key> = Vec::new();
    let mut counts: Vec<usize> = Vec::with_capacity(events.len());
    for event in events.iter() {
        flat.push(event.owner_key);
        flat.extend_from_slice(&event.user_keys);
        counts.push(1 + event.user_keys.len());
    }
    if flat.is_empty() {
        return Ok(());
    }

    let fetched = store.get_multi(&flat).await?;

    let mut start = 0;
    for (event, count) in events.iter_mut().zip(counts) {
        let window = &flat[start..start + count];
        let slots = &fetched[start..start + count];
        start += count;

        let users = resolve_users(window, slots);
        let by_id = partials_by_id(&users);

        event.owner = users
            .iter()
            .find(|u| u.key == event.owner_key)
            .map(UserPartial::from);
        event.user_partials = project(&users, |u| event.user_keys.contains(&u.key));
        event.rsvps = project(&users, |u| event.has_rsvp(&u.key));
        event.user_reads = read_partials(&event.reads, &by_id);
    }
    Ok(())
}

/// Thread counterpart of [`hydrate_events`]: owner, members and per-user
/// read status, one batched fetch for the whole slice.
pub async fn hydrate_threads(store: &dyn Store, threads: &mut [Thread]) -> AppResult<()> {
    let mut flat: Vec<Key> = Vec::new();
    let mut counts: Vec<usize> = Vec::with_capacity(threads.len());
    for thread in threads.iter() {
        flat.push(thread.owner_key);
        flat.extend_from_slice(&thread.user_keys);
        counts.push(1 + thread.user_keys.len());
    }
    if flat.is_empty() {
        return Ok(());
    }

    let fetched = store.get_multi(&flat).await?;

    let mut start = 0;
    for (thread, count) in threads.iter_mut().zip(counts) {
        let window = &flat[start..start + count];
        let slots = &fetched[start..start + count];
        start += count;

        let users = resolve_users(window, slots);
        let by_id = partials_by_id(&users);

        thread.owner = users
            .iter()
            .find(|u| u.key == thread.owner_key)
            .map(UserPartial::from);
        thread.user_partials = project(&users, |u| thread.user_keys.contains(&u.key));
        thread.user_reads = read_partials(&thread.reads, &by_id);
    }
    Ok(())
}

/// Fills in author partials for a batch of messages with one fetch.
pub async fn hydrate_messages(store: &dyn Store, messages: &mut [Message]) -> AppResult<()> {
    let flat: Vec<Key> = messages.iter().map(|m| m.user_key).collect();
    if flat.is_empty() {
        return Ok(());
    }

    let fetched = store.get_multi(&flat).await?;

    for (message, slot) in messages.iter_mut().zip(&fetched) {
        message.user = resolve_user(&message.user_key, slot).map(|u| UserPartial::from(&u));
    }
    Ok(())
}

/// Resolves one batch slot. A missing or wrong-kind document is a dangling
/// reference: logged and dropped from the composite, never an error.
pub(crate) fn resolve_user(expected: &Key, slot: &Option<Entity>) -> Option<User> {
    match slot {
        Some(Entity::User(user)) => Some(user.clone()),
        _ => {
            tracing::warn!(key = %expected, "dropping dangling reference during hydration");
            None
        }
    }
}

fn resolve_users(window: &[Key], slots: &[Option<Entity>]) -> Vec<User> {
    window
        .iter()
        .zip(slots)
        .filter_map(|(key, slot)| resolve_user(key, slot))
        .collect()
}

fn partials_by_id(users: &[User]) -> HashMap<Uuid, UserPartial> {
    users
        .iter()
        .map(|u| (u.key.id, UserPartial::from(u)))
        .collect()
}

fn project(users: &[User], mut include: impl FnMut(&User) -> bool) -> Vec<UserPartial> {
    users
        .iter()
        .filter(|u| include(u))
        .map(UserPartial::from)
        .collect()
}

fn read_partials(
    reads: &[crate::models::Read],
    by_id: &HashMap<Uuid, UserPartial>,
) -> Vec<UserPartial> {
    reads
        .iter()
        .filter_map(|r| by_id.get(&r.user_key.id).cloned())
        .collect()
}

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::keys::{swap_keys, Key, Kind};
use crate::models::read::{swap_read_keys, Read, ReadState};
use crate::models::user::{User, UserPartial};

/// Hard cap on invited guests per event, owner excluded.
pub const MAX_EVENT_MEMBERS: usize = 300;

/// An event owned by exactly one user. The owner is a member implicitly and
/// never appears in `user_keys` or `rsvp_keys`; those lists hold invited
/// guests only. `user_partials` and `rsvps` are denormalized projections
/// kept in lock-step with their key lists by every mutator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub key: Key,
    pub owner_key: Key,
    pub owner: Option<UserPartial>,
    pub user_keys: Vec<Key>,
    pub user_partials: Vec<UserPartial>,
    pub rsvp_keys: Vec<Key>,
    pub rsvps: Vec<UserPartial>,
    pub place_id: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// Offset of the event's local timezone, in seconds east of UTC.
    pub utc_offset_seconds: i32,
    pub reads: Vec<Read>,
    /// Projections of the users who have seen the latest activity. Computed
    /// at hydration time from `reads`.
    pub user_reads: Vec<UserPartial>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventParams {
    pub name: String,
    pub description: String,
    pub place_id: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub utc_offset_seconds: i32,
}

impl Event {
    /// Creates an event with an initial guest list. Duplicate guests and the
    /// owner are filtered out of the list; the owner is a member implicitly.
    pub fn new(params: EventParams, owner: &User, guests: &[&User]) -> AppResult<Self> {
        let mut user_keys = Vec::new();
        let mut user_partials = Vec::new();
        for guest in guests {
            if guest.key == owner.key || user_keys.contains(&guest.key) {
                continue;
            }
            user_keys.push(guest.key);
            user_partials.push(UserPartial::from(*guest));
        }

        if user_keys.len() > MAX_EVENT_MEMBERS {
            return Err(AppError::CapacityExceeded);
        }

        Ok(Self {
            key: Key::new(Kind::Event),
            owner_key: owner.key,
            owner: Some(UserPartial::from(owner)),
            user_keys,
            user_partials,
            rsvp_keys: Vec::new(),
            rsvps: Vec::new(),
            place_id: params.place_id,
            address: params.address,
            lat: params.lat,
            lng: params.lng,
            name: params.name,
            description: params.description,
            timestamp: params.timestamp,
            utc_offset_seconds: params.utc_offset_seconds,
            reads: Vec::new(),
            user_reads: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn owner_is(&self, key: &Key) -> bool {
        self.owner_key == *key
    }

    /// Whether the user can see and post to this event. The owner counts as
    /// a member.
    pub fn has_user(&self, key: &Key) -> bool {
        self.owner_is(key) || self.user_keys.contains(key)
    }

    pub fn has_rsvp(&self, key: &Key) -> bool {
        self.rsvp_keys.contains(key)
    }

    /// Invites a user. Appends to the key list and the partial list
    /// together; the two never drift.
    pub fn add_user(&mut self, user: &User) -> AppResult<()> {
        if self.owner_is(&user.key) || self.user_keys.contains(&user.key) {
            return Err(AppError::AlreadyMember);
        }
        if self.user_keys.len() >= MAX_EVENT_MEMBERS {
            return Err(AppError::CapacityExceeded);
        }
        self.user_keys.push(user.key);
        self.user_partials.push(UserPartial::from(user));
        Ok(())
    }

    /// Uninvites a user, revoking any outstanding RSVP so `rsvp_keys` stays
    /// a subset of `user_keys`. The owner cannot be removed.
    pub fn remove_user(&mut self, key: &Key) -> AppResult<()> {
        if !self.user_keys.contains(key) {
            return Err(AppError::NotMember);
        }
        remove_key(&mut self.user_keys, key);
        remove_partial(&mut self.user_partials, &key.id);
        if self.has_rsvp(key) {
            remove_key(&mut self.rsvp_keys, key);
            remove_partial(&mut self.rsvps, &key.id);
        }
        Ok(())
    }

    /// RSVPs an invited user and clears the reads list: a new attendee is
    /// high-signal activity that should re-surface the event as unread for
    /// everyone.
    pub fn add_rsvp(&mut self, user: &User) -> AppResult<()> {
        if self.owner_is(&user.key) || self.has_rsvp(&user.key) {
            return Err(AppError::AlreadyRsvpd);
        }
        if !self.user_keys.contains(&user.key) {
            return Err(AppError::NotMember);
        }
        self.rsvp_keys.push(user.key);
        self.rsvps.push(UserPartial::from(user));
        self.clear_reads();
        Ok(())
    }

    pub fn remove_rsvp(&mut self, key: &Key) -> AppResult<()> {
        if !self.has_rsvp(key) {
            return Err(AppError::NotRsvpd);
        }
        remove_key(&mut self.rsvp_keys, key);
        remove_partial(&mut self.rsvps, &key.id);
        Ok(())
    }

    /// Rewrites every reference to `old` to point at `new` during an
    /// identity merge: membership, RSVPs, reads and ownership. Partial
    /// lists are rebuilt in lock-step with their key lists.
    pub fn reassign_user(&mut self, old: &Key, new: &User) {
        if self.owner_key == *old {
            self.owner_key = new.key;
            self.owner = Some(UserPartial::from(new));
        }

        self.user_keys = swap_keys(&self.user_keys, old, &new.key);
        self.user_keys.retain(|k| *k != self.owner_key);
        self.rsvp_keys = swap_keys(&self.rsvp_keys, old, &new.key);
        self.rsvp_keys.retain(|k| *k != self.owner_key);
        self.reads = swap_read_keys(&self.reads, old, &new.key);

        let mut by_id: HashMap<Uuid, UserPartial> = self
            .user_partials
            .drain(..)
            .map(|p| (p.id, p))
            .collect();
        by_id.insert(new.key.id, UserPartial::from(new));
        self.user_partials = self
            .user_keys
            .iter()
            .filter_map(|k| by_id.get(&k.id).cloned())
            .collect();
        self.rsvps = self
            .rsvp_keys
            .iter()
            .filter_map(|k| by_id.get(&k.id).cloned())
            .collect();
    }

    pub fn is_in_future(&self) -> bool {
        self.timestamp > Utc::now()
    }

    /// The event's start time rendered in its own timezone.
    pub fn formatted_time(&self) -> String {
        let offset = FixedOffset::east_opt(self.utc_offset_seconds)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        self.timestamp
            .with_timezone(&offset)
            .format("%A, %B %-d @ %-I:%M %p")
            .to_string()
    }
}

impl ReadState for Event {
    fn reads(&self) -> &[Read] {
        &self.reads
    }

    fn reads_mut(&mut self) -> &mut Vec<Read> {
        &mut self.reads
    }
}

/// O(1) swap-with-last removal. Order is not preserved; set semantics are.
pub(crate) fn remove_key(keys: &mut Vec<Key>, key: &Key) {
    if let Some(i) = keys.iter().position(|k| k == key) {
        keys.swap_remove(i);
    }
}

pub(crate) fn remove_partial(partials: &mut Vec<UserPartial>, id: &Uuid) {
    if let Some(i) = partials.iter().position(|p| p.id == *id) {
        partials.swap_remove(i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params() -> EventParams {
        EventParams {
            name: "Picnic".into(),
            description: "Lunch in the park".into(),
            place_id: "pl-1".into(),
            address: "1 Park Way".into(),
            lat: 40.78,
            lng: -73.96,
            timestamp: Utc::now() + Duration::days(7),
            utc_offset_seconds: -5 * 3600,
        }
    }

    fn user(name: &str) -> User {
        User::new(&format!("{}@example.com", name), name, "T")
    }

    fn assert_lockstep(event: &Event) {
        assert_eq!(event.user_keys.len(), event.user_partials.len());
        for key in &event.user_keys {
            assert!(event.user_partials.iter().any(|p| p.id == key.id));
        }
        assert_eq!(event.rsvp_keys.len(), event.rsvps.len());
        for key in &event.rsvp_keys {
            assert!(event.rsvps.iter().any(|p| p.id == key.id));
        }
    }

    #[test]
    fn test_new_filters_owner_and_duplicates() {
        let owner = user("owner");
        let guest = user("guest");
        let event = Event::new(params(), &owner, &[&guest, &guest, &owner]).unwrap();

        assert_eq!(event.user_keys, vec![guest.key]);
        assert!(event.has_user(&owner.key));
        assert!(event.has_user(&guest.key));
        assert_lockstep(&event);
    }

    #[test]
    fn test_add_user_rejects_owner_and_duplicates() {
        let owner = user("owner");
        let guest = user("guest");
        let mut event = Event::new(params(), &owner, &[]).unwrap();

        assert!(matches!(event.add_user(&owner), Err(AppError::AlreadyMember)));

        event.add_user(&guest).unwrap();
        assert!(matches!(event.add_user(&guest), Err(AppError::AlreadyMember)));
        assert_lockstep(&event);
    }

    #[test]
    fn test_add_user_enforces_capacity() {
        let owner = user("owner");
        let mut event = Event::new(params(), &owner, &[]).unwrap();
        for i in 0..MAX_EVENT_MEMBERS {
            event.add_user(&user(&format!("guest{}", i))).unwrap();
        }
        let overflow = user("overflow");
        assert!(matches!(
            event.add_user(&overflow),
            Err(AppError::CapacityExceeded)
        ));
        assert_eq!(event.user_keys.len(), MAX_EVENT_MEMBERS);
        assert_lockstep(&event);
    }

    #[test]
    fn test_remove_user_revokes_rsvp() {
        let owner = user("owner");
        let guest = user("guest");
        let mut event = Event::new(params(), &owner, &[&guest]).unwrap();
        event.add_rsvp(&guest).unwrap();

        event.remove_user(&guest.key).unwrap();

        assert!(!event.has_user(&guest.key));
        assert!(!event.has_rsvp(&guest.key));
        assert_lockstep(&event);
    }

    #[test]
    fn test_remove_user_requires_membership() {
        let owner = user("owner");
        let stranger = user("stranger");
        let mut event = Event::new(params(), &owner, &[]).unwrap();

        assert!(matches!(
            event.remove_user(&stranger.key),
            Err(AppError::NotMember)
        ));
        // The owner is not in the member list and cannot be removed.
        let owner_key = owner.key;
        assert!(matches!(
            event.remove_user(&owner_key),
            Err(AppError::NotMember)
        ));
    }

    #[test]
    fn test_add_rsvp_clears_reads() {
        let owner = user("owner");
        let guest = user("guest");
        let other = user("other");
        let mut event = Event::new(params(), &owner, &[&guest, &other]).unwrap();

        let owner_key = owner.key;
        event.mark_read(&owner_key, Utc::now());
        event.mark_read(&other.key, Utc::now());
        assert_eq!(event.reads().len(), 2);

        event.add_rsvp(&guest).unwrap();

        assert!(event.reads().is_empty());
        assert_eq!(event.rsvp_keys, vec![guest.key]);
        assert_lockstep(&event);
    }

    #[test]
    fn test_add_rsvp_rejects_owner_duplicate_and_stranger() {
        let owner = user("owner");
        let guest = user("guest");
        let stranger = user("stranger");
        let mut event = Event::new(params(), &owner, &[&guest]).unwrap();

        assert!(matches!(event.add_rsvp(&owner), Err(AppError::AlreadyRsvpd)));
        assert!(matches!(event.add_rsvp(&stranger), Err(AppError::NotMember)));

        event.add_rsvp(&guest).unwrap();
        assert!(matches!(event.add_rsvp(&guest), Err(AppError::AlreadyRsvpd)));
    }

    #[test]
    fn test_remove_rsvp_keeps_membership_and_reads() {
        let owner = user("owner");
        let guest = user("guest");
        let mut event = Event::new(params(), &owner, &[&guest]).unwrap();
        event.add_rsvp(&guest).unwrap();
        let owner_key = owner.key;
        event.mark_read(&owner_key, Utc::now());

        event.remove_rsvp(&guest.key).unwrap();

        assert!(event.has_user(&guest.key));
        assert!(event.rsvp_keys.is_empty());
        // Removing an RSVP is not high-signal; reads survive.
        assert_eq!(event.reads().len(), 1);

        assert!(matches!(
            event.remove_rsvp(&guest.key),
            Err(AppError::NotRsvpd)
        ));
    }

    #[test]
    fn test_reassign_user_rewrites_membership_rsvps_and_reads() {
        let owner = user("owner");
        let old = user("old");
        let replacement = user("replacement");
        let mut event = Event::new(params(), &owner, &[&old]).unwrap();
        event.add_rsvp(&old).unwrap();
        event.mark_read(&old.key, Utc::now());

        event.reassign_user(&old.key, &replacement);

        assert!(!event.has_user(&old.key));
        assert!(event.has_user(&replacement.key));
        assert_eq!(event.rsvp_keys, vec![replacement.key]);
        assert_eq!(event.reads.len(), 1);
        assert_eq!(event.reads[0].user_key, replacement.key);
        assert_lockstep(&event);
    }

    #[test]
    fn test_reassign_user_handles_merge_into_existing_member() {
        let owner = user("owner");
        let old = user("old");
        let existing = user("existing");
        let mut event = Event::new(params(), &owner, &[&old, &existing]).unwrap();

        event.reassign_user(&old.key, &existing);

        // No duplicate after the swap collapses the two identities.
        assert_eq!(event.user_keys, vec![existing.key]);
        assert_lockstep(&event);
    }

    #[test]
    fn test_reassign_user_transfers_ownership() {
        let owner = user("owner");
        let replacement = user("replacement");
        let guest = user("guest");
        let mut event = Event::new(params(), &owner, &[&guest]).unwrap();

        let old_owner_key = owner.key;
        event.reassign_user(&old_owner_key, &replacement);

        assert!(event.owner_is(&replacement.key));
        assert_eq!(event.owner.as_ref().unwrap().id, replacement.key.id);
        // The new owner never sits in the member list.
        assert!(!event.user_keys.contains(&replacement.key));
        assert_lockstep(&event);
    }
}

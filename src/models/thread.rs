use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::keys::{swap_keys, Key, Kind};
use crate::models::event::{remove_key, remove_partial};
use crate::models::read::{swap_read_keys, Read, ReadState};
use crate::models::user::{User, UserPartial};

/// A multi-party message thread. Like events, the owner is a member
/// implicitly and never appears in `user_keys`; unlike events there is no
/// RSVP state and no member cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub key: Key,
    pub owner_key: Key,
    pub owner: Option<UserPartial>,
    pub subject: String,
    pub user_keys: Vec<Key>,
    pub user_partials: Vec<UserPartial>,
    pub reads: Vec<Read>,
    pub user_reads: Vec<UserPartial>,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(subject: &str, owner: &User, participants: &[&User]) -> Self {
        let mut user_keys = Vec::new();
        let mut user_partials = Vec::new();
        for participant in participants {
            if participant.key == owner.key || user_keys.contains(&participant.key) {
                continue;
            }
            user_keys.push(participant.key);
            user_partials.push(UserPartial::from(*participant));
        }

        Self {
            key: Key::new(Kind::Thread),
            owner_key: owner.key,
            owner: Some(UserPartial::from(owner)),
            subject: subject.to_string(),
            user_keys,
            user_partials,
            reads: Vec::new(),
            user_reads: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn owner_is(&self, key: &Key) -> bool {
        self.owner_key == *key
    }

    pub fn has_user(&self, key: &Key) -> bool {
        self.owner_is(key) || self.user_keys.contains(key)
    }

    pub fn add_user(&mut self, user: &User) -> AppResult<()> {
        if self.owner_is(&user.key) || self.user_keys.contains(&user.key) {
            return Err(AppError::AlreadyMember);
        }
        self.user_keys.push(user.key);
        self.user_partials.push(UserPartial::from(user));
        Ok(())
    }

    pub fn remove_user(&mut self, key: &Key) -> AppResult<()> {
        if !self.user_keys.contains(key) {
            return Err(AppError::NotMember);
        }
        remove_key(&mut self.user_keys, key);
        remove_partial(&mut self.user_partials, &key.id);
        Ok(())
    }

    /// Rewrites every reference to `old` to point at `new` during an
    /// identity merge.
    pub fn reassign_user(&mut self, old: &Key, new: &User) {
        if self.owner_key == *old {
            self.owner_key = new.key;
            self.owner = Some(UserPartial::from(new));
        }

        self.user_keys = swap_keys(&self.user_keys, old, &new.key);
        self.user_keys.retain(|k| *k != self.owner_key);
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
    }
}

impl ReadState for Thread {
    fn reads(&self) -> &[Read] {
        &self.reads
    }

    fn reads_mut(&mut self) -> &mut Vec<Read> {
        &mut self.reads
    }
}

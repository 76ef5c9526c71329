use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity kinds stored in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    User,
    Thread,
    Event,
    Message,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::User => "user",
            Kind::Thread => "thread",
            Kind::Event => "event",
            Kind::Message => "message",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a stored entity. Two keys are equal iff they denote
/// the same stored entity (kind + id). Keys are minted once at creation and
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub kind: Kind,
    pub id: Uuid,
}

impl Key {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
        }
    }

    pub fn from_id(kind: Kind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Removes duplicate keys, keeping the first occurrence of each. Stable and
/// idempotent.
pub fn dedupe_keys(keys: &[Key]) -> Vec<Key> {
    let mut seen = HashSet::with_capacity(keys.len());
    let mut clean = Vec::with_capacity(keys.len());
    for key in keys {
        if seen.insert(*key) {
            clean.push(*key);
        }
    }
    clean
}

/// Replaces every occurrence of `old` with `new`, then dedupes. Applying the
/// same swap twice yields the same list.
pub fn swap_keys(keys: &[Key], old: &Key, new: &Key) -> Vec<Key> {
    let swapped: Vec<Key> = keys
        .iter()
        .map(|k| if k == old { *new } else { *k })
        .collect();
    dedupe_keys(&swapped)
}

/// Unions two key lists without duplicates, preserving `a`'s ordering first.
pub fn merge_keys(a: &[Key], b: &[Key]) -> Vec<Key> {
    let mut all = Vec::with_capacity(a.len() + b.len());
    all.extend_from_slice(a);
    all.extend_from_slice(b);
    dedupe_keys(&all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence_order() {
        let a = Key::new(Kind::User);
        let b = Key::new(Kind::User);
        let c = Key::new(Kind::User);
        let deduped = dedupe_keys(&[a, b, a, c, b]);
        assert_eq!(deduped, vec![a, b, c]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let a = Key::new(Kind::User);
        let b = Key::new(Kind::User);
        let once = dedupe_keys(&[a, a, b]);
        assert_eq!(dedupe_keys(&once), once);
    }

    #[test]
    fn test_swap_replaces_and_dedupes() {
        let old = Key::new(Kind::User);
        let new = Key::new(Kind::User);
        let other = Key::new(Kind::User);
        // A list that already contains the replacement collapses to one entry.
        let swapped = swap_keys(&[old, other, new], &old, &new);
        assert_eq!(swapped, vec![new, other]);
    }

    #[test]
    fn test_swap_is_idempotent() {
        let old = Key::new(Kind::User);
        let new = Key::new(Kind::User);
        let other = Key::new(Kind::User);
        let once = swap_keys(&[old, other], &old, &new);
        assert_eq!(swap_keys(&once, &old, &new), once);
    }

    #[test]
    fn test_swap_distinguishes_kinds_with_same_id() {
        let id = Uuid::new_v4();
        let user = Key::from_id(Kind::User, id);
        let thread = Key::from_id(Kind::Thread, id);
        let new = Key::new(Kind::User);
        // Same id under a different kind is a different reference.
        let swapped = swap_keys(&[user, thread], &user, &new);
        assert_eq!(swapped, vec![new, thread]);
    }

    #[test]
    fn test_merge_preserves_left_ordering() {
        let a = Key::new(Kind::User);
        let b = Key::new(Kind::User);
        let c = Key::new(Kind::User);
        let merged = merge_keys(&[a, b], &[b, c, a]);
        assert_eq!(merged, vec![a, b, c]);
    }

    #[test]
    fn test_merge_with_empty_sides() {
        let a = Key::new(Kind::User);
        assert_eq!(merge_keys(&[], &[a]), vec![a]);
        assert_eq!(merge_keys(&[a], &[]), vec![a]);
        assert!(merge_keys(&[], &[]).is_empty());
    }
}

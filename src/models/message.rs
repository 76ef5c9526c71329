use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::{Key, Kind};
use crate::models::read::{swap_read_keys, Read, ReadState};
use crate::models::user::{User, UserPartial};

/// The entity a message belongs to. Exactly one of a thread or an event,
/// enforced by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "snake_case")]
pub enum ParentKey {
    Thread(Key),
    Event(Key),
}

impl ParentKey {
    pub fn key(&self) -> Key {
        match self {
            ParentKey::Thread(k) | ParentKey::Event(k) => *k,
        }
    }
}

/// A message posted to a thread or an event. Immutable once created except
/// for its reads list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub key: Key,
    /// The author.
    pub user_key: Key,
    pub user: Option<UserPartial>,
    pub parent: ParentKey,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub reads: Vec<Read>,
}

impl Message {
    pub fn new(author: &User, parent: ParentKey, body: &str) -> Self {
        Self {
            key: Key::new(Kind::Message),
            user_key: author.key,
            user: Some(UserPartial::from(author)),
            parent,
            body: body.to_string(),
            timestamp: Utc::now(),
            reads: Vec::new(),
        }
    }

    pub fn author_is(&self, key: &Key) -> bool {
        self.user_key == *key
    }

    /// Reassigns authorship and read ownership during an identity merge.
    pub fn reassign_author(&mut self, old: &Key, new: &User) {
        if self.user_key == *old {
            self.user_key = new.key;
            self.user = Some(UserPartial::from(new));
        }
        self.reads = swap_read_keys(&self.reads, old, &new.key);
    }
}

impl ReadState for Message {
    fn reads(&self) -> &[Read] {
        &self.reads
    }

    fn reads_mut(&mut self) -> &mut Vec<Read> {
        &mut self.reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User::new(&format!("{}@example.com", name), name, "T")
    }

    #[test]
    fn test_new_message_carries_author_partial() {
        let author = user("author");
        let thread_key = Key::new(Kind::Thread);
        let message = Message::new(&author, ParentKey::Thread(thread_key), "hello");

        assert!(message.author_is(&author.key));
        assert_eq!(message.user.as_ref().unwrap().id, author.key.id);
        assert_eq!(message.parent.key(), thread_key);
        assert!(message.reads.is_empty());
    }

    #[test]
    fn test_reassign_author_rewrites_author_and_reads() {
        let old = user("old");
        let reader = user("reader");
        let replacement = user("replacement");
        let mut message = Message::new(&old, ParentKey::Event(Key::new(Kind::Event)), "hi");
        message.mark_read(&old.key, Utc::now());
        message.mark_read(&reader.key, Utc::now());

        message.reassign_author(&old.key, &replacement);

        assert!(message.author_is(&replacement.key));
        assert_eq!(message.user.as_ref().unwrap().id, replacement.key.id);
        assert_eq!(message.reads.len(), 2);
        assert_eq!(message.reads[0].user_key, replacement.key);
        assert_eq!(message.reads[1].user_key, reader.key);
    }

    #[test]
    fn test_reassign_author_leaves_other_authors_alone() {
        let author = user("author");
        let old = user("old");
        let replacement = user("replacement");
        let mut message = Message::new(&author, ParentKey::Thread(Key::new(Kind::Thread)), "hi");
        message.mark_read(&old.key, Utc::now());

        message.reassign_author(&old.key, &replacement);

        assert!(message.author_is(&author.key));
        assert_eq!(message.reads[0].user_key, replacement.key);
    }
}

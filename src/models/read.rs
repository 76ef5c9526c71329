use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::Key;

/// Records when a user last viewed a thread, event or message. At most one
/// record per user per parent entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Read {
    pub user_key: Key,
    pub timestamp: DateTime<Utc>,
}

impl Read {
    pub fn new(user_key: Key, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_key,
            timestamp,
        }
    }
}

/// Shared read-state behavior for every entity that carries a reads list.
pub trait ReadState {
    fn reads(&self) -> &[Read];
    fn reads_mut(&mut self) -> &mut Vec<Read>;

    /// Records that the user viewed this entity. A repeat view replaces the
    /// old timestamp instead of adding a second record.
    fn mark_read(&mut self, user_key: &Key, at: DateTime<Utc>) {
        let reads = self.reads_mut();
        if let Some(existing) = reads.iter_mut().find(|r| r.user_key == *user_key) {
            existing.timestamp = at;
        } else {
            reads.push(Read::new(*user_key, at));
        }
    }

    fn clear_reads(&mut self) {
        self.reads_mut().clear();
    }

    fn read_by(&self, user_key: &Key) -> Option<DateTime<Utc>> {
        self.reads()
            .iter()
            .find(|r| r.user_key == *user_key)
            .map(|r| r.timestamp)
    }

    fn has_read(&self, user_key: &Key) -> bool {
        self.read_by(user_key).is_some()
    }
}

/// Rewrites read ownership from `old` to `new`, deduping by user so `new`
/// never ends up with two records for the same parent. The first record per
/// post-swap user wins. Idempotent.
pub fn swap_read_keys(reads: &[Read], old: &Key, new: &Key) -> Vec<Read> {
    let mut seen = HashSet::with_capacity(reads.len());
    let mut clean = Vec::with_capacity(reads.len());
    for read in reads {
        let user_key = if read.user_key == *old {
            *new
        } else {
            read.user_key
        };
        if seen.insert(user_key) {
            clean.push(Read::new(user_key, read.timestamp));
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Kind;
    use chrono::TimeZone;

    struct Parent {
        reads: Vec<Read>,
    }

    impl ReadState for Parent {
        fn reads(&self) -> &[Read] {
            &self.reads
        }

        fn reads_mut(&mut self) -> &mut Vec<Read> {
            &mut self.reads
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_mark_read_replaces_existing_record() {
        let user = Key::new(Kind::User);
        let mut parent = Parent { reads: vec![] };

        parent.mark_read(&user, ts(100));
        parent.mark_read(&user, ts(200));

        assert_eq!(parent.reads().len(), 1);
        assert_eq!(parent.read_by(&user), Some(ts(200)));
    }

    #[test]
    fn test_swap_read_keys_reassigns_ownership() {
        let old = Key::new(Kind::User);
        let new = Key::new(Kind::User);
        let other = Key::new(Kind::User);
        let reads = vec![Read::new(old, ts(1)), Read::new(other, ts(2))];

        let swapped = swap_read_keys(&reads, &old, &new);

        assert_eq!(swapped.len(), 2);
        assert_eq!(swapped[0].user_key, new);
        assert_eq!(swapped[1].user_key, other);
    }

    #[test]
    fn test_swap_read_keys_dedupes_post_swap() {
        let old = Key::new(Kind::User);
        let new = Key::new(Kind::User);
        // Both identities had read records; after the swap only one survives.
        let reads = vec![Read::new(old, ts(1)), Read::new(new, ts(2))];

        let swapped = swap_read_keys(&reads, &old, &new);

        assert_eq!(swapped.len(), 1);
        assert_eq!(swapped[0].user_key, new);
    }

    #[test]
    fn test_swap_read_keys_is_idempotent() {
        let old = Key::new(Kind::User);
        let new = Key::new(Kind::User);
        let reads = vec![Read::new(old, ts(1)), Read::new(new, ts(2))];
        let once = swap_read_keys(&reads, &old, &new);
        assert_eq!(swap_read_keys(&once, &old, &new), once);
    }
}

pub mod memory;

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::keys::{Key, Kind};
use crate::models::{Event, Message, ParentKey, Thread, User};

pub use memory::MemoryStore;

/// Default attempt budget for optimistic transactions before the conflict
/// surfaces to the caller.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// A stored document. Entities serialize to the store's native JSON
/// document format; the variant tag doubles as the document kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    User(User),
    Thread(Thread),
    Event(Event),
    Message(Message),
}

impl Entity {
    pub fn key(&self) -> Key {
        match self {
            Entity::User(u) => u.key,
            Entity::Thread(t) => t.key,
            Entity::Event(e) => e.key,
            Entity::Message(m) => m.key,
        }
    }

    pub fn kind(&self) -> Kind {
        self.key().kind
    }

    pub fn into_user(self) -> AppResult<User> {
        match self {
            Entity::User(u) => Ok(u),
            other => Err(AppError::KindMismatch {
                expected: Kind::User,
                found: other.kind(),
            }),
        }
    }

    pub fn into_thread(self) -> AppResult<Thread> {
        match self {
            Entity::Thread(t) => Ok(t),
            other => Err(AppError::KindMismatch {
                expected: Kind::Thread,
                found: other.kind(),
            }),
        }
    }

    pub fn into_event(self) -> AppResult<Event> {
        match self {
            Entity::Event(e) => Ok(e),
            other => Err(AppError::KindMismatch {
                expected: Kind::Event,
                found: other.kind(),
            }),
        }
    }

    pub fn into_message(self) -> AppResult<Message> {
        match self {
            Entity::Message(m) => Ok(m),
            other => Err(AppError::KindMismatch {
                expected: Kind::Message,
                found: other.kind(),
            }),
        }
    }
}

impl From<User> for Entity {
    fn from(u: User) -> Self {
        Entity::User(u)
    }
}

impl From<Thread> for Entity {
    fn from(t: Thread) -> Self {
        Entity::Thread(t)
    }
}

impl From<Event> for Entity {
    fn from(e: Event) -> Self {
        Entity::Event(e)
    }
}

impl From<Message> for Entity {
    fn from(m: Message) -> Self {
        Entity::Message(m)
    }
}

/// Equality filters the store can answer from its indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Users whose contact list contains the key.
    ContactsContain(Key),
    /// Threads or events where the key is the owner or a member.
    MembersContain(Key),
    /// Messages authored by the key.
    AuthorIs(Key),
    /// Messages belonging to the thread or event.
    ParentIs(Key),
}

#[derive(Debug, Clone)]
pub struct Query {
    pub kind: Kind,
    pub filter: Filter,
}

impl Query {
    pub fn users_with_contact(key: &Key) -> Self {
        Self {
            kind: Kind::User,
            filter: Filter::ContactsContain(*key),
        }
    }

    pub fn threads_with_member(key: &Key) -> Self {
        Self {
            kind: Kind::Thread,
            filter: Filter::MembersContain(*key),
        }
    }

    pub fn events_with_member(key: &Key) -> Self {
        Self {
            kind: Kind::Event,
            filter: Filter::MembersContain(*key),
        }
    }

    pub fn messages_by_author(key: &Key) -> Self {
        Self {
            kind: Kind::Message,
            filter: Filter::AuthorIs(*key),
        }
    }

    pub fn messages_in(parent: &ParentKey) -> Self {
        Self {
            kind: Kind::Message,
            filter: Filter::ParentIs(parent.key()),
        }
    }
}

/// The durable document store this service runs against. Single-document
/// writes are atomic on their own; anything spanning documents goes through
/// [`StoreTransaction`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &Key) -> AppResult<Entity>;

    /// Batch lookup. The result is aligned to the input keys; absent
    /// documents come back as `None`.
    async fn get_multi(&self, keys: &[Key]) -> AppResult<Vec<Option<Entity>>>;

    async fn put(&self, entity: &Entity) -> AppResult<()>;

    async fn put_multi(&self, entities: &[Entity]) -> AppResult<()>;

    async fn query(&self, query: &Query) -> AppResult<Vec<Entity>>;

    /// Opens an optimistic transaction. Reads through the handle pin the
    /// observed document versions; commit fails with
    /// [`AppError::TransactionConflict`] if any pinned document changed
    /// underneath.
    async fn transaction<'a>(&'a self) -> AppResult<Box<dyn StoreTransaction + 'a>>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, key: &Key) -> AppResult<Entity>;

    async fn get_multi(&mut self, keys: &[Key]) -> AppResult<Vec<Option<Entity>>>;

    /// Stages a write. Nothing is visible outside the transaction until
    /// commit.
    fn put(&mut self, entity: Entity);

    fn put_multi(&mut self, entities: Vec<Entity>);

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Re-runs an optimistic operation (discovery plus transaction) until it
/// commits, a terminal error surfaces, or the attempt budget runs out.
pub async fn run_with_retries<T, F, Fut>(max_attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::debug!(attempt, error = %err, "transaction conflict, retrying");
            }
            result => return result,
        }
    }
}

pub mod contacts;
pub mod events;
pub mod merge;
pub mod messages;
pub mod notify;
pub mod threads;

pub use contacts::ContactService;
pub use events::{EventChanges, EventService};
pub use merge::MergeService;
pub use messages::MessageService;
pub use notify::{LogNotifier, Notification, NotificationKind, Notifier};
pub use threads::ThreadService;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::keys::{merge_keys, swap_keys, Key, Kind};

/// Denormalized read-only projection of a user, embedded in events, threads
/// and messages so listing members never requires fetching every user. This
/// is the only user representation exposed in composites; the full record
/// stays private to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPartial {
    pub id: Uuid,
    pub full_name: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserPartial {
    fn from(user: &User) -> Self {
        Self {
            id: user.key.id,
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub key: Key,
    pub email: String,
    /// Verified secondary addresses. An invite sent to any of these reaches
    /// this account instead of minting a placeholder.
    pub emails: Vec<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub verified: bool,
    pub contact_keys: Vec<Key>,
    /// Set when this identity has been absorbed by another via merge.
    pub merged_into: Option<Key>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, first_name: &str, last_name: &str) -> Self {
        let full_name = format!("{} {}", first_name, last_name).trim().to_string();
        Self {
            key: Key::new(Kind::User),
            email: email.to_lowercase(),
            emails: Vec::new(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            full_name,
            avatar: None,
            verified: false,
            contact_keys: Vec::new(),
            merged_into: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.email == email || self.emails.iter().any(|e| *e == email)
    }

    pub fn add_email(&mut self, email: &str) -> AppResult<()> {
        let email = email.to_lowercase();
        if self.has_email(&email) {
            return Err(AppError::BadRequest(format!(
                "{} is already associated with this account",
                email
            )));
        }
        self.emails.push(email);
        Ok(())
    }

    pub fn remove_email(&mut self, email: &str) -> AppResult<()> {
        let email = email.to_lowercase();
        if self.email == email {
            return Err(AppError::BadRequest(
                "you cannot remove your primary email".into(),
            ));
        }
        let before = self.emails.len();
        self.emails.retain(|e| *e != email);
        if self.emails.len() == before {
            return Err(AppError::BadRequest(format!(
                "{} is not associated with this account",
                email
            )));
        }
        Ok(())
    }

    /// Promotes a secondary email to primary; the old primary becomes
    /// secondary.
    pub fn make_email_primary(&mut self, email: &str) -> AppResult<()> {
        let email = email.to_lowercase();
        if self.email == email {
            return Ok(());
        }
        if !self.emails.iter().any(|e| *e == email) {
            return Err(AppError::BadRequest(format!(
                "{} is not associated with this account",
                email
            )));
        }
        self.emails.retain(|e| *e != email);
        let old_primary = std::mem::replace(&mut self.email, email);
        self.emails.push(old_primary);
        Ok(())
    }

    pub fn has_contact(&self, key: &Key) -> bool {
        self.contact_keys.contains(key)
    }

    pub fn add_contact(&mut self, contact: &User) -> AppResult<()> {
        if contact.key == self.key {
            return Err(AppError::CannotContactSelf);
        }
        if self.has_contact(&contact.key) {
            return Err(AppError::AlreadyContact);
        }
        self.contact_keys.push(contact.key);
        Ok(())
    }

    pub fn remove_contact(&mut self, key: &Key) -> AppResult<()> {
        if !self.has_contact(key) {
            return Err(AppError::NotContact);
        }
        self.contact_keys.retain(|k| k != key);
        Ok(())
    }

    /// Rewrites a contact reference from `old` to `new` during an identity
    /// merge. Never introduces a self-reference or a duplicate.
    pub fn reassign_contact(&mut self, old: &Key, new: &Key) {
        let swapped = swap_keys(&self.contact_keys, old, new);
        self.contact_keys = swapped.into_iter().filter(|k| *k != self.key).collect();
    }

    /// Absorbs another identity into this one: unions contact lists and
    /// email addresses. References to the absorbed identity become
    /// self-references and are removed.
    pub fn merge_with(&mut self, old: &User) {
        let merged = merge_keys(&self.contact_keys, &old.contact_keys);
        let swapped = swap_keys(&merged, &old.key, &self.key);
        self.contact_keys = swapped.into_iter().filter(|k| *k != self.key).collect();

        if !self.has_email(&old.email) {
            self.emails.push(old.email.to_lowercase());
        }
        for email in &old.emails {
            if !self.has_email(email) {
                self.emails.push(email.to_lowercase());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_contact_rejects_self_and_duplicates() {
        let mut alice = User::new("alice@example.com", "Alice", "A");
        let bob = User::new("bob@example.com", "Bob", "B");

        let self_copy = alice.clone();
        assert!(matches!(
            alice.add_contact(&self_copy),
            Err(AppError::CannotContactSelf)
        ));

        alice.add_contact(&bob).unwrap();
        assert!(matches!(
            alice.add_contact(&bob),
            Err(AppError::AlreadyContact)
        ));
        assert_eq!(alice.contact_keys, vec![bob.key]);
    }

    #[test]
    fn test_remove_contact_requires_presence() {
        let mut alice = User::new("alice@example.com", "Alice", "A");
        let bob = User::new("bob@example.com", "Bob", "B");

        assert!(matches!(
            alice.remove_contact(&bob.key),
            Err(AppError::NotContact)
        ));

        alice.add_contact(&bob).unwrap();
        alice.remove_contact(&bob.key).unwrap();
        assert!(alice.contact_keys.is_empty());
    }

    #[test]
    fn test_email_management() {
        let mut user = User::new("primary@example.com", "Pat", "P");
        user.add_email("Second@Example.com").unwrap();
        assert!(user.has_email("second@example.com"));
        assert!(user.add_email("second@example.com").is_err());

        user.make_email_primary("second@example.com").unwrap();
        assert_eq!(user.email, "second@example.com");
        assert!(user.has_email("primary@example.com"));

        assert!(user.remove_email("second@example.com").is_err());
        user.remove_email("primary@example.com").unwrap();
        assert!(!user.has_email("primary@example.com"));
    }

    #[test]
    fn test_merge_with_unions_contacts_and_emails() {
        let carol = User::new("carol@example.com", "Carol", "C");
        let dave = User::new("dave@example.com", "Dave", "D");

        let mut old = User::new("placeholder@example.com", "P", "H");
        old.contact_keys = vec![carol.key, dave.key];
        old.emails = vec!["alias@example.com".into()];

        let mut new = User::new("real@example.com", "Real", "R");
        new.contact_keys = vec![carol.key, old.key];

        new.merge_with(&old);

        // Union without duplicates; the reference to the absorbed identity
        // is gone and no self-reference appeared.
        assert_eq!(new.contact_keys, vec![carol.key, dave.key]);
        assert!(new.has_email("placeholder@example.com"));
        assert!(new.has_email("alias@example.com"));

        // Absorbing the same identity again changes nothing.
        let snapshot = new.clone();
        new.merge_with(&old);
        assert_eq!(new.contact_keys, snapshot.contact_keys);
        assert_eq!(new.emails, snapshot.emails);
    }

    #[test]
    fn test_reassign_contact_drops_self_reference() {
        let old = User::new("old@example.com", "Old", "O");
        let mut holder = User::new("holder@example.com", "Holder", "H");
        holder.contact_keys = vec![old.key];

        let holder_key = holder.key;
        holder.reassign_contact(&old.key, &holder_key);
        assert!(holder.contact_keys.is_empty());
    }
}

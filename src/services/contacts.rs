use crate::error::AppResult;
use crate::hydration::resolve_user;
use crate::keys::Key;
use crate::models::UserPartial;
use crate::state::AppState;
use crate::store::Store;

pub struct ContactService;

impl ContactService {
    /// Adds another user to the actor's contact list. Single-document
    /// mutation; the contact record itself is untouched.
    pub async fn add_contact(
        state: &AppState,
        actor: &Key,
        contact_key: &Key,
    ) -> AppResult<UserPartial> {
        let contact = state.store.get(contact_key).await?.into_user()?;
        let mut user = state.store.get(actor).await?.into_user()?;
        user.add_contact(&contact)?;
        state.store.put(&user.into()).await?;
        Ok(UserPartial::from(&contact))
    }

    pub async fn remove_contact(state: &AppState, actor: &Key, contact_key: &Key) -> AppResult<()> {
        let mut user = state.store.get(actor).await?.into_user()?;
        user.remove_contact(contact_key)?;
        state.store.put(&user.into()).await?;
        Ok(())
    }

    /// The actor's contacts as partials, batch-fetched in one go. Dangling
    /// contact references are dropped from the view like everywhere else.
    pub async fn get_contacts(state: &AppState, actor: &Key) -> AppResult<Vec<UserPartial>> {
        let user = state.store.get(actor).await?.into_user()?;
        let fetched = state.store.get_multi(&user.contact_keys).await?;
        Ok(user
            .contact_keys
            .iter()
            .zip(&fetched)
            .filter_map(|(key, slot)| resolve_user(key, slot))
            .map(|u| UserPartial::from(&u))
            .collect())
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};

use convene_service::models::{EventParams, User};
use convene_service::services::LogNotifier;
use convene_service::store::{MemoryStore, Store};
use convene_service::{AppState, Config};

pub fn test_state() -> (AppState, Arc<MemoryStore>) {
    convene_service::telemetry::init();
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), Arc::new(LogNotifier), Config::default());
    (state, store)
}

pub async fn create_user(state: &AppState, name: &str) -> User {
    let user = User::new(&format!("{}@example.com", name), name, "Tester");
    state
        .store
        .put(&user.clone().into())
        .await
        .expect("seeding a user");
    user
}

pub fn event_params(name: &str) -> EventParams {
    EventParams {
        name: name.to_string(),
        description: "a gathering".to_string(),
        place_id: "place-1".to_string(),
        address: "1 Main St".to_string(),
        lat: 40.7,
        lng: -74.0,
        timestamp: Utc::now() + Duration::days(7),
        utc_offset_seconds: -5 * 3600,
    }
}

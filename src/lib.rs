pub mod config;
pub mod error;
pub mod hydration;
pub mod keys;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use keys::{Key, Kind};
pub use state::AppState;

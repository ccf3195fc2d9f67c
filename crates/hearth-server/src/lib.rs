#![warn(missing_docs)]

//! Hearth HTTP control surface
//!
//! Exposes the instance registry of `hearth-process` over JSON endpoints,
//! with the live console served as a `text/event-stream`.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod settings;
pub mod state;

pub use server::ApiServer;
pub use settings::{Settings, SettingsError, SettingsLoader};
pub use state::AppState;

// Core modules
pub mod api;
pub mod config;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::{AlpacaClient, Venue, VenueError};
pub use config::Settings;
pub use execution::{Driver, DriverState};
pub use models::*;

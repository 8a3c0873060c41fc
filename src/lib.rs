pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod middleware;
pub mod telemetry;
pub mod utils;

pub use app_state::AppState;
pub use config::Config;

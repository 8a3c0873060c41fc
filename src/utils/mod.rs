pub mod api_response;
pub mod assistant;
pub mod error;
pub mod extract;
pub mod permissions;

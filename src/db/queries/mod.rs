pub mod chat;
pub mod product;
pub mod public;
pub mod user;

pub mod business;
pub mod chat;
pub mod product;
pub mod user;

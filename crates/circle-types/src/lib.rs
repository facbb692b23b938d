pub mod api;
pub mod connection;
pub mod events;
pub mod models;

pub mod auth;
pub mod connections;
pub mod error;
pub mod media;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod service;
pub mod state;
pub mod stories;
pub mod users;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

pub mod account;
pub mod auth;
pub mod channel;
pub mod error;
pub mod health;
pub mod media;
pub mod middleware;
pub mod password;
pub mod response;
pub mod routes;
pub mod state;
pub mod tokens;
pub mod uploads;

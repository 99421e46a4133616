pub mod chat;
pub mod clients;
pub mod error;
pub mod health;
pub mod routes;
pub mod stats;

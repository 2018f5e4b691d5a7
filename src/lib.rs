pub mod account;
pub mod auth;
pub mod blob_store;
pub mod configuration;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod validators;

pub mod config;
pub mod errors;
pub mod history;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod reconcile;
pub mod rest;
pub mod seed;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod validate;

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod realtime;
pub mod routes;
pub mod rules;
pub mod schemas;
pub mod store;

pub use client::SplitClient;
pub use error::{BackendError, Error, ValidationError};

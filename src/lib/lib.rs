pub mod amount;
pub mod client;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod format;
pub mod graphql;
pub mod handlers;
pub mod observability;
pub mod query;
pub mod server;
pub mod store;

pub use engine::{Indexer, Outcome};
pub use error::{IndexError, Result};

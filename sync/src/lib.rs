pub mod concurrency;
pub mod connector;
pub mod error;
mod macros;
pub mod mapper;
pub mod persistence;
pub mod pipeline;
pub mod state;
pub mod types;
pub mod workers;

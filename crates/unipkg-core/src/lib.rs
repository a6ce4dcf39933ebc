pub mod adapters;
pub mod config;
pub mod details;
pub mod engine;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod parsing;
pub mod persistence;

pub use engine::Engine;

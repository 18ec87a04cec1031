//! EscalateAI: log customer escalations from a mailbox, score their urgency,
//! notify chat and ticketing, and re-check unresolved High-urgency items.

pub mod analyzer;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod http;
pub mod mail;
mod migrations;
pub mod pipeline;
pub mod poller;
pub mod predictor;
pub mod scheduler;
pub mod sinks;
pub mod state;
pub mod store;
pub mod types;

//! Mailsweep — rule-first inbox triage with incremental runs.

pub mod actions;
pub mod config;
pub mod enrich;
pub mod error;
pub mod mail;
pub mod pipeline;
pub mod provider;
pub mod rules;
pub mod run;
pub mod server;
pub mod state;

//! Deploybot Library
//!
//! Core modules for the conversational deployment orchestrator.

pub mod app;
pub mod chat;
pub mod control;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod intake;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod utils;

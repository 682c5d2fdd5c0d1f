//! Deployment module

pub mod executor;
pub mod fsm;
pub mod service;
pub mod supervisor;

//! Intake conversation

pub mod controller;
pub mod session;
pub mod validate;

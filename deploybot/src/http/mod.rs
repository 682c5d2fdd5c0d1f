//! HTTP clients for external collaborators

pub mod client;
pub mod identity;
pub mod probe;
pub mod provider;

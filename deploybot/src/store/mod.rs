//! Deployment record storage

pub mod backend;
pub mod records;

//! Status and control API

pub mod service;

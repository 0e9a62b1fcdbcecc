//! HTTP handlers

pub mod health;
pub mod process;
pub mod proxy;

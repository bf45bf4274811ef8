//! HTTP handlers

pub mod documents;
pub mod health;
pub mod models;
pub mod records;
pub mod submissions;

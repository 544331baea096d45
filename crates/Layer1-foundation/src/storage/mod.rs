//! Storage module for Errand
//!
//! - `json`: JSON - settings file save/load

mod json;

pub use json::JsonStore;

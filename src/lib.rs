//! WardWatch - live alert listener for the hospital intelligence backend
//!
//! This library provides the alert channel that subscribes to the backend's
//! STOMP alert topic and fans alerts out to listeners, together with a client
//! for the backend's REST API.

pub mod api;
pub mod app;
pub mod channel;
pub mod cli;
pub mod config;
pub mod core;
pub mod network;
pub mod outputs;
pub mod registry;
pub mod sockjs;
pub mod stomp;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
pub use channel::AlertChannel;

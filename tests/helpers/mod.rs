#![allow(dead_code)]

pub mod app;
pub mod fake_transport;
#[cfg(feature = "websocket")]
pub mod mock_broker;

use std::sync::{Arc, Mutex};
use wardwatch::{app::AlertHandler, core::Alert};

/// Builds an `AlertHandler` that records every alert it sees.
pub fn recording_handler() -> (AlertHandler, Arc<Mutex<Vec<Alert>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: AlertHandler = Arc::new(move |alert: &Alert| {
        sink.lock().unwrap().push(alert.clone());
    });
    (handler, seen)
}

/// Encodes a STOMP `MESSAGE` frame for the default alert subscription.
pub fn message_frame(body: &str) -> String {
    format!(
        "MESSAGE\ndestination:/topic/alerts\nsubscription:sub-0\nmessage-id:0\ncontent-length:{}\n\n{}\0",
        body.len(),
        body
    )
}

pub const CONNECTED_FRAME: &str = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0";

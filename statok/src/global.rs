//! The process-wide client facade.
//!
//! Most applications configure one client at startup and report events from
//! anywhere. This module provides that convenience layer over a global
//! [`Client`]; all reporting functions are inert until [`init`] succeeds.

use std::sync::OnceLock;

use crate::{Client, ClientError, Config, DroppedEvent};

static CLIENT: OnceLock<Client> = OnceLock::new();

/// Initializes the global client.
///
/// Fails if the configuration is rejected or if the global client has
/// already been initialized.
pub fn init(config: Config) -> Result<(), ClientError> {
    let client = Client::new(config)?;
    CLIENT
        .set(client)
        .map_err(|_| ClientError::AlreadyInitialized)
}

/// Reports a counter increment through the global client.
pub fn event(name: &str, increment: u32, labels: &[&str]) {
    if let Some(client) = CLIENT.get() {
        client.event(name, increment, labels);
    }
}

/// Reports a counter increment through the global client, surfacing
/// overflow.
pub fn event_with_error(name: &str, increment: u32, labels: &[&str]) -> Result<(), DroppedEvent> {
    match CLIENT.get() {
        Some(client) => client.event_with_error(name, increment, labels),
        None => Ok(()),
    }
}

/// Reports a value observation through the global client.
pub fn event_value(name: &str, value: f32, labels: &[&str]) {
    if let Some(client) = CLIENT.get() {
        client.event_value(name, value, labels);
    }
}

/// Reports a value observation through the global client, surfacing
/// overflow.
pub fn event_value_with_error(name: &str, value: f32, labels: &[&str]) -> Result<(), DroppedEvent> {
    match CLIENT.get() {
        Some(client) => client.event_value_with_error(name, value, labels),
        None => Ok(()),
    }
}

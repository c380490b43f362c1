//! lprgate Notifications
//!
//! This crate provides the outbound side of the gateway:
//! - A client for the messaging relay HTTP API
//! - The vehicle entry message template

pub mod message;
pub mod relay;

pub use message::{ENTRY_TEMPLATE, entry_message, format_template, translate_vehicle_color};
pub use relay::{NotifyError, RelayConfig, RelayNotifier, Result, parse_recipients};

//! Delivery of feed updates to message tasks.
//!
//! [`router::NotificationRouter`] is the entry point: it takes one
//! [`models::NotificationJob`] per aggregation cycle and hands it to the
//! sender matching the task's message type.

pub mod models;
pub mod render;
pub mod router;
pub mod senders;

//! Real-time notification fan-out.
//!
//! The pipeline publishes addressed events here; a socket server (out of
//! scope) subscribes and routes them to the affected student or
//! teacher(s), or to everyone when the recipient cannot be narrowed.

pub mod events;
pub mod hub;

pub use events::{BatchPromptDetail, Event, Notification, PromptRef, Recipient, StudentRef};
pub use hub::NotificationHub;

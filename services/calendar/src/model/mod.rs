//! Calendar data model module.
//!
//! # Purpose
//! Re-exports client, event and date-window types shared by the store, ledger
//! and HTTP layers.
mod client;
mod event;
mod window;

pub use client::{Client, ClientId, ClientRef, ClientStatus, NewClient};
pub use event::{Event, EventDraft, EventId, EventOrigin, EventPatch, EventStatus, NewEvent};
pub use window::DateWindow;

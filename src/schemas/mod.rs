//! Canonical data shapes: the normalized log event.

pub mod event;

pub use event::{Event, EventMetadata, Level};

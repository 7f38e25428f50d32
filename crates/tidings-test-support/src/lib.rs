//! Shared test doubles and utilities for the Tidings notification feed.

mod clock;
mod directory;
mod message_store;

pub use clock::FixedClock;
pub use directory::InMemoryDirectory;
pub use message_store::{FailingMessageStore, InMemoryMessageStore};

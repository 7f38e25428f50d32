//! Application layer: unread count, mark-read and page detail.

pub mod command_handlers;
pub mod query_handlers;

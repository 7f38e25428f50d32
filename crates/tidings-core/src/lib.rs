//! Tidings Core — shared domain types and store abstractions.
//!
//! This crate defines the message model, the store traits for the message
//! log and read cursors, and the read-only collaborator directories the feed
//! resolves entities through. It contains no infrastructure code.

pub mod clock;
pub mod command;
pub mod directory;
pub mod error;
pub mod message;
pub mod repository;

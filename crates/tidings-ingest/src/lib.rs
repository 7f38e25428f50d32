//! Tidings — ingestion gateway.
//!
//! Turns producer events into message rows: resolves the recipient, drops
//! self-notifications and duplicates, and joins the recipient's open
//! aggregate bucket when there is one.

pub mod application;
pub mod domain;

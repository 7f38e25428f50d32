//! Tidings — feed assembly.
//!
//! Renders one page of a user's notifications. Every renderer on the page
//! shares one `PageContext`, whose resolvers coalesce the user, post and
//! comment lookups of the whole page into one query per entity type.

pub mod application;
pub mod batch;
pub mod context;
pub mod domain;
pub mod render;
pub mod resolvers;

//! Application layer: command handlers and the fire-and-forget gateway.

pub mod command_handlers;
pub mod gateway;

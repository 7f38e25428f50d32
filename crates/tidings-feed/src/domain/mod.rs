//! Domain layer: feed commands.

pub mod commands;

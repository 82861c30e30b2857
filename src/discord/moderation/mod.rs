// Discord adapters for the moderation pipeline.

pub mod alerts;
pub mod commands;
pub mod enforcer;
pub mod spam_handler;

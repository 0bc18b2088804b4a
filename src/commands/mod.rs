//! CLI commands

pub mod delete;
pub mod list;
pub mod new;
pub mod show;

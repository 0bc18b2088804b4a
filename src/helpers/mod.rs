//! Small formatting helpers shared by the renderer, the server and the CLI

mod date;
mod html;

pub use date::*;
pub use html::*;

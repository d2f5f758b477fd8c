//! Sources of text for a host or typed session.

pub mod clipboard;
pub mod typed;

pub use clipboard::{ClipboardError, ClipboardWatcher, watch_clipboard};
pub use typed::forward_lines;

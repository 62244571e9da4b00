//! Shared utility functions.

mod html;

pub use html::{html_escape, prettify};

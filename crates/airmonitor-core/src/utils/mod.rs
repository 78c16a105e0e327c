//! Utility functions for formatting readings for display.

pub mod format;

pub use format::{format_level, format_reading, format_window, truncate_string};

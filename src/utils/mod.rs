//! Utils Module
pub mod truncate;

pub use truncate::{char_len, truncate_chars, truncate_owned};

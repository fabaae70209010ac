//! Types shared across the slide crates.

pub mod config;
pub mod types;

pub use config::SlideConfig;
pub use types::{DeckSnapshot, Slide};

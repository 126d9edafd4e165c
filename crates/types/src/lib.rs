//! Shared domain types for the trendstream pipeline
//!
//! This crate defines the records that flow between pipeline stages:
//! - Raw wire schema for incoming post messages
//! - Decoded, validated post events
//! - Per-word mention signals
//! - Windowed count and statistics output records

pub mod events;
pub mod records;

pub use events::{PostEvent, RawAuthorInfos, RawItemInfos, RawMusicInfos, RawPost, WordMention};
pub use records::{Window, WindowedCount, WordStats};

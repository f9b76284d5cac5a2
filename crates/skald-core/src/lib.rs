//! skald-core: Pure types, waveform decoding and text processing.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod announce;
pub mod debounce;
pub mod error;
pub mod text_prep;
pub mod types;
pub mod voice;
pub mod wav;

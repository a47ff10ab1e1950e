//! Hadris CD
//!
//! Sink-facing production task for optical disc images. Builds on
//! [`hadris_iso::IsoImage::format_new`] for the actual ECMA-119/Rock Ridge/
//! Joliet/HFS+/El Torito layout and adds the piece that sits between a
//! finished image and a burn device or file: a bounded ring buffer
//! decoupling the image-writer thread from whatever drains it, plus the
//! `BurnSource` contract that drain side implements.

pub mod raw_sector;

#[cfg(feature = "std")]
pub mod sink;

#[cfg(feature = "std")]
pub use sink::{BurnSource, CdError, RingBufferSink, SinkState, SinkStatus, format_into_sink, will_cancel};

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

/// Algorithms (checksums, forward error correction, scrambling)
pub mod alg;
/// Partition table formats (MBR, GPT, APM, SUN disk label)
pub mod part;
/// Fixed and variable width string encodings used by on-disk structures
pub mod str;
/// Concurrency primitives shared by the optical media sink
#[cfg(feature = "sync")]
pub mod sync;
/// Endian-tagged primitive types
pub mod types;

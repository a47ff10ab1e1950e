/// Endianness markers and the [`Endian`](endian::Endian) conversion trait.
pub mod endian;
/// Fixed-width integer wrappers tagged with an on-disk endianness.
pub mod number;

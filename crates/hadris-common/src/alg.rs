/// Checksum and hash algorithms.
pub mod hash;
/// Reed-Solomon Product Code parity and the ECMA-130 scrambler used for raw
/// sector optical media.
pub mod rspc;

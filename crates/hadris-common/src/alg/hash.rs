/// CRC-32 (ISO-HDLC / "Ethernet" polynomial), used by GPT headers.
#[cfg(feature = "std")]
pub mod crc;
/// MD5, used to tag session/stream checksums (`isofs.ca`/`isofs.cb`/`isofs.cc`).
#[cfg(feature = "std")]
pub mod md5;

use md5::{Digest, Md5};

/// An MD5 digest, as stored in the `CX`/`isofs.cX` checksum tags and the
/// per-file `isofs.cb` extended attribute.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl core::fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental MD5 hasher; mirrors [`Crc32HasherIsoHdlc`](super::crc::Crc32HasherIsoHdlc)'s
/// one-shot `checksum` entry point plus a streaming path for the session
/// checksum tag, which covers the whole image and cannot be buffered at once.
#[derive(Clone)]
pub struct Md5Hasher {
    inner: Md5,
}

impl Md5Hasher {
    pub fn new() -> Self {
        Self { inner: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Md5Digest {
        let digest = self.inner.finalize();
        Md5Digest(digest.into())
    }

    pub fn checksum(data: &[u8]) -> Md5Digest {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_input_matches_known_digest() {
        let digest = Md5Hasher::checksum(b"");
        assert_eq!(
            format!("{:?}", digest),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn incremental_update_matches_one_shot() {
        let mut hasher = Md5Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        let incremental = hasher.finalize();
        let one_shot = Md5Hasher::checksum(b"hello world");
        assert_eq!(incremental, one_shot);
    }
}

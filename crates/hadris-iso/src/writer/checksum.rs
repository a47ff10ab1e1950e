//! The whole-image checksum tag writer.
//!
//! Grounded on the ASCII tag line libisofs stamps into the image
//! (`libisofs_checksum_tag_v1 pos=... range_start=... range_size=...
//! md5=...`): one 2048-byte block holding a human-readable attestation that
//! the MD5 of `[range_start, range_start+range_size)` blocks equals `md5`.
//! This writer always runs last among the data-bearing writers, so by the
//! time its `write_data` fires every earlier writer has already put its
//! bytes on `out`; it reads them back to compute the hash rather than
//! threading partial digests through every other writer.

use alloc::vec::Vec;

use crate::{Error, Read, ReadWriteSeek, Seek, SeekFrom, Write};

use super::{ImageWriter, PipelineState, BLOCK_SIZE};

pub struct ChecksumWriter {
    tag_block: u64,
    range_start: u64,
}

impl ChecksumWriter {
    /// `range_start` is the first block the tag should hash from; superblock
    /// tags hash from block 0, a tree-end tag might start later.
    pub fn new(range_start: u64) -> Self {
        Self {
            tag_block: 0,
            range_start,
        }
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for ChecksumWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        self.tag_block = state.current_block;
        state.current_block += 1;
        Ok(())
    }

    fn write_data(&mut self, _state: &mut PipelineState, out: &mut W) -> Result<(), Error> {
        let range_size = self.tag_block - self.range_start;

        out.seek(SeekFrom::Start(self.range_start * BLOCK_SIZE))?;
        let mut hasher = hadris_common::alg::hash::md5::Md5Hasher::new();
        let mut buf = alloc::vec![0u8; BLOCK_SIZE as usize];
        for _ in 0..range_size {
            out.read_exact(&mut buf)?;
            hasher.update(&buf);
        }
        let digest = hasher.finalize();

        let line = alloc::format!(
            "libisofs_checksum_tag_v1 pos={} range_start={} range_size={} md5={:?}\n",
            self.tag_block,
            self.range_start,
            range_size,
            digest
        );

        let mut block = Vec::with_capacity(BLOCK_SIZE as usize);
        block.extend_from_slice(line.as_bytes());
        block.resize(BLOCK_SIZE as usize, 0);

        out.seek(SeekFrom::Start(self.tag_block * BLOCK_SIZE))?;
        out.write_all(&block)?;
        Ok(())
    }
}

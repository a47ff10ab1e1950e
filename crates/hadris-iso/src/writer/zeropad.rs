//! Trailing zero padding.
//!
//! Reserves a fixed number of extra blocks past the end of the image and
//! zero-fills them, the same role as xorriso's `tail-blocks` option: some
//! burners and virtual drives choke on an image that ends exactly on the
//! last data block.

use alloc::vec::Vec;

use crate::{Error, ReadWriteSeek, SeekFrom, Write};

use super::{ImageWriter, PipelineState, BLOCK_SIZE};

pub struct ZeropadWriter {
    tail_blocks: u64,
    start_block: u64,
}

impl ZeropadWriter {
    pub fn new(tail_blocks: u64) -> Self {
        Self {
            tail_blocks,
            start_block: 0,
        }
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for ZeropadWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        self.start_block = state.current_block;
        state.current_block += self.tail_blocks;
        Ok(())
    }

    fn write_data(&mut self, _state: &mut PipelineState, out: &mut W) -> Result<(), Error> {
        if self.tail_blocks == 0 {
            return Ok(());
        }
        out.seek(SeekFrom::Start(self.start_block * BLOCK_SIZE))?;
        let zeros: Vec<u8> = alloc::vec![0u8; (self.tail_blocks * BLOCK_SIZE) as usize];
        out.write_all(&zeros)?;
        Ok(())
    }
}

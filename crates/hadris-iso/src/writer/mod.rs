//! The writer pipeline.
//!
//! Generalizes the teacher's single-purpose `FileWriter` (one tree, one
//! writer, in `lib.rs`) into an ordered list of independent writers, each
//! contributing to three passes over the image: block accounting
//! (`compute_data_blocks`), volume descriptor fields (`write_vol_desc`), and
//! the data body itself (`write_data`). Concrete writers (ECMA-119, Joliet,
//! ISO 9660:1999, file-source region, checksum tag, tail padding) each own
//! one slice of the image and are run in sequence by [`Pipeline`].

pub mod checksum;
pub mod ecma;
#[cfg(feature = "el-torito")]
pub mod eltorito;
pub mod filesrc;
#[cfg(feature = "hfsplus")]
pub mod hfsplus;
#[cfg(feature = "iso1999")]
pub mod iso1999;
#[cfg(feature = "joliet")]
pub mod joliet;
#[cfg(any(feature = "iso1999", feature = "joliet"))]
mod rawtree;
pub mod zeropad;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use std::io::Cursor;

use hadris_common::alg::hash::md5::Md5Hasher;

use crate::directory::{DirectoryRecord, DirectoryRecordHeader, DirectoryRef};
use crate::{Error, Read, ReadWriteSeek, Seek, SeekFrom};

pub const BLOCK_SIZE: u64 = 2048;

/// Pads `cursor` up to the next block boundary, growing the backing buffer
/// if needed, and returns the padded (block-aligned) byte offset.
pub(crate) fn align_cursor(cursor: &mut Cursor<Vec<u8>>) -> Result<u64, Error> {
    let pos = cursor.stream_position()?;
    let padded = (pos + (BLOCK_SIZE - 1)) & !(BLOCK_SIZE - 1);
    if (cursor.get_ref().len() as u64) < padded {
        cursor.get_mut().resize(padded as usize, 0);
    }
    cursor.seek(SeekFrom::Start(padded))?;
    Ok(padded)
}

pub(crate) fn local_sector(cursor: &mut Cursor<Vec<u8>>) -> u64 {
    cursor.stream_position().unwrap() / BLOCK_SIZE
}

/// Reads the directory records stored at `local_offset..local_offset+size`
/// in `cursor`, mirroring `IsoDir::entries` but against the in-progress
/// in-memory buffer rather than the final output stream.
pub(crate) fn read_local_entries(
    cursor: &mut Cursor<Vec<u8>>,
    local_offset: u64,
    size: u64,
) -> Result<Vec<(u64, DirectoryRecord)>, Error> {
    const HEADER_SIZE: usize = size_of::<DirectoryRecordHeader>();
    cursor.seek(SeekFrom::Start(local_offset))?;
    let mut offset = 0u64;
    let mut entries = Vec::new();
    while offset < size {
        let mut header_bytes = [0u8; HEADER_SIZE];
        cursor.read_exact(&mut header_bytes)?;
        let header = *DirectoryRecordHeader::from_bytes(&header_bytes);
        if header.len == 0 {
            break;
        }
        let mut rest = alloc::vec![0u8; header.len as usize - HEADER_SIZE];
        cursor.read_exact(&mut rest)?;
        let name_len = header.file_identifier_len as usize;
        // A padding byte follows the identifier only when its length is
        // even (ECMA-119 9.1.12); anything after that is the system use
        // area (Rock Ridge et al.), which must survive this round trip so
        // the caller's in-place LBA patch doesn't blank it out.
        let system_use_start = name_len + if name_len % 2 == 0 { 1 } else { 0 };
        let system_use = rest.get(system_use_start..).map(|s| s.to_vec()).unwrap_or_default();
        rest.truncate(name_len);
        offset += header.len as u64;
        entries.push((
            offset,
            DirectoryRecord {
                header,
                name: rest.into(),
                system_use,
            },
        ));
    }
    Ok(entries)
}

/// Process-scoped state threaded through every writer's three passes.
pub struct PipelineState {
    /// Cursor tracking the next free block; each writer's
    /// `compute_data_blocks` advances it by however many blocks it claims.
    pub current_block: u64,
    /// Multi-session image start block, for images appended to an existing
    /// session; `0` for a fresh image.
    pub ms_block: u64,
    /// Offset applied to absolute LBAs in a partition-relative tree copy.
    pub partition_offset: u64,
    /// Set once the final writer has run; total image size in blocks.
    pub total_blocks: u64,
    /// Streaming whole-image checksum, finalized by [`checksum::ChecksumWriter`].
    pub checksum: Md5Hasher,
    /// Running index for per-file checksum tags.
    pub checksum_index: u32,
    /// File data extents keyed by logical path, populated once by
    /// [`filesrc::FilesrcWriter`] and then read by every tree writer so a
    /// file's bytes are written exactly once no matter how many views
    /// reference it.
    pub file_extents: BTreeMap<String, DirectoryRef>,
    /// Hard-link count per logical path, populated alongside `file_extents`:
    /// the size of the identity bucket the path's [`crate::filesrc::SourceKey`]
    /// fell into (spec §4.4 step 3). `1` for paths with no shared identity.
    pub file_nlinks: BTreeMap<String, u32>,
}

impl PipelineState {
    pub fn new(start_block: u64) -> Self {
        Self {
            current_block: start_block,
            ms_block: 0,
            partition_offset: 0,
            total_blocks: 0,
            checksum: Md5Hasher::new(),
            checksum_index: 0,
            file_extents: BTreeMap::new(),
            file_nlinks: BTreeMap::new(),
        }
    }
}

/// One stage of the writer pipeline.
///
/// `compute_data_blocks` must be idempotent-free: it's called exactly once,
/// in pipeline order, and is the only place a writer may claim blocks from
/// [`PipelineState::current_block`]. `write_vol_desc` and `write_data` may
/// assume every writer's layout has already been computed.
pub trait ImageWriter<W: ReadWriteSeek> {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error>;

    /// Patches this writer's fields into the volume descriptor list. Most
    /// writers that don't own a volume descriptor (file source region,
    /// checksum tag, padding) leave this empty.
    fn write_vol_desc(&mut self, _state: &PipelineState, _descriptors: &mut crate::VolumeDescriptorList) {}

    fn write_data(&mut self, state: &mut PipelineState, out: &mut W) -> Result<(), Error>;

    /// Releases any in-memory layout the writer cached between passes.
    fn free_data(&mut self) {}
}

/// Runs an ordered list of [`ImageWriter`]s over a single output stream.
pub struct Pipeline<'a, W: ReadWriteSeek> {
    out: &'a mut W,
    writers: Vec<Box<dyn ImageWriter<W> + 'a>>,
    pub state: PipelineState,
}

impl<'a, W: ReadWriteSeek> Pipeline<'a, W> {
    pub fn new(out: &'a mut W, start_block: u64) -> Self {
        Self {
            out,
            writers: Vec::new(),
            state: PipelineState::new(start_block),
        }
    }

    pub fn push(&mut self, writer: Box<dyn ImageWriter<W> + 'a>) {
        self.writers.push(writer);
    }

    /// Pass 1: freezes every writer's LBAs without touching the output
    /// stream. Used both as the first half of [`Self::run`] and standalone
    /// by callers that only need the final image size (`will_cancel`).
    pub fn compute_layout(&mut self) -> Result<(), Error> {
        for writer in &mut self.writers {
            writer.compute_data_blocks(&mut self.state)?;
        }
        self.state.total_blocks = self.state.current_block;
        Ok(())
    }

    /// Runs all three passes, returning the finished volume descriptor list.
    pub fn run(&mut self) -> Result<crate::VolumeDescriptorList, Error> {
        self.compute_layout()?;

        let mut descriptors = crate::VolumeDescriptorList::empty();
        for writer in &mut self.writers {
            writer.write_vol_desc(&self.state, &mut descriptors);
        }

        for writer in &mut self.writers {
            writer.write_data(&mut self.state, self.out)?;
        }
        for writer in &mut self.writers {
            writer.free_data();
        }

        self.out
            .seek(SeekFrom::Start(self.state.total_blocks * BLOCK_SIZE))?;
        Ok(descriptors)
    }
}

pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.into()
    } else {
        alloc::format!("{parent}/{child}")
    }
}

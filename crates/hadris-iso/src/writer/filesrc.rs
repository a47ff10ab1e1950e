//! The file-source writer: the single owner of the file-data region.
//!
//! Every tree writer (ECMA-119, Joliet, ISO 9660:1999, HFS+) references the
//! same file bytes by logical path; this writer is the only one that
//! actually emits them, deduplicating by content identity through
//! [`crate::filesrc::FileSourceRegistry`] so that hard links and
//! byte-identical files share one extent.

use alloc::vec::Vec;

use crate::directory::DirectoryRef;
use crate::file::File;
use crate::filesrc::{FileSourceRegistry, SourceKey, SourceKind};
use crate::{Error, ReadWriteSeek, SeekFrom, Write};

use super::{ImageWriter, PipelineState, BLOCK_SIZE};

pub struct FilesrcWriter {
    files: Vec<File>,
    registry: FileSourceRegistry,
    /// Extents that actually need bytes written, in write order; duplicate
    /// paths never appear here; they reuse an earlier entry's extent.
    unique_writes: Vec<(DirectoryRef, Vec<u8>)>,
}

impl FilesrcWriter {
    pub fn new(files: Vec<File>) -> Self {
        Self {
            files,
            registry: FileSourceRegistry::new(),
            unique_writes: Vec::new(),
        }
    }

    pub fn extent_for(&self, path: &str) -> Option<DirectoryRef> {
        self.registry.get(path).map(|(_, extent)| extent)
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for FilesrcWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        let mut cursor = state.current_block;
        for file in &self.files {
            // `SourceKey::for_file` prefers the real identity tuple
            // `(fs_id, dev_id, source_ino)` plus an attribute/xattr digest
            // (spec §4.4); only a `File` with no host identity at all falls
            // back to a content digest, matching data that happens to be
            // byte-identical without actually being hard-linked.
            let key = match SourceKey::for_file(file) {
                SourceKey::Unique(_) => SourceKey::ContentHash(SourceKey::hash_content(&file.get_data())),
                key => key,
            };
            if let Some(existing) = self.registry.lookup(&key) {
                self.registry
                    .insert(file.path.clone(), key, SourceKind::File, existing);
                continue;
            }
            let data = file.get_data();
            let blocks = ((data.len() as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1);
            let extent = DirectoryRef {
                offset: cursor,
                size: data.len() as u64,
            };
            cursor += blocks;
            self.unique_writes.push((extent, data));
            self.registry
                .insert(file.path.clone(), key, SourceKind::File, extent);
        }
        state.current_block = cursor;
        for file in &self.files {
            if let Some(extent) = self.extent_for(&file.path) {
                state.file_extents.insert(file.path.clone(), extent);
            }
            state
                .file_nlinks
                .insert(file.path.clone(), self.registry.nlink_for(&file.path));
        }
        Ok(())
    }

    fn write_data(&mut self, _state: &mut PipelineState, out: &mut W) -> Result<(), Error> {
        for (extent, data) in &self.unique_writes {
            out.seek(SeekFrom::Start(extent.offset * BLOCK_SIZE))?;
            out.write_all(data)?;
        }
        if let Some((extent, _)) = self.unique_writes.last() {
            let end = extent.offset * BLOCK_SIZE + extent.size;
            let padded = (end + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1);
            out.seek(SeekFrom::Start(padded))?;
        }
        Ok(())
    }

    fn free_data(&mut self) {
        self.unique_writes.clear();
    }
}

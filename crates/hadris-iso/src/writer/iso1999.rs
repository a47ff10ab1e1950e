//! The ISO 9660:1999 ("enhanced volume descriptor") tree writer.
//!
//! Shares the placeholder/patch directory algorithm with
//! [`super::ecma::EcmaWriter`] via [`super::rawtree`]. The 1999 amendment
//! drops the forced `;1` version suffix and the 8.3/30-char interchange
//! ceiling in favor of a single, much looser 32-character one (mirroring
//! [`crate::types::FileInterchange::NonConformant`], which this reuses
//! directly rather than re-deriving the same truncation rule).

use alloc::string::String;
use alloc::vec::Vec;

use crate::directory::DirectoryRef;
use crate::file::File;
use crate::name;
use crate::path::PathTableRef;
use crate::types::FileInterchange;
use crate::volume::{SupplementaryVolumeDescriptor, VolumeDescriptor};
use crate::{Error, ReadWriteSeek, SeekFrom, Write};

use super::rawtree::write_tree;
use super::{join_path, ImageWriter, PipelineState, BLOCK_SIZE};

/// Writes the ISO 9660:1999 directory tree and its own pair of path tables.
pub struct Iso1999Writer {
    volume_identifier: String,
    dirs: Vec<File>,
    start_block: u64,
    buffer: Vec<u8>,
    root_dir: DirectoryRef,
    path_table: PathTableRef,
}

impl Iso1999Writer {
    pub fn new(volume_identifier: String, mut dirs: Vec<File>) -> Self {
        dirs.sort_by(|a, b| {
            let a_depth = a.path.split('/').count();
            let b_depth = b.path.split('/').count();
            if a_depth == b_depth {
                b.path.len().cmp(&a.path.len())
            } else {
                b_depth.cmp(&a_depth)
            }
        });
        Self {
            volume_identifier,
            dirs,
            start_block: 0,
            buffer: Vec::new(),
            root_dir: DirectoryRef::default(),
            path_table: PathTableRef {
                lpath_table_offset: 0,
                mpath_table_offset: 0,
                size: 0,
            },
        }
    }

    pub fn root_dir(&self) -> DirectoryRef {
        self.root_dir
    }

    pub fn path_table(&self) -> PathTableRef {
        self.path_table
    }

    fn mangled_names(&self) -> alloc::collections::BTreeMap<String, String> {
        let mut out = alloc::collections::BTreeMap::new();
        for dir in &self.dirs {
            let mut entries: Vec<name::MangleEntry> = dir
                .get_children()
                .iter()
                .map(|child| {
                    let fullname = join_path(&dir.path, child);
                    name::MangleEntry {
                        name: child.clone(),
                        is_dir: self.dirs.iter().any(|d| d.path == fullname),
                    }
                })
                .collect();
            // NonConformant-level mangling is the closest existing budget to
            // the 1999 amendment's single relaxed length ceiling; ignore
            // TooManyCollisions here the same way the original mangler's
            // own worst case is surfaced (32 siblings truncating identically
            // and exhausting seven digits of suffixing is already absurd).
            let _ = name::mangle_siblings(&mut entries, FileInterchange::NonConformant);
            for (original, mangled) in dir.get_children().iter().zip(entries.iter()) {
                out.insert(join_path(&dir.path, original), mangled.name.clone());
            }
        }
        out
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for Iso1999Writer {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        self.start_block = state.current_block;
        let mangled = self.mangled_names();

        let (root_dir, path_table, buffer) = write_tree(
            &self.dirs,
            self.start_block,
            state,
            |fullname, child_name, _is_dir| {
                let key = mangled.get(fullname).map(String::as_str).unwrap_or(child_name);
                key.as_bytes().to_vec()
            },
            |bytes| String::from_utf8_lossy(bytes).into_owned(),
        )?;

        let blocks_used = (buffer.len() as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE;
        state.current_block = self.start_block + blocks_used;
        self.root_dir = root_dir;
        self.path_table = path_table;
        self.buffer = buffer;
        Ok(())
    }

    fn write_vol_desc(&mut self, state: &PipelineState, descriptors: &mut crate::VolumeDescriptorList) {
        let mut svd =
            SupplementaryVolumeDescriptor::new_enhanced(&self.volume_identifier, state.total_blocks as u32);
        svd.dir_record.header.extent.write(self.root_dir.offset as u32);
        svd.dir_record.header.data_len.write(self.root_dir.size as u32);
        svd.path_table_size.write(self.path_table.size as u32);
        svd.type_l_path_table.set(self.path_table.lpath_table_offset as u32);
        svd.type_m_path_table.set(self.path_table.mpath_table_offset as u32);
        descriptors.push(VolumeDescriptor::Supplementary(svd));
    }

    fn write_data(&mut self, _state: &mut PipelineState, out: &mut W) -> Result<(), Error> {
        out.seek(SeekFrom::Start(self.start_block * BLOCK_SIZE))?;
        out.write_all(&self.buffer)?;
        Ok(())
    }

    fn free_data(&mut self) {
        self.buffer = Vec::new();
    }
}

//! The Joliet supplementary tree writer.
//!
//! Same two-pass placeholder/patch directory algorithm as
//! [`super::ecma::EcmaWriter`] (shared via [`super::rawtree`]), but
//! identifiers are big-endian UCS-2 produced by [`crate::name::to_joliet`]
//! instead of space-padded `d-characters`, and no `;1` version suffix is
//! forced onto file names.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use crate::directory::DirectoryRef;
use crate::file::File;
use crate::name;
use crate::path::PathTableRef;
use crate::volume::{SupplementaryVolumeDescriptor, VolumeDescriptor};
use crate::{Error, ReadWriteSeek, SeekFrom, Write};

use super::rawtree::write_tree;
use super::{join_path, ImageWriter, PipelineState, BLOCK_SIZE};

fn decode_joliet(bytes: &[u8]) -> String {
    hadris_common::str::utf16::JolietString::from_be_bytes(bytes)
        .and_then(|s| s.decode())
        .unwrap_or_default()
}

/// Writes the Joliet directory tree and its own pair of path tables.
pub struct JolietWriter {
    volume_identifier: String,
    dirs: Vec<File>,
    start_block: u64,
    buffer: Vec<u8>,
    root_dir: DirectoryRef,
    path_table: PathTableRef,
}

impl JolietWriter {
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

    /// Resolves collisions among each directory's children once truncated
    /// to the Joliet name budget, keyed by full path so identically-named
    /// children of different directories never interfere with each other.
    fn mangled_names(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
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
            joliet_mangle(&mut entries);
            for (original, mangled) in dir.get_children().iter().zip(entries.iter()) {
                out.insert(join_path(&dir.path, original), mangled.name.clone());
            }
        }
        out
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for JolietWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        self.start_block = state.current_block;
        let mangled = self.mangled_names();

        let (root_dir, path_table, buffer) = write_tree(
            &self.dirs,
            self.start_block,
            state,
            |fullname, child_name, _is_dir| {
                let key = mangled.get(fullname).map(String::as_str).unwrap_or(child_name);
                name::to_joliet(key)
            },
            decode_joliet,
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
            SupplementaryVolumeDescriptor::new_joliet(&self.volume_identifier, state.total_blocks as u32, 3);
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

/// Disambiguates siblings that collide once truncated to
/// [`name::JOLIET_MAX_CHARS`], the same numeric-suffix strategy
/// [`name::mangle_siblings`] uses for ECMA-119, just against a wider budget.
fn joliet_mangle(entries: &mut [name::MangleEntry]) {
    let mut seen = BTreeSet::new();
    for entry in entries.iter_mut() {
        let truncated: String = entry.name.chars().take(name::JOLIET_MAX_CHARS).collect();
        if seen.insert(truncated.clone()) {
            entry.name = truncated;
            continue;
        }
        let mut n = 1u32;
        loop {
            let suffix = alloc::format!("~{n}");
            let budget = name::JOLIET_MAX_CHARS.saturating_sub(suffix.len());
            let candidate: String = entry.name.chars().take(budget).chain(suffix.chars()).collect();
            if seen.insert(candidate.clone()) {
                entry.name = candidate;
                break;
            }
            n += 1;
        }
    }
}

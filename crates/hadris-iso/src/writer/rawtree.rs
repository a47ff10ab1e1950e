//! Directory-tree writer shared by the views whose identifiers are raw,
//! pre-encoded byte buffers rather than `IsoStringFile` ASCII: Joliet (UCS-2
//! big-endian) and ISO 9660:1999 (UTF-8 passthrough, no forced `;1`).
//!
//! Mirrors [`super::ecma::EcmaWriter`]'s two-phase placeholder/patch
//! algorithm; the only per-view difference is how a name becomes wire bytes
//! and back, supplied by the caller as `encode`/`decode` closures.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::io::Cursor;

use crate::directory::{DirectoryRecord, DirectoryRef, FileFlags};
use crate::file::File;
use crate::path::{PathTableEntry, PathTableRef};
use crate::types::EndianType;
use crate::{Error, ReadWriteSeek, Seek, SeekFrom, Write};

use super::{align_cursor, join_path, local_sector, read_local_entries, PipelineState, BLOCK_SIZE};

/// Writes a directory tree whose names are produced by `encode`, returning
/// the root directory's extent, the finished path table, and the buffer
/// itself (appended at `start_block`).
pub(super) fn write_tree<E, D>(
    dirs: &[File],
    start_block: u64,
    state: &PipelineState,
    encode: E,
    decode: D,
) -> Result<(DirectoryRef, PathTableRef, Vec<u8>), Error>
where
    E: Fn(&str, &str, bool) -> Vec<u8>,
    D: Fn(&[u8]) -> String,
{
    let mut cursor = Cursor::new(Vec::new());
    let dir_refs = write_directories(dirs, &mut cursor, start_block, state, &encode, &decode)?;
    let root_dir = *dir_refs
        .get("")
        .ok_or_else(|| Error::other("missing root directory"))?;
    let path_table = write_path_tables(dirs, &mut cursor, start_block, &dir_refs)?;
    Ok((root_dir, path_table, cursor.into_inner()))
}

fn write_directories<E, D>(
    dirs: &[File],
    cursor: &mut Cursor<Vec<u8>>,
    start_block: u64,
    state: &PipelineState,
    encode: &E,
    decode: &D,
) -> Result<BTreeMap<String, DirectoryRef>, Error>
where
    E: Fn(&str, &str, bool) -> Vec<u8>,
    D: Fn(&[u8]) -> String,
{
    let mut dir_refs: BTreeMap<String, DirectoryRef> = BTreeMap::new();
    let default_entry = DirectoryRecord::with_raw_name(
        alloc::vec![0u8],
        DirectoryRef::default(),
        FileFlags::DIRECTORY,
    );

    for dir in dirs {
        let start_local = local_sector(cursor);
        default_entry.write(cursor)?;
        default_entry.write(cursor)?;

        for child in dir.get_children() {
            let fullname = join_path(&dir.path, child);
            let (is_dir, file_ref) = if let Some(&r) = dir_refs.get(&fullname) {
                (true, r)
            } else {
                (
                    false,
                    state.file_extents.get(&fullname).copied().unwrap_or_default(),
                )
            };
            let flags = if is_dir {
                FileFlags::DIRECTORY
            } else {
                FileFlags::empty()
            };
            let name_bytes = encode(&fullname, child, is_dir);
            DirectoryRecord::with_raw_name(name_bytes, file_ref, flags).write(cursor)?;
        }

        let end_local = align_cursor(cursor)?;
        let directory_ref = DirectoryRef {
            offset: start_block + start_local,
            size: end_local - start_local * BLOCK_SIZE,
        };
        dir_refs.insert(dir.path.clone(), directory_ref);
    }

    let root_dir = *dir_refs
        .get("")
        .ok_or_else(|| Error::other("missing root directory"))?;
    let mut stack = alloc::vec![(root_dir, root_dir, String::new())];

    while let Some((dir_ref, parent_ref, cur_path)) = stack.pop() {
        let local_start = (dir_ref.offset - start_block) * BLOCK_SIZE;
        cursor.seek(SeekFrom::Start(local_start))?;
        DirectoryRecord::with_raw_name(alloc::vec![0u8], dir_ref, FileFlags::DIRECTORY).write(cursor)?;
        DirectoryRecord::with_raw_name(alloc::vec![1u8], parent_ref, FileFlags::DIRECTORY).write(cursor)?;

        let entries = read_local_entries(cursor, local_start, dir_ref.size)?;
        for (rel_offset, entry) in entries
            .iter()
            .filter(|(_, entry)| entry.header.is_directory())
        {
            if entry.name.bytes() == b"\x00" || entry.name.bytes() == b"\x01" {
                continue;
            }
            let orig_name = decode(entry.name.bytes());
            let dirname = join_path(&cur_path, &orig_name);
            let child_ref = *dir_refs
                .get(dirname.as_str())
                .ok_or_else(|| Error::other("directory record has no matching subtree"))?;

            let mut new_entry = entry.clone();
            new_entry.header.extent.write(child_ref.offset as u32);
            new_entry.header.data_len.write(child_ref.size as u32);
            cursor.seek(SeekFrom::Start(local_start + rel_offset - entry.header.len as u64))?;
            new_entry.write(cursor)?;
            stack.push((child_ref, dir_ref, dirname));
        }
    }

    Ok(dir_refs)
}

fn write_path_tables(
    dirs: &[File],
    cursor: &mut Cursor<Vec<u8>>,
    start_block: u64,
    dir_refs: &BTreeMap<String, DirectoryRef>,
) -> Result<PathTableRef, Error> {
    let start_local = local_sector(cursor);
    let mut entries = Vec::new();
    let mut index = 1u16;
    let mut parent_map: BTreeMap<String, u16> = BTreeMap::new();

    let root_dir = *dir_refs.get("").unwrap();
    entries.push(PathTableEntry {
        length: 1,
        extended_attr_record: 0,
        parent_lba: root_dir.offset as u32,
        parent_index: 1,
        name: "\0".to_string(),
    });
    parent_map.insert(String::new(), 1);

    for dir in dirs {
        if dir.path.is_empty() {
            continue;
        }
        let directory_ref = dir_refs.get(&dir.path).unwrap();
        let parent_name = dir.path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        let parent_index = *parent_map.get(parent_name).unwrap_or(&1);
        parent_map.insert(dir.path.clone(), index);
        let name = dir.path.rsplit_once('/').map(|(_, n)| n).unwrap_or(&dir.path);

        entries.push(PathTableEntry {
            length: name.len() as u8,
            name: name.to_string(),
            extended_attr_record: 0,
            parent_lba: directory_ref.offset as u32,
            parent_index,
        });
        index += 1;
    }

    for entry in &entries {
        cursor.write_all(&entry.to_bytes(EndianType::LittleEndian))?;
    }
    let end_l = align_cursor(cursor)?;

    let path_table_ref = PathTableRef {
        lpath_table_offset: start_block + start_local,
        mpath_table_offset: 0,
        size: end_l - start_local * BLOCK_SIZE,
    };

    for entry in &entries {
        cursor.write_all(&entry.to_bytes(EndianType::BigEndian))?;
    }
    align_cursor(cursor)?;

    Ok(PathTableRef {
        mpath_table_offset: path_table_ref.lpath_table_offset + path_table_ref.size / BLOCK_SIZE,
        ..path_table_ref
    })
}

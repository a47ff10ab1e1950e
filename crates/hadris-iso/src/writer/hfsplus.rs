//! HFS+ writer: catalog B-tree, a minimal extents overflow B-tree, an
//! allocation bitmap and a volume header, all embedded in an `Apple_HFS`
//! partition inside the image.
//!
//! Record and node layout follows Apple's published HFS+ volume format:
//! a node descriptor, a run of records, and a reverse-order offset table
//! at the node's tail. Catalog entries are keyed the usual way (folder and
//! file records keyed by `(parentID, name)`, thread records keyed by
//! `(ownID, "")` so a node can be found by ID alone). Index levels are
//! built bottom-up from the leaf row until a single root node remains,
//! the same shape [`super::rawtree`] uses for ECMA-119/Joliet path tables
//! but one level deeper. This does not reproduce Apple's Unicode
//! decomposition tables or a node-bitmap map node, and is not validated
//! bit-for-bit against a real HFS+ driver; see [`name::to_hfs`]'s own
//! caveat about decomposition.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::file::File;
use crate::name;
use crate::types::{BigEndian, Endian, U16, U32, U64};
use crate::{Error, ReadWriteSeek, SeekFrom, Write};

use super::{join_path, ImageWriter, PipelineState, BLOCK_SIZE};

type U16be = U16<BigEndian>;
type U32be = U32<BigEndian>;
type U64be = U64<BigEndian>;

/// Seconds between the Unix epoch and the HFS+ epoch (1904-01-01).
const HFS_EPOCH_OFFSET: u32 = 2_082_844_800;

const K_HFS_ROOT_FOLDER_ID: u32 = 2;
const K_HFS_FIRST_USER_CNID: u32 = 16;

const K_BT_LEAF_NODE: i8 = -1;
const K_BT_INDEX_NODE: i8 = 0;
const K_BT_HEADER_NODE: i8 = 1;

const K_HFS_PLUS_FOLDER_RECORD: i16 = 1;
const K_HFS_PLUS_FILE_RECORD: i16 = 2;
const K_HFS_PLUS_FOLDER_THREAD_RECORD: i16 = 3;
const K_HFS_PLUS_FILE_THREAD_RECORD: i16 = 4;

const K_HFS_VOLUME_UNMOUNTED_BIT: u32 = 1 << 8;
const K_HFS_VOLUME_SOFTWARE_LOCK_BIT: u32 = 1 << 15;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ExtentDescriptor {
    start_block: U32be,
    block_count: U32be,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ForkData {
    logical_size: U64be,
    clump_size: U32be,
    total_blocks: U32be,
    extents: [ExtentDescriptor; 8],
}

impl ForkData {
    fn empty() -> Self {
        bytemuck::Zeroable::zeroed()
    }

    fn single_extent(logical_size: u64, start_block: u32, block_count: u32) -> Self {
        let mut fork = Self::empty();
        fork.logical_size = U64be::new(logical_size);
        fork.total_blocks = U32be::new(block_count);
        if block_count > 0 {
            fork.extents[0] = ExtentDescriptor {
                start_block: U32be::new(start_block),
                block_count: U32be::new(block_count),
            };
        }
        fork
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BsdInfo {
    owner_id: U32be,
    group_id: U32be,
    admin_flags: u8,
    owner_flags: u8,
    file_mode: U16be,
    special: U32be,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FinderInfo16 {
    bytes: [u8; 16],
}

impl FinderInfo16 {
    fn empty() -> Self {
        Self { bytes: [0; 16] }
    }

    /// Finder type/creator codes `"slnk"`/`"rhap"`, used by HFS+ symlinks.
    // Not wired up yet: `File` has no symlink variant for this writer to
    // query.
    #[allow(dead_code)]
    fn symlink() -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(b"slnk");
        bytes[4..8].copy_from_slice(b"rhap");
        Self { bytes }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BTNodeDescriptorRaw {
    f_link: U32be,
    b_link: U32be,
    kind: i8,
    height: u8,
    num_records: U16be,
    reserved: U16be,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BTHeaderRec {
    tree_depth: U16be,
    root_node: U32be,
    leaf_records: U32be,
    first_leaf_node: U32be,
    last_leaf_node: U32be,
    node_size: U16be,
    max_key_length: U16be,
    total_nodes: U32be,
    free_nodes: U32be,
    reserved1: U16be,
    clump_size: U32be,
    btree_type: u8,
    key_compare_type: u8,
    attributes: U32be,
    reserved3: [U32be; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct VolumeHeader {
    signature: [u8; 2],
    version: U16be,
    attributes: U32be,
    last_mounted_version: [u8; 4],
    journal_info_block: U32be,
    create_date: U32be,
    modify_date: U32be,
    backup_date: U32be,
    checked_date: U32be,
    file_count: U32be,
    folder_count: U32be,
    block_size: U32be,
    total_blocks: U32be,
    free_blocks: U32be,
    next_allocation: U32be,
    rsrc_clump_size: U32be,
    data_clump_size: U32be,
    next_catalog_id: U32be,
    write_count: U32be,
    encodings_bitmap: U64be,
    finder_info: [U32be; 8],
    allocation_file: ForkData,
    extents_file: ForkData,
    catalog_file: ForkData,
    attributes_file: ForkData,
    startup_file: ForkData,
}

/// One node's worth of catalog records, plus the key of its first record
/// (needed by the parent index level).
struct BuiltNode {
    first_key: Vec<u8>,
    bytes: Vec<u8>,
}

/// A catalog record before it is packed into a node: its raw key bytes
/// (length-prefixed) and its raw data bytes.
struct CatalogRecord {
    key: Vec<u8>,
    data: Vec<u8>,
}

fn hfs_time(unix_seconds: i64) -> u32 {
    (unix_seconds.max(0) as u32).saturating_add(HFS_EPOCH_OFFSET)
}

/// Builds the length-prefixed `(parentID, nodeName)` catalog key. `name_be`
/// is the name already encoded as [`name::to_hfs`] produces it: big-endian
/// UTF-16 code unit bytes.
fn build_key(parent_id: u32, name_be: &[u8]) -> Vec<u8> {
    let char_count = (name_be.len() / 2) as u16;
    let mut out = Vec::with_capacity(8 + name_be.len());
    out.extend_from_slice(&0u16.to_be_bytes()); // patched below
    out.extend_from_slice(&parent_id.to_be_bytes());
    out.extend_from_slice(&char_count.to_be_bytes());
    out.extend_from_slice(name_be);
    let key_len = (out.len() - 2) as u16;
    out[0..2].copy_from_slice(&key_len.to_be_bytes());
    out
}

fn compare_keys(a: &[u8], b: &[u8]) -> core::cmp::Ordering {
    // Skip the 2-byte keyLength prefix; compare parentID then nodeName.
    a[2..].cmp(&b[2..])
}

/// Packs a node descriptor and a set of already-built records into one
/// fixed-size node, trailing a reverse-order record offset table.
fn pack_node(descriptor: BTNodeDescriptorRaw, records: &[Vec<u8>], node_size: usize) -> Vec<u8> {
    let mut buf = alloc::vec![0u8; node_size];
    buf[0..14].copy_from_slice(bytemuck::bytes_of(&descriptor));

    let mut offsets = Vec::with_capacity(records.len() + 1);
    let mut cursor = 14usize;
    offsets.push(cursor as u16);
    for rec in records {
        buf[cursor..cursor + rec.len()].copy_from_slice(rec);
        cursor += rec.len();
        if cursor % 2 != 0 {
            cursor += 1;
        }
        offsets.push(cursor as u16);
    }

    let mut pos = node_size;
    for off in offsets.iter().rev() {
        pos -= 2;
        buf[pos..pos + 2].copy_from_slice(&off.to_be_bytes());
    }
    buf
}

/// Groups leaf/index rows into fixed-capacity nodes and recurses upward
/// until a single root node remains, returning every node in final
/// left-to-right, bottom-to-top emission order plus the root's index.
fn build_btree_levels(
    leaf_records: Vec<Vec<CatalogRecord>>,
    node_size: usize,
    header_node_count: usize,
) -> (Vec<BuiltNode>, u32, u16) {
    let mut levels: Vec<Vec<BuiltNode>> = Vec::new();

    let leaf_node_count = leaf_records.len();
    let mut leaves = Vec::with_capacity(leaf_node_count);
    for (i, recs) in leaf_records.into_iter().enumerate() {
        let first_key = recs.first().map(|r| r.key.clone()).unwrap_or_default();
        let raw: Vec<Vec<u8>> = recs
            .into_iter()
            .map(|r| {
                let mut rec = r.key;
                rec.extend_from_slice(&r.data);
                rec
            })
            .collect();
        let f_link = if i + 1 < leaf_node_count {
            (header_node_count + i + 1) as u32
        } else {
            0
        };
        let b_link = if i > 0 { (header_node_count + i - 1) as u32 } else { 0 };
        let descriptor = BTNodeDescriptorRaw {
            f_link: U32be::new(f_link),
            b_link: U32be::new(b_link),
            kind: K_BT_LEAF_NODE,
            height: 1,
            num_records: U16be::new(raw.len() as u16),
            reserved: U16be::new(0),
        };
        leaves.push(BuiltNode {
            first_key,
            bytes: pack_node(descriptor, &raw, node_size),
        });
    }
    levels.push(leaves);

    let mut height = 1u8;
    loop {
        let current = levels.last().unwrap();
        if current.len() <= 1 {
            break;
        }
        height += 1;
        let base = header_node_count + levels.iter().map(|l| l.len()).sum::<usize>() - current.len();
        let mut next_level = Vec::new();
        let mut i = 0usize;
        // Greedily pack child pointers into index nodes of node_size capacity.
        let mut pending: Vec<(Vec<u8>, u32)> = current
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.first_key.clone(), (base + idx) as u32))
            .collect();
        while i < pending.len() {
            let mut records: Vec<Vec<u8>> = Vec::new();
            let mut used = 14usize;
            let mut first_key_of_node = None;
            while i < pending.len() {
                let (ref key, child) = pending[i];
                let mut rec = key.clone();
                rec.extend_from_slice(&child.to_be_bytes());
                let rec_len = rec.len() + (rec.len() % 2);
                if used + rec_len + 2 > node_size && !records.is_empty() {
                    break;
                }
                if first_key_of_node.is_none() {
                    first_key_of_node = Some(key.clone());
                }
                used += rec_len + 2;
                records.push(rec);
                i += 1;
            }
            next_level.push((first_key_of_node.unwrap_or_default(), records));
        }

        let next_node_count = next_level.len();
        let next_base = header_node_count + levels.iter().map(|l| l.len()).sum::<usize>();
        let built: Vec<BuiltNode> = next_level
            .into_iter()
            .enumerate()
            .map(|(idx, (first_key, records))| {
                let f_link = if idx + 1 < next_node_count {
                    (next_base + idx + 1) as u32
                } else {
                    0
                };
                let b_link = if idx > 0 { (next_base + idx - 1) as u32 } else { 0 };
                let descriptor = BTNodeDescriptorRaw {
                    f_link: U32be::new(f_link),
                    b_link: U32be::new(b_link),
                    kind: K_BT_INDEX_NODE,
                    height,
                    num_records: U16be::new(records.len() as u16),
                    reserved: U16be::new(0),
                };
                BuiltNode {
                    first_key,
                    bytes: pack_node(descriptor, &records, node_size),
                }
            })
            .collect();
        levels.push(built);
    }

    let total_before_root: usize = levels[..levels.len() - 1].iter().map(|l| l.len()).sum();
    let root_index = (header_node_count + total_before_root) as u32;
    let tree_depth = levels.len() as u16;

    let mut all = Vec::new();
    for level in levels {
        all.extend(level);
    }
    (all, root_index, tree_depth)
}

/// One directory or file entry destined for the HFS+ catalog.
struct CatalogEntry {
    cnid: u32,
    parent_cnid: u32,
    name: String,
    is_dir: bool,
    valence: u32,
    data_extent: Option<(u64, u64)>,
}

/// Writes the HFS+ catalog B-tree, a minimal extents overflow B-tree, an
/// allocation bitmap and a volume header into one partition.
pub struct HfsPlusWriter {
    volume_identifier: String,
    apm_block_size: u32,
    dirs: Vec<File>,
    start_block: u64,
    partition_blocks: u64,
    buffer: Vec<u8>,
}

impl HfsPlusWriter {
    pub fn new(volume_identifier: String, apm_block_size: u32, mut dirs: Vec<File>) -> Self {
        dirs.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            volume_identifier,
            apm_block_size,
            dirs,
            start_block: 0,
            partition_blocks: 0,
            buffer: Vec::new(),
        }
    }

    pub fn partition_blocks(&self) -> u64 {
        self.partition_blocks
    }

    fn node_size(&self) -> usize {
        (2 * self.apm_block_size) as usize
    }

    fn collect_entries(&self, state: &PipelineState) -> Vec<CatalogEntry> {
        let mut entries = Vec::new();
        let mut next_cnid = K_HFS_FIRST_USER_CNID;
        let mut cnid_of: BTreeMap<String, u32> = BTreeMap::new();
        cnid_of.insert(String::new(), K_HFS_ROOT_FOLDER_ID);

        for dir in &self.dirs {
            if dir.path.is_empty() {
                continue;
            }
            cnid_of.insert(dir.path.clone(), next_cnid);
            next_cnid += 1;
        }

        for dir in &self.dirs {
            let parent_cnid = *cnid_of.get(&dir.path).unwrap();
            for child in dir.get_children() {
                let fullname = join_path(&dir.path, child);
                let is_dir = self.dirs.iter().any(|d| d.path == fullname);
                if is_dir {
                    entries.push(CatalogEntry {
                        cnid: *cnid_of.get(&fullname).unwrap(),
                        parent_cnid,
                        name: child.clone(),
                        is_dir: true,
                        valence: self
                            .dirs
                            .iter()
                            .find(|d| d.path == fullname)
                            .map(|d| d.get_children().len() as u32)
                            .unwrap_or(0),
                        data_extent: None,
                    });
                } else {
                    let cnid = next_cnid;
                    next_cnid += 1;
                    let extent = state
                        .file_extents
                        .get(&fullname)
                        .map(|r| (r.offset, r.size));
                    entries.push(CatalogEntry {
                        cnid,
                        parent_cnid,
                        name: child.clone(),
                        is_dir: false,
                        valence: 0,
                        data_extent: extent,
                    });
                }
            }
        }
        entries
    }

    fn build_catalog_records(&self, entries: &[CatalogEntry]) -> Vec<CatalogRecord> {
        let now = hfs_time(0);
        let mut records = Vec::new();

        // Root folder's own thread record, keyed by (rootID, "").
        records.push(CatalogRecord {
            key: build_key(K_HFS_ROOT_FOLDER_ID, &[]),
            data: thread_record_bytes(K_HFS_PLUS_FOLDER_THREAD_RECORD, 1, &[]),
        });

        for entry in entries {
            let (name_be, _cmp_key) = name::to_hfs(&entry.name);
            if entry.is_dir {
                records.push(CatalogRecord {
                    key: build_key(entry.parent_cnid, &name_be),
                    data: folder_record_bytes(entry.cnid, entry.valence, now),
                });
                records.push(CatalogRecord {
                    key: build_key(entry.cnid, &[]),
                    data: thread_record_bytes(K_HFS_PLUS_FOLDER_THREAD_RECORD, entry.parent_cnid, &name_be),
                });
            } else {
                let (start, size) = entry.data_extent.unwrap_or((0, 0));
                records.push(CatalogRecord {
                    key: build_key(entry.parent_cnid, &name_be),
                    data: file_record_bytes(entry.cnid, start, size, now),
                });
                records.push(CatalogRecord {
                    key: build_key(entry.cnid, &[]),
                    data: thread_record_bytes(K_HFS_PLUS_FILE_THREAD_RECORD, entry.parent_cnid, &name_be),
                });
            }
        }

        records.sort_by(|a, b| compare_keys(&a.key, &b.key));
        records
    }
}

fn folder_record_bytes(folder_id: u32, valence: u32, now: u32) -> Vec<u8> {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Rec {
        record_type: U16be,
        flags: U16be,
        valence: U32be,
        folder_id: U32be,
        create_date: U32be,
        content_mod_date: U32be,
        attribute_mod_date: U32be,
        access_date: U32be,
        backup_date: U32be,
        permissions: BsdInfo,
        user_info: FinderInfo16,
        finder_info: FinderInfo16,
        text_encoding: U32be,
        reserved: U32be,
    }
    let rec = Rec {
        record_type: U16be::new(K_HFS_PLUS_FOLDER_RECORD as u16),
        flags: U16be::new(0),
        valence: U32be::new(valence),
        folder_id: U32be::new(folder_id),
        create_date: U32be::new(now),
        content_mod_date: U32be::new(now),
        attribute_mod_date: U32be::new(now),
        access_date: U32be::new(now),
        backup_date: U32be::new(0),
        permissions: bytemuck::Zeroable::zeroed(),
        user_info: FinderInfo16::empty(),
        finder_info: FinderInfo16::empty(),
        text_encoding: U32be::new(0),
        reserved: U32be::new(0),
    };
    bytemuck::bytes_of(&rec).to_vec()
}

fn file_record_bytes(file_id: u32, extent_start: u64, extent_size: u64, now: u32) -> Vec<u8> {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Rec {
        record_type: U16be,
        flags: U16be,
        reserved1: U32be,
        file_id: U32be,
        create_date: U32be,
        content_mod_date: U32be,
        attribute_mod_date: U32be,
        access_date: U32be,
        backup_date: U32be,
        permissions: BsdInfo,
        user_info: FinderInfo16,
        finder_info: FinderInfo16,
        text_encoding: U32be,
        reserved2: U32be,
        data_fork: ForkData,
        resource_fork: ForkData,
    }
    let blocks = if extent_size == 0 {
        0
    } else {
        ((extent_size + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32
    };
    let rec = Rec {
        record_type: U16be::new(K_HFS_PLUS_FILE_RECORD as u16),
        flags: U16be::new(0),
        reserved1: U32be::new(0),
        file_id: U32be::new(file_id),
        create_date: U32be::new(now),
        content_mod_date: U32be::new(now),
        attribute_mod_date: U32be::new(now),
        access_date: U32be::new(now),
        backup_date: U32be::new(0),
        permissions: bytemuck::Zeroable::zeroed(),
        user_info: FinderInfo16::empty(),
        finder_info: FinderInfo16::empty(),
        text_encoding: U32be::new(0),
        reserved2: U32be::new(0),
        data_fork: ForkData::single_extent(extent_size, extent_start as u32, blocks),
        resource_fork: ForkData::empty(),
    };
    bytemuck::bytes_of(&rec).to_vec()
}

fn thread_record_bytes(record_type: i16, parent_id: u32, name_be: &[u8]) -> Vec<u8> {
    let char_count = (name_be.len() / 2) as u16;
    let mut out = Vec::with_capacity(8 + name_be.len());
    out.extend_from_slice(&(record_type as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&parent_id.to_be_bytes());
    out.extend_from_slice(&char_count.to_be_bytes());
    out.extend_from_slice(name_be);
    out
}

impl<W: ReadWriteSeek> ImageWriter<W> for HfsPlusWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        self.start_block = state.current_block;
        let node_size = self.node_size();

        let entries = self.collect_entries(state);
        let records = self.build_catalog_records(&entries);

        // Pack catalog leaf records into fixed-size leaf nodes, each
        // holding as many whole records as fit.
        let mut leaf_rows: Vec<Vec<CatalogRecord>> = Vec::new();
        let mut current: Vec<CatalogRecord> = Vec::new();
        let mut used = 14usize;
        for rec in records {
            let rec_len = rec.key.len() + rec.data.len();
            let padded = rec_len + (rec_len % 2);
            if used + padded + 2 > node_size && !current.is_empty() {
                leaf_rows.push(core::mem::take(&mut current));
                used = 14;
            }
            used += padded + 2;
            current.push(rec);
        }
        if !current.is_empty() {
            leaf_rows.push(current);
        }
        if leaf_rows.is_empty() {
            leaf_rows.push(Vec::new());
        }
        let leaf_count = leaf_rows.len() as u32;
        let leaf_records_total: u32 = leaf_rows.iter().map(|r| r.len() as u32).sum();

        // Node 0 is the header node; catalog leaves/index nodes follow it.
        let (nodes, root_node, tree_depth) = build_btree_levels(leaf_rows, node_size, 1);
        let total_catalog_nodes = 1 + nodes.len() as u32;

        let header_rec = BTHeaderRec {
            tree_depth: U16be::new(tree_depth),
            root_node: U32be::new(root_node),
            leaf_records: U32be::new(leaf_records_total),
            first_leaf_node: U32be::new(1),
            last_leaf_node: U32be::new(leaf_count),
            node_size: U16be::new(node_size as u16),
            max_key_length: U16be::new(516),
            total_nodes: U32be::new(total_catalog_nodes),
            free_nodes: U32be::new(0),
            reserved1: U16be::new(0),
            clump_size: U32be::new(node_size as u32),
            btree_type: 0,
            key_compare_type: 0xBC, // kHFSBinaryCompare
            attributes: U32be::new(0x0000_0002), // kBTBigKeysMask
            reserved3: [U32be::new(0); 16],
        };

        let mut header_node_body = Vec::new();
        header_node_body.extend_from_slice(bytemuck::bytes_of(&header_rec));
        header_node_body.extend_from_slice(&alloc::vec![0u8; 128]); // userData
        let map_len = node_size.saturating_sub(14 + core::mem::size_of::<BTHeaderRec>() + 128 + 2 * 3);
        header_node_body.extend_from_slice(&alloc::vec![0u8; map_len]);
        let header_records = alloc::vec![
            header_node_body[0..core::mem::size_of::<BTHeaderRec>()].to_vec(),
            header_node_body[core::mem::size_of::<BTHeaderRec>()..core::mem::size_of::<BTHeaderRec>() + 128].to_vec(),
            header_node_body[core::mem::size_of::<BTHeaderRec>() + 128..].to_vec(),
        ];
        let header_descriptor = BTNodeDescriptorRaw {
            f_link: U32be::new(0),
            b_link: U32be::new(0),
            kind: K_BT_HEADER_NODE,
            height: 0,
            num_records: U16be::new(3),
            reserved: U16be::new(0),
        };
        let header_node = pack_node(header_descriptor, &header_records, node_size);

        let mut catalog_bytes = Vec::with_capacity(node_size * total_catalog_nodes as usize);
        catalog_bytes.extend_from_slice(&header_node);
        for node in &nodes {
            catalog_bytes.extend_from_slice(&node.bytes);
        }
        let catalog_blocks = ((catalog_bytes.len() as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1);

        // A minimal extents overflow tree: header node only, no overflow
        // records (no file here is fragmented across more than 8 extents).
        let extents_header_rec = BTHeaderRec {
            tree_depth: U16be::new(0),
            root_node: U32be::new(0),
            leaf_records: U32be::new(0),
            first_leaf_node: U32be::new(0),
            last_leaf_node: U32be::new(0),
            node_size: U16be::new(node_size as u16),
            max_key_length: U16be::new(10),
            total_nodes: U32be::new(1),
            free_nodes: U32be::new(0),
            reserved1: U16be::new(0),
            clump_size: U32be::new(node_size as u32),
            btree_type: 0,
            key_compare_type: 0xBC,
            attributes: U32be::new(0x0000_0002),
            reserved3: [U32be::new(0); 16],
        };
        let mut extents_body = Vec::new();
        extents_body.extend_from_slice(bytemuck::bytes_of(&extents_header_rec));
        extents_body.extend_from_slice(&alloc::vec![0u8; 128]);
        let ext_map_len = node_size.saturating_sub(14 + core::mem::size_of::<BTHeaderRec>() + 128 + 2 * 3);
        extents_body.extend_from_slice(&alloc::vec![0u8; ext_map_len]);
        let extents_records = alloc::vec![
            extents_body[0..core::mem::size_of::<BTHeaderRec>()].to_vec(),
            extents_body[core::mem::size_of::<BTHeaderRec>()..core::mem::size_of::<BTHeaderRec>() + 128].to_vec(),
            extents_body[core::mem::size_of::<BTHeaderRec>() + 128..].to_vec(),
        ];
        let extents_descriptor = BTNodeDescriptorRaw {
            f_link: U32be::new(0),
            b_link: U32be::new(0),
            kind: K_BT_HEADER_NODE,
            height: 0,
            num_records: U16be::new(3),
            reserved: U16be::new(0),
        };
        let extents_node = pack_node(extents_descriptor, &extents_records, node_size);
        let extents_blocks = ((extents_node.len() as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1);

        // Volume header occupies one block at relative block 2; the
        // catalog file, extents file and allocation bitmap follow it, and
        // a duplicate header closes the partition.
        let mut layout_block = 3u64; // blocks 0-1 reserved, block 2 = volume header
        let catalog_start = layout_block;
        layout_block += catalog_blocks;
        let extents_start = layout_block;
        layout_block += extents_blocks;

        // The bitmap's own size depends on the final block count, which
        // depends on the bitmap's size; size it from an estimate with
        // generous slack rather than iterating to a fixed point; the
        // actual bit count set below is always checked against capacity.
        let provisional_total = layout_block + 1; // + trailing duplicate header
        let bitmap_bits = (provisional_total + 64).max(1);
        let bitmap_bytes = (bitmap_bits + 7) / 8;
        let bitmap_blocks = ((bitmap_bytes + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1);
        let bitmap_start = layout_block;
        layout_block += bitmap_blocks;

        let total_blocks = layout_block + 1; // + duplicate volume header
        let duplicate_header_block = total_blocks - 1;
        self.partition_blocks = total_blocks;

        let mut bitmap = alloc::vec![0u8; (bitmap_blocks * BLOCK_SIZE) as usize];
        for block in 0..total_blocks.min(bitmap.len() as u64 * 8) {
            bitmap[(block / 8) as usize] |= 1 << (7 - (block % 8));
        }

        let now = hfs_time(0);
        let volume_header = VolumeHeader {
            signature: *b"H+",
            version: U16be::new(4),
            attributes: U32be::new(K_HFS_VOLUME_UNMOUNTED_BIT | K_HFS_VOLUME_SOFTWARE_LOCK_BIT),
            last_mounted_version: *b"hdis",
            journal_info_block: U32be::new(0),
            create_date: U32be::new(now),
            modify_date: U32be::new(now),
            backup_date: U32be::new(0),
            checked_date: U32be::new(now),
            file_count: U32be::new(entries.iter().filter(|e| !e.is_dir).count() as u32),
            folder_count: U32be::new(entries.iter().filter(|e| e.is_dir).count() as u32),
            block_size: U32be::new(BLOCK_SIZE as u32),
            total_blocks: U32be::new(total_blocks as u32),
            free_blocks: U32be::new(0),
            next_allocation: U32be::new(0),
            rsrc_clump_size: U32be::new(BLOCK_SIZE as u32),
            data_clump_size: U32be::new(BLOCK_SIZE as u32),
            next_catalog_id: U32be::new(K_HFS_FIRST_USER_CNID + entries.len() as u32),
            write_count: U32be::new(1),
            encodings_bitmap: U64be::new(1),
            finder_info: [U32be::new(0); 8],
            allocation_file: ForkData::single_extent(
                bitmap_blocks * BLOCK_SIZE,
                bitmap_start as u32,
                bitmap_blocks as u32,
            ),
            extents_file: ForkData::single_extent(
                extents_node.len() as u64,
                extents_start as u32,
                extents_blocks as u32,
            ),
            catalog_file: ForkData::single_extent(
                catalog_bytes.len() as u64,
                catalog_start as u32,
                catalog_blocks as u32,
            ),
            attributes_file: ForkData::empty(),
            startup_file: ForkData::empty(),
        };

        let mut image = alloc::vec![0u8; (total_blocks * BLOCK_SIZE) as usize];
        let header_bytes = bytemuck::bytes_of(&volume_header);
        image[2 * BLOCK_SIZE as usize..2 * BLOCK_SIZE as usize + header_bytes.len()]
            .copy_from_slice(header_bytes);
        image[duplicate_header_block as usize * BLOCK_SIZE as usize
            ..duplicate_header_block as usize * BLOCK_SIZE as usize + header_bytes.len()]
            .copy_from_slice(header_bytes);

        image[(catalog_start * BLOCK_SIZE) as usize..(catalog_start * BLOCK_SIZE) as usize + catalog_bytes.len()]
            .copy_from_slice(&catalog_bytes);
        image[(extents_start * BLOCK_SIZE) as usize..(extents_start * BLOCK_SIZE) as usize + extents_node.len()]
            .copy_from_slice(&extents_node);
        image[(bitmap_start * BLOCK_SIZE) as usize..(bitmap_start * BLOCK_SIZE) as usize + bitmap.len()]
            .copy_from_slice(&bitmap);

        self.buffer = image;
        state.current_block = self.start_block + total_blocks;
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_key_sorts_by_parent_then_name() {
        let (alpha, _) = name::to_hfs("alpha");
        let (beta, _) = name::to_hfs("beta");
        let a = build_key(16, &alpha);
        let b = build_key(16, &beta);
        assert_eq!(compare_keys(&a, &b), core::cmp::Ordering::Less);
    }

    #[test]
    fn hfs_time_applies_epoch_offset() {
        assert_eq!(hfs_time(0), HFS_EPOCH_OFFSET);
    }

    #[test]
    fn to_hfs_comparison_key_is_case_insensitive() {
        let (_, upper) = name::to_hfs("README");
        let (_, lower) = name::to_hfs("readme");
        assert_eq!(upper, lower);
    }
}

//! The ECMA-119 (plain ISO 9660) tree writer.
//!
//! Adapted from the teacher's `FileWriter::{write_file_data,
//! write_directory_data, write_path_table}`: the same two-pass directory
//! layout (write placeholder self/parent entries, append mangled children,
//! then patch self/parent and child LBAs once every directory has a home)
//! but split so that sizing and serialization happen in
//! `compute_data_blocks` against an in-memory buffer, and `write_data` only
//! flushes that buffer to the real output at its now-known final position.
//! This is what lets the writer sit in an ordered pipeline instead of
//! owning the whole format step.

use std::io::Cursor;

use alloc::borrow::Cow;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::directory::{DirectoryRecord, DirectoryRef, FileFlags};
use crate::file::{File, FileData};
use crate::name;
use crate::options::{PermissionOptions, RelaxationFlags, RelocationOptions, RockRidgeOptions, TimingOptions};
use crate::path::{PathTableEntry, PathTableRef};
use crate::rockridge::{self, RockRidgeEntry};
use crate::types::{EndianType, FileInterchange, IsoStringFile};
use crate::volume::{PrimaryVolumeDescriptor, VolumeDescriptor};
use crate::{Error, ReadWriteSeek, Seek, SeekFrom, Write};

/// ECMA-119 directory nesting limit before Rock Ridge relocation kicks in
/// (spec §4.2/§4.3): root counts as depth 1.
const MAX_ECMA_DEPTH: usize = 8;
/// Path length budget in bytes before relocation or `ALLOW_LONGER_PATHS`.
const MAX_ECMA_PATH_LEN: usize = 255;

use super::{align_cursor, join_path, local_sector, read_local_entries, ImageWriter, PipelineState, BLOCK_SIZE};

/// Writes the ECMA-119 directory-record tree and both path tables.
pub struct EcmaWriter {
    level: FileInterchange,
    volume_identifier: String,
    dirs: Vec<File>,
    rock_ridge: Option<RockRidgeOptions>,
    permissions: PermissionOptions,
    timing: TimingOptions,
    relaxations: RelaxationFlags,
    relocation: RelocationOptions,
    /// Per-path logical node data (both directories and regular files),
    /// used to read real POSIX attributes, symlink targets and xattrs into
    /// Rock Ridge fields instead of falling back to the global defaults.
    nodes: BTreeMap<String, File>,
    /// Placeholder fullname (in its original, unmoved parent) -> the
    /// relocated directory's new path. Populated by [`Self::relocate_deep_paths`].
    placeholders: BTreeMap<String, String>,
    /// Relocated directory's new path -> its true original parent path, for
    /// the Rock Ridge `PL` back-pointer.
    true_parents: BTreeMap<String, String>,
    /// `(new_prefix, original_prefix)` pairs, one per relocated subtree, for
    /// translating a view path back to the logical node it came from.
    moved_prefixes: Vec<(String, String)>,
    /// Whether the relocation directory itself was created by this pass
    /// (as opposed to already present in the tree), gating the `RE` mark.
    relocation_created: bool,
    start_block: u64,
    buffer: Vec<u8>,
    root_dir: DirectoryRef,
    path_table: PathTableRef,
}

/// Orders directories so every child is processed, and has a
/// [`DirectoryRef`], before its parent is written. Re-applied after
/// relocation rewrites some directories' paths.
fn sort_dirs_deepest_first(dirs: &mut [File]) {
    dirs.sort_by(|a, b| {
        let a_depth = a.path.split('/').count();
        let b_depth = b.path.split('/').count();
        if a_depth == b_depth {
            b.path.len().cmp(&a.path.len())
        } else {
            b_depth.cmp(&a_depth)
        }
    });
}

/// Rock Ridge directory-record system use budget: a record's length field
/// is one byte, so header + name + system use must stay under 255.
const SYSTEM_USE_BUDGET: usize = 200;

impl EcmaWriter {
    pub fn new(level: FileInterchange, volume_identifier: String, mut dirs: Vec<File>) -> Self {
        sort_dirs_deepest_first(&mut dirs);
        Self {
            level,
            volume_identifier,
            dirs,
            rock_ridge: None,
            permissions: PermissionOptions::default(),
            timing: TimingOptions::default(),
            relaxations: RelaxationFlags::empty(),
            relocation: RelocationOptions::default(),
            nodes: BTreeMap::new(),
            placeholders: BTreeMap::new(),
            true_parents: BTreeMap::new(),
            moved_prefixes: Vec::new(),
            relocation_created: false,
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

    /// Enables Rock Ridge system use fields on every child directory record.
    pub fn with_rock_ridge(mut self, options: Option<RockRidgeOptions>, permissions: PermissionOptions) -> Self {
        self.rock_ridge = options;
        self.permissions = permissions;
        self
    }

    /// Overrides the primary volume descriptor's timestamps per
    /// [`TimingOptions`], instead of stamping every date with build time.
    pub fn with_timing(mut self, timing: TimingOptions) -> Self {
        self.timing = timing;
        self
    }

    /// Applies [`RelaxationFlags`] to name encoding and path-length checks.
    pub fn with_relaxations(mut self, relaxations: RelaxationFlags) -> Self {
        self.relaxations = relaxations;
        self
    }

    /// Configures where deep-path relocation (spec §4.3) parks directories
    /// that would otherwise exceed the ECMA-119 nesting/length limit.
    pub fn with_relocation(mut self, relocation: RelocationOptions) -> Self {
        self.relocation = relocation;
        self
    }

    /// Supplies the logical node data (regular files plus the same
    /// directories already passed to [`Self::new`]) read for real POSIX
    /// attributes, symlink targets and extended attributes.
    pub fn with_file_nodes(mut self, files: &[File], dirs: &[File]) -> Self {
        for node in files.iter().chain(dirs.iter()) {
            self.nodes.insert(node.path.clone(), node.clone());
        }
        self
    }

    fn depth_of(path: &str) -> usize {
        if path.is_empty() {
            1
        } else {
            2 + path.matches('/').count()
        }
    }

    /// Rock Ridge deep-path relocation (spec §4.3): any directory whose
    /// depth or path length would overflow ECMA-119's limits moves under a
    /// relocation directory (default `rr_moved`, created at depth 2 if it
    /// doesn't already exist). The directory it's moved out of keeps a
    /// zero-data placeholder carrying a Rock Ridge `CL` pointer; the
    /// relocated directory carries a `PL` pointer back to its real parent.
    /// Only the shallowest offending directory per branch is moved; its own
    /// descendants come along for free since their stored paths are
    /// rewritten under the same prefix.
    fn relocate_deep_paths(&mut self) -> Result<(), Error> {
        let allow_deep = self.relaxations.contains(RelaxationFlags::ALLOW_DEEP_PATHS);
        let allow_long = self.relaxations.contains(RelaxationFlags::ALLOW_LONGER_PATHS);

        let mut overflowing: Vec<String> = self
            .dirs
            .iter()
            .filter(|d| !d.path.is_empty())
            .filter(|d| {
                (!allow_deep && Self::depth_of(&d.path) > MAX_ECMA_DEPTH)
                    || (!allow_long && d.path.len() > MAX_ECMA_PATH_LEN)
            })
            .map(|d| d.path.clone())
            .collect();
        if overflowing.is_empty() {
            return Ok(());
        }
        if self.rock_ridge.is_none() {
            return Err(Error::other(
                "directory path exceeds the ECMA-119 depth/length limit; enable Rock Ridge relocation or an ALLOW_* relaxation",
            ));
        }

        // Process shallowest violations first and skip anything already
        // covered by an ancestor's relocation.
        overflowing.sort_by_key(|p| Self::depth_of(p));
        let mut roots: Vec<String> = Vec::new();
        for path in overflowing {
            if roots.iter().any(|r| path == *r || path.starts_with(&alloc::format!("{r}/"))) {
                continue;
            }
            roots.push(path);
        }

        let reloc_path = self.relocation.name.clone();
        if !self.dirs.iter().any(|d| d.path == reloc_path) {
            self.dirs.push(File {
                is_dir: true,
                ..File::new(reloc_path.clone(), FileData::Data(Vec::new()))
            });
            if let Some(root) = self.dirs.iter_mut().find(|d| d.path.is_empty()) {
                root.children.push(reloc_path.clone());
            }
            self.relocation_created = true;
        }

        let mut used_names: BTreeSet<String> = self
            .dirs
            .iter()
            .find(|d| d.path == reloc_path)
            .map(|d| d.get_children().iter().cloned().collect())
            .unwrap_or_default();

        for orig_path in roots {
            let orig_parent = orig_path.rsplit_once('/').map(|(p, _)| p.to_string()).unwrap_or_default();
            let basename = orig_path.rsplit_once('/').map(|(_, b)| b.to_string()).unwrap_or_else(|| orig_path.clone());

            let mut new_name = basename.clone();
            let mut suffix = 1u32;
            while used_names.contains(&new_name) {
                new_name = alloc::format!("{basename}_{suffix}");
                suffix += 1;
            }
            used_names.insert(new_name.clone());
            let new_path = join_path(&reloc_path, &new_name);

            for dir in self.dirs.iter_mut() {
                if dir.path == orig_path {
                    dir.path = new_path.clone();
                } else if let Some(rest) = dir.path.strip_prefix(&alloc::format!("{orig_path}/")) {
                    dir.path = join_path(&new_path, rest);
                }
            }
            if let Some(rr_moved) = self.dirs.iter_mut().find(|d| d.path == reloc_path) {
                rr_moved.children.push(new_name);
            }

            self.placeholders.insert(orig_path.clone(), new_path.clone());
            self.true_parents.insert(new_path.clone(), orig_parent);
            self.moved_prefixes.push((new_path, orig_path));
        }

        sort_dirs_deepest_first(&mut self.dirs);
        Ok(())
    }

    /// Maps a (possibly relocated) view path back to the logical node path
    /// it was built from, so `state.file_extents`/`self.nodes` lookups keep
    /// working after [`Self::relocate_deep_paths`] has moved a subtree.
    fn origin_fullname<'a>(&self, fullname: &'a str) -> Cow<'a, str> {
        for (new_prefix, orig_prefix) in &self.moved_prefixes {
            if fullname == new_prefix.as_str() {
                return Cow::Owned(orig_prefix.clone());
            }
            if let Some(rest) = fullname.strip_prefix(new_prefix.as_str()).and_then(|r| r.strip_prefix('/')) {
                return Cow::Owned(alloc::format!("{orig_prefix}/{rest}"));
            }
        }
        Cow::Borrowed(fullname)
    }

    /// Builds the PX/NM/TF/RR system use entries for one child entry, if
    /// Rock Ridge is enabled. `original` is the pre-mangling name; `is_dir`
    /// selects the directory default mode over the file default mode.
    fn system_use_for(
        &self,
        original: &str,
        is_dir: bool,
        mangled: &str,
        fullname: &str,
        nlink: u32,
        dir_refs: &BTreeMap<String, DirectoryRef>,
    ) -> Vec<u8> {
        let Some(_options) = &self.rock_ridge else {
            return Vec::new();
        };
        let origin = self.origin_fullname(fullname);
        let node = self.nodes.get(origin.as_ref());
        let default_mode: u32 = if is_dir { 0o40555 } else { 0o100444 };
        let source_mode = node.map(|n| n.attributes.mode).unwrap_or(default_mode);
        let mode = if is_dir {
            self.permissions.dir_mode.resolve(source_mode, default_mode)
        } else {
            self.permissions.file_mode.resolve(source_mode, default_mode)
        };
        let source_uid = node.map(|n| n.attributes.uid).unwrap_or(0);
        let source_gid = node.map(|n| n.attributes.gid).unwrap_or(0);
        let uid = self.permissions.uid.resolve(source_uid, 0);
        let gid = self.permissions.gid.resolve(source_gid, 0);
        // Directory nlink (2 + subdirectory count) isn't tracked here; `2`
        // covers the minimum any directory carries (`.` and its own entry).
        // File nlink comes from the hard-link identity bucket (spec §4.4).
        let links = if is_dir { 2 } else { nlink };
        let mut entries = alloc::vec![RockRidgeEntry::Px {
            mode,
            links,
            uid,
            gid,
            serial: None,
        }];
        let mut flags = rockridge::rr_flags::PX;
        if original != mangled {
            entries.push(RockRidgeEntry::Nm {
                continued: false,
                name: original.to_string(),
            });
            flags |= rockridge::rr_flags::NM;
        }
        if let Some((major, minor)) = node.and_then(|n| n.rdev) {
            entries.push(RockRidgeEntry::Pn {
                dev_high: major,
                dev_low: minor,
            });
            flags |= rockridge::rr_flags::PN;
        }
        if let Some(target) = node.and_then(|n| n.symlink_target.as_deref()) {
            entries.push(RockRidgeEntry::Sl {
                continued: false,
                components: symlink_components(target),
            });
            flags |= rockridge::rr_flags::SL;
        }
        let timestamps = match node {
            Some(n) if self.timing.source_mtime_passthrough => {
                alloc::vec![rockridge_timestamp(n.attributes.mtime)]
            }
            _ => alloc::vec![rockridge_now()],
        };
        entries.push(RockRidgeEntry::Tf {
            flags: rockridge::tf_flags::MODIFY,
            timestamps,
        });
        flags |= rockridge::rr_flags::TF;
        if let Some(xattrs) = node.filter(|n| !n.xattrs.is_empty()) {
            let mut payload = Vec::new();
            for (name, value) in &xattrs.xattrs {
                payload.extend(rockridge::aaip::encode_pair(name, value));
            }
            entries.push(RockRidgeEntry::Al { data: payload });
        }
        if let Some(new_path) = self.placeholders.get(fullname) {
            let child_location = dir_refs.get(new_path).map(|r| r.offset as u32).unwrap_or(0);
            entries.push(RockRidgeEntry::Cl { child_location });
            flags |= rockridge::rr_flags::CL;
        }
        if let Some(orig_parent_path) = self.true_parents.get(fullname) {
            if let Some(parent_ref) = dir_refs.get(orig_parent_path) {
                entries.push(RockRidgeEntry::Pl {
                    parent_location: parent_ref.offset as u32,
                });
                flags |= rockridge::rr_flags::PL;
            }
        }
        if self.relocation_created && self.relocation.auto_re_mark && fullname == self.relocation.name {
            entries.push(RockRidgeEntry::Re);
            flags |= rockridge::rr_flags::RE;
        }
        entries.push(RockRidgeEntry::Rr { flags });
        let (packed, overflow) = rockridge::pack_entries(&entries, SYSTEM_USE_BUDGET);
        if !overflow.is_empty() {
            log::warn!("Rock Ridge system use area for {original:?} overflowed the budget; dropping {} field(s)", overflow.len());
        }
        packed
    }

    pub fn root_dir(&self) -> DirectoryRef {
        self.root_dir
    }

    pub fn path_table(&self) -> PathTableRef {
        self.path_table
    }

    fn write_directories(
        &self,
        cursor: &mut Cursor<Vec<u8>>,
        state: &PipelineState,
    ) -> Result<BTreeMap<String, DirectoryRef>, Error> {
        let mut dir_refs: BTreeMap<String, DirectoryRef> = BTreeMap::new();
        let default_entry = DirectoryRecord::with_len(1);

        for dir in &self.dirs {
            let start_local = local_sector(cursor);
            default_entry.write(cursor)?;
            default_entry.write(cursor)?;

            let mut children: Vec<name::MangleEntry> = dir
                .get_children()
                .iter()
                .map(|entry| {
                    let fullname = join_path(&dir.path, entry);
                    let is_dir = dir_refs.contains_key(&fullname);
                    name::MangleEntry {
                        name: entry.clone(),
                        is_dir,
                    }
                })
                .collect();
            name::mangle_siblings(&mut children, self.level)
                .map_err(|_| Error::other("too many colliding sibling names"))?;

            for (original, mangled) in dir.get_children().iter().zip(children.iter()) {
                let fullname = join_path(&dir.path, original);
                let origin_fullname = self.origin_fullname(&fullname);
                let (is_dir, file_ref) = if let Some(&r) = dir_refs.get(&fullname) {
                    (true, r)
                } else {
                    (
                        false,
                        state.file_extents.get(origin_fullname.as_ref()).copied().unwrap_or_default(),
                    )
                };
                let flags = if is_dir {
                    FileFlags::DIRECTORY
                } else {
                    FileFlags::empty()
                };
                let name = self
                    .level
                    .from_str_versioned(&mangled.name, !self.relaxations.contains(RelaxationFlags::OMIT_VERSION))
                    .map_err(|_| Error::other("name does not fit the chosen interchange level"))?;
                let nlink = state.file_nlinks.get(origin_fullname.as_ref()).copied().unwrap_or(1);
                let system_use = self.system_use_for(original, is_dir, &mangled.name, &fullname, nlink, &dir_refs);
                DirectoryRecord::new_with_system_use(name, file_ref, flags, system_use).write(cursor)?;
            }

            let end_local = align_cursor(cursor)?;
            let directory_ref = DirectoryRef {
                offset: self.start_block + start_local,
                size: end_local - start_local * BLOCK_SIZE,
            };
            dir_refs.insert(dir.path.clone(), directory_ref);
        }

        let root_dir = *dir_refs.get("").ok_or_else(|| Error::other("missing root directory"))?;
        let mut stack = alloc::vec![(root_dir, root_dir, String::new())];

        while let Some((dir_ref, parent_ref, cur_path)) = stack.pop() {
            let local_start = (dir_ref.offset - self.start_block) * BLOCK_SIZE;
            cursor.seek(SeekFrom::Start(local_start))?;
            DirectoryRecord::new(IsoStringFile::from_bytes(&[0x00]), dir_ref, FileFlags::DIRECTORY)
                .write(cursor)?;
            DirectoryRecord::new(IsoStringFile::from_bytes(&[0x01]), parent_ref, FileFlags::DIRECTORY)
                .write(cursor)?;

            let entries = read_local_entries(cursor, local_start, dir_ref.size)?;
            for (rel_offset, entry) in entries
                .iter()
                .filter(|(_, entry)| entry.header.is_directory())
            {
                if entry.name.bytes() == b"\x00" || entry.name.bytes() == b"\x01" {
                    continue;
                }
                let orig_name = self.level.original(&entry.name);
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

        self.patch_placeholder_locations(cursor, &dir_refs)?;

        Ok(dir_refs)
    }

    /// Placeholders are written with `child_location = 0` in the first pass
    /// (the relocated directory they point at hasn't been laid out yet at
    /// that point); this fixes them up now that every directory's final
    /// extent is known.
    fn patch_placeholder_locations(
        &self,
        cursor: &mut Cursor<Vec<u8>>,
        dir_refs: &BTreeMap<String, DirectoryRef>,
    ) -> Result<(), Error> {
        for (orig_fullname, new_path) in &self.placeholders {
            let Some(target_ref) = dir_refs.get(new_path) else { continue };
            let (parent_path, basename) = match orig_fullname.rsplit_once('/') {
                Some((p, b)) => (p, b),
                None => ("", orig_fullname.as_str()),
            };
            let Some(&parent_ref) = dir_refs.get(parent_path) else { continue };

            let local_start = (parent_ref.offset - self.start_block) * BLOCK_SIZE;
            let entries = read_local_entries(cursor, local_start, parent_ref.size)?;
            for (rel_offset, entry) in &entries {
                if entry.header.is_directory() {
                    continue;
                }
                if self.level.original(&entry.name) != basename {
                    continue;
                }
                let mut system_use = entry.system_use.clone();
                if patch_cl_entry(&mut system_use, target_ref.offset as u32) {
                    let mut new_entry = entry.clone();
                    new_entry.system_use = system_use;
                    cursor.seek(SeekFrom::Start(local_start + rel_offset - entry.header.len as u64))?;
                    new_entry.write(cursor)?;
                }
                break;
            }
        }
        Ok(())
    }

    fn write_path_tables(
        &self,
        cursor: &mut Cursor<Vec<u8>>,
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

        for dir in &self.dirs {
            if dir.path.is_empty() {
                continue;
            }
            let directory_ref = dir_refs.get(&dir.path).unwrap();
            let parent_name = dir.path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            let parent_index = *parent_map.get(parent_name).unwrap_or(&1);
            parent_map.insert(dir.path.clone(), index);
            let name = dir
                .path
                .rsplit_once('/')
                .map(|(_, n)| n)
                .unwrap_or(&dir.path);

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
            lpath_table_offset: self.start_block + start_local,
            mpath_table_offset: 0,
            size: end_l - start_local * BLOCK_SIZE,
        };

        for entry in &entries {
            cursor.write_all(&entry.to_bytes(EndianType::BigEndian))?;
        }
        align_cursor(cursor)?;

        Ok(PathTableRef {
            mpath_table_offset: path_table_ref.lpath_table_offset
                + path_table_ref.size / BLOCK_SIZE,
            ..path_table_ref
        })
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for EcmaWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        self.relocate_deep_paths()?;
        self.start_block = state.current_block;
        let mut cursor = Cursor::new(Vec::new());

        let dir_refs = self.write_directories(&mut cursor, state)?;
        self.root_dir = *dir_refs.get("").unwrap();
        self.path_table = self.write_path_tables(&mut cursor, &dir_refs)?;

        let blocks_used = (cursor.get_ref().len() as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE;
        state.current_block = self.start_block + blocks_used;
        self.buffer = cursor.into_inner();
        Ok(())
    }

    fn write_vol_desc(&mut self, state: &PipelineState, descriptors: &mut crate::VolumeDescriptorList) {
        descriptors.push(VolumeDescriptor::Primary(PrimaryVolumeDescriptor::new(
            &self.volume_identifier,
            state.total_blocks as u32,
        )));
        let pvd = descriptors.primary_mut();
        pvd.dir_record.header.extent.write(self.root_dir.offset as u32);
        pvd.dir_record.header.data_len.write(self.root_dir.size as u32);
        pvd.path_table_size.write(self.path_table.size as u32);
        pvd.type_l_path_table.set(self.path_table.lpath_table_offset as u32);
        pvd.type_m_path_table.set(self.path_table.mpath_table_offset as u32);
        self.apply_timing(pvd);
    }

    /// Patches the primary volume descriptor's four timestamps from
    /// [`TimingOptions`]. A `uuid_override` takes priority over individual
    /// creation/modification overrides, matching the relationship a 16-digit
    /// volume UUID has with those fields in practice: both record "when",
    /// so the caller sets one or the other, not both.
    fn apply_timing(&self, pvd: &mut PrimaryVolumeDescriptor) {
        let tz = if self.timing.always_gmt { 0 } else { pvd.creation_date.timezone };
        if let Some(uuid) = &self.timing.uuid_override {
            if let Ok(stamp) = crate::types::DecDateTime::from_decimal_str(uuid) {
                pvd.creation_date = stamp;
                pvd.modification_date = stamp;
                return;
            }
        }
        if let Some(dt) = self.timing.creation {
            pvd.creation_date = crate::types::DecDateTime::from_datetime(dt, tz);
        } else if self.timing.always_gmt {
            pvd.creation_date.timezone = 0;
        }
        if let Some(dt) = self.timing.modification {
            pvd.modification_date = crate::types::DecDateTime::from_datetime(dt, tz);
        } else if self.timing.always_gmt {
            pvd.modification_date.timezone = 0;
        }
        if let Some(dt) = self.timing.expiration {
            pvd.expiration_date = crate::types::DecDateTime::from_datetime(dt, tz);
        } else if self.timing.always_gmt {
            pvd.expiration_date.timezone = 0;
        }
        if let Some(dt) = self.timing.effective {
            pvd.effective_date = crate::types::DecDateTime::from_datetime(dt, tz);
        } else if self.timing.always_gmt {
            pvd.effective_date.timezone = 0;
        }
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

fn rockridge_now() -> rockridge::Timestamp {
    use chrono::{Datelike, Timelike, Utc};
    let now = Utc::now();
    rockridge::Timestamp {
        years_since_1900: (now.year() - 1900) as u8,
        month: now.month() as u8,
        day: now.day() as u8,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        second: now.second() as u8,
        gmt_offset: 0,
    }
}

/// A Rock Ridge timestamp from a Unix `mtime`, falling back to the current
/// time for an out-of-range or unset (`0`) value.
fn rockridge_timestamp(mtime: i64) -> rockridge::Timestamp {
    use chrono::{DateTime, Datelike, Timelike, Utc};
    if mtime == 0 {
        return rockridge_now();
    }
    let Some(dt) = DateTime::<Utc>::from_timestamp(mtime, 0) else {
        return rockridge_now();
    };
    rockridge::Timestamp {
        years_since_1900: (dt.year() - 1900).clamp(0, 255) as u8,
        month: dt.month() as u8,
        day: dt.day() as u8,
        hour: dt.hour() as u8,
        minute: dt.minute() as u8,
        second: dt.second() as u8,
        gmt_offset: 0,
    }
}

/// Walks a packed Rock Ridge system use area looking for a `CL` entry and
/// overwrites its pointer in place. Returns whether one was found.
fn patch_cl_entry(system_use: &mut [u8], target_offset: u32) -> bool {
    let mut i = 0usize;
    while i + 4 <= system_use.len() {
        let len = system_use[i + 2] as usize;
        if len < 4 || i + len > system_use.len() {
            break;
        }
        if &system_use[i..i + 2] == b"CL" {
            let bytes = target_offset.to_le_bytes();
            system_use[i + 4..i + 8].copy_from_slice(&bytes);
            let bytes = target_offset.to_be_bytes();
            system_use[i + 8..i + 12].copy_from_slice(&bytes);
            return true;
        }
        i += len;
    }
    false
}

/// Splits a symlink target into Rock Ridge `SL` components: `..`/`.`/root
/// segments get the matching flag bit with no content, everything else is a
/// literal path segment.
fn symlink_components(target: &str) -> Vec<rockridge::SlComponent> {
    let mut components = Vec::new();
    if let Some(rest) = target.strip_prefix('/') {
        components.push(rockridge::SlComponent {
            current: false,
            parent: false,
            root: true,
            content: String::new(),
        });
        return components.into_iter().chain(symlink_components(rest)).collect();
    }
    for segment in target.split('/') {
        match segment {
            "" => continue,
            "." => components.push(rockridge::SlComponent {
                current: true,
                parent: false,
                root: false,
                content: String::new(),
            }),
            ".." => components.push(rockridge::SlComponent {
                current: false,
                parent: true,
                root: false,
                content: String::new(),
            }),
            seg => components.push(rockridge::SlComponent {
                current: false,
                parent: false,
                root: false,
                content: seg.to_string(),
            }),
        }
    }
    components
}

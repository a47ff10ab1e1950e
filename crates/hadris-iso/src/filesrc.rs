//! File source registry
//!
//! Generalizes the teacher's `FileWriter::written_files: BTreeMap<String,
//! (bool, DirectoryRef)>` pattern from a path-keyed map into one keyed by
//! file *identity*, so that two paths pointing at the same underlying data
//! (a hard link, or two in-memory files with identical contents) share a
//! single extent instead of being written twice.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::file::File;
use crate::DirectoryRef;

/// What makes two [`crate::File`] entries the "same" file for the purposes
/// of extent sharing.
///
/// `Identity` mirrors the hard-link sort key: two nodes share an inode iff
/// their `(fs_id, dev_id, source_ino)` tuple agrees *and* every view-relevant
/// attribute (mode, uid, gid, timestamps, xattrs) agrees too, so a later
/// `chmod` on one half of a hard-linked pair splits them into distinct
/// entries here exactly as it would on a real filesystem copy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceKey {
    /// Identified by host filesystem identity plus an attribute/xattr digest.
    Identity {
        fs_id: u64,
        dev_id: u64,
        source_ino: u64,
        attr_hash: u64,
    },
    /// Identified by a content digest, for in-memory data where no inode is
    /// available. Two files with the same digest are deduplicated too,
    /// since the disc image has no reason to store the bytes twice.
    ContentHash(u64),
    /// No stable identity available; always unique.
    Unique(String),
}

impl SourceKey {
    /// An FNV-1a digest of file contents, used for [`SourceKey::ContentHash`].
    pub fn hash_content(data: &[u8]) -> u64 {
        fnv1a(data.iter().map(|b| *b as u64))
    }

    /// Builds the identity key for a [`File`], per the hard-link sort key of
    /// spec §4.4: `(fs_id, dev_id, source_ino)` plus a combined attribute/
    /// xattr hash. Falls back to [`SourceKey::Unique`] when the file carries
    /// no host identity (`source_ino == 0`, the sentinel for "not backed by
    /// a real inode" set by [`File::new`]).
    pub fn for_file(file: &File) -> Self {
        let identity = &file.identity;
        if identity.source_ino == 0 {
            return SourceKey::Unique(file.path.clone());
        }
        let attrs = &file.attributes;
        let attr_hash = fnv1a(
            [
                attrs.mode as u64,
                attrs.uid as u64,
                attrs.gid as u64,
                attrs.atime as u64,
                attrs.mtime as u64,
                attrs.ctime as u64,
            ]
            .into_iter()
            .chain(file.xattrs.iter().flat_map(|(name, value)| {
                name.bytes().map(|b| b as u64).chain(value.iter().map(|b| *b as u64))
            })),
        );
        SourceKey::Identity {
            fs_id: identity.fs_id,
            dev_id: identity.dev_id,
            source_ino: identity.source_ino,
            attr_hash,
        }
    }
}

fn fnv1a(bytes: impl Iterator<Item = u64>) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= byte;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Whether a registered entry is a file or a directory; directories are
/// never deduplicated (every directory gets its own extent, even an empty
/// one, because its contents differ by location in the tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Directory,
}

/// Tracks which [`SourceKey`]s have already been written, so that hard
/// links and content-identical files can reuse an existing extent instead
/// of being laid out twice.
#[derive(Debug, Default)]
pub struct FileSourceRegistry {
    by_key: BTreeMap<SourceKey, DirectoryRef>,
    by_path: BTreeMap<String, (SourceKind, DirectoryRef)>,
    links: BTreeMap<String, String>,
    /// Bucket size per key: how many paths share one extent. Used as the
    /// Rock Ridge `PX` `nlink` count (spec §4.4 step 3).
    link_counts: BTreeMap<SourceKey, u32>,
    path_keys: BTreeMap<String, SourceKey>,
}

impl FileSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up whether `key` has already been written, returning its
    /// extent if so. Directories never hit this path; callers should only
    /// query it for regular files.
    pub fn lookup(&self, key: &SourceKey) -> Option<DirectoryRef> {
        match key {
            SourceKey::Unique(_) => None,
            _ => self.by_key.get(key).copied(),
        }
    }

    /// Registers `path` as written at `extent`, identified by `key`.
    /// If another path already registered the same key, `path` is recorded
    /// as a hard link onto it rather than a new allocation.
    pub fn insert(&mut self, path: String, key: SourceKey, kind: SourceKind, extent: DirectoryRef) {
        if kind == SourceKind::File {
            *self.link_counts.entry(key.clone()).or_insert(0) += 1;
            self.path_keys.insert(path.clone(), key.clone());
            if let Some(existing) = self.by_key.get(&key) {
                self.by_path.insert(path.clone(), (kind, *existing));
                return;
            }
            self.by_key.insert(key, extent);
        }
        self.by_path.insert(path, (kind, extent));
    }

    /// Marks `path` as a hard link to `target`, both already-registered
    /// paths. Returns `false` if `target` is unknown.
    pub fn link(&mut self, path: String, target: &str) -> bool {
        let Some(&(kind, extent)) = self.by_path.get(target) else {
            return false;
        };
        self.by_path.insert(path.clone(), (kind, extent));
        self.links.insert(path.clone(), target.to_string());
        if let Some(key) = self.path_keys.get(target).cloned() {
            *self.link_counts.entry(key.clone()).or_insert(1) += 1;
            self.path_keys.insert(path, key);
        }
        true
    }

    pub fn get(&self, path: &str) -> Option<(bool, DirectoryRef)> {
        self.by_path
            .get(path)
            .map(|(kind, extent)| (*kind == SourceKind::Directory, *extent))
    }

    /// Number of paths sharing `path`'s extent (itself included); `1` for a
    /// file with no other hard links, or for any path with no recorded
    /// identity key (directories, `SourceKey::Unique`-only paths).
    pub fn nlink_for(&self, path: &str) -> u32 {
        self.path_keys
            .get(path)
            .and_then(|key| self.link_counts.get(key))
            .copied()
            .unwrap_or(1)
    }

    /// Number of distinct extents actually allocated (post-dedup).
    pub fn unique_extent_count(&self) -> usize {
        self.by_key.len()
            + self
                .by_path
                .values()
                .filter(|(kind, _)| *kind == SourceKind::Directory)
                .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity(source_ino: u64) -> SourceKey {
        SourceKey::Identity {
            fs_id: 0,
            dev_id: 1,
            source_ino,
            attr_hash: 0,
        }
    }

    #[test]
    fn identical_identity_dedups_extent() {
        let mut registry = FileSourceRegistry::new();
        let extent = DirectoryRef {
            offset: 100,
            size: 2048,
        };
        registry.insert("a.txt".to_string(), test_identity(42), SourceKind::File, extent);
        registry.insert("b.txt".to_string(), test_identity(42), SourceKind::File, extent);
        assert_eq!(
            registry.lookup(&test_identity(42)),
            Some(extent),
            "second path with the same identity tuple should see the existing extent"
        );
        assert_eq!(registry.nlink_for("a.txt"), 2);
        assert_eq!(registry.nlink_for("b.txt"), 2);
    }

    #[test]
    fn differing_attr_hash_does_not_dedup() {
        let mut registry = FileSourceRegistry::new();
        let extent_a = DirectoryRef { offset: 100, size: 2048 };
        let extent_b = DirectoryRef { offset: 200, size: 2048 };
        registry.insert(
            "a.txt".to_string(),
            SourceKey::Identity { fs_id: 0, dev_id: 1, source_ino: 42, attr_hash: 1 },
            SourceKind::File,
            extent_a,
        );
        registry.insert(
            "b.txt".to_string(),
            SourceKey::Identity { fs_id: 0, dev_id: 1, source_ino: 42, attr_hash: 2 },
            SourceKind::File,
            extent_b,
        );
        assert_eq!(registry.get("a.txt"), Some((false, extent_a)));
        assert_eq!(registry.get("b.txt"), Some((false, extent_b)));
        assert_eq!(registry.nlink_for("a.txt"), 1);
    }

    #[test]
    fn directories_are_never_deduped_by_key() {
        let mut registry = FileSourceRegistry::new();
        let extent = DirectoryRef {
            offset: 10,
            size: 2048,
        };
        registry.insert(
            "dir".to_string(),
            SourceKey::Unique("dir".to_string()),
            SourceKind::Directory,
            extent,
        );
        assert_eq!(registry.get("dir"), Some((true, extent)));
    }

    #[test]
    fn explicit_link_shares_extent() {
        let mut registry = FileSourceRegistry::new();
        let extent = DirectoryRef {
            offset: 5,
            size: 4096,
        };
        registry.insert(
            "orig.txt".to_string(),
            SourceKey::Unique("orig.txt".to_string()),
            SourceKind::File,
            extent,
        );
        assert!(registry.link("hardlink.txt".to_string(), "orig.txt"));
        assert_eq!(registry.get("hardlink.txt"), Some((false, extent)));
    }

    #[test]
    fn content_hash_is_stable() {
        let data = b"hello world";
        assert_eq!(SourceKey::hash_content(data), SourceKey::hash_content(data));
    }
}

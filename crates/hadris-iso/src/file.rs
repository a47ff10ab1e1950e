//! In-memory description of the file tree that gets laid out onto an image.
//!
//! [`FileInput`] is what a caller builds (or loads from a host filesystem via
//! [`FileInput::from_fs`]) and hands to [`crate::FormatOption`]. Internally it
//! is split into a list of directories and a list of regular files, each
//! tagged with its full path relative to the root, for [`crate::FileWriter`]
//! to lay out on the image.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hadris_io::Error;

/// The content backing a single file entry.
#[derive(Clone)]
pub enum FileData {
    /// Data already resident in memory.
    Data(Vec<u8>),
    /// Data read lazily from the host filesystem when the image is written.
    #[cfg(feature = "std")]
    Path(std::path::PathBuf),
}

impl core::fmt::Debug for FileData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FileData::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            #[cfg(feature = "std")]
            FileData::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

impl FileData {
    /// Returns the file contents.
    ///
    /// For [`FileData::Path`] this reads the file from disk every time it is
    /// called; callers that need the data more than once should cache it.
    pub fn get_data(&self) -> Vec<u8> {
        match self {
            FileData::Data(data) => data.clone(),
            #[cfg(feature = "std")]
            FileData::Path(path) => std::fs::read(path).unwrap_or_default(),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            FileData::Data(data) => data.len() as u64,
            #[cfg(feature = "std")]
            FileData::Path(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Host filesystem identity of a logical node, the sort key hard-link
/// detection groups by (spec §4.4 step 1). `fs_id` distinguishes filesystems
/// that don't share an inode/device numbering space (e.g. two source trees
/// merged into one image); `source_ino == 0` is the sentinel for "no real
/// inode", set by [`File::new`] and every in-memory constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileIdentity {
    pub fs_id: u64,
    pub dev_id: u64,
    pub source_ino: u64,
}

/// POSIX metadata carried by a logical node (spec §3). Timestamps are Unix
/// seconds; `mode` includes the file-type bits the way `st_mode` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixAttributes {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Default for PosixAttributes {
    fn default() -> Self {
        Self {
            mode: 0o100444,
            uid: 0,
            gid: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }
}

/// A single file or directory, with its path relative to the root directory.
#[derive(Debug, Clone)]
pub struct File {
    /// Path relative to the root, using `/` as a separator and no leading
    /// slash. The root directory itself is the empty string.
    pub path: String,
    pub data: FileData,
    pub(crate) is_dir: bool,
    /// Immediate child names (not full paths) for directories. Always empty
    /// for regular files.
    pub(crate) children: Vec<String>,
    /// Host filesystem identity, used for hard-link detection (spec §4.4).
    pub identity: FileIdentity,
    /// POSIX mode/ownership/timestamps, carried into Rock Ridge `PX`/`TF`.
    pub attributes: PosixAttributes,
    /// Target path of a symbolic link; `None` for regular files and
    /// directories.
    pub symlink_target: Option<String>,
    /// `(major, minor)` device numbers for a character or block device node.
    pub rdev: Option<(u32, u32)>,
    /// Extended attributes as `(namespace.name, value)` pairs, carried into
    /// the AAIP `AL` system use field.
    pub xattrs: Vec<(String, Vec<u8>)>,
    /// Per-view hidden mask: bit 0 hides the entry from the ISO 9660 tree,
    /// bit 1 from Joliet, bit 2 from the ISO 9660:1999 tree, bit 3 from
    /// HFS+. Zero means visible everywhere.
    pub hidden_mask: u8,
}

impl File {
    /// Creates a new regular file entry, with default (non-link, no xattrs)
    /// identity and attributes.
    pub fn new(path: String, data: FileData) -> Self {
        Self {
            path,
            data,
            is_dir: false,
            children: Vec::new(),
            identity: FileIdentity::default(),
            attributes: PosixAttributes::default(),
            symlink_target: None,
            rdev: None,
            xattrs: Vec::new(),
            hidden_mask: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.is_dir
    }

    pub fn get_children(&self) -> &[String] {
        &self.children
    }

    pub fn get_data(&self) -> Vec<u8> {
        self.data.get_data()
    }

    /// Whether this entry is hidden from the view identified by `bit`
    /// (`0` = ISO 9660, `1` = Joliet, `2` = ISO 9660:1999, `3` = HFS+).
    pub fn hidden_in(&self, bit: u8) -> bool {
        self.hidden_mask & (1 << bit) != 0
    }
}

/// A description of the directory tree to be written to an image.
#[derive(Debug, Clone, Default)]
pub struct FileInput {
    dir_paths: Vec<String>,
    files: Vec<File>,
}

impl FileInput {
    pub fn empty() -> Self {
        Self {
            dir_paths: alloc::vec![String::new()],
            files: Vec::new(),
        }
    }

    /// Recursively walks a directory on the host filesystem and builds a
    /// [`FileInput`] mirroring its structure.
    #[cfg(feature = "std")]
    pub fn from_fs<P: AsRef<std::path::Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref();
        let mut input = Self::empty();
        Self::walk(root, root, &mut input)?;
        Ok(input)
    }

    #[cfg(feature = "std")]
    fn walk(root: &std::path::Path, dir: &std::path::Path, out: &mut Self) -> Result<(), Error> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_dir() {
                out.dir_paths.push(rel);
                Self::walk(root, &path, out)?;
            } else {
                let mut file = File::new(rel, FileData::Path(path.clone()));
                Self::populate_host_metadata(&mut file, &path);
                out.files.push(file);
            }
        }
        Ok(())
    }

    /// Fills in `file`'s identity, attributes, and symlink target from the
    /// host filesystem entry at `path`. Best-effort: a metadata read that
    /// fails leaves `file` with [`File::new`]'s defaults.
    #[cfg(feature = "std")]
    fn populate_host_metadata(file: &mut File, path: &std::path::Path) {
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            return;
        };
        if meta.is_symlink() {
            file.symlink_target = std::fs::read_link(path)
                .ok()
                .map(|target| target.to_string_lossy().replace('\\', "/"));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            file.identity = FileIdentity {
                fs_id: 0,
                dev_id: meta.dev(),
                source_ino: meta.ino(),
            };
            file.attributes = PosixAttributes {
                mode: meta.mode(),
                uid: meta.uid(),
                gid: meta.gid(),
                atime: meta.atime(),
                mtime: meta.mtime(),
                ctime: meta.ctime(),
            };
            if meta.file_type().is_char_device() || meta.file_type().is_block_device() {
                let rdev = meta.rdev();
                file.rdev = Some(((rdev >> 8) as u32 & 0xff, rdev as u32 & 0xff));
            }
        }
    }

    /// Appends a regular file to the input.
    pub fn append(&mut self, file: File) {
        self.files.push(file);
    }

    pub fn add_directory(&mut self, path: String) {
        if !self.dir_paths.iter().any(|d| d == &path) {
            self.dir_paths.push(path);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path) || self.dir_paths.iter().any(|d| d == path)
    }

    pub fn len(&self) -> usize {
        self.dir_paths.len() + self.files.len()
    }

    fn parent_of(path: &str) -> &str {
        path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    /// Splits the input into a list of directories and a list of regular
    /// files. Each directory's [`File::get_children`] is populated with the
    /// basenames of every direct child, whether file or subdirectory.
    pub fn split(self) -> (Vec<File>, Vec<File>) {
        let mut dirs: Vec<File> = self
            .dir_paths
            .into_iter()
            .map(|path| File {
                is_dir: true,
                ..File::new(path, FileData::Data(Vec::new()))
            })
            .collect();

        let dir_paths: Vec<String> = dirs.iter().map(|d| d.path.clone()).collect();
        for dir in dirs.iter_mut() {
            let mut children = Vec::new();
            for path in dir_paths.iter().chain(self.files.iter().map(|f| &f.path)) {
                if path == &dir.path {
                    continue;
                }
                if Self::parent_of(path) == dir.path {
                    let name = path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path.as_str());
                    children.push(name.to_string());
                }
            }
            dir.children = children;
        }

        (dirs, self.files)
    }

    /// Iterates every entry (directories and files) for size accounting.
    /// Directories returned this way never carry `children`; use
    /// [`Self::split`] when the tree structure itself is needed.
    pub fn iter_entries(&self) -> impl Iterator<Item = File> + '_ {
        let dirs = self.dir_paths.iter().map(|path| File {
            is_dir: true,
            ..File::new(path.clone(), FileData::Data(Vec::new()))
        });
        let files = self.files.iter().cloned();
        dirs.chain(files)
    }
}

impl<'a> IntoIterator for &'a FileInput {
    type Item = &'a File;
    type IntoIter = core::slice::Iter<'a, File>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

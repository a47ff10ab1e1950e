//! Name encoding and collision mangling.
//!
//! [`FileInterchange::from_str`] turns a single host file name into the
//! space-padded, `;`-versioned on-disk form for a given interchange level.
//! What it cannot do on its own is guarantee uniqueness: truncating two
//! long names to the same interchange-level length can make them collide.
//! [`mangle_siblings`] resolves those collisions in place, by truncating
//! further and appending a numeric suffix, the same way libisofs mangles a
//! directory's children before writing them out.

use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};

use crate::types::FileInterchange;

/// Maximum number of digits appended to disambiguate a colliding name.
/// Matches the upstream limit: 7 digits allows up to ~10 million siblings
/// sharing a truncated name before giving up.
const MAX_DIGITS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MangleError {
    /// More than `10^MAX_DIGITS` siblings collided on the same truncated name.
    TooManyCollisions,
}

/// A child entry to be mangled: its original name and whether it's a
/// directory (directories don't get a forced `.` extension at level 1).
#[derive(Debug, Clone)]
pub struct MangleEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Joliet level 1 caps a name at 64 UCS-2 code units; levels 2/3 raise that
/// to 101/110, but level 1 is what every reader actually implements.
pub const JOLIET_MAX_CHARS: usize = 64;

/// Encodes a host file name as big-endian UCS-2, the wire form Joliet
/// directory records store their identifier in.
pub fn to_joliet(src: &str) -> alloc::vec::Vec<u8> {
    let truncated: String = src.chars().take(JOLIET_MAX_CHARS).collect();
    hadris_common::str::utf16::JolietString::encode(&truncated).to_be_bytes()
}

/// Encodes a host file name for an HFS+ catalog node: big-endian UTF-16
/// identifier bytes, plus a case-folded comparison key used to order and
/// deduplicate siblings in the catalog B-tree. Real HFS+ also applies
/// canonical (NFD) Unicode decomposition before folding; this skips that
/// step, so names that differ only by precomposed-vs-decomposed accents
/// won't sort identically to a real HFS+ driver.
pub fn to_hfs(src: &str) -> (alloc::vec::Vec<u8>, alloc::vec::Vec<u16>) {
    let mut name_bytes = alloc::vec::Vec::with_capacity(src.len() * 2);
    for unit in src.encode_utf16() {
        name_bytes.extend_from_slice(&unit.to_be_bytes());
    }
    let cmp_key: alloc::vec::Vec<u16> = src.to_lowercase().encode_utf16().collect();
    (name_bytes, cmp_key)
}

/// The maximum base name length (including any extension, excluding the
/// `;version`) allowed at a given interchange level.
pub fn max_name_len(level: FileInterchange, is_dir: bool) -> usize {
    match level {
        FileInterchange::L1 => {
            if is_dir {
                8
            } else {
                12 // 8.3
            }
        }
        FileInterchange::L2 | FileInterchange::L3 => 30,
        FileInterchange::NonConformant => 32,
    }
}

/// Splits a name into (stem, extension) the way ECMA-119 mangling does:
/// the last `.` separates them, unless the entry is a directory (dots have
/// no special meaning in directory names).
fn split_ext(name: &str, is_dir: bool) -> (&str, Option<&str>) {
    if is_dir {
        return (name, None);
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    }
}

/// Truncates `name` to fit within `max_len` bytes total (stem + `.` + ext),
/// reserving `digits` trailing characters of the stem for a numeric suffix.
fn truncate_for_level(name: &str, is_dir: bool, max_len: usize, digits: u32) -> String {
    let digits = digits as usize;
    let (stem, ext) = split_ext(name, is_dir);
    match ext {
        Some(ext) => {
            // Extensions are never shrunk below 3 chars unless the whole
            // name budget can't fit that.
            let ext_budget = ext.len().min(max_len.saturating_sub(4 + digits)).max(3.min(ext.len()));
            let ext = &ext[..ext_budget.min(ext.len())];
            let stem_budget = max_len.saturating_sub(ext.len() + 1 + digits);
            let stem = &stem[..stem_budget.min(stem.len())];
            alloc::format!("{stem}.{ext}")
        }
        None => {
            let stem_budget = max_len.saturating_sub(digits);
            let stem = &stem[..stem_budget.min(stem.len())];
            stem.to_string()
        }
    }
}

/// Mangles a directory's children in place so that every resulting name,
/// once passed through [`FileInterchange::from_str`], is unique and fits
/// the level's length limit. Leaves names that are already unique and
/// within budget untouched.
pub fn mangle_siblings(
    entries: &mut [MangleEntry],
    level: FileInterchange,
) -> Result<(), MangleError> {
    // Identify groups of entries that truncate to the same on-disk name.
    let mut seen = BTreeSet::new();
    let mut buckets: alloc::collections::BTreeMap<String, alloc::vec::Vec<usize>> =
        alloc::collections::BTreeMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        let max_len = max_name_len(level, entry.is_dir);
        let truncated = truncate_for_level(&entry.name, entry.is_dir, max_len, 0);
        buckets.entry(truncated).or_default().push(idx);
    }

    for (bucket_name, indices) in buckets {
        if indices.len() <= 1 {
            if let Some(&idx) = indices.first() {
                seen.insert(entries[idx].name.clone());
            }
            continue;
        }

        // The bucket's first entry keeps the plain truncated name; only the
        // entries that actually collide with it get a numeric suffix.
        let first_idx = indices[0];
        entries[first_idx].name = bucket_name.clone();
        seen.insert(bucket_name);
        let rest = &indices[1..];

        let mut digits = 1u32;
        'retry: while digits < MAX_DIGITS {
            let mut candidates = alloc::vec::Vec::with_capacity(rest.len());
            let mut local_seen: BTreeSet<String> = BTreeSet::new();
            for &idx in rest {
                let entry = &entries[idx];
                let max_len = max_name_len(level, entry.is_dir);
                let base = truncate_for_level(&entry.name, entry.is_dir, max_len, digits);
                let (stem, ext) = split_ext(&base, entry.is_dir);
                let mut found = None;
                for n in 0..10u32.pow(digits) {
                    let candidate = match ext {
                        Some(ext) => alloc::format!("{stem}{n:0width$}.{ext}", width = digits as usize),
                        None => alloc::format!("{stem}{n:0width$}", width = digits as usize),
                    };
                    if !seen.contains(&candidate) && !local_seen.contains(&candidate) {
                        found = Some(candidate);
                        break;
                    }
                }
                match found {
                    Some(candidate) => {
                        local_seen.insert(candidate.clone());
                        candidates.push(candidate);
                    }
                    None => {
                        digits += 1;
                        continue 'retry;
                    }
                }
            }
            for (candidate, &idx) in candidates.into_iter().zip(rest.iter()) {
                seen.insert(candidate.clone());
                entries[idx].name = candidate;
            }
            break;
        }
        if digits >= MAX_DIGITS {
            return Err(MangleError::TooManyCollisions);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joliet_encodes_as_big_endian_ucs2() {
        let bytes = to_joliet("hi");
        assert_eq!(bytes, [0x00, b'h', 0x00, b'i']);
    }

    #[test]
    fn hfs_comparison_key_is_case_folded() {
        let (_name, key) = to_hfs("README");
        let lower: alloc::vec::Vec<u16> = "readme".encode_utf16().collect();
        assert_eq!(key, lower);
    }

    #[test]
    fn unique_names_survive_unchanged() {
        let mut entries = [
            MangleEntry {
                name: "foo.txt".to_string(),
                is_dir: false,
            },
            MangleEntry {
                name: "bar.txt".to_string(),
                is_dir: false,
            },
        ];
        mangle_siblings(&mut entries, FileInterchange::L2).unwrap();
        assert_eq!(entries[0].name, "foo.txt");
        assert_eq!(entries[1].name, "bar.txt");
    }

    #[test]
    fn l1_truncation_collisions_get_numeric_suffixes() {
        let mut entries = [
            MangleEntry {
                name: "verylongname1.txt".to_string(),
                is_dir: false,
            },
            MangleEntry {
                name: "verylongname2.txt".to_string(),
                is_dir: false,
            },
        ];
        mangle_siblings(&mut entries, FileInterchange::L1).unwrap();
        assert_ne!(entries[0].name, entries[1].name);
        assert!(entries[0].name.len() <= 12);
        assert!(entries[1].name.len() <= 12);
    }

    #[test]
    fn directories_mangle_without_dot_semantics() {
        let mut entries = [
            MangleEntry {
                name: "a-very-long-directory-name-one".to_string(),
                is_dir: true,
            },
            MangleEntry {
                name: "a-very-long-directory-name-two".to_string(),
                is_dir: true,
            },
        ];
        mangle_siblings(&mut entries, FileInterchange::L2).unwrap();
        assert_ne!(entries[0].name, entries[1].name);
        assert!(entries[0].name.len() <= 30);
    }

    #[test]
    fn first_colliding_sibling_keeps_its_base_name() {
        let mut entries = [
            MangleEntry { name: "a.bin".to_string(), is_dir: false },
            MangleEntry { name: "a.bin".to_string(), is_dir: false },
            MangleEntry { name: "a.bin".to_string(), is_dir: false },
        ];
        mangle_siblings(&mut entries, FileInterchange::L2).unwrap();
        assert_eq!(entries[0].name, "a.bin");
        assert_eq!(entries[1].name, "a0.bin");
        assert_eq!(entries[2].name, "a1.bin");
    }
}

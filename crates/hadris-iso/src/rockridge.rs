//! Rock Ridge: the SUSP-based POSIX metadata extension.
//!
//! Each [`RockRidgeEntry`] is a System Use field as defined by SUSP: a
//! two-character signature, a length byte (including the 4-byte header),
//! a version byte, then a payload. Entries are packed one after another
//! into a directory record's system use area, spilling into a `CE`
//! continuation area when they don't fit.
//!
//! AAIP attribute/ACL data rides along as the payload of a plain `NM`-like
//! entry signed `AL`; see [`aaip`] for that codec.

pub mod aaip;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// A timestamp in the compact 7-byte form `TF` uses by default (years since
/// 1900, rather than a 4-digit decimal year as `DecDateTime` stores it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub years_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub gmt_offset: u8,
}

/// Bits in the old-style `RR` extension flag word, set to announce which
/// later fields are present in the same system use area.
pub mod rr_flags {
    pub const PX: u8 = 0x01;
    pub const PN: u8 = 0x02;
    pub const SL: u8 = 0x04;
    pub const NM: u8 = 0x08;
    pub const CL: u8 = 0x10;
    pub const PL: u8 = 0x20;
    pub const RE: u8 = 0x40;
    pub const TF: u8 = 0x80;
}

/// Bits in a `TF` entry's flag byte selecting which timestamps follow.
pub mod tf_flags {
    pub const CREATION: u8 = 0x01;
    pub const MODIFY: u8 = 0x02;
    pub const ACCESS: u8 = 0x04;
    pub const ATTRIBUTES: u8 = 0x08;
    pub const BACKUP: u8 = 0x10;
    pub const EXPIRATION: u8 = 0x20;
    pub const EFFECTIVE: u8 = 0x40;
    /// Reserved: SUSP allows a 17-byte decimal-date form here, which this
    /// encoder never emits (always writes the compact 7-byte form).
    pub const LONG_FORM: u8 = 0x80;
}

/// Bits in an `NM` or `SL` component's continuation flag byte.
pub mod name_flags {
    pub const CONTINUE: u8 = 0x01;
    pub const CURRENT: u8 = 0x02;
    pub const PARENT: u8 = 0x04;
    pub const ROOT: u8 = 0x08;
}

fn push_header(out: &mut Vec<u8>, signature: &[u8; 2], len: u8, version: u8) {
    out.push(signature[0]);
    out.push(signature[1]);
    out.push(len);
    out.push(version);
}

/// One SUSP/Rock Ridge system use field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RockRidgeEntry {
    /// POSIX file mode, link count, uid, gid and (optionally) serial number.
    Px {
        mode: u32,
        links: u32,
        uid: u32,
        gid: u32,
        serial: Option<u32>,
    },
    /// Device node major/minor numbers, for character and block devices.
    Pn { dev_high: u32, dev_low: u32 },
    /// Symbolic link target, broken into components (a literal path
    /// segment, or one of `.`/`..`/`/`).
    Sl {
        continued: bool,
        components: Vec<SlComponent>,
    },
    /// An alternate (long) name, chained across entries via the continue bit.
    Nm { continued: bool, name: String },
    /// Marks this directory record as a placeholder; the real entry has been
    /// relocated, and its location is given here.
    Cl { child_location: u32 },
    /// Marks the relocated directory itself, pointing back to its parent.
    Pl { parent_location: u32 },
    /// Marks a directory record as the relocated copy of a deep directory.
    Re,
    /// Creation/modify/access/etc. timestamps.
    Tf {
        flags: u8,
        timestamps: Vec<Timestamp>,
    },
    /// Sparse file data: virtual file size and allocated-block table depth.
    Sf {
        virtual_size_high: u32,
        virtual_size_low: u32,
        table_depth: u8,
    },
    /// Old-style extension announcement: which of the above fields this
    /// directory record carries.
    Rr { flags: u8 },
    /// Extensions-in-use identifier, written once in the root directory.
    Er {
        id: String,
        descriptor: String,
        source: String,
    },
    /// Continuation area pointer: block, offset and length of more entries.
    Ce {
        block: u32,
        offset: u32,
        len: u32,
    },
    /// AAIP extended attribute / ACL payload (see [`aaip`]).
    Al { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlComponent {
    pub current: bool,
    pub parent: bool,
    pub root: bool,
    pub content: String,
}

impl SlComponent {
    fn encode(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.current {
            flags |= name_flags::CURRENT;
        }
        if self.parent {
            flags |= name_flags::PARENT;
        }
        if self.root {
            flags |= name_flags::ROOT;
        }
        let mut out = alloc::vec![flags, self.content.len() as u8];
        out.extend_from_slice(self.content.as_bytes());
        out
    }
}

impl RockRidgeEntry {
    /// Encodes this entry into its SUSP wire form, returning `None` if the
    /// payload would overflow the one-byte length field (the caller should
    /// split it across a continuation area instead).
    pub fn encode(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            RockRidgeEntry::Px {
                mode,
                links,
                uid,
                gid,
                serial,
            } => {
                let len = if serial.is_some() { 44 } else { 36 };
                push_header(&mut out, b"PX", len, 1);
                out.extend_from_slice(&lsb_msb_32(*mode));
                out.extend_from_slice(&lsb_msb_32(*links));
                out.extend_from_slice(&lsb_msb_32(*uid));
                out.extend_from_slice(&lsb_msb_32(*gid));
                if let Some(serial) = serial {
                    out.extend_from_slice(&lsb_msb_32(*serial));
                }
            }
            RockRidgeEntry::Pn { dev_high, dev_low } => {
                push_header(&mut out, b"PN", 20, 1);
                out.extend_from_slice(&lsb_msb_32(*dev_high));
                out.extend_from_slice(&lsb_msb_32(*dev_low));
            }
            RockRidgeEntry::Sl {
                continued,
                components,
            } => {
                let mut body = Vec::new();
                for component in components {
                    body.extend(component.encode());
                }
                let len = 5 + body.len();
                if len > 255 {
                    return None;
                }
                push_header(&mut out, b"SL", len as u8, 1);
                out.push(if *continued { name_flags::CONTINUE } else { 0 });
                out.extend_from_slice(&body);
            }
            RockRidgeEntry::Nm { continued, name } => {
                let len = 5 + name.len();
                if len > 255 {
                    return None;
                }
                push_header(&mut out, b"NM", len as u8, 1);
                out.push(if *continued { name_flags::CONTINUE } else { 0 });
                out.extend_from_slice(name.as_bytes());
            }
            RockRidgeEntry::Cl { child_location } => {
                push_header(&mut out, b"CL", 12, 1);
                out.extend_from_slice(&lsb_msb_32(*child_location));
            }
            RockRidgeEntry::Pl { parent_location } => {
                push_header(&mut out, b"PL", 12, 1);
                out.extend_from_slice(&lsb_msb_32(*parent_location));
            }
            RockRidgeEntry::Re => {
                push_header(&mut out, b"RE", 4, 1);
            }
            RockRidgeEntry::Tf { flags, timestamps } => {
                let len = 5 + timestamps.len() * 7;
                if len > 255 {
                    return None;
                }
                push_header(&mut out, b"TF", len as u8, 1);
                out.push(*flags & !tf_flags::LONG_FORM);
                for stamp in timestamps {
                    out.extend_from_slice(&short_date(stamp));
                }
            }
            RockRidgeEntry::Sf {
                virtual_size_high,
                virtual_size_low,
                table_depth,
            } => {
                push_header(&mut out, b"SF", 21, 1);
                out.extend_from_slice(&lsb_msb_32(*virtual_size_high));
                out.extend_from_slice(&lsb_msb_32(*virtual_size_low));
                out.push(*table_depth);
            }
            RockRidgeEntry::Rr { flags } => {
                push_header(&mut out, b"RR", 5, 1);
                out.push(*flags);
            }
            RockRidgeEntry::Er {
                id,
                descriptor,
                source,
            } => {
                let len = 8 + id.len() + descriptor.len() + source.len();
                if len > 255 {
                    return None;
                }
                push_header(&mut out, b"ER", len as u8, 1);
                out.push(id.len() as u8);
                out.push(descriptor.len() as u8);
                out.push(source.len() as u8);
                out.push(1);
                out.extend_from_slice(id.as_bytes());
                out.extend_from_slice(descriptor.as_bytes());
                out.extend_from_slice(source.as_bytes());
            }
            RockRidgeEntry::Ce { block, offset, len } => {
                push_header(&mut out, b"CE", 28, 1);
                out.extend_from_slice(&lsb_msb_32(*block));
                out.extend_from_slice(&lsb_msb_32(*offset));
                out.extend_from_slice(&lsb_msb_32(*len));
            }
            RockRidgeEntry::Al { data } => {
                let len = 4 + data.len();
                if len > 255 {
                    return None;
                }
                push_header(&mut out, b"AL", len as u8, 1);
                out.extend_from_slice(data);
            }
        }
        Some(out)
    }
}

fn lsb_msb_32(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&value.to_le_bytes());
    out[4..8].copy_from_slice(&value.to_be_bytes());
    out
}

fn short_date(stamp: &Timestamp) -> [u8; 7] {
    [
        stamp.years_since_1900,
        stamp.month,
        stamp.day,
        stamp.hour,
        stamp.minute,
        stamp.second,
        stamp.gmt_offset,
    ]
}

/// Packs one or more Rock Ridge entries into a directory record's system
/// use area, appending a `CE` pointer and leaving the overflow entries for
/// the caller to place in the continuation area when the area is full.
pub fn pack_entries(entries: &[RockRidgeEntry], budget: usize) -> (Vec<u8>, Vec<RockRidgeEntry>) {
    let mut packed = Vec::new();
    let mut overflow = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let Some(bytes) = entry.encode() else {
            overflow.extend_from_slice(&entries[idx..]);
            break;
        };
        if packed.len() + bytes.len() > budget {
            overflow.extend_from_slice(&entries[idx..]);
            break;
        }
        packed.extend_from_slice(&bytes);
    }
    (packed, overflow)
}

/// Reassembles a name that was split across multiple continued `NM` entries.
pub fn join_continued_names(entries: &[RockRidgeEntry]) -> String {
    let mut name = String::new();
    for entry in entries {
        if let RockRidgeEntry::Nm { name: part, .. } = entry {
            name.push_str(part);
        }
    }
    name
}

/// Reassembles a symlink target from a (possibly continued) sequence of
/// `SL` entries into a `/`-joined path string.
pub fn join_symlink_target(entries: &[RockRidgeEntry]) -> String {
    let mut parts = Vec::new();
    for entry in entries {
        let RockRidgeEntry::Sl { components, .. } = entry else {
            continue;
        };
        for component in components {
            if component.root {
                parts.push(String::new());
            } else if component.parent {
                parts.push("..".to_string());
            } else if component.current {
                parts.push(".".to_string());
            } else {
                parts.push(component.content.clone());
            }
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_encodes_with_header() {
        let entry = RockRidgeEntry::Px {
            mode: 0o755,
            links: 1,
            uid: 1000,
            gid: 1000,
            serial: None,
        };
        let bytes = entry.encode().unwrap();
        assert_eq!(&bytes[0..2], b"PX");
        assert_eq!(bytes[2], 36);
        assert_eq!(bytes.len(), 36);
    }

    #[test]
    fn rr_flags_roundtrip_as_bits() {
        let flags = rr_flags::PX | rr_flags::NM | rr_flags::TF;
        let entry = RockRidgeEntry::Rr { flags };
        let bytes = entry.encode().unwrap();
        assert_eq!(bytes[4], flags);
    }

    #[test]
    fn symlink_target_reassembles_with_parent_segments() {
        let entries = [RockRidgeEntry::Sl {
            continued: false,
            components: alloc::vec![
                SlComponent {
                    current: false,
                    parent: true,
                    root: false,
                    content: String::new(),
                },
                SlComponent {
                    current: false,
                    parent: false,
                    root: false,
                    content: "bin".to_string(),
                },
            ],
        }];
        assert_eq!(join_symlink_target(&entries), "../bin");
    }

    #[test]
    fn continued_name_joins_in_order() {
        let entries = [
            RockRidgeEntry::Nm {
                continued: true,
                name: "part-one-".to_string(),
            },
            RockRidgeEntry::Nm {
                continued: false,
                name: "part-two".to_string(),
            },
        ];
        assert_eq!(join_continued_names(&entries), "part-one-part-two");
    }

    #[test]
    fn pack_entries_overflows_past_budget() {
        let entries = [
            RockRidgeEntry::Px {
                mode: 0o644,
                links: 1,
                uid: 0,
                gid: 0,
                serial: None,
            },
            RockRidgeEntry::Re,
        ];
        let (packed, overflow) = pack_entries(&entries, 36);
        assert_eq!(packed.len(), 36);
        assert_eq!(overflow.len(), 1);
    }
}

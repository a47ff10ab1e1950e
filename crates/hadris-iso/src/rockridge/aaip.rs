//! AAIP: the Arbitrary Attribute Interchange Protocol
//!
//! Encodes POSIX extended attributes and ACLs into the byte stream carried
//! inside a Rock Ridge `AL` continuation area entry. Layout follows
//! `aaip_0_2.c`: each attribute is a name/value pair split into component
//! records, each component record a `(continuation, length)` byte pair
//! optionally followed by a one-byte namespace prefix, followed by that
//! many data bytes.

use alloc::string::String;
use alloc::vec::Vec;

/// Namespace prefix codes for the short-form attribute name encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Literal = 0x01,
    System = 0x02,
    User = 0x03,
    Isofs = 0x04,
    Trusted = 0x05,
    Security = 0x06,
}

impl Namespace {
    fn prefix(name: &str) -> (Option<Self>, &str) {
        const PREFIXES: &[(&str, Namespace)] = &[
            ("system.", Namespace::System),
            ("user.", Namespace::User),
            ("isofs.", Namespace::Isofs),
            ("trusted.", Namespace::Trusted),
            ("security.", Namespace::Security),
        ];
        for (text, ns) in PREFIXES {
            if let Some(rest) = name.strip_prefix(text) {
                return (Some(*ns), rest);
            }
        }
        (None, name)
    }

    fn text(self) -> &'static str {
        match self {
            Namespace::Literal => "",
            Namespace::System => "system.",
            Namespace::User => "user.",
            Namespace::Isofs => "isofs.",
            Namespace::Trusted => "trusted.",
            Namespace::Security => "security.",
        }
    }
}

/// Writes one component (the name half or the value half of a pair) as a
/// sequence of `(continuation, length[, prefix]) + data` records, each
/// record carrying at most 255 data bytes.
fn encode_component(out: &mut Vec<u8>, prefix: Option<Namespace>, data: &[u8]) {
    if data.is_empty() && prefix.is_none() {
        out.push(0);
        out.push(0);
        return;
    }
    let mut offset = 0;
    let mut prefix = prefix;
    while offset < data.len() || (offset == 0 && prefix.is_some()) {
        let prefix_len = if prefix.is_some() { 1 } else { 0 };
        let remaining = data.len() - offset + prefix_len;
        let todo = remaining.min(255);
        out.push(if remaining > 255 { 1 } else { 0 });
        out.push(todo as u8);
        let mut written = 0;
        if let Some(ns) = prefix.take() {
            out.push(ns as u8);
            written += 1;
        }
        let chunk = todo - written;
        out.extend_from_slice(&data[offset..offset + chunk]);
        offset += chunk;
        if offset >= data.len() {
            break;
        }
    }
}

fn decode_component(data: &[u8], pos: &mut usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        if *pos + 2 > data.len() {
            break;
        }
        let more = data[*pos] != 0;
        let len = data[*pos + 1] as usize;
        *pos += 2;
        if len == 0 {
            break;
        }
        let end = (*pos + len).min(data.len());
        out.extend_from_slice(&data[*pos..end]);
        *pos = end;
        if !more {
            break;
        }
    }
    out
}

/// Encodes one extended-attribute name/value pair.
pub fn encode_pair(name: &str, value: &[u8]) -> Vec<u8> {
    let (prefix, rest) = Namespace::prefix(name);
    let mut out = Vec::new();
    encode_component(&mut out, prefix, rest.as_bytes());
    encode_component(&mut out, None, value);
    out
}

/// Decodes every name/value pair in a concatenated AAIP attribute stream.
pub fn decode_pairs(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut pairs = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let name_bytes = decode_component(data, &mut pos);
        let value = decode_component(data, &mut pos);
        if name_bytes.is_empty() && value.is_empty() {
            break;
        }
        let name = if let Some(&prefix_byte) = name_bytes.first() {
            if let Ok(ns) = Namespace::try_from(prefix_byte) {
                alloc::format!("{}{}", ns.text(), String::from_utf8_lossy(&name_bytes[1..]))
            } else {
                String::from_utf8_lossy(&name_bytes).into_owned()
            }
        } else {
            String::new()
        };
        pairs.push((name, value));
    }
    pairs
}

impl TryFrom<u8> for Namespace {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Namespace::Literal,
            0x02 => Namespace::System,
            0x03 => Namespace::User,
            0x04 => Namespace::Isofs,
            0x05 => Namespace::Trusted,
            0x06 => Namespace::Security,
            _ => return Err(()),
        })
    }
}

/// ACL entry tag, matching the `Aaip_ACL_*` constants.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclTag {
    UserObj = 1,
    User = 2,
    GroupObj = 3,
    Group = 4,
    Mask = 5,
    Other = 6,
    /// Marks the boundary between the access ACL and the default ACL in a
    /// combined encoding.
    SwitchMark = 8,
    UserN = 10,
    GroupN = 12,
}

/// A single parsed ACL entry (`user::rwx`, `group:1000:r-x`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclEntry {
    pub tag: AclTag,
    /// Present for `User`/`Group` (named) entries.
    pub qualifier: Option<u32>,
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl AclEntry {
    fn perm_bits(self) -> u8 {
        (self.read as u8) << 2 | (self.write as u8) << 1 | (self.execute as u8)
    }
}

/// Packs ACL entries into AAIP's tag-nibble/perm-nibble-plus-qualifier wire
/// format. Named user/group entries append a 2-byte qualifier.
pub fn encode_acl(entries: &[AclEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        out.push(entry.perm_bits() | ((entry.tag as u8) << 4));
        if matches!(entry.tag, AclTag::User | AclTag::Group) {
            if let Some(qualifier) = entry.qualifier {
                out.extend_from_slice(&(qualifier as u16).to_le_bytes());
            }
        }
    }
    out
}

pub fn decode_acl(data: &[u8]) -> Vec<AclEntry> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        i += 1;
        let tag_val = byte >> 4;
        let Ok(tag) = AclTag::try_from(tag_val) else {
            continue;
        };
        let qualifier = if matches!(tag, AclTag::User | AclTag::Group) && i + 2 <= data.len() {
            let q = u16::from_le_bytes([data[i], data[i + 1]]) as u32;
            i += 2;
            Some(q)
        } else {
            None
        };
        entries.push(AclEntry {
            tag,
            qualifier,
            read: byte & 0b100 != 0,
            write: byte & 0b010 != 0,
            execute: byte & 0b001 != 0,
        });
    }
    entries
}

impl TryFrom<u8> for AclTag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => AclTag::UserObj,
            2 => AclTag::User,
            3 => AclTag::GroupObj,
            4 => AclTag::Group,
            5 => AclTag::Mask,
            6 => AclTag::Other,
            8 => AclTag::SwitchMark,
            10 => AclTag::UserN,
            12 => AclTag::GroupN,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_pair() {
        let encoded = encode_pair("user.comment", b"hello");
        let pairs = decode_pairs(&encoded);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "user.comment");
        assert_eq!(pairs[0].1, b"hello");
    }

    #[test]
    fn round_trips_multiple_pairs() {
        let mut stream = Vec::new();
        stream.extend(encode_pair("system.posix_acl_access", b"\x01"));
        stream.extend(encode_pair("user.note", b"x"));
        let pairs = decode_pairs(&stream);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0, "user.note");
    }

    #[test]
    fn acl_entries_round_trip_with_qualifiers() {
        let entries = [
            AclEntry {
                tag: AclTag::UserObj,
                qualifier: None,
                read: true,
                write: true,
                execute: false,
            },
            AclEntry {
                tag: AclTag::User,
                qualifier: Some(1000),
                read: true,
                write: false,
                execute: true,
            },
        ];
        let encoded = encode_acl(&entries);
        let decoded = decode_acl(&encoded);
        assert_eq!(decoded, entries);
    }
}

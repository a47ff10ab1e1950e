#[cfg(feature = "std")]
use crate::alg::hash::crc::Crc32HasherIsoHdlc;
use crate::{
    str::utf16::FixedUtf16Str,
    types::{
        endian::{Endian, LittleEndian},
        number::{U32, U64},
    },
};

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct Guid([u8; 16]);

impl Default for Guid {
    fn default() -> Self {
        Self([0; 16])
    }
}

impl core::fmt::Debug for Guid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

impl Guid {
    pub const BASIC_DATA_PART: Self = Self([
        0xa2, 0xa0, 0xd0, 0xeb, 0xe5, 0xb9, 0x33, 0x44, 0x87, 0xc0, 0x68, 0xb6, 0xb7, 0x26, 0x99,
        0xc7,
    ]);
    pub const EFI_SYSTEM_PART: Self = Self([
        0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11, 0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9,
        0x3b,
    ]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub const fn is_nil(&self) -> bool {
        let mut i = 0;
        while i < 16 {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Generates a random version-4, variant-1 GUID (RFC 4122).
    #[cfg(feature = "std")]
    pub fn generate_v4() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        // Version 4: top nibble of byte 6 is 0100
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        // Variant 1: top two bits of byte 8 are 10
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct GptPartitionTableHeader {
    /// The signature for the GPT header, must be "EFI PART".
    pub signature: [u8; 8],
    pub revision: U32<LittleEndian>,
    pub header_size: U32<LittleEndian>,
    pub crc32: U32<LittleEndian>,
    pub reserved: U32<LittleEndian>,
    pub current_lba: U64<LittleEndian>,
    pub backup_lba: U64<LittleEndian>,
    pub first_usable_lba: U64<LittleEndian>,
    pub last_usable_lba: U64<LittleEndian>,
    pub disk_guid: Guid,
    pub partition_entry_lba: U64<LittleEndian>,
    pub num_partition_entries: U32<LittleEndian>,
    /// The size of the size of each partition entry, in bytes.
    ///
    /// Must be a 128 * 2^n bytes
    pub size_of_partition_entry: U32<LittleEndian>,
    pub partition_entry_array_crc32: U32<LittleEndian>,
}

impl GptPartitionTableHeader {
    pub const SIGNATURE: [u8; 8] = *b"EFI PART";
    pub const HEADER_SIZE: u32 = 92;
}

impl Default for GptPartitionTableHeader {
    fn default() -> Self {
        Self {
            signature: Self::SIGNATURE,
            revision: U32::new(0x00010000),
            header_size: U32::new(Self::HEADER_SIZE),
            crc32: U32::new(0),
            reserved: U32::new(0),
            current_lba: U64::new(0),
            backup_lba: U64::new(0),
            first_usable_lba: U64::new(0),
            last_usable_lba: U64::new(0),
            disk_guid: Guid::default(),
            partition_entry_lba: U64::new(0),
            num_partition_entries: U32::new(0),
            size_of_partition_entry: U32::new(128),
            partition_entry_array_crc32: U32::new(0),
        }
    }
}

#[cfg(feature = "std")]
impl GptPartitionTableHeader {
    /// Computes the header CRC32 with the `crc32` field itself zeroed, as
    /// required by the UEFI spec, without mutating `self`.
    pub fn generate_crc32(&self) -> u32 {
        let mut copy = *self;
        copy.crc32 = U32::new(0);
        let bytes: &[u8] = bytemuck::bytes_of(&copy);
        Crc32HasherIsoHdlc::checksum(&bytes[..self.header_size.get() as usize])
    }

    /// Validates the signature, declared header size and stored CRC32.
    /// Does not check `partition_entry_array_crc32` since that requires the
    /// partition entry array, not just the header.
    pub fn is_valid(&self) -> bool {
        if self.signature != Self::SIGNATURE {
            return false;
        }
        if self.header_size.get() as usize != core::mem::size_of::<Self>() {
            return false;
        }
        self.crc32.get() == self.generate_crc32()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct GptPartitionEntry {
    pub type_guid: Guid,
    pub unique_partition_guid: Guid,
    pub starting_lba: U64<LittleEndian>,
    pub ending_lba: U64<LittleEndian>,
    pub attributes: U64<LittleEndian>,
    pub partition_name: FixedUtf16Str<36, LittleEndian>,
}

impl Default for GptPartitionEntry {
    fn default() -> Self {
        Self {
            type_guid: Guid::default(),
            unique_partition_guid: Guid::default(),
            starting_lba: U64::new(0),
            ending_lba: U64::new(0),
            attributes: U64::new(0),
            partition_name: FixedUtf16Str::default(),
        }
    }
}

impl GptPartitionEntry {
    /// An entry with a nil type GUID is unused, per the UEFI spec.
    pub fn is_empty(&self) -> bool {
        self.type_guid.is_nil()
    }
}

/// Computes the CRC32 of a partition entry array, as stored in the GPT
/// header's `partition_entry_array_crc32` field.
#[cfg(feature = "std")]
pub fn entry_array_crc32(entries: &[GptPartitionEntry]) -> u32 {
    Crc32HasherIsoHdlc::checksum(bytemuck::cast_slice(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_matches_struct_layout() {
        assert_eq!(
            core::mem::size_of::<GptPartitionTableHeader>(),
            GptPartitionTableHeader::HEADER_SIZE as usize
        );
    }

    #[test]
    fn header_crc_round_trips() {
        let mut header = GptPartitionTableHeader::default();
        header.num_partition_entries = U32::new(128);
        header.crc32 = U32::new(header.generate_crc32());
        assert!(header.is_valid());
    }

    #[test]
    fn empty_entry_has_nil_type_guid() {
        let entry = GptPartitionEntry::default();
        assert!(entry.is_empty());
    }

    #[cfg(feature = "std")]
    #[test]
    fn generated_guid_has_version_and_variant_bits_set() {
        let guid = Guid::generate_v4();
        assert_eq!(guid.as_bytes()[6] & 0xF0, 0x40);
        assert_eq!(guid.as_bytes()[8] & 0xC0, 0x80);
    }
}

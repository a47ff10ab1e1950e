//! Classic Apple Partition Map (APM), as laid down in block 1+ of the system
//! area when producing a disc bootable on 68k/PowerPC Macs (`hybrid="apm"`
//! in xorriso terms). Each partition map entry occupies one block and
//! describes itself plus the total entry count, so the map can be validated
//! without a separate header block.

use crate::types::{
    endian::{BigEndian, Endian},
    number::U32,
};

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct ApmPartitionEntry {
    /// Must be `0x504D` ("PM").
    pub signature: crate::types::number::U16<BigEndian>,
    pub reserved: crate::types::number::U16<BigEndian>,
    /// Number of blocks occupied by the partition map itself (including
    /// this entry).
    pub map_entry_count: U32<BigEndian>,
    pub partition_start: U32<BigEndian>,
    pub partition_blocks: U32<BigEndian>,
    pub name: [u8; 32],
    pub partition_type: [u8; 32],
    pub data_start: U32<BigEndian>,
    pub data_count: U32<BigEndian>,
    pub status: U32<BigEndian>,
    pub boot_start: U32<BigEndian>,
    pub boot_size: U32<BigEndian>,
    pub boot_load: U32<BigEndian>,
    pub boot_load2: U32<BigEndian>,
    pub boot_entry: U32<BigEndian>,
    pub boot_entry2: U32<BigEndian>,
    pub boot_checksum: U32<BigEndian>,
    pub processor: [u8; 16],
    pub pad: [u8; 380],
}

impl ApmPartitionEntry {
    pub const SIGNATURE: u16 = 0x504D;
    pub const BLOCK_SIZE: u32 = 512;

    pub fn new(index: u32, total_entries: u32, start: u32, blocks: u32, name: &str, ty: &str) -> Self {
        let mut entry = Self::zeroed();
        entry.signature = crate::types::number::U16::new(Self::SIGNATURE);
        entry.map_entry_count = U32::new(total_entries);
        entry.partition_start = U32::new(start);
        entry.partition_blocks = U32::new(blocks);
        entry.data_start = U32::new(0);
        entry.data_count = U32::new(blocks);
        copy_name(&mut entry.name, name);
        copy_name(&mut entry.partition_type, ty);
        let _ = index;
        entry
    }

    fn zeroed() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

fn copy_name(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    let n = bytes.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&bytes[..n]);
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct ApmDriverDescriptorRecord {
    /// Must be `0x4552` ("ER").
    pub signature: crate::types::number::U16<BigEndian>,
    pub block_size: crate::types::number::U16<BigEndian>,
    pub block_count: U32<BigEndian>,
    pub device_type: crate::types::number::U16<BigEndian>,
    pub device_id: crate::types::number::U16<BigEndian>,
    pub data: U32<BigEndian>,
    pub driver_count: crate::types::number::U16<BigEndian>,
    pub pad: [u8; 494],
}

impl ApmDriverDescriptorRecord {
    pub const SIGNATURE: u16 = 0x4552;

    pub fn new(total_blocks: u32) -> Self {
        let mut rec: Self = bytemuck::Zeroable::zeroed();
        rec.signature = crate::types::number::U16::new(Self::SIGNATURE);
        rec.block_size = crate::types::number::U16::new(ApmPartitionEntry::BLOCK_SIZE as u16);
        rec.block_count = U32::new(total_blocks);
        rec.driver_count = crate::types::number::U16::new(0);
        rec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_entry_is_one_block() {
        assert_eq!(core::mem::size_of::<ApmPartitionEntry>(), 512);
    }

    #[test]
    fn driver_descriptor_is_one_block() {
        assert_eq!(core::mem::size_of::<ApmDriverDescriptorRecord>(), 512);
    }

    #[test]
    fn new_entry_sets_signature_and_extent() {
        let entry = ApmPartitionEntry::new(1, 3, 64, 100, "ISO9660", "Apple_ISO");
        assert_eq!(entry.signature.get(), ApmPartitionEntry::SIGNATURE);
        assert_eq!(entry.partition_start.get(), 64);
        assert_eq!(entry.partition_blocks.get(), 100);
    }
}

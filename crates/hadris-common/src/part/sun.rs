//! SUN disk label (VTOC), written into block 0 of the system area so the
//! image can be used as a SPARC OpenBoot disk. Unlike MBR/GPT, the SUN
//! label shares its 512-byte block with the ASCII volume label and an
//! 8-entry partition table; it is identified by the magic word `0xDABE`
//! at the end of the block and protected by a running XOR checksum rather
//! than a CRC.

use crate::types::{
    endian::{BigEndian, Endian},
    number::{U16, U32},
};

#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct SunPartitionEntry {
    /// Starting cylinder of the partition.
    pub start_cylinder: U32<BigEndian>,
    /// Number of blocks in the partition.
    pub num_blocks: U32<BigEndian>,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct SunDiskLabel {
    /// Free-form ASCII description, conventionally identifies the tool
    /// that wrote the label.
    pub info: [u8; 128],
    /// Volume name, distinct from `info`.
    pub volume_name: [u8; 8],
    pub sector_size: U16<BigEndian>,
    pub num_partitions: U16<BigEndian>,
    _reserved_vtoc: [u8; 4],
    partition_tags: [U16<BigEndian>; 8],
    partition_flags: [U16<BigEndian>; 8],
    _reserved_vtoc2: [u8; 52],
    pub rpm: U16<BigEndian>,
    pub physical_cylinders: U16<BigEndian>,
    pub alternate_cylinders: U16<BigEndian>,
    pub interleave: U16<BigEndian>,
    pub data_cylinders: U16<BigEndian>,
    pub num_heads: U16<BigEndian>,
    pub num_sectors: U16<BigEndian>,
    _reserved: [u8; 4],
    pub partitions: [SunPartitionEntry; 8],
    _pad: [u8; 198],
    pub magic: U16<BigEndian>,
    pub checksum: U16<BigEndian>,
}

impl SunDiskLabel {
    pub const MAGIC: u16 = 0xDABE;
    pub const DEFAULT_SECTOR_SIZE: u16 = 512;

    pub fn new(info: &str, data_cylinders: u16, num_heads: u16, num_sectors: u16) -> Self {
        let mut label: Self = bytemuck::Zeroable::zeroed();
        let info_bytes = info.as_bytes();
        let n = info_bytes.len().min(label.info.len());
        label.info[..n].copy_from_slice(&info_bytes[..n]);
        label.sector_size = U16::new(Self::DEFAULT_SECTOR_SIZE);
        label.num_partitions = U16::new(8);
        label.data_cylinders = U16::new(data_cylinders);
        label.physical_cylinders = U16::new(data_cylinders);
        label.num_heads = U16::new(num_heads);
        label.num_sectors = U16::new(num_sectors);
        label.magic = U16::new(Self::MAGIC);
        label
    }

    /// Computes the label checksum: the XOR of every big-endian 16-bit
    /// word in the block up to (not including) the checksum field itself.
    pub fn generate_checksum(&self) -> u16 {
        let mut copy = *self;
        copy.checksum = U16::new(0);
        let bytes: &[u8] = bytemuck::bytes_of(&copy);
        let mut sum = 0u16;
        for chunk in bytes.chunks_exact(2) {
            sum ^= u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        sum
    }

    pub fn finalize(&mut self) {
        self.checksum = U16::new(self.generate_checksum());
    }

    pub fn is_valid(&self) -> bool {
        self.magic.get() == Self::MAGIC && self.checksum.get() == self.generate_checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_one_block() {
        assert_eq!(core::mem::size_of::<SunDiskLabel>(), 512);
    }

    #[test]
    fn checksum_round_trips() {
        let mut label = SunDiskLabel::new("hadris", 100, 1, 32);
        label.finalize();
        assert!(label.is_valid());
    }
}

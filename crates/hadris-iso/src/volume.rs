//! Volume descriptors
//!
//! The volume descriptor set starts at sector 16 and is a sequence of
//! 2048-byte records, each tagged with a [`VolumeDescriptorType`], terminated
//! by a [`VolumeDescriptorSetTerminator`]. [`VolumeDescriptorList`] owns the
//! in-memory set and knows how to read/write it as a whole.

use hadris_io::{Error, Read, Seek, Write};

use crate::{
    RootDirectoryEntry,
    types::{BigEndian, DecDateTime, IsoStrA, IsoStrD, LittleEndian, U16LsbMsb, U32, U32LsbMsb},
};

pub const VOLUME_DESCRIPTOR_SIZE: usize = 2048;
pub const STANDARD_IDENTIFIER: &str = "CD001";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorType {
    BootRecord = 0x00,
    Primary = 0x01,
    Supplementary = 0x02,
    Partition = 0x03,
    SetTerminator = 0xFF,
}

impl VolumeDescriptorType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::BootRecord,
            0x01 => Self::Primary,
            0x02 => Self::Supplementary,
            0x03 => Self::Partition,
            0xFF => Self::SetTerminator,
            _ => return None,
        })
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeDescriptorHeader {
    pub descriptor_type: u8,
    pub standard_identifier: IsoStrA<5>,
    pub version: u8,
}

impl VolumeDescriptorHeader {
    pub fn new(descriptor_type: VolumeDescriptorType) -> Self {
        Self {
            descriptor_type: descriptor_type as u8,
            standard_identifier: IsoStrA::from_str(STANDARD_IDENTIFIER).unwrap(),
            version: 1,
        }
    }
}

/// The Primary Volume Descriptor (PVD), one per image.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct PrimaryVolumeDescriptor {
    pub header: VolumeDescriptorHeader,
    pub unused0: u8,
    pub system_identifier: IsoStrA<32>,
    pub volume_identifier: IsoStrD<32>,
    pub unused1: [u8; 8],
    pub volume_space_size: U32LsbMsb,
    pub unused2: [u8; 32],
    pub volume_set_size: U16LsbMsb,
    pub volume_sequence_number: U16LsbMsb,
    pub logical_block_size: U16LsbMsb,
    pub path_table_size: U32LsbMsb,
    pub type_l_path_table: U32<LittleEndian>,
    pub opt_type_l_path_table: U32<LittleEndian>,
    pub type_m_path_table: U32<BigEndian>,
    pub opt_type_m_path_table: U32<BigEndian>,
    pub dir_record: RootDirectoryEntry,
    pub volume_set_identifier: IsoStrD<128>,
    pub publisher_identifier: IsoStrA<128>,
    pub preparer_identifier: IsoStrA<128>,
    pub application_identifier: IsoStrA<128>,
    pub copyright_file_identifier: IsoStrD<37>,
    pub abstract_file_identifier: IsoStrD<37>,
    pub bibliographic_file_identifier: IsoStrD<37>,
    pub creation_date: DecDateTime,
    pub modification_date: DecDateTime,
    pub expiration_date: DecDateTime,
    pub effective_date: DecDateTime,
    pub file_structure_version: u8,
    pub unused3: u8,
    pub app_data: [u8; 512],
    pub reserved: [u8; 653],
}

unsafe impl bytemuck::Zeroable for PrimaryVolumeDescriptor {}
unsafe impl bytemuck::Pod for PrimaryVolumeDescriptor {}

impl core::fmt::Debug for PrimaryVolumeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrimaryVolumeDescriptor")
            .field("system_identifier", &self.system_identifier)
            .field("volume_identifier", &self.volume_identifier)
            .field("volume_space_size", &self.volume_space_size.read())
            .field("path_table_size", &self.path_table_size.read())
            .finish_non_exhaustive()
    }
}

impl PrimaryVolumeDescriptor {
    /// Creates a new PVD with the given volume identifier and volume space
    /// size (in 2048-byte sectors). Path table and root directory fields are
    /// left zeroed; the caller fills them in once those are written.
    pub fn new(volume_identifier: &str, sectors: u32) -> Self {
        Self {
            header: VolumeDescriptorHeader::new(VolumeDescriptorType::Primary),
            unused0: 0,
            system_identifier: IsoStrA::empty(),
            volume_identifier: IsoStrD::from_str(volume_identifier).unwrap_or(IsoStrD::empty()),
            unused1: [0; 8],
            volume_space_size: U32LsbMsb::new(sectors),
            unused2: [0; 32],
            volume_set_size: U16LsbMsb::new(1),
            volume_sequence_number: U16LsbMsb::new(1),
            logical_block_size: U16LsbMsb::new(2048),
            path_table_size: U32LsbMsb::new(0),
            type_l_path_table: U32::<LittleEndian>::new(0),
            opt_type_l_path_table: U32::<LittleEndian>::new(0),
            type_m_path_table: U32::<BigEndian>::new(0),
            opt_type_m_path_table: U32::<BigEndian>::new(0),
            dir_record: RootDirectoryEntry::default(),
            volume_set_identifier: IsoStrD::empty(),
            publisher_identifier: IsoStrA::empty(),
            preparer_identifier: IsoStrA::empty(),
            application_identifier: IsoStrA::from_str("HADRIS").unwrap_or(IsoStrA::empty()),
            copyright_file_identifier: IsoStrD::empty(),
            abstract_file_identifier: IsoStrD::empty(),
            bibliographic_file_identifier: IsoStrD::empty(),
            creation_date: DecDateTime::now(),
            modification_date: DecDateTime::now(),
            expiration_date: DecDateTime::now(),
            effective_date: DecDateTime::now(),
            file_structure_version: 1,
            unused3: 0,
            app_data: [0; 512],
            reserved: [0; 653],
        }
    }
}

/// A Supplementary Volume Descriptor: used by Joliet (with the UCS-2
/// escape sequence) and by ISO 9660:1999 (the "enhanced volume descriptor",
/// escape sequences left zeroed).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct SupplementaryVolumeDescriptor {
    pub header: VolumeDescriptorHeader,
    pub volume_flags: u8,
    pub system_identifier: IsoStrA<32>,
    pub volume_identifier: IsoStrD<32>,
    pub unused1: [u8; 8],
    pub volume_space_size: U32LsbMsb,
    /// Joliet: one of the UCS-2 escape sequences (`%/@`, `%/C`, `%/E`).
    /// ISO 9660:1999: all zero.
    pub escape_sequences: [u8; 32],
    pub volume_set_size: U16LsbMsb,
    pub volume_sequence_number: U16LsbMsb,
    pub logical_block_size: U16LsbMsb,
    pub path_table_size: U32LsbMsb,
    pub type_l_path_table: U32<LittleEndian>,
    pub opt_type_l_path_table: U32<LittleEndian>,
    pub type_m_path_table: U32<BigEndian>,
    pub opt_type_m_path_table: U32<BigEndian>,
    pub dir_record: RootDirectoryEntry,
    pub volume_set_identifier: IsoStrD<128>,
    pub publisher_identifier: IsoStrA<128>,
    pub preparer_identifier: IsoStrA<128>,
    pub application_identifier: IsoStrA<128>,
    pub copyright_file_identifier: IsoStrD<37>,
    pub abstract_file_identifier: IsoStrD<37>,
    pub bibliographic_file_identifier: IsoStrD<37>,
    pub creation_date: DecDateTime,
    pub modification_date: DecDateTime,
    pub expiration_date: DecDateTime,
    pub effective_date: DecDateTime,
    pub file_structure_version: u8,
    pub unused3: u8,
    pub app_data: [u8; 512],
    pub reserved: [u8; 653],
}

unsafe impl bytemuck::Zeroable for SupplementaryVolumeDescriptor {}
unsafe impl bytemuck::Pod for SupplementaryVolumeDescriptor {}

impl core::fmt::Debug for SupplementaryVolumeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupplementaryVolumeDescriptor")
            .field("volume_identifier", &self.volume_identifier)
            .field("escape_sequences", &self.escape_sequences)
            .finish_non_exhaustive()
    }
}

/// The three well known Joliet UCS-2 level escape sequences (ECMA-119
/// Appendix A / UDF/Joliet spec).
pub const JOLIET_LEVEL1_ESCAPE: [u8; 3] = [0x25, 0x2F, 0x40];
pub const JOLIET_LEVEL2_ESCAPE: [u8; 3] = [0x25, 0x2F, 0x43];
pub const JOLIET_LEVEL3_ESCAPE: [u8; 3] = [0x25, 0x2F, 0x45];

impl SupplementaryVolumeDescriptor {
    /// Creates a Joliet SVD at the given UCS-2 level (2 or 3 are typical).
    pub fn new_joliet(volume_identifier: &str, sectors: u32, level: u8) -> Self {
        let mut svd = Self::new_enhanced(volume_identifier, sectors);
        let escape = match level {
            1 => JOLIET_LEVEL1_ESCAPE,
            3 => JOLIET_LEVEL3_ESCAPE,
            _ => JOLIET_LEVEL2_ESCAPE,
        };
        svd.escape_sequences[..3].copy_from_slice(&escape);
        svd
    }

    /// Creates an ISO 9660:1999 enhanced volume descriptor (no escape
    /// sequence, directory records use the file-name charset directly).
    pub fn new_enhanced(volume_identifier: &str, sectors: u32) -> Self {
        Self {
            header: VolumeDescriptorHeader::new(VolumeDescriptorType::Supplementary),
            volume_flags: 0,
            system_identifier: IsoStrA::empty(),
            volume_identifier: IsoStrD::from_str(volume_identifier).unwrap_or(IsoStrD::empty()),
            unused1: [0; 8],
            volume_space_size: U32LsbMsb::new(sectors),
            escape_sequences: [0; 32],
            volume_set_size: U16LsbMsb::new(1),
            volume_sequence_number: U16LsbMsb::new(1),
            logical_block_size: U16LsbMsb::new(2048),
            path_table_size: U32LsbMsb::new(0),
            type_l_path_table: U32::<LittleEndian>::new(0),
            opt_type_l_path_table: U32::<LittleEndian>::new(0),
            type_m_path_table: U32::<BigEndian>::new(0),
            opt_type_m_path_table: U32::<BigEndian>::new(0),
            dir_record: RootDirectoryEntry::default(),
            volume_set_identifier: IsoStrD::empty(),
            publisher_identifier: IsoStrA::empty(),
            preparer_identifier: IsoStrA::empty(),
            application_identifier: IsoStrA::from_str("HADRIS").unwrap_or(IsoStrA::empty()),
            copyright_file_identifier: IsoStrD::empty(),
            abstract_file_identifier: IsoStrD::empty(),
            bibliographic_file_identifier: IsoStrD::empty(),
            creation_date: DecDateTime::now(),
            modification_date: DecDateTime::now(),
            expiration_date: DecDateTime::now(),
            effective_date: DecDateTime::now(),
            file_structure_version: 1,
            unused3: 0,
            app_data: [0; 512],
            reserved: [0; 653],
        }
    }

    pub fn is_joliet(&self) -> bool {
        let seq = &self.escape_sequences[..3];
        seq == JOLIET_LEVEL1_ESCAPE || seq == JOLIET_LEVEL2_ESCAPE || seq == JOLIET_LEVEL3_ESCAPE
    }
}

/// The Boot Record Volume Descriptor used by El Torito.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct BootRecordVolumeDescriptor {
    pub boot_record_indicator: u8,
    pub iso_identifier: IsoStrA<5>,
    pub version: u8,
    pub boot_system_identifier: [u8; 32],
    pub unused0: [u8; 32],
    pub catalog_ptr: U32<LittleEndian>,
    pub unused1: [u8; 1973],
}

unsafe impl bytemuck::Zeroable for BootRecordVolumeDescriptor {}
unsafe impl bytemuck::Pod for BootRecordVolumeDescriptor {}

impl core::fmt::Debug for BootRecordVolumeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootRecordVolumeDescriptor")
            .field("catalog_ptr", &self.catalog_ptr.get())
            .finish_non_exhaustive()
    }
}

const EL_TORITO_IDENTIFIER: &[u8; 23] = b"EL TORITO SPECIFICATION";

impl BootRecordVolumeDescriptor {
    pub fn new(catalog_ptr: u32) -> Self {
        let mut boot_system_identifier = [0u8; 32];
        boot_system_identifier[..EL_TORITO_IDENTIFIER.len()].copy_from_slice(EL_TORITO_IDENTIFIER);
        Self {
            boot_record_indicator: VolumeDescriptorType::BootRecord as u8,
            iso_identifier: IsoStrA::from_str(STANDARD_IDENTIFIER).unwrap(),
            version: 1,
            boot_system_identifier,
            unused0: [0; 32],
            catalog_ptr: U32::<LittleEndian>::new(catalog_ptr),
            unused1: [0; 1973],
        }
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeDescriptorSetTerminator {
    pub header: VolumeDescriptorHeader,
    pub reserved: [u8; 2041],
}

impl Default for VolumeDescriptorSetTerminator {
    fn default() -> Self {
        Self {
            header: VolumeDescriptorHeader::new(VolumeDescriptorType::SetTerminator),
            reserved: [0; 2041],
        }
    }
}

/// Any one volume descriptor, tagged by kind.
#[derive(Debug, Clone, Copy)]
pub enum VolumeDescriptor {
    BootRecord(BootRecordVolumeDescriptor),
    Primary(PrimaryVolumeDescriptor),
    Supplementary(SupplementaryVolumeDescriptor),
}

impl VolumeDescriptor {
    fn as_bytes(&self) -> &[u8] {
        match self {
            VolumeDescriptor::BootRecord(vd) => bytemuck::bytes_of(vd),
            VolumeDescriptor::Primary(vd) => bytemuck::bytes_of(vd),
            VolumeDescriptor::Supplementary(vd) => bytemuck::bytes_of(vd),
        }
    }
}

/// The ordered set of volume descriptors at the start of the image, plus
/// the implicit set terminator.
#[derive(Debug, Clone, Default)]
pub struct VolumeDescriptorList {
    pub(crate) descriptors: Vec<VolumeDescriptor>,
}

impl VolumeDescriptorList {
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub fn push(&mut self, descriptor: VolumeDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Number of bytes the whole set (descriptors + terminator) occupies.
    pub fn size_required(&self) -> usize {
        (self.descriptors.len() + 1) * VOLUME_DESCRIPTOR_SIZE
    }

    pub fn primary(&self) -> &PrimaryVolumeDescriptor {
        self.descriptors
            .iter()
            .find_map(|d| match d {
                VolumeDescriptor::Primary(pvd) => Some(pvd),
                _ => None,
            })
            .expect("volume descriptor list has no primary volume descriptor")
    }

    pub fn primary_mut(&mut self) -> &mut PrimaryVolumeDescriptor {
        self.descriptors
            .iter_mut()
            .find_map(|d| match d {
                VolumeDescriptor::Primary(pvd) => Some(pvd),
                _ => None,
            })
            .expect("volume descriptor list has no primary volume descriptor")
    }

    pub fn supplementary(&self) -> Option<&SupplementaryVolumeDescriptor> {
        self.descriptors.iter().find_map(|d| match d {
            VolumeDescriptor::Supplementary(svd) => Some(svd),
            _ => None,
        })
    }

    pub fn supplementary_mut(&mut self) -> Option<&mut SupplementaryVolumeDescriptor> {
        self.descriptors.iter_mut().find_map(|d| match d {
            VolumeDescriptor::Supplementary(svd) => Some(svd),
            _ => None,
        })
    }

    pub fn boot_record(&self) -> Option<&BootRecordVolumeDescriptor> {
        self.descriptors.iter().find_map(|d| match d {
            VolumeDescriptor::BootRecord(vd) => Some(vd),
            _ => None,
        })
    }

    pub fn boot_record_mut(&mut self) -> Option<&mut BootRecordVolumeDescriptor> {
        self.descriptors.iter_mut().find_map(|d| match d {
            VolumeDescriptor::BootRecord(vd) => Some(vd),
            _ => None,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        for descriptor in &self.descriptors {
            writer.write_all(descriptor.as_bytes())?;
        }
        writer.write_all(bytemuck::bytes_of(&VolumeDescriptorSetTerminator::default()))?;
        Ok(())
    }

    /// Parses the descriptor set, expecting the reader to already be
    /// positioned at its start (normally sector 16).
    pub fn parse<T: Read + Seek>(reader: &mut T) -> Result<Self, Error> {
        let mut descriptors = Vec::new();
        loop {
            let mut buf = [0u8; VOLUME_DESCRIPTOR_SIZE];
            reader.read_exact(&mut buf)?;
            let Some(kind) = VolumeDescriptorType::from_u8(buf[0]) else {
                log::warn!("Unknown volume descriptor type {:#x}, stopping", buf[0]);
                break;
            };
            match kind {
                VolumeDescriptorType::SetTerminator => break,
                VolumeDescriptorType::Primary => {
                    descriptors.push(VolumeDescriptor::Primary(*bytemuck::from_bytes(&buf)));
                }
                VolumeDescriptorType::Supplementary => {
                    descriptors.push(VolumeDescriptor::Supplementary(*bytemuck::from_bytes(
                        &buf,
                    )));
                }
                VolumeDescriptorType::BootRecord => {
                    descriptors.push(VolumeDescriptor::BootRecord(*bytemuck::from_bytes(&buf)));
                }
                VolumeDescriptorType::Partition => {
                    log::trace!("Skipping volume partition descriptor");
                }
            }
        }
        Ok(Self { descriptors })
    }
}

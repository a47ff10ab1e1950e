//! The El Torito boot specification
//!
//! This is used for booting from CDs and DVDs. Besides the boot catalog
//! itself, [`ElToritoWriter::patch_boot_image`] patches the boot image's own
//! bytes (ISOLINUX boot information table, GRUB2 LBA) once its final extent
//! is known; the isohybrid MBR partition slot is a separate concern, handled
//! by [`crate::system_area`].

use core::fmt::Debug;
use hadris_io::{Error, Read, Seek, SeekFrom, Write};

use crate::{
    BootEntryOptions, BootOptions, BootRecordVolumeDescriptor, FileData, FileInput,
    types::{Endian, LittleEndian, U16, U32},
};

// Types for El Torito boot catalogue
// The boot catalogue consists of a series of boot catalogue entries:
// First, the validation entry
// Next, the initial/default entry
// Section headers,
// Section entries,
// Section entry extensions

/// Boot catalogue
#[derive(Debug, Clone)]
pub struct BootCatalog {
    validation: BootValidationEntry,
    default_entry: BootSectionEntry,
    sections: Vec<(BootSectionHeaderEntry, Vec<BootSectionEntry>)>,
}

impl Default for BootCatalog {
    fn default() -> Self {
        Self::new(EmulationType::NoEmulation, 0, 0, 0)
    }
}

impl BootCatalog {
    pub fn new(
        media_type: EmulationType,
        load_segment: u16,
        sector_count: u16,
        load_rba: u32,
    ) -> Self {
        Self {
            validation: BootValidationEntry::new(),
            default_entry: BootSectionEntry::new(media_type, load_segment, sector_count, load_rba),
            sections: Vec::new(),
        }
    }

    pub fn set_default_entry(&mut self, entry: BootSectionEntry) {
        self.default_entry = entry;
    }

    pub fn add_section(&mut self, platform_id: PlatformId, entries: Vec<BootSectionEntry>) {
        if let Some((header, _entry)) = self.sections.last_mut() {
            // No longer the last section
            header.header_type = 0x90;
        }

        let header = BootSectionHeaderEntry {
            header_type: 0x91,
            platform_id: platform_id.to_u8(),
            section_count: U16::new(1),
            section_ident: [0; 28],
        };

        self.sections.push((header, entries));
    }

    /// Parse the boot catalogue from the given reader,
    /// expects the reader to seek to the start of the catalogue
    pub fn parse<T: Read + Seek>(reader: &mut T) -> Result<Self, Error> {
        debug_assert!(reader.stream_position().unwrap() % 2048 == 0);

        let validation = BootValidationEntry::parse(reader)?;
        if !validation.is_valid() {
            panic!("Invalid boot catalogue: Validation entry is invalid");
        }
        let default_entry = BootSectionEntry::parse(reader)?;
        if !default_entry.is_valid() {
            panic!("Invalid boot catalogue: Default boot entry is invalid");
        }

        let mut sections = Vec::new();
        let mut buffer = [0u8; 32];
        let mut has_more = false;
        let mut header = None;
        let mut entries = Vec::new();
        loop {
            reader.read_exact(&mut buffer)?;
            match buffer[0] {
                0x00 if !has_more => break,
                0x90 => {
                    has_more = true;
                    if let Some(header) = header.take() {
                        sections.push((header, entries));
                        entries = Vec::new();
                    }
                    header = Some(bytemuck::cast(buffer));
                }
                0x91 => {
                    has_more = false;
                    if let Some(header) = header.take() {
                        sections.push((header, entries));
                        entries = Vec::new();
                    }
                    header = Some(bytemuck::cast(buffer));
                }
                id => {
                    if header.is_none() {
                        panic!("Boot catalogue: expected header, got: {:#x}", id);
                    }
                    entries.push(bytemuck::cast(buffer));
                }
            }
        }

        assert!(!has_more, "Boot catalogue: expected more sections");
        if let Some(header) = header {
            sections.push((header, entries));
        }

        Ok(Self {
            validation,
            default_entry,
            sections,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_all(bytemuck::bytes_of(&self.validation))?;
        writer.write_all(bytemuck::bytes_of(&self.default_entry))?;
        for (header, entries) in self.sections.iter() {
            writer.write_all(bytemuck::bytes_of(header))?;
            for entry in entries {
                writer.write_all(bytemuck::bytes_of(entry))?;
            }
        }
        // End of entries
        writer.write_all(&[0; 32])?;
        Ok(())
    }

    pub fn size(&self) -> usize {
        // 32 for the validation entry
        // 32 for the default entry
        // For each section:
        // 32 for header
        // and 32 for each entry
        64 + self
            .sections
            .iter()
            .map(|(_, entries)| entries.len() + 1)
            .sum::<usize>()
            * 32
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BootCatalogueEntry {
    Validation(BootValidationEntry),
    SectionHeader(BootSectionHeaderEntry),
    SectionEntry(BootSectionEntry),
    SectionEntryExtension(BootSectionEntryExtension),
}

impl BootCatalogueEntry {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BootCatalogueEntry::Validation(entry) => bytemuck::bytes_of(entry),
            BootCatalogueEntry::SectionHeader(entry) => bytemuck::bytes_of(entry),
            BootCatalogueEntry::SectionEntry(entry) => bytemuck::bytes_of(entry),
            BootCatalogueEntry::SectionEntryExtension(entry) => bytemuck::bytes_of(entry),
        }
    }

    pub const fn size(&self) -> usize {
        32
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PlatformId {
    /// This is for X8086, X86, and X86_64 architectures.
    X80X86,
    PowerPC,
    Macintosh,
    UEFI,
    Unknown(u8),
}

impl PlatformId {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::X80X86,
            0x01 => Self::PowerPC,
            0x02 => Self::Macintosh,
            0xEF => Self::UEFI,
            value => Self::Unknown(value),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::X80X86 => 0x00,
            Self::PowerPC => 0x01,
            Self::Macintosh => 0x02,
            Self::UEFI => 0xEF,
            Self::Unknown(value) => value,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct BootValidationEntry {
    pub header_id: u8,
    pub platform_id: u8,
    pub reserved: [u8; 2],
    pub manufacturer: [u8; 24],
    pub checksum: U16<LittleEndian>,
    /// 0x55AA
    pub key: [u8; 2],
}

impl BootValidationEntry {
    pub fn new() -> Self {
        let mut entry = Self {
            header_id: 1,
            platform_id: 0,
            reserved: [0; 2],
            manufacturer: [0; 24],
            checksum: U16::new(0),
            key: [0x55, 0xAA],
        };
        entry.checksum.set(entry.calculate_checksum());
        entry
    }
}

impl Debug for BootValidationEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootValidationEntry")
            .field("header_id", &format!("{:#x}", self.header_id))
            .field("platform_id", &PlatformId::from_u8(self.platform_id))
            .field(
                "manufacturer",
                &core::str::from_utf8(&self.manufacturer).unwrap(),
            )
            .field("checksum", &self.checksum.get())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl BootValidationEntry {
    pub fn parse<T: Read>(reader: &mut T) -> Result<Self, Error> {
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf)?;
        Ok(bytemuck::cast(buf))
    }

    pub fn is_valid(&self) -> bool {
        self.header_id == 0x01 && self.checksum.get() == self.calculate_checksum()
    }

    /// Calculates the checksum of the boot catalogue
    ///
    /// The checksum works such that the checksum of the data (including checksum bytes) is 0.
    /// We can do this by finding the sum of the data without the checksum bytes, and negating it
    /// (using two's complement).
    pub fn calculate_checksum(&self) -> u16 {
        // We know the size of the struct, we we can just stack allocate a buffer and copy the data
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(bytemuck::bytes_of(self));
        // Zero out the checksum bytes (we are basically just ignoring them), since we need to find
        // what the data equal without them
        bytes[28] = 0;
        bytes[29] = 0;
        let mut checksum = 0u16;
        for i in (0..32).step_by(2) {
            let value = u16::from_le_bytes([bytes[i], bytes[i + 1]]);
            checksum = checksum.wrapping_add(value);
        }
        // We use two's complement to negate the checksum, so that the checksum + data = 0 (in 16-bit)
        (!checksum) + 1
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct BootSectionHeaderEntry {
    /// 0x90 = Header, more headers follow
    /// 0x91 = Final header
    pub header_type: u8,
    pub platform_id: u8,
    pub section_count: U16<LittleEndian>,
    pub section_ident: [u8; 28],
}

impl Debug for BootSectionHeaderEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootSectionHeaderEntry")
            .field("header_type", &format!("{:#x}", self.header_type))
            .field("platform_id", &PlatformId::from_u8(self.platform_id))
            .field("section_count", &self.section_count.get())
            .field(
                "section_ident",
                &core::str::from_utf8(&self.section_ident).unwrap(),
            )
            .finish_non_exhaustive()
    }
}

unsafe impl bytemuck::Zeroable for BootSectionHeaderEntry {}
unsafe impl bytemuck::Pod for BootSectionHeaderEntry {}

#[derive(Debug, Clone, Copy)]
pub enum EmulationType {
    /// 0x00 = No emulation
    NoEmulation,
    Unknown(u8),
}

impl EmulationType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::NoEmulation,
            value => Self::Unknown(value),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoEmulation => 0x00,
            Self::Unknown(value) => value,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct BootSectionEntry {
    /// 0x88 = Bootable, 0x00 = Not bootable
    pub boot_indicator: u8,
    pub boot_media_type: u8,
    pub load_segment: U16<LittleEndian>,
    pub system_type: u8,
    pub reserved0: u8,
    pub sector_count: U16<LittleEndian>,
    pub load_rba: U32<LittleEndian>,
    pub selection_criteria: u8,
    pub vendor_unique: [u8; 19],
}

impl BootSectionEntry {
    pub fn new(
        media_type: EmulationType,
        load_segment: u16,
        sector_count: u16,
        load_rba: u32,
    ) -> Self {
        Self {
            boot_indicator: 0x88,
            boot_media_type: media_type.to_u8(),
            load_segment: U16::new(load_segment),
            system_type: 0,
            reserved0: 0,
            sector_count: U16::new(sector_count),
            load_rba: U32::new(load_rba),
            selection_criteria: 0,
            vendor_unique: [0; 19],
        }
    }
}

impl Debug for BootSectionEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootSectionEntry")
            .field("boot_indicator", &format!("{:#x}", self.boot_indicator))
            .field(
                "boot_media_type",
                &EmulationType::from_u8(self.boot_media_type),
            )
            .field("load_segment", &self.load_segment.get())
            .field("system_type", &self.system_type)
            .field("sector_count", &self.sector_count.get())
            .field("load_rba", &self.load_rba.get())
            .field("selection_criteria", &self.selection_criteria)
            .finish_non_exhaustive()
    }
}

impl BootSectionEntry {
    pub fn parse<T: Read>(reader: &mut T) -> Result<Self, Error> {
        let mut buf: [u8; 32] = [0; 32];
        reader.read_exact(&mut buf)?;
        Ok(bytemuck::cast(buf))
    }

    pub fn is_valid(&self) -> bool {
        self.boot_indicator == 0x88
    }
}

unsafe impl bytemuck::Zeroable for BootSectionEntry {}
unsafe impl bytemuck::Pod for BootSectionEntry {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BootSectionEntryExtension {
    // Must be 0x44
    pub extension_indicator: u8,
    // Bit 5: 1 = more extensions follow, 0 = final extension
    pub flags: u8,
    pub vendor_unique: [u8; 30],
}

unsafe impl bytemuck::Zeroable for BootSectionEntryExtension {}
unsafe impl bytemuck::Pod for BootSectionEntryExtension {}

/// Boot information table
///
/// This table is located in the boot binary and contains information about the
/// ISO image and the boot binary.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct BootInfoTable {
    /// The start LBA of the ISO image (This would 16 in most cases)
    pub iso_start: U32<LittleEndian>,
    /// The start LBA of the boot binary
    pub file_lba: U32<LittleEndian>,
    /// The length of the boot binary (in bytes)
    pub file_len: U32<LittleEndian>,
    /// The checksum of the boot binary
    pub checksum: U32<LittleEndian>,
}

pub struct ElToritoWriter;

impl ElToritoWriter {
    /// Creates the El-Torito ovlume descriptor based on the given options and files
    /// This will append a boot catalogue to the given files if the options require it
    /// When extra checks are enabled, this will also check that the boot entry paths are valid
    /// (included in the files)
    pub fn create_descriptor(
        opts: &BootOptions,
        files: &mut FileInput,
    ) -> BootRecordVolumeDescriptor {
        log::trace!("Adding boot record to volume descriptors");
        #[cfg(feature = "extra-checks")]
        for entry in opts.entries() {
            assert!(
                files.contains(&entry.boot_image_path),
                "Boot image path not found in files"
            );
        }

        if opts.write_boot_catalogue {
            log::trace!("Appending boot catalogue to file list");
            let size = 96 + opts.entries.len() * 64;
            let size = (size + 2047) & !2047;
            files.append(crate::file::File::new(
                "boot.catalog".to_string(),
                FileData::Data(vec![0; size]),
            ));
        }
        BootRecordVolumeDescriptor::new(0)
    }

    /// Patches an already-written El Torito boot image with a boot
    /// information table (ISOLINUX/SYSLINUX convention) and/or the GRUB2
    /// LBA patch, per `opts`. Must run after every pipeline writer has
    /// placed its data: both patches embed the boot file's own final LBA,
    /// which isn't known until layout is frozen.
    ///
    /// `pvd_lba` is the image's primary volume descriptor LBA (16 for a
    /// fresh, non-multisession image). `file_lba`/`file_len` are the boot
    /// image's own extent, in blocks and bytes respectively.
    pub fn patch_boot_image<W: Read + Write + Seek>(
        writer: &mut W,
        pvd_lba: u32,
        file_lba: u32,
        file_len: u32,
        opts: &BootEntryOptions,
    ) -> Result<(), Error> {
        if opts.boot_info_table {
            Self::patch_boot_info_table(writer, pvd_lba, file_lba, file_len)?;
        }
        if opts.grub2_boot_info {
            Self::patch_grub2_boot_image(writer, file_lba, file_len)?;
        }
        Ok(())
    }

    /// The ISOLINUX/SYSLINUX boot information table: a checksum of the boot
    /// image (from byte 64 onward) plus the PVD LBA, the boot image's own
    /// LBA and its length, written at byte offset 8 of the boot image.
    fn patch_boot_info_table<W: Read + Write + Seek>(
        writer: &mut W,
        pvd_lba: u32,
        file_lba: u32,
        file_len: u32,
    ) -> Result<(), Error> {
        if file_len < 64 {
            log::warn!("Boot image too small to hold a boot information table, skipping patch");
            return Ok(());
        }

        let byte_offset = file_lba as u64 * 2048;
        let mut checksum = 0u32;
        let mut buffer = [0u8; 4];
        writer.seek(SeekFrom::Start(byte_offset + 64))?;
        for _ in (64..file_len).step_by(4) {
            writer.read_exact(&mut buffer)?;
            checksum = checksum.wrapping_add(u32::from_le_bytes(buffer));
        }

        let table = BootInfoTable {
            iso_start: U32::new(pvd_lba),
            file_lba: U32::new(file_lba),
            file_len: U32::new(file_len),
            checksum: U32::new(checksum),
        };

        const TABLE_OFFSET: u64 = 8;
        writer.seek(SeekFrom::Start(byte_offset + TABLE_OFFSET))?;
        writer.write_all(bytemuck::bytes_of(&table))?;
        Ok(())
    }

    /// GRUB2's El Torito LBA patch: the boot image's own LBA, converted to
    /// 512-byte units and offset by a fixed constant, written as a
    /// little-endian 64-bit value 2548 bytes into the boot image
    /// (`512*5 - 12`, grounded on libisofs's
    /// `Libisofs_grub2_elto_patch_poS`/`_offsT`).
    fn patch_grub2_boot_image<W: Write + Seek>(
        writer: &mut W,
        file_lba: u32,
        file_len: u32,
    ) -> Result<(), Error> {
        const GRUB2_ELTO_PATCH_POS: u64 = 512 * 5 - 12;
        const GRUB2_ELTO_PATCH_OFFSET: u64 = 5;

        if (file_len as u64) < GRUB2_ELTO_PATCH_POS + 8 {
            log::warn!("Boot image too small for GRUB2 patch, skipping");
            return Ok(());
        }

        let blk = (file_lba as u64) * 4 + GRUB2_ELTO_PATCH_OFFSET;
        let byte_offset = file_lba as u64 * 2048 + GRUB2_ELTO_PATCH_POS;
        writer.seek(SeekFrom::Start(byte_offset))?;
        writer.write_all(&(blk as u32).to_le_bytes())?;
        writer.write_all(&((blk >> 32) as u32).to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_eq_size!(BootValidationEntry, [u8; 32]);
    static_assertions::assert_eq_size!(BootSectionHeaderEntry, [u8; 32]);
    static_assertions::assert_eq_size!(BootSectionEntry, [u8; 32]);

    static_assertions::assert_eq_align!(BootValidationEntry, u8);
    static_assertions::assert_eq_align!(BootSectionHeaderEntry, u8);
    static_assertions::assert_eq_align!(BootSectionEntry, u8);

    use std::io::Cursor;

    fn boot_entry_opts(boot_info_table: bool, grub2_boot_info: bool) -> BootEntryOptions {
        BootEntryOptions {
            load_size: 4,
            boot_image_path: "boot.img".to_string(),
            boot_info_table,
            grub2_boot_info,
            emulation: EmulationType::NoEmulation,
        }
    }

    #[test]
    fn patch_boot_info_table_writes_expected_fields() {
        let file_len = 2048u32;
        let mut image = Cursor::new(vec![0u8; file_len as usize]);
        let opts = boot_entry_opts(true, false);

        ElToritoWriter::patch_boot_image(&mut image, 16, 32, file_len, &opts).unwrap();

        let bytes = image.into_inner();
        let table: &BootInfoTable = bytemuck::from_bytes(&bytes[8..8 + 16]);
        assert_eq!(table.iso_start.get(), 16);
        assert_eq!(table.file_lba.get(), 32);
        assert_eq!(table.file_len.get(), file_len);
        // Checksum is a sum of LE32 words from byte 64 onward, all zero here.
        assert_eq!(table.checksum.get(), 0);
    }

    #[test]
    fn patch_boot_info_table_skips_small_images() {
        let mut image = Cursor::new(vec![0xABu8; 32]);
        let opts = boot_entry_opts(true, false);

        ElToritoWriter::patch_boot_image(&mut image, 16, 32, 32, &opts).unwrap();

        // Untouched: too small to hold a boot information table.
        assert!(image.into_inner().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn patch_grub2_boot_image_writes_le64_lba() {
        let file_len = 4096u32;
        let mut image = Cursor::new(vec![0u8; file_len as usize]);
        let opts = boot_entry_opts(false, true);
        let file_lba = 100u32;

        ElToritoWriter::patch_boot_image(&mut image, 16, file_lba, file_len, &opts).unwrap();

        let bytes = image.into_inner();
        let pos = (512 * 5 - 12) as usize;
        let low = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        let high = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap());
        let blk = ((high as u64) << 32) | low as u64;
        assert_eq!(blk, file_lba as u64 * 4 + 5);
    }

    #[test]
    fn patch_grub2_boot_image_skips_small_images() {
        let mut image = Cursor::new(vec![0xCDu8; 256]);
        let opts = boot_entry_opts(false, true);

        ElToritoWriter::patch_boot_image(&mut image, 16, 10, 256, &opts).unwrap();

        assert!(image.into_inner().iter().all(|&b| b == 0xCD));
    }

    #[test]
    fn patch_boot_image_applies_both_patches() {
        let file_len = 4096u32;
        let mut image = Cursor::new(vec![0u8; file_len as usize]);
        let opts = boot_entry_opts(true, true);

        ElToritoWriter::patch_boot_image(&mut image, 16, 50, file_len, &opts).unwrap();

        let bytes = image.into_inner();
        let table: &BootInfoTable = bytemuck::from_bytes(&bytes[8..8 + 16]);
        assert_eq!(table.file_lba.get(), 50);

        let pos = (512 * 5 - 12) as usize;
        assert_ne!(&bytes[pos..pos + 8], &[0u8; 8]);
    }
}

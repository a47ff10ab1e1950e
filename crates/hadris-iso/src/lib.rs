//! Hadris ISO
//! Terminology and spec are followed by the specifications described in
//! the [non official ISO9660 specification included](https://github.com/hxyulin/hadris/tree/main/crates/hadris-iso/spec)

#[cfg(feature = "el-torito")]
pub mod boot;
#[cfg(feature = "el-torito")]
pub use boot::*;

use bytemuck::Zeroable;
use hadris_common::part::{
    gpt::{GptPartitionEntry, GptPartitionTableHeader},
    mbr::{MbrPartitionTable, MbrPartitionType},
};

pub use directory::*;
pub use file::*;
pub use options::*;
pub use path::*;
// We expose these types because they are used in the public API,
// but they are also just std::io types of hadris-io types (if in no-std mode)
pub use hadris_io::{Error, Read, Seek, SeekFrom, Write};

/// A reader/writer/seeker, the minimum bound needed to both parse and format
/// an image.
pub trait ReadWriteSeek: Read + Write + Seek {}
impl<T: Read + Write + Seek> ReadWriteSeek for T {}

extern crate alloc;

#[cfg(feature = "write")]
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use core::fmt::Debug;
pub use types::*;
pub use volume::*;

mod directory;
mod file;
pub mod filesrc;
pub mod name;
mod options;
mod path;
pub mod rockridge;
#[cfg(feature = "write")]
pub mod system_area;
mod types;
mod volume;
#[cfg(feature = "write")]
pub mod writer;

/// Errors that can occur when working with an ISO image
#[derive(Debug, thiserror::Error)]
pub enum IsoImageError {
    #[cfg(feature = "extra-checks")]
    /// The image is too small, check [`FormatOptions::image_len()`] for the minimum size
    #[error("The image is too small, expected at least {0}b, got {1}b")]
    ImageTooSmall(u64, u64),

    /// An IO error occurred
    ///
    /// When working with the `std` feature, this is an alias for [`std::io::Error`]
    /// When working with the `no-std` feature, this is an alias for [`hadris_io::Error`]
    #[error(transparent)]
    IoError(#[from] hadris_io::Error),

    #[cfg(feature = "write")]
    /// Writing the system area (MBR/GPT/APM/SUN partition tables) failed
    #[error(transparent)]
    SystemArea(#[from] system_area::SystemAreaError),
}

/// An ISO image
///
/// This is the main struct for working with ISO images.
///
/// # Example
/// To create a new ISO image, you can use the [`Self::format_file`] method. \
/// This example creates a hybrid bootable image with a BIOS boot entry and a UEFI boot entry:
/// ```
/// use hadris_iso::{IsoImage, FormatOption, FileInput, FileInterchange, BootOptions, BootEntryOptions, EmulationType, PlatformId, BootSectionOptions};
/// use std::path::PathBuf;
///
/// let files = PathBuf::from("path/to/iso_root");
/// # // Now we need to actually create a temporary directory
/// # let files = tempfile::tempdir()?.into_path();
/// # let mut tmpfile = std::fs::File::create(files.join("boot.img"))?;
/// # use std::io::Write;
/// # writeln!(tmpfile, "Hello, world!")?;
/// # drop(tmpfile);
/// # let mut tmpfile = std::fs::File::create(files.join("uefi-boot.img"))?;
/// # writeln!(tmpfile, "Hello, world!")?;
/// # drop(tmpfile);
/// let options = FormatOption::new()
/// .with_files(FileInput::from_fs(&files)?)
/// .with_level(FileInterchange::NonConformant)
/// .with_boot_options(BootOptions {
///     write_boot_catalogue: true,
///     default: BootEntryOptions {
///         boot_image_path: "boot.img".to_string(),
///         load_size: 4,
///         emulation: EmulationType::NoEmulation,
///         boot_info_table: true,
///         grub2_boot_info: false,
///     },
///     entries: vec![(
///         BootSectionOptions {
///             platform_id: PlatformId::UEFI,
///         },
///         BootEntryOptions {
///             boot_image_path: "uefi-boot.img".to_string(),
///             load_size: 0, // This means the size will be calculated
///             emulation: EmulationType::NoEmulation,
///             boot_info_table: false,
///             grub2_boot_info: false,
///         },
///     )],
/// });
/// let output_file = PathBuf::from("my_image.iso");
/// # let output_file = files.join("my_image.iso");
/// let file = IsoImage::format_file(output_file, options)?;
/// # Ok::<(), hadris_iso::IsoImageError>(())
/// ````
#[derive(Debug)]
pub struct IsoImage<'a, T: Read + Write + Seek> {
    data: &'a mut T,

    volume_descriptors: VolumeDescriptorList,
    root_directory: DirectoryRef,
    path_table: PathTableRef,
}

#[cfg(feature = "write")]
impl<'a> IsoImage<'a, std::fs::File> {
    /// Formats a new ISO image,
    ///
    /// This creates a new file, which may be too large for some cases,
    /// but it will be truncated to the correct size when the image is written.
    /// This may only be an issue when low on disk space or using an in-memory filesystem. 
    /// Due to how many operating systems work with files, the pages should be mapped-on-demand,
    /// and there shouldn't be a lot of performance penalty.
    pub fn format_file<P>(path: P, options: FormatOption) -> Result<std::fs::File, IsoImageError>
    where
        P: AsRef<std::path::Path>,
    {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .unwrap();
        let (min, max) = options.image_len();
        log::trace!("Calculate minimum and maximum size of image: {min}b to {max}b");
        file.set_len(max).unwrap();
        IsoImage::format_new(&mut file, options)?;
        let written = file.stream_position()?;
        log::debug!("Written {written}b to image, trimming...");
        file.set_len(written)?;
        file.flush()?;
        Ok(file)
    }
}

impl<'a, T: Read + Write + Seek> IsoImage<'a, T> {
    /// Formats a new ISO image,
    /// for a more convenient API, see [`Self::format_file`] for [`std::fs::File`]
    /// Otherwise, resize the image using the minimum / maximum from [`FormatOptions::image_len`].
    #[cfg(feature = "write")]
    pub fn format_new(data: &'a mut T, mut ops: FormatOption) -> Result<(), IsoImageError> {
        #[cfg(feature = "extra-checks")]
        if ops.strictness >= Strictness::Default {
            let size_bytes = data.seek(SeekFrom::End(0))?;
            let (min_size, _max_size) = ops.image_len();
            if size_bytes < min_size {
                return Err(IsoImageError::ImageTooSmall(min_size, size_bytes));
            }

            log::trace!(
                "Started formatting ISO image with {} sectors ({}) bytes)",
                size_bytes / 2048,
                size_bytes
            );
        }

        // The volume descriptor set's size is fixed by which optional
        // descriptors are requested, so the post-descriptor start block is
        // known before any writer runs: one primary descriptor always, one
        // boot record / Joliet / ISO 9660:1999 descriptor each iff
        // requested, plus the implicit terminator.
        let mut descriptor_count = 1u64;
        #[cfg(feature = "el-torito")]
        if ops.boot.is_some() {
            descriptor_count += 1;
        }
        #[cfg(feature = "joliet")]
        if ops.joliet {
            descriptor_count += 1;
        }
        #[cfg(feature = "iso1999")]
        if ops.iso9660_1999 {
            descriptor_count += 1;
        }
        let start_block = system_area::SYSTEM_AREA_BLOCKS + descriptor_count + 1;

        let (dirs, files) = ops.files.split();
        let file_nodes = files.clone();

        // Writer order follows the documented significant order (ECMA-119,
        // El Torito, Joliet, ISO 9660:1999, HFS+, checksum, tail padding)
        // with one deviation: `filesrc` leads the list instead of sitting
        // just before the HFS+/FAT tail, because every tree/boot writer's
        // `compute_data_blocks` looks up its children's final extents in
        // `PipelineState::file_extents` in the same pass that lays out its
        // own directory records (there is no later patch pass for file
        // records the way there is for directory self/parent entries), so
        // `file_extents` must already be populated before any of them runs.
        let mut pipeline = writer::Pipeline::new(&mut *data, start_block);
        pipeline.push(Box::new(writer::filesrc::FilesrcWriter::new(files)));
        pipeline.push(Box::new(
            writer::ecma::EcmaWriter::new(ops.level, ops.volume_name.clone(), dirs.clone())
                .with_rock_ridge(ops.rock_ridge, ops.permissions)
                .with_file_nodes(&file_nodes, &dirs)
                .with_timing(ops.timing.clone())
                .with_relaxations(ops.relaxations)
                .with_relocation(ops.relocation.clone()),
        ));
        #[cfg(feature = "el-torito")]
        if let Some(boot_ops) = ops.boot.clone() {
            pipeline.push(Box::new(writer::eltorito::EltoritoWriter::new(
                boot_ops,
            )));
        }
        #[cfg(feature = "joliet")]
        if ops.joliet {
            pipeline.push(Box::new(writer::joliet::JolietWriter::new(
                ops.volume_name.clone(),
                dirs.clone(),
            )));
        }
        #[cfg(feature = "iso1999")]
        if ops.iso9660_1999 {
            pipeline.push(Box::new(writer::iso1999::Iso1999Writer::new(
                ops.volume_name.clone(),
                dirs.clone(),
            )));
        }
        #[cfg(feature = "hfsplus")]
        if ops.hfs_plus {
            pipeline.push(Box::new(writer::hfsplus::HfsPlusWriter::new(
                ops.volume_name.clone(),
                2048,
                dirs.clone(),
            )));
        }
        pipeline.push(Box::new(writer::checksum::ChecksumWriter::new(0)));

        // A GPT backup needs its own reserved tail, the same way
        // `FormatOption::image_len` already accounts for it.
        let gpt_tail_blocks = if ops.format.contains(PartitionOptions::GPT) {
            let gpt_bytes = 128u64 * 128 + 512;
            (gpt_bytes + 2047) / 2048
        } else {
            0
        };
        pipeline.push(Box::new(writer::zeropad::ZeropadWriter::new(
            gpt_tail_blocks,
        )));

        let volume_descriptors = pipeline.run()?;
        let image_blocks = pipeline.state.total_blocks;
        #[cfg(feature = "el-torito")]
        let file_extents = core::mem::take(&mut pipeline.state.file_extents);
        // `pipeline` borrowed `data` mutably; drop it so `data` can be used
        // directly again for the post-processing steps below.
        drop(pipeline);

        #[cfg(feature = "el-torito")]
        if let Some(boot_ops) = &ops.boot {
            for entry in boot_ops.entries() {
                let Some(extent) = file_extents.get(&entry.boot_image_path) else {
                    continue;
                };
                boot::ElToritoWriter::patch_boot_image(
                    data,
                    system_area::SYSTEM_AREA_BLOCKS as u32,
                    extent.offset as u32,
                    extent.size as u32,
                    &entry,
                )?;
            }
        }

        if let Some(system_area) = &ops.system_area {
            assert!(system_area.len() as u64 <= system_area::SYSTEM_AREA_BYTES);
            data.seek(SeekFrom::Start(0))?;
            data.write_all(system_area)?;
        }

        let write_format =
            ops.system_area.is_none() || ops.format.contains(PartitionOptions::OVERWRITE_FORMAT);

        if write_format {
            if ops.format.contains(PartitionOptions::INCLUDE_DEFAULT_BOOT) {
                log::warn!(
                    "INCLUDE_DEFAULT_BOOT was requested, but this build embeds no default boot \
                     sector stub; skipping. Use PROTECTIVE_MBR or an El Torito boot entry instead."
                );
            }

            let plan = system_area::SystemAreaPlan {
                mbr: ops.format.contains(PartitionOptions::MBR),
                protective_mbr: ops.format.contains(PartitionOptions::PROTECTIVE_MBR),
                gpt: ops.format.contains(PartitionOptions::GPT),
                ..Default::default()
            };
            system_area::compose(data, &plan, image_blocks)?;
        }

        data.seek(SeekFrom::Start(system_area::SYSTEM_AREA_BYTES))?;
        volume_descriptors.write(data)?;

        // We need to be at the end of the image
        data.seek(SeekFrom::Start(image_blocks * 2048))?;
        Ok(())
    }

    #[deprecated(since = "0.0.1", note = "Use `parse` instead")]
    pub fn new(data: &'a mut T) -> Result<Self, Error> {
        Self::parse(data)
    }

    /// Parses an ISO image from the given reader
    /// Currently this is not fully supported, and only provides basic information
    pub fn parse(data: &'a mut T) -> Result<Self, Error> {
        {
            data.seek(SeekFrom::Start(446))?;
            let mut mbr = MbrPartitionTable::default();
            data.read_exact(bytemuck::bytes_of_mut(&mut mbr))?;
            if mbr.is_valid() {
                let len = mbr.len();
                log::trace!("Found MBR partition table with {} entries", len);
                for i in 0..len {
                    log::trace!("\tPartition {}:", i);
                    log::trace!("\t\tStart sector: {}", mbr[i].start_sector);
                    log::trace!("\t\tSector count: {}", mbr[i].block_count);
                    log::trace!(
                        "\t\tType: {:?}",
                        MbrPartitionType::from_u8(mbr[i].part_type)
                    );
                }
            }
        }

        {
            data.seek(SeekFrom::Start(512))?;
            let mut gpt_header = GptPartitionTableHeader::default();
            data.read_exact(bytemuck::bytes_of_mut(&mut gpt_header))?;
            if gpt_header.is_valid() {
                log::trace!(
                    "Found GPT partition table with {} entries",
                    gpt_header.num_partition_entries
                );
                let checksum = gpt_header.crc32.get();
                gpt_header.generate_crc32();
                if checksum != gpt_header.crc32.get() {
                    log::warn!(
                        "GPT header CRC32 checksum mismatch, got {:#x}, expected {:#x}",
                        gpt_header.crc32.get(),
                        checksum
                    );
                }
                log::trace!("\tRevision: {}", gpt_header.revision);
                log::trace!("\tHeader size: {}", gpt_header.header_size);
                log::trace!("\tCRC32: {}", gpt_header.crc32);
                log::trace!("\tDisk GUID: {}", gpt_header.disk_guid);
                log::trace!("\tCurrent LBA: {}", gpt_header.current_lba);
                log::trace!("\tBackup LBA: {}", gpt_header.backup_lba);
                log::trace!("\tFirst usable LBA: {}", gpt_header.first_usable_lba);
                log::trace!("\tLast usable LBA: {}", gpt_header.last_usable_lba);
                log::trace!("\tPartition entry LBA: {}", gpt_header.partition_entry_lba);
                log::trace!(
                    "\tNum partition entries: {}",
                    gpt_header.num_partition_entries
                );
                log::trace!(
                    "\tSize of partition entry: {}",
                    gpt_header.size_of_partition_entry
                );
                log::trace!(
                    "\tPartition entry array CRC32: {}",
                    gpt_header.partition_entry_array_crc32
                );

                data.seek(SeekFrom::Start(
                    gpt_header.partition_entry_lba.get() as u64 * 512,
                ))?;
                let mut entries = vec![
                    GptPartitionEntry::zeroed();
                    gpt_header.num_partition_entries.get() as usize
                ];
                data.read_exact(bytemuck::cast_slice_mut(&mut entries))?;
                for entry in entries.iter_mut() {
                    if entry.is_empty() {
                        continue;
                    }
                    let name = entry
                        .partition_name
                        .to_string()
                        .unwrap_or("Invalid UTF-8".to_string());
                    log::trace!("\tPartition {}:", name);
                    log::trace!("\t\tType GUID: {}", entry.type_guid);
                    log::trace!("\t\tUnique GUID: {}", entry.unique_partition_guid);
                    log::trace!("\t\tStarting LBA: {}", entry.starting_lba);
                    log::trace!("\t\tEnding LBA: {}", entry.ending_lba);
                    log::trace!("\t\tAttributes: {}", entry.attributes);
                    log::trace!("\t\tPartition name: {}", name);
                }

                let backup = gpt_header.backup_lba.get() as u64 * 512;
                data.seek(SeekFrom::Start(backup))?;
                let mut backup_header = GptPartitionTableHeader::default();
                data.read_exact(bytemuck::bytes_of_mut(&mut backup_header))?;
                if !backup_header.is_valid() {
                    log::warn!("Found invalid backup GPT header at LBA {}", backup);
                }
                // TODO: Calculate the checksum for backup
            }
        }

        data.seek(SeekFrom::Start(16 * 2048))?;
        let volume_descriptors = VolumeDescriptorList::parse(data)?;

        let pvd = volume_descriptors.primary();
        #[cfg(feature = "el-torito")]
        if let Some(boot) = volume_descriptors.boot_record() {
            data.seek(SeekFrom::Start(boot.catalog_ptr.get() as u64 * 2048))?;
            let catalogue = BootCatalog::parse(data)?;
            log::trace!("Boot catalogue: {:?}", catalogue);
            // At the moment we dont support anything with a boot catalogue
        }

        let root_entry = pvd.dir_record;
        let root_directory = DirectoryRef {
            offset: root_entry.header.extent.read() as u64,
            size: root_entry.header.data_len.read() as u64,
        };

        let path_table = PathTableRef {
            lpath_table_offset: pvd.type_l_path_table.get() as u64,
            mpath_table_offset: pvd.type_m_path_table.get() as u64,
            size: pvd.path_table_size.read() as u64,
        };

        Ok(Self {
            data,

            volume_descriptors,
            root_directory,
            path_table,
        })
    }

    pub fn root_directory(&mut self) -> IsoDir<T> {
        IsoDir {
            reader: &mut self.data,
            directory: self.root_directory,
        }
    }

    pub fn path_table(&mut self) -> IsoPathTable<T> {
        IsoPathTable {
            reader: &mut self.data,
            path_table: self.path_table,
        }
    }

    /// Summarizes the image's primary volume descriptor and the presence of
    /// the optional volume descriptors this crate can write.
    pub fn info(&self) -> IsoImageInfo {
        let pvd = self.volume_descriptors.primary();
        IsoImageInfo {
            volume_identifier: pvd.volume_identifier.as_str().to_string(),
            volume_space_size: pvd.volume_space_size.read(),
            has_joliet: self.volume_descriptors.supplementary().is_some(),
            has_boot_record: self.volume_descriptors.boot_record().is_some(),
        }
    }
}

/// A small summary of an image's volume descriptor set, returned by
/// [`IsoImage::info`].
#[derive(Debug, Clone)]
pub struct IsoImageInfo {
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub has_joliet: bool,
    pub has_boot_record: bool,
}

/// Trait for internal methods of the `IsoImage` struct.
///
/// This trait provides a way to access some of the internal structures of the `IsoImage` struct,
/// and not only the public API (files, boot entries, etc.).
pub trait VolumeInternals {
    /// Returns a reference to the volume descriptors.
    fn get_volume_descriptors(&self) -> &[VolumeDescriptor];
}

impl<'a, T: Read + Write + Seek> VolumeInternals for IsoImage<'a, T> {
    fn get_volume_descriptors(&self) -> &[VolumeDescriptor] {
        self.volume_descriptors.descriptors.as_slice()
    }
}

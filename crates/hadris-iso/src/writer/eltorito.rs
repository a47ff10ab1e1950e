//! The El Torito boot catalog writer.
//!
//! Pipeline wrapper around [`crate::boot::BootCatalog`]: reserves space for
//! the catalog and patches the boot record's `catalog_ptr` once that
//! block's LBA is known. The catalog itself can't be built until every
//! boot image's final extent is known (its section entries embed the
//! image's LBA and sector count), so construction is deferred to
//! [`ImageWriter::write_data`], once [`PipelineState::file_extents`] is
//! populated by [`super::filesrc::FilesrcWriter`]. Boot-image *content*
//! patching (ISOLINUX/GRUB2 info tables, isohybrid MBR) lives in `boot.rs`
//! itself and runs as a post-processing step over the finished image, not
//! as a pipeline stage, since it needs the already-placed boot file's final
//! extent too.

use crate::boot::{BootCatalog, BootSectionEntry};
use crate::volume::{BootRecordVolumeDescriptor, VolumeDescriptor};
use crate::{BootOptions, Error, ReadWriteSeek, SeekFrom, Write};

use super::{ImageWriter, PipelineState, BLOCK_SIZE};

pub struct EltoritoWriter {
    boot_options: BootOptions,
    catalog_block: u64,
    catalog_blocks: u64,
}

impl EltoritoWriter {
    pub fn new(boot_options: BootOptions) -> Self {
        Self {
            boot_options,
            catalog_block: 0,
            catalog_blocks: 0,
        }
    }

    pub fn catalog_block(&self) -> u64 {
        self.catalog_block
    }

    fn build_catalog(&self, state: &PipelineState) -> BootCatalog {
        let mut catalog = BootCatalog::default();
        for (section, mut entry) in self.boot_options.sections() {
            let extent = state
                .file_extents
                .get(&entry.boot_image_path)
                .copied()
                .unwrap_or_default();
            if entry.load_size == 0 {
                entry.load_size = ((extent.size + 511) / 512) as u16;
            }
            let boot_entry =
                BootSectionEntry::new(entry.emulation, 0, entry.load_size, extent.offset as u32);
            match section {
                Some(section) => catalog.add_section(section.platform_id, alloc::vec![boot_entry]),
                None => catalog.set_default_entry(boot_entry),
            }
        }
        catalog
    }
}

impl<W: ReadWriteSeek> ImageWriter<W> for EltoritoWriter {
    fn compute_data_blocks(&mut self, state: &mut PipelineState) -> Result<(), Error> {
        // Catalog byte size depends only on entry count, not on the LBAs
        // patched in later, so this can be computed ahead of layout.
        let entry_count = self.boot_options.entries().len();
        let size = entry_count * 64 + 64;
        self.catalog_blocks = ((size as u64) + BLOCK_SIZE - 1) / BLOCK_SIZE;
        self.catalog_block = state.current_block;
        state.current_block += self.catalog_blocks;
        Ok(())
    }

    fn write_vol_desc(&mut self, _state: &PipelineState, descriptors: &mut crate::VolumeDescriptorList) {
        descriptors.push(VolumeDescriptor::BootRecord(BootRecordVolumeDescriptor::new(
            self.catalog_block as u32,
        )));
    }

    fn write_data(&mut self, state: &mut PipelineState, out: &mut W) -> Result<(), Error> {
        let catalog = self.build_catalog(state);
        out.seek(SeekFrom::Start(self.catalog_block * BLOCK_SIZE))?;
        catalog.write(out)?;
        let written = catalog.size() as u64;
        let padded = self.catalog_blocks * BLOCK_SIZE;
        if padded > written {
            out.write_all(&alloc::vec![0u8; (padded - written) as usize])?;
        }
        Ok(())
    }
}

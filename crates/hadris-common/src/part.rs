/// Classic Apple Partition Map.
pub mod apm;
/// GUID Partition Table.
pub mod gpt;
/// Legacy DOS/BIOS Master Boot Record.
pub mod mbr;
/// SUN (SPARC OpenBoot) disk label.
pub mod sun;

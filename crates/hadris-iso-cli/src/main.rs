use clap::Parser;
use hadris_iso::{
    BootEntryOptions, BootOptions, BootSectionOptions, EmulationType, FileInput, FileInterchange,
    FormatOption, IsoImage, PartitionOptions, PlatformId, RockRidgeOptions,
};
use std::{fs::OpenOptions, path::PathBuf};
use tracing::Level;

#[derive(Debug, Clone, Parser)]
pub struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    Read(ReadArgs),
    Write(WriteArgs),
    Xorriso(XorrisoArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Read(args) => args.verbose,
            Command::Write(args) => args.verbose,
            Command::Xorriso(_) => false,
        }
    }
}

/// A xorriso-like subcommand
#[derive(Debug, Clone, Parser)]
pub struct XorrisoArgs {
    #[arg(short = 'V')]
    volume_name: String,
}

#[derive(Debug, Clone, Parser)]
pub struct ReadArgs {
    input: PathBuf,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct WriteArgs {
    isoroot: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
    #[arg(short, long)]
    verbose: bool,

    #[arg(short = 'V', long, default_value = "ISOIMAGE")]
    volume_name: String,

    /// Enable Rock Ridge (POSIX metadata, long names, symlinks).
    #[arg(short = 'r', long)]
    rock_ridge: bool,
    /// Add a Joliet supplementary volume descriptor.
    #[arg(short = 'j', long)]
    joliet: bool,
    /// Add an HFS+ hybrid partition.
    #[arg(long)]
    hfs_plus: bool,
    /// Replace the system area (first 16 sectors) with the contents of this
    /// file instead of the default MBR/GPT composition.
    #[arg(long)]
    system_area: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.cmd.verbose() {
            Level::TRACE
        } else {
            Level::WARN
        })
        .init();

    match args.cmd {
        Command::Read(args) => read(&args.input),
        Command::Write(args) => write(args),
        Command::Xorriso(args) => {
            println!("xorriso {:?}", args);
        }
    }
}

fn write(args: WriteArgs) {
    let mut options = FormatOption::default()
        .with_volume_name(args.volume_name)
        .with_level(FileInterchange::L3)
        .with_files(FileInput::from_fs(args.isoroot).unwrap())
        .with_format_options(
            PartitionOptions::PROTECTIVE_MBR | PartitionOptions::GPT | PartitionOptions::INCLUDE_DEFAULT_BOOT,
        )
        .with_boot_options(BootOptions {
            write_boot_catalogue: true,
            default: BootEntryOptions {
                emulation: EmulationType::NoEmulation,
                load_size: 4,
                boot_image_path: "limine-bios-cd.bin".to_string(),
                boot_info_table: true,
                grub2_boot_info: false,
            },
            entries: vec![(
                BootSectionOptions {
                    platform_id: PlatformId::UEFI,
                },
                BootEntryOptions {
                    emulation: EmulationType::NoEmulation,
                    load_size: 0,
                    boot_image_path: "limine-uefi-cd.bin".to_string(),
                    boot_info_table: false,
                    grub2_boot_info: false,
                },
            )],
        });

    if args.rock_ridge {
        options = options.with_rock_ridge(RockRidgeOptions::default());
    }
    if args.joliet {
        options = options.with_joliet(true);
    }
    if args.hfs_plus {
        options = options.with_hfs_plus(true);
    }
    if let Some(system_area) = args.system_area {
        let bytes = std::fs::read(system_area).unwrap();
        options = options.with_system_area(bytes);
    }

    IsoImage::format_file(args.output, options).unwrap();
}

fn read(file: &PathBuf) {
    let mut file = OpenOptions::new().read(true).open(file).unwrap();
    let mut iso = hadris_iso::IsoImage::parse(&mut file).unwrap();
    let mut root_dir = iso.root_directory();
    println!("Files: {:#?}", root_dir.entries());
    let info = iso.info();
    println!("Info: {:#?}", info);
}

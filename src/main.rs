//! dcpayload: inspect the flash directory of a firmware image.
//!
//! ```bash
//! # Show the root directory found through the anchor
//! dcpayload image.bin --anchor 0x100 root
//!
//! # List a sub-directory
//! dcpayload image.bin --anchor 0x100 ls RW_FWA
//!
//! # Extract a region
//! dcpayload image.bin --anchor 0x100 dump RW_FWA/FW_MAIN -o fw_main.bin
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use payload_dcdir::{DcDir, Entry, Pointer, Region};
use payload_storage::{StorageError, StorageOps, StorageResult, checked_range};

#[derive(Parser, Debug)]
#[command(name = "dcpayload")]
#[command(version)]
#[command(about = "Inspect the flash directory of a firmware image")]
struct Args {
    /// Firmware image to read
    image: PathBuf,

    /// Offset of the directory anchor in the image
    #[arg(short, long, default_value = "0", value_parser = parse_offset)]
    anchor: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the root directory found through the anchor
    Root,
    /// List the entries of a directory
    Ls {
        /// `/` separated directory path, the root if omitted
        #[arg(default_value = "")]
        path: String,
    },
    /// Print where a region lives
    Region { path: String },
    /// Write the bytes of a region
    Dump {
        path: String,

        /// Output file, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_offset(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset {s:?}: {e}"))
}

/// A firmware image file as flash storage.
struct ImageFile {
    file: File,
    size: u32,
}

impl ImageFile {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {path:?}"))?;
        let len = file.metadata()?.len();
        let size = u32::try_from(len)
            .with_context(|| format!("{path:?} is too large for a flash image ({len} bytes)"))?;
        Ok(Self { file, size })
    }
}

impl StorageOps for ImageFile {
    fn read(&mut self, dst: &mut [u8], offset: u32) -> StorageResult<()> {
        checked_range(offset, dst.len(), self.size)?;
        self.file
            .seek(SeekFrom::Start(u64::from(offset)))
            .and_then(|_| self.file.read_exact(dst))
            .map_err(|e| {
                log::error!("Reading image at {offset:#x} failed: {e}");
                StorageError::Device
            })
    }

    fn size(&mut self) -> StorageResult<u32> {
        Ok(self.size)
    }
}

fn describe(entry: &Entry) -> String {
    let kind = if entry.record.directory { "dir" } else { "region" };
    let pointer = match entry.record.pointer {
        Pointer::Offset24Length24 {
            offset,
            length_minus_one,
        } => format!("offset {offset:#x} size {:#x}", length_minus_one.wrapping_add(1)),
        Pointer::Base32Offset32Length32 {
            base,
            offset,
            length_minus_one,
        } => format!(
            "base {base:#x} offset {offset:#x} size {:#x}",
            length_minus_one.wrapping_add(1)
        ),
        Pointer::Unknown { variant } => format!("unknown pointer type {variant}"),
    };
    format!("{:<8} {kind:<6} {pointer}", entry.name())
}

fn run(args: &Args, storage: &mut dyn StorageOps, out: &mut dyn Write) -> Result<()> {
    let root = DcDir::open_root(storage, args.anchor)
        .with_context(|| format!("No directory anchor at {:#x}", args.anchor))?;

    match &args.command {
        Command::Root => {
            writeln!(
                out,
                "root at {:#x} base {:#x} (pointers relative to {:#x})",
                root.offset,
                root.base,
                root.unrelocated_offset()
            )?;
        }
        Command::Ls { path } => {
            let dir = root
                .open_dir_path(storage, path)
                .with_context(|| format!("Failed to open directory {path:?}"))?;
            for entry in dir.entries(storage)? {
                writeln!(out, "{}", describe(&entry))?;
            }
        }
        Command::Region { path } => {
            let Region { offset, size } = root
                .open_region_path(storage, path)
                .with_context(|| format!("Failed to resolve {path:?}"))?;
            writeln!(out, "{path}: offset {offset:#x} size {size:#x}")?;
        }
        Command::Dump { path, .. } => {
            let region = root
                .open_region_path(storage, path)
                .with_context(|| format!("Failed to resolve {path:?}"))?;
            let range = checked_range(region.offset, region.size as usize, storage.size()?)
                .with_context(|| format!("Region {path:?} does not fit the image"))?;
            let mut data = vec![0u8; range.len()];
            storage.read(&mut data, region.offset)?;
            out.write_all(&data)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut image = ImageFile::open(&args.image)?;
    match &args.command {
        Command::Dump {
            output: Some(path), ..
        } => {
            let mut file =
                File::create(path).with_context(|| format!("Failed to create {path:?}"))?;
            run(&args, &mut image, &mut file)
        }
        _ => run(&args, &mut image, &mut std::io::stdout().lock()),
    }
}

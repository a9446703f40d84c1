use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::checksum::{ChecksumAlgo, ChecksumSet};
use crate::envelope::{Codec, CompressionChoice};
use crate::error::ArchiveError;
use crate::format::FormatDescriptor;
use crate::pack::PackOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

/// Container descriptor overrides shared by every subcommand.
#[derive(clap::Args, Clone, Debug)]
pub struct FormatArgs {
    /// Container format name embedded in the magic header.
    #[arg(long = "format")]
    pub format_name: Option<String>,

    /// Container format version embedded in the magic header (e.g. 001).
    #[arg(long = "formatver")]
    pub format_version: Option<String>,

    /// Field delimiter byte. Accepts a single character, or "nul" / "\0" for the default NUL byte.
    #[arg(long)]
    pub delimiter: Option<String>,
}

impl FormatArgs {
    /// Builds the descriptor, starting from the defaults and applying any overrides.
    pub fn descriptor(&self) -> Result<FormatDescriptor, ArchiveError> {
        let mut desc = FormatDescriptor::default();
        if let Some(name) = &self.format_name {
            desc.name = name.clone();
        }
        if let Some(version) = &self.format_version {
            desc.version = version.clone();
        }
        if let Some(raw) = &self.delimiter {
            desc.delimiter = parse_delimiter(raw)?;
        }
        Ok(desc)
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a new archive from files and directories, or convert a foreign container.
    #[command(alias = "c")]
    Create {
        /// One or more input files or directories to add to the archive.
        /// With --convert, exactly one foreign container file.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// The path for the output archive file (e.g. backup.cat).
        #[arg(short, long)]
        output: PathBuf,

        /// Whole-container compression: auto, none, gzip, bzip2, lzma, zstd, brotli or lz4.
        #[arg(long, default_value = "auto")]
        compression: String,

        /// Compression level. The meaningful range depends on the codec.
        #[arg(long)]
        level: Option<u32>,

        /// Checksum algorithm for headers and content: none, crc32, md5, sha1, sha224, sha256, sha384 or sha512.
        #[arg(long, default_value = "crc32")]
        checksum: String,

        /// Convert a foreign container instead of walking the filesystem: tar, zip, 7z or rar.
        #[arg(long)]
        convert: Option<String>,

        /// Skip unreadable inputs instead of aborting.
        #[arg(long)]
        skip_errors: bool,

        /// Print each entry as it is archived.
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Extract an archive into a directory.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory where entries will be recreated. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force the decompression codec instead of auto-detecting it. Required for brotli.
        #[arg(long)]
        compression: Option<String>,

        /// Restore ownership, permissions and timestamps on extracted entries.
        #[arg(long)]
        preserve: bool,

        /// Print each entry as it is extracted.
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// List the contents of an archive (or a foreign container) without extracting it.
    #[command(alias = "l")]
    List {
        /// The archive file to list.
        #[arg(required = true)]
        archive: PathBuf,

        /// Force the decompression codec instead of auto-detecting it. Required for brotli.
        #[arg(long)]
        compression: Option<String>,

        /// Treat the input as a foreign container: tar, zip, 7z or rar.
        #[arg(long)]
        convert: Option<String>,

        /// Print kind and size columns in addition to paths.
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Rewrite an archive with a different compression codec or checksum algorithm.
    #[command(alias = "r")]
    Repack {
        /// The archive file to repack.
        #[arg(required = true)]
        archive: PathBuf,

        /// The path for the rewritten archive.
        #[arg(short, long)]
        output: PathBuf,

        /// Whole-container compression for the output: auto, none, gzip, bzip2, lzma, zstd, brotli or lz4.
        #[arg(long, default_value = "auto")]
        compression: String,

        /// Compression level for the output codec.
        #[arg(long)]
        level: Option<u32>,

        /// Recompute checksums with this algorithm. When omitted, stored checksums are carried over unchanged.
        #[arg(long)]
        checksum: Option<String>,

        /// Force the input decompression codec instead of auto-detecting it. Required for brotli.
        #[arg(long)]
        input_compression: Option<String>,

        /// Print each entry as it is rewritten.
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Verify every header and content checksum in an archive.
    #[command(alias = "v")]
    Validate {
        /// The archive file to validate.
        #[arg(required = true)]
        archive: PathBuf,

        /// Force the decompression codec instead of auto-detecting it. Required for brotli.
        #[arg(long)]
        compression: Option<String>,

        /// Verify against this algorithm instead of inferring it from the stored digests.
        #[arg(long)]
        checksum: Option<String>,

        /// Print a per-entry pass/fail line.
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        format: FormatArgs,
    },
}

/// Maps a delimiter spelling from the command line to its byte value.
pub fn parse_delimiter(raw: &str) -> Result<u8, ArchiveError> {
    match raw {
        "nul" | "NUL" | "\\0" => Ok(0),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        other => Err(ArchiveError::UnsupportedCapability(format!(
            "delimiter must be a single byte, got '{other}'"
        ))),
    }
}

/// Parses an optional codec override.
pub fn parse_codec(raw: Option<&str>) -> Result<Option<Codec>, ArchiveError> {
    raw.map(str::parse).transpose()
}

/// Builds pack options from the create/convert flags.
pub fn pack_options(
    compression: &str,
    level: Option<u32>,
    checksum: &str,
    format: &FormatArgs,
    verbose: bool,
    skip_errors: bool,
) -> Result<PackOptions, ArchiveError> {
    let choice: CompressionChoice = compression.parse()?;
    let algo: ChecksumAlgo = checksum.parse()?;
    Ok(PackOptions {
        compression: choice,
        level,
        checksums: ChecksumSet::uniform(algo),
        descriptor: format.descriptor()?,
        verbose,
        skip_errors,
    })
}

/// Parses command-line arguments and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}

//! Main entry point for the catfile CLI app

use std::path::PathBuf;

use catfile::cli::{self, Commands};
use catfile::{foreign, list, pack, repack, unpack, validate};
use catfile::{ForeignKind, ListOptions, RepackOptions, UnpackOptions, ValidateOptions};

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        if e.downcast_ref::<clap::Error>().is_none() {
            eprintln!("Error: {}", e);
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;

    match &command {
        Commands::Create {
            inputs,
            output,
            compression,
            level,
            checksum,
            convert,
            skip_errors,
            verbose,
            format,
        } => {
            let opts = cli::pack_options(
                compression,
                *level,
                checksum,
                format,
                *verbose,
                *skip_errors,
            )?;
            match convert {
                Some(kind) => {
                    let kind: ForeignKind = kind.parse()?;
                    let input = single_input(inputs, kind)?;
                    foreign::pack_from_foreign(kind, input, output, &opts)?;
                }
                None => pack::pack(inputs, output, &opts)?,
            }
        }
        Commands::Extract {
            archive,
            output,
            compression,
            preserve,
            verbose,
            format,
        } => {
            let opts = UnpackOptions {
                codec: cli::parse_codec(compression.as_deref())?,
                preserve: *preserve,
                descriptor: format.descriptor()?,
                verbose: *verbose,
            };
            let dest = output.clone().unwrap_or_else(|| PathBuf::from("."));
            let report = unpack::unpack(archive, &dest, &opts)?;
            for w in &report.warnings {
                eprintln!(
                    "warning: entry {} ({}): {} checksum mismatch",
                    w.index, w.path, w.part
                );
            }
        }
        Commands::List {
            archive,
            compression,
            convert,
            verbose,
            format,
        } => {
            let summaries = match convert {
                Some(kind) => {
                    let kind: ForeignKind = kind.parse()?;
                    foreign::list_foreign(kind, archive, *verbose)?
                }
                None => {
                    let opts = ListOptions {
                        codec: cli::parse_codec(compression.as_deref())?,
                        descriptor: format.descriptor()?,
                        verbose: *verbose,
                    };
                    list::list_entries(archive, &opts)?
                }
            };
            if !*verbose {
                for s in &summaries {
                    println!("{}", s.path);
                }
            }
        }
        Commands::Repack {
            archive,
            output,
            compression,
            level,
            checksum,
            input_compression,
            verbose,
            format,
        } => {
            let opts = RepackOptions {
                compression: compression.parse()?,
                level: *level,
                checksum: checksum.as_deref().map(str::parse).transpose()?,
                input_codec: cli::parse_codec(input_compression.as_deref())?,
                descriptor: format.descriptor()?,
                verbose: *verbose,
            };
            repack::repack(archive, output, &opts)?;
        }
        Commands::Validate {
            archive,
            compression,
            checksum,
            verbose,
            format,
        } => {
            let opts = ValidateOptions {
                codec: cli::parse_codec(compression.as_deref())?,
                method: checksum.as_deref().map(str::parse).transpose()?,
                descriptor: format.descriptor()?,
                verbose: *verbose,
            };
            let report = validate::validate(archive, &opts)?;
            if report.valid {
                println!("{}: OK", archive.display());
            } else {
                println!("{}: FAILED", archive.display());
                return Err("archive validation failed".into());
            }
        }
    }

    Ok(())
}

fn single_input(inputs: &[PathBuf], kind: ForeignKind) -> Result<&PathBuf, Box<dyn std::error::Error>> {
    match inputs {
        [one] => Ok(one),
        _ => Err(format!("--convert {kind} takes exactly one input container").into()),
    }
}

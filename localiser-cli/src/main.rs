use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::path::{Path, PathBuf};

use localiser_core::{
    load_translation_table, load_translations, read_resource, rtz, run_inject, run_inject_dir,
    run_scan, run_verify, EncodeMode, EncodeOptions, InjectDirSettings,
    InjectSettings, InjectSummary, LocaliserError, Result, ScanSettings, SegmentStatus, TermSet,
    Translations,
};

#[derive(Debug, Parser)]
#[command(
    name = "segloc",
    version,
    about = "Extract and re-inject text in tagged text segment resources"
)]
struct Args {
    /// JSON term set replacing the built-in vocabulary.
    #[arg(long, global = true, value_name = "JSON")]
    terms: Option<PathBuf>,

    /// Extra game terms, comma separated.
    #[arg(long, global = true, value_delimiter = ',')]
    extra_terms: Vec<String>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    FixedSlot,
    Resizing,
}

impl From<ModeArg> for EncodeMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::FixedSlot => EncodeMode::FixedSlot,
            ModeArg::Resizing => EncodeMode::Resizing,
        }
    }
}

#[derive(Debug, clap::Args)]
struct EncodeArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::FixedSlot)]
    mode: ModeArg,

    /// Also rewrite segments the classifier rejected.
    #[arg(long, default_value_t = false)]
    include_invalid: bool,

    /// Offset to start scanning from (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0", value_parser = parse_offset)]
    start: usize,
}

impl EncodeArgs {
    fn options(&self) -> EncodeOptions {
        EncodeOptions {
            mode: self.mode.into(),
            valid_only: !self.include_invalid,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the text segments found in a resource.
    Scan {
        input: PathBuf,

        #[arg(long, default_value = "0", value_parser = parse_offset)]
        start: usize,

        /// Show rejected segments too.
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Write translations into a copy of a resource.
    Inject {
        input: PathBuf,
        output: PathBuf,

        /// JSON object of 1-based segment index to text.
        #[arg(long, value_name = "JSON")]
        translations: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Apply a per-file translation table to a directory of resources.
    InjectDir {
        input: PathBuf,
        output: PathBuf,

        /// JSON object of file name to {index: text}.
        #[arg(long, value_name = "JSON")]
        table: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Check an injected file against a fresh encode of its source.
    Verify {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, value_name = "JSON")]
        translations: PathBuf,

        /// Terms to look for in the output, comma separated.
        #[arg(long, value_delimiter = ',')]
        expect: Vec<String>,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Decompress an .rtz resource.
    Unpack { input: PathBuf, output: PathBuf },

    /// Compress a resource into .rtz form.
    Pack { input: PathBuf, output: PathBuf },
}

fn parse_offset(s: &str) -> std::result::Result<usize, String> {
    let t = s.trim();
    let res = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else {
        t.parse::<usize>()
    };
    res.map_err(|e| format!("invalid offset '{t}': {e}"))
}

fn setup_logging(verbose: u8, quiet: bool) -> std::result::Result<(), fern::InitError> {
    let level = if quiet {
        LevelFilter::Warn
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn load_terms(args: &Args) -> Result<TermSet> {
    let mut terms = match &args.terms {
        Some(path) => TermSet::load(path)?,
        None => TermSet::default(),
    };
    terms.merge_terms(args.extra_terms.iter().cloned());
    Ok(terms)
}

fn status_label(status: &SegmentStatus) -> String {
    match status {
        SegmentStatus::Kept => "kept".to_string(),
        SegmentStatus::Replaced { units } => format!("replaced ({units} units)"),
        SegmentStatus::Truncated { requested, written } => {
            format!("TRUNCATED ({requested} -> {written} units)")
        }
        SegmentStatus::Retained => "UNREPRESENTABLE, original kept".to_string(),
        SegmentStatus::SkippedInvalid => "skipped (not valid text)".to_string(),
    }
}

fn print_inject_summary(summary: &InjectSummary) {
    for outcome in &summary.encode.outcomes {
        if outcome.status != SegmentStatus::Kept {
            println!(
                "[{}] prefix@0x{:X}: {}",
                outcome.index,
                outcome.prefix_offset,
                status_label(&outcome.status)
            );
        }
    }
    let v = &summary.verify;
    println!(
        "segments: {} (valid {}), translated: {}, confirmed: {}, size delta: {:+}",
        summary.segments, summary.valid, v.translated, v.confirmed, v.size_delta
    );
    println!(
        "sentinel tail preserved: {}, slot spans preserved: {}",
        v.tail_preserved, v.spans_preserved
    );
}

fn translations_from(path: &Path) -> Result<Translations> {
    let translations = load_translations(path)?;
    if translations.is_empty() {
        log::warn!("{} holds no translations", path.display());
    }
    Ok(translations)
}

fn run(args: Args) -> Result<()> {
    let terms = load_terms(&args)?;

    match args.command {
        Command::Scan { input, start, all } => {
            let scanned = run_scan(&ScanSettings {
                input_path: input,
                start_offset: start,
                terms,
            })?;
            for seg in &scanned.report.segments {
                if !all && !seg.is_valid {
                    continue;
                }
                println!(
                    "[{}] {} prefix@0x{:X}: L={} ({} bytes) -> {:?}",
                    seg.index,
                    if seg.is_valid { "VALID" } else { "noise" },
                    seg.prefix_offset,
                    seg.declared_unit_count,
                    seg.payload_len(),
                    seg.clean_text
                );
            }
            println!("stop: {:?}", scanned.report.stop);
        }

        Command::Inject {
            input,
            output,
            translations,
            encode,
        } => {
            let summary = run_inject(&InjectSettings {
                input_path: input,
                output_path: output,
                start_offset: encode.start,
                translations: translations_from(&translations)?,
                options: encode.options(),
                terms,
            })?;
            print_inject_summary(&summary);
        }

        Command::InjectDir {
            input,
            output,
            table,
            encode,
        } => {
            let summary = run_inject_dir(&InjectDirSettings {
                input_dir: input,
                output_dir: output.clone(),
                start_offset: encode.start,
                table: load_translation_table(&table)?,
                options: encode.options(),
                terms,
            })?;
            for (path, file) in &summary.injected {
                println!("== {}", path.display());
                print_inject_summary(file);
            }
            println!(
                "files injected: {}, copied: {}, unmatched table entries: {}",
                summary.injected.len(),
                summary.copied,
                summary.unmatched.len()
            );
            println!("output directory: {}", output.display());
        }

        Command::Verify {
            input,
            output,
            translations,
            expect,
            encode,
        } => {
            let summary = run_verify(
                &InjectSettings {
                    input_path: input,
                    output_path: output,
                    start_offset: encode.start,
                    translations: translations_from(&translations)?,
                    options: encode.options(),
                    terms,
                },
                &expect,
            )?;
            print_inject_summary(&summary.expected);
            println!("output matches fresh encode: {}", summary.output_matches);
            for (term, pos) in &summary.terms_found {
                match pos {
                    Some(p) => println!("  found {term:?} at 0x{p:X}"),
                    None => println!("  missing {term:?}"),
                }
            }
            if !summary.output_matches || !summary.expected.verify.is_ok() {
                return Err(LocaliserError::Config("verification failed".to_string()));
            }
        }

        Command::Unpack { input, output } => {
            let data = read_resource(&input)?;
            std::fs::write(&output, &data)?;
            println!("{} -> {} ({} bytes)", input.display(), output.display(), data.len());
        }

        Command::Pack { input, output } => {
            let data = std::fs::read(&input)?;
            let packed = rtz::pack(&data)?;
            std::fs::write(&output, &packed)?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                packed.len()
            );
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = setup_logging(args.verbose, args.quiet) {
        eprintln!("Failed to initialise logging: {e}");
    }

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub mod classifier;
pub mod encoder;
pub mod markup;
pub mod rtz;
pub mod scanner;
pub mod segment;
pub mod terms;
pub mod verify;

pub use classifier::{Classifier, Confidence, Reason, Verdict};
pub use encoder::{encode, EncodeMode, EncodeOptions, EncodeReport, SegmentOutcome, SegmentStatus};
pub use markup::Normalizer;
pub use scanner::{scan, ScanReport, ScanStop};
pub use segment::{apply_translations, Segment, Translations};
pub use terms::TermSet;
pub use verify::{verify, VerifyReport};

#[derive(Debug, Error)]
pub enum LocaliserError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("container error: {0}")]
    Container(String),
}

pub type Result<T> = std::result::Result<T, LocaliserError>;

/// Translation tables for a directory run, keyed by file name.
pub type TranslationTable = BTreeMap<String, Translations>;

/// Scan, normalise and classify one decoded buffer.
pub fn process_buffer(
    buf: &[u8],
    start_offset: usize,
    normalizer: &Normalizer,
    classifier: &Classifier,
) -> ScanReport {
    let mut report = scan(buf, start_offset);
    normalizer.normalize_segments(&mut report.segments);
    let valid = classifier.classify_segments(&mut report.segments);
    log::info!(
        "total segments extracted: {}, valid: {}, stop: {:?}",
        report.segments.len(),
        valid,
        report.stop
    );
    report
}

/// Read a resource, unwrapping the `.rtz` container when the extension
/// says so.
pub fn read_resource(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path)?;
    if rtz::is_rtz_path(path) {
        rtz::unpack(&raw)
    } else {
        Ok(raw)
    }
}

pub fn write_resource(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if rtz::is_rtz_path(path) {
        fs::write(path, rtz::pack(data)?)?;
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn check_indices(translations: &Translations, source: &Path) -> Result<()> {
    if translations.contains_key(&0) {
        return Err(LocaliserError::Config(format!(
            "{}: segment indices start at 1",
            source.display()
        )));
    }
    Ok(())
}

/// Load `{"<index>": "<text>", ...}` for a single file.
pub fn load_translations(path: &Path) -> Result<Translations> {
    let data = fs::read_to_string(path)?;
    let translations: Translations = serde_json::from_str(&data)?;
    check_indices(&translations, path)?;
    Ok(translations)
}

/// Load `{"<file name>": {"<index>": "<text>"}, ...}`.
pub fn load_translation_table(path: &Path) -> Result<TranslationTable> {
    let data = fs::read_to_string(path)?;
    let table: TranslationTable = serde_json::from_str(&data)?;
    for translations in table.values() {
        check_indices(translations, path)?;
    }
    Ok(table)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    pub input_path: PathBuf,
    pub start_offset: usize,
    pub terms: TermSet,
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub buffer: Vec<u8>,
    pub report: ScanReport,
}

pub fn run_scan(settings: &ScanSettings) -> Result<ScannedFile> {
    let normalizer = Normalizer::new(&settings.terms);
    let classifier = Classifier::new(&settings.terms)?;

    let buffer = read_resource(&settings.input_path)?;
    log::info!(
        "scanning {} ({} bytes) from 0x{:X}",
        settings.input_path.display(),
        buffer.len(),
        settings.start_offset
    );
    let report = process_buffer(&buffer, settings.start_offset, &normalizer, &classifier);

    Ok(ScannedFile {
        path: settings.input_path.clone(),
        buffer,
        report,
    })
}

#[derive(Debug, Clone)]
pub struct InjectSettings {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub start_offset: usize,
    pub translations: Translations,
    pub options: EncodeOptions,
    pub terms: TermSet,
}

#[derive(Debug, Clone)]
pub struct InjectSummary {
    pub scan_stop: ScanStop,
    pub segments: usize,
    pub valid: usize,
    pub encode: EncodeReport,
    pub verify: VerifyReport,
}

fn inject_buffer(
    buffer: &[u8],
    start_offset: usize,
    translations: &Translations,
    options: EncodeOptions,
    normalizer: &Normalizer,
    classifier: &Classifier,
) -> InjectSummary {
    let mut report = process_buffer(buffer, start_offset, normalizer, classifier);
    apply_translations(&mut report.segments, translations);

    let encoded = encode(buffer, &report.segments, options, normalizer);
    let checked = verify(buffer, &report.segments, &encoded, start_offset, normalizer);
    if !checked.is_ok() {
        log::warn!("output verification failed: {:?}", checked);
    }

    InjectSummary {
        scan_stop: report.stop,
        segments: report.segments.len(),
        valid: report.segments.iter().filter(|s| s.is_valid).count(),
        encode: encoded,
        verify: checked,
    }
}

/// Both paths name the same file on disk. A missing output cannot be
/// the input.
fn same_file(input: &Path, output: &Path) -> Result<bool> {
    if input == output {
        return Ok(true);
    }
    if !output.exists() {
        return Ok(false);
    }
    Ok(fs::canonicalize(input)? == fs::canonicalize(output)?)
}

/// Rewrite one resource file with the given translations. The input file
/// is never modified.
pub fn run_inject(settings: &InjectSettings) -> Result<InjectSummary> {
    if same_file(&settings.input_path, &settings.output_path)? {
        return Err(LocaliserError::Config(format!(
            "refusing to overwrite input {}",
            settings.input_path.display()
        )));
    }

    let normalizer = Normalizer::new(&settings.terms);
    let classifier = Classifier::new(&settings.terms)?;

    let buffer = read_resource(&settings.input_path)?;
    let summary = inject_buffer(
        &buffer,
        settings.start_offset,
        &settings.translations,
        settings.options,
        &normalizer,
        &classifier,
    );

    write_resource(&settings.output_path, &summary.encode.bytes)?;
    log::info!(
        "wrote {} ({} of {} segments translated, delta {:+})",
        settings.output_path.display(),
        summary.encode.changed(),
        summary.segments,
        summary.verify.size_delta
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct InjectDirSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub start_offset: usize,
    pub table: TranslationTable,
    pub options: EncodeOptions,
    pub terms: TermSet,
}

#[derive(Debug, Clone, Default)]
pub struct DirSummary {
    pub injected: Vec<(PathBuf, InjectSummary)>,
    pub copied: usize,
    /// Table entries with no matching file under the input directory.
    pub unmatched: Vec<String>,
}

/// Look up a file's translations by relative path, then file name, then
/// file stem with any extension (tables exported from text dumps use
/// `.txt` names for `.bin` files).
fn table_entry<'a>(
    table: &'a TranslationTable,
    rel: &Path,
) -> Option<(&'a String, &'a Translations)> {
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    if let Some(entry) = table.get_key_value(&rel_str) {
        return Some(entry);
    }
    let name = rel.file_name()?.to_string_lossy();
    if let Some(entry) = table.get_key_value(&*name) {
        return Some(entry);
    }
    let stem = rel.file_stem()?.to_string_lossy();
    table.iter().find(|(k, _)| {
        Path::new(k.as_str())
            .file_stem()
            .map_or(false, |s| s.to_string_lossy() == stem)
    })
}

/// Apply a translation table to every file under `input_dir`, mirroring
/// the tree into `output_dir`. Files without translations are copied.
pub fn run_inject_dir(settings: &InjectDirSettings) -> Result<DirSummary> {
    if !settings.input_dir.is_dir() {
        return Err(LocaliserError::Config(format!(
            "input directory does not exist: {}",
            settings.input_dir.display()
        )));
    }

    let normalizer = Normalizer::new(&settings.terms);
    let classifier = Classifier::new(&settings.terms)?;

    let mut summary = DirSummary::default();
    let mut used: Vec<&String> = Vec::new();

    for entry in WalkDir::new(&settings.input_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| LocaliserError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&settings.input_dir)
            .map_err(|e| LocaliserError::Config(e.to_string()))?;
        let dest = settings.output_dir.join(rel);

        match table_entry(&settings.table, rel) {
            Some((key, translations)) if !translations.is_empty() => {
                used.push(key);
                log::info!("processing {}", rel.display());
                let buffer = read_resource(entry.path())?;
                let result = inject_buffer(
                    &buffer,
                    settings.start_offset,
                    translations,
                    settings.options,
                    &normalizer,
                    &classifier,
                );
                write_resource(&dest, &result.encode.bytes)?;
                summary.injected.push((rel.to_path_buf(), result));
            }
            _ => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &dest)?;
                summary.copied += 1;
            }
        }
    }

    summary.unmatched = settings
        .table
        .keys()
        .filter(|k| !used.contains(k))
        .cloned()
        .collect();
    for key in &summary.unmatched {
        log::warn!("no file found for translation table entry {}", key);
    }

    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct VerifySummary {
    pub expected: InjectSummary,
    /// The file on disk is byte-identical to a fresh encode.
    pub output_matches: bool,
    pub terms_found: Vec<(String, Option<usize>)>,
}

/// Re-run the injection in memory and compare it with an existing output
/// file, then look for the given terms (UTF-16LE) in that file.
pub fn run_verify(settings: &InjectSettings, terms: &[String]) -> Result<VerifySummary> {
    let normalizer = Normalizer::new(&settings.terms);
    let classifier = Classifier::new(&settings.terms)?;

    let original = read_resource(&settings.input_path)?;
    let written = read_resource(&settings.output_path)?;

    let expected = inject_buffer(
        &original,
        settings.start_offset,
        &settings.translations,
        settings.options,
        &normalizer,
        &classifier,
    );
    let output_matches = expected.encode.bytes == written;
    if !output_matches {
        log::warn!(
            "{} differs from a fresh encode ({} vs {} bytes)",
            settings.output_path.display(),
            written.len(),
            expected.encode.bytes.len()
        );
    }

    let terms_found = terms
        .iter()
        .map(|t| (t.clone(), verify::find_utf16(&written, t)))
        .collect();

    Ok(VerifySummary {
        expected,
        output_matches,
        terms_found,
    })
}

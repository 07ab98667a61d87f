//! The `.rtz` resource wrapper: a little-endian u32 holding the
//! uncompressed size, followed by a gzip stream.

use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};
use std::path::Path;

use crate::{LocaliserError, Result};

const SIZE_HEADER: usize = 4;

pub fn is_rtz_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("rtz"))
}

pub fn unpack(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.len() < SIZE_HEADER {
        return Err(LocaliserError::Container(format!(
            "rtz file is {} bytes, too small for its size header",
            raw.len()
        )));
    }

    let expected = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;

    // Some resources are several gzip members back to back.
    let mut decoder = MultiGzDecoder::new(&raw[SIZE_HEADER..]);
    let mut out = Vec::with_capacity(expected.min(raw.len().saturating_mul(8)));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| LocaliserError::Container(format!("rtz gzip stream: {e}")))?;

    if out.len() != expected {
        log::warn!(
            "rtz size mismatch: header says {} bytes, decompressed {}",
            expected,
            out.len()
        );
    }
    Ok(out)
}

pub fn pack(data: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(data.len()).map_err(|_| {
        LocaliserError::Container(format!(
            "{} bytes does not fit the rtz size header",
            data.len()
        ))
    })?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let cmp = encoder.finish()?;

    let mut out = Vec::with_capacity(SIZE_HEADER + cmp.len());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&cmp);
    Ok(out)
}

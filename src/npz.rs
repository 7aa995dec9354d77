//! NumPy `.npz` bundles of 2-D `float64` arrays.
//!
//! An `.npz` file is an uncompressed zip archive with one NPY v1.0 member
//! per array (`<name>.npy`), as written by `numpy.savez`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;
const NPY_SUFFIX: &str = ".npy";
const F64_DESCR: &str = "<f8";
const F64_SIZE: usize = std::mem::size_of::<f64>();

#[derive(Debug, Error)]
pub enum NpzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid NPY member {member}: {reason}")]
    Format { member: String, reason: String },
}

/// Writes `arrays` to `path` as an `.npz` archive, replacing any existing
/// file. Members are written in the given order.
pub fn write_npz(path: &Path, arrays: &[(&str, ArrayView2<'_, f64>)]) -> Result<(), NpzError> {
    let file = fs::File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, array) in arrays {
        let member = format!("{name}{NPY_SUFFIX}");
        debug!(
            component = "npz",
            event = "npz.member.write",
            path = %path.display(),
            member = %member,
            shape = ?array.dim()
        );
        zip.start_file(member, options)?;
        zip.write_all(&encode_npy(array.view()))?;
    }

    zip.finish()?;
    Ok(())
}

/// Reads every `.npy` member of an `.npz` archive, keyed by member name
/// without the `.npy` suffix.
pub fn read_npz(path: &Path) -> Result<BTreeMap<String, Array2<f64>>, NpzError> {
    let file = fs::File::open(path)?;
    let mut zip = ZipArchive::new(file)?;
    let mut out = BTreeMap::new();

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.name().strip_suffix(NPY_SUFFIX).map(str::to_string) else {
            continue;
        };

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        let array = decode_npy(&name, &buf)?;
        out.insert(name, array);
    }

    Ok(out)
}

fn encode_npy(array: ArrayView2<'_, f64>) -> Vec<u8> {
    let (rows, cols) = array.dim();
    let mut header =
        format!("{{'descr': '{F64_DESCR}', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    // magic + version + u16 length + header + trailing newline
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(unpadded + padding + rows * cols * F64_SIZE);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for value in array.iter() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_npy(member: &str, bytes: &[u8]) -> Result<Array2<f64>, NpzError> {
    let format_err = |reason: &str| NpzError::Format {
        member: member.to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(format_err("missing NPY magic"));
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        _ => return Err(format_err("unsupported NPY version")),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .ok_or_else(|| format_err("truncated header"))?;

    if header_value(header, "descr").map(|v| v.trim_matches('\'')) != Some(F64_DESCR) {
        return Err(format_err("only little-endian float64 arrays are supported"));
    }
    if header_value(header, "fortran_order") != Some("False") {
        return Err(format_err("fortran-ordered arrays are not supported"));
    }
    let shape = header_value(header, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| format_err("unreadable shape"))?;
    let &[rows, cols] = shape.as_slice() else {
        return Err(format_err("expected a 2-D array"));
    };

    let expected_len = rows
        .checked_mul(cols)
        .and_then(|cells| cells.checked_mul(F64_SIZE))
        .ok_or_else(|| format_err("shape is too large"))?;
    let data = &bytes[data_start..];
    if data.len() != expected_len {
        return Err(format_err("data length does not match shape"));
    }
    let values = data
        .chunks_exact(F64_SIZE)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();

    Array2::from_shape_vec((rows, cols), values).map_err(|err| format_err(&err.to_string()))
}

/// Returns the raw text of a key's value in an NPY header dict.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{key}':");
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find(',').unwrap_or(rest.len())
    };
    Some(rest[..end].trim())
}

fn parse_shape(raw: &str) -> Option<Vec<usize>> {
    raw.strip_prefix('(')?
        .strip_suffix(')')?
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn npy_header_is_aligned_and_describes_array() {
        let bytes = encode_npy(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].view());
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % NPY_ALIGN, 0);

        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<f8', 'fortran_order': False, 'shape': (3, 2), }"));
        assert!(header.ends_with('\n'));
        assert_eq!(bytes.len(), 10 + header_len + 6 * 8);
    }

    #[test]
    fn archive_members_are_stored_uncompressed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.npz");
        let front = array![[0.9, -5.0], [0.8, -3.0]];
        let pop = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        write_npz(&path, &[("front", front.view()), ("pop", pop.view())]).unwrap();

        let mut zip = ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|idx| zip.by_index(idx).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["front.npy", "pop.npy"]);
        assert_eq!(
            zip.by_index(0).unwrap().compression(),
            CompressionMethod::Stored
        );

        let loaded = read_npz(&path).unwrap();
        assert_eq!(loaded["front"], front);
        assert_eq!(loaded["pop"], pop);
    }

    #[test]
    fn decode_rejects_non_float_arrays() {
        let mut bytes = encode_npy(array![[1.0]].view());
        let pos = bytes.windows(3).position(|w| w == b"<f8").unwrap();
        bytes[pos + 1] = b'i';
        let err = decode_npy("x", &bytes).expect_err("int dtype rejected");
        assert!(matches!(err, NpzError::Format { .. }));
    }

    #[test]
    fn decode_rejects_shapes_whose_byte_size_overflows() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (4611686018427387904, 4), }\n";
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 8]);

        let err = decode_npy("front", &bytes).expect_err("oversized shape rejected");
        match err {
            NpzError::Format { member, reason } => {
                assert_eq!(member, "front");
                assert_eq!(reason, "shape is too large");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shape_parser_handles_trailing_commas() {
        assert_eq!(parse_shape("(3, 2)"), Some(vec![3, 2]));
        assert_eq!(parse_shape("(4,)"), Some(vec![4]));
        assert_eq!(parse_shape("()"), Some(vec![]));
    }
}

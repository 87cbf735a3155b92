//! On-disk vector store.
//!
//! An index directory holds two artifacts that are written and read as a
//! pair:
//!
//! * `vectors.bin`: little-endian `i32` count, `i32` dimension (0 when the
//!   count is 0), then `count * dimension` `f32` values, row-major.
//! * `index.json`: `{"entries": [{"file", "path", "chunk", "index"}, ...]}`,
//!   optionally tagged with the tokenizer scheme that produced the vectors.
//!
//! The two writes are not atomic together. A store left inconsistent by a
//! crash is repaired by rebuilding it.

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Number;
use crate::error::{Result, SemdexError};
use crate::tokenizer::TokenizerScheme;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const INDEX_FILE: &str = "index.json";

const HEADER_SIZE: usize = 2 * size_of::<i32>();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Display name of the source file.
    pub file: String,
    /// Path of the source file as it was enumerated.
    pub path: String,
    pub chunk: String,
    /// Position of this entry's vector in `vectors.bin`.
    pub index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<TokenizerScheme>,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub entries: usize,
    pub vectors: usize,
    pub dimension: usize,
    pub tokenizer: Option<TokenizerScheme>,
}

pub fn vectors_path(dir: &Path) -> PathBuf {
    dir.join(VECTORS_FILE)
}

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// True when both artifacts are present in `dir`.
pub fn index_exists(dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    vectors_path(dir).is_file() && index_path(dir).is_file()
}

pub fn save_vectors(vectors: &[Vec<Number>], dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    let dimension = vectors.first().map_or(0, Vec::len);
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(SemdexError::InvalidArgument(format!(
            "vector {i} has dimension {}, expected {dimension}",
            v.len()
        )));
    }
    let count = to_i32(vectors.len(), "vector count")?;
    let dimension = if count == 0 { 0 } else { to_i32(dimension, "dimension")? };

    fs::create_dir_all(dir).map_err(|e| SemdexError::io(dir, e))?;
    let path = vectors_path(dir);
    let file = File::create(&path).map_err(|e| SemdexError::io(&path, e))?;
    let mut writer = BufWriter::new(file);

    let write = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
        writer.write_all(&count.to_le_bytes())?;
        writer.write_all(&dimension.to_le_bytes())?;
        for value in vectors.iter().flatten() {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()
    };
    write(&mut writer).map_err(|e| SemdexError::io(&path, e))?;

    debug!(count, dimension, path = %path.display(), "saved vectors");
    Ok(())
}

pub fn load_vectors(dir: impl AsRef<Path>) -> Result<Vec<Vec<Number>>> {
    let path = vectors_path(dir.as_ref());
    let mmap = map_vectors(&path)?;
    let (count, dimension) = read_header(&mmap, &path)?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(size_of::<Number>()))
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| SemdexError::corrupt(&path, "header describes an impossible size"))?;
    if mmap.len() < expected {
        return Err(SemdexError::corrupt(
            &path,
            format!("truncated: expected {expected} bytes, found {}", mmap.len()),
        ));
    }
    if mmap.len() > expected {
        return Err(SemdexError::corrupt(
            &path,
            format!("{} trailing bytes after {count} vectors", mmap.len() - expected),
        ));
    }
    if count == 0 {
        return Ok(Vec::new());
    }

    let vectors = mmap[HEADER_SIZE..]
        .chunks_exact(dimension * size_of::<Number>())
        .map(|row| {
            row.chunks_exact(size_of::<Number>())
                .map(|b| Number::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect();

    debug!(count, dimension, path = %path.display(), "loaded vectors");
    Ok(vectors)
}

fn map_vectors(path: &Path) -> Result<Mmap> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SemdexError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(SemdexError::io(path, e)),
    };
    let len = file.metadata().map_err(|e| SemdexError::io(path, e))?.len();
    if len < HEADER_SIZE as u64 {
        return Err(SemdexError::corrupt(
            path,
            format!("{len} bytes is shorter than the {HEADER_SIZE}-byte header"),
        ));
    }
    // The store is only rewritten by a rebuild, which callers serialize with reads.
    unsafe { Mmap::map(&file) }.map_err(|e| SemdexError::io(path, e))
}

fn read_header(bytes: &[u8], path: &Path) -> Result<(usize, usize)> {
    let count = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let dimension = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if count < 0 || dimension < 0 {
        return Err(SemdexError::corrupt(
            path,
            format!("negative header values (count {count}, dimension {dimension})"),
        ));
    }
    if count > 0 && dimension == 0 {
        return Err(SemdexError::corrupt(path, "non-empty store with dimension 0"));
    }
    Ok((count as usize, dimension as usize))
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| SemdexError::InvalidArgument(format!("{what} {value} does not fit in i32")))
}

/// Header of `vectors.bin` without reading the vector data.
pub fn vectors_header(dir: impl AsRef<Path>) -> Result<(usize, usize)> {
    let path = vectors_path(dir.as_ref());
    let mmap = map_vectors(&path)?;
    read_header(&mmap, &path)
}

pub fn save_index(entries: &[IndexEntry], dir: impl AsRef<Path>) -> Result<()> {
    write_index_file(entries, None, dir.as_ref())
}

/// Like [`save_index`], recording which tokenizer scheme produced the vectors.
pub fn save_index_tagged(
    entries: &[IndexEntry],
    scheme: TokenizerScheme,
    dir: impl AsRef<Path>,
) -> Result<()> {
    write_index_file(entries, Some(scheme), dir.as_ref())
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tokenizer: Option<TokenizerScheme>,
    entries: &'a [IndexEntry],
}

fn write_index_file(entries: &[IndexEntry], tokenizer: Option<TokenizerScheme>, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| SemdexError::io(dir, e))?;
    let path = index_path(dir);
    let file = File::create(&path).map_err(|e| SemdexError::io(&path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &IndexFileRef { tokenizer, entries })
        .map_err(|e| SemdexError::ExternalFailure(format!("failed to write {}: {e}", path.display())))?;
    writer.flush().map_err(|e| SemdexError::io(&path, e))?;
    debug!(entries = entries.len(), path = %path.display(), "saved index entries");
    Ok(())
}

pub fn load_index_file(dir: impl AsRef<Path>) -> Result<IndexFile> {
    let path = index_path(dir.as_ref());
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SemdexError::NotFound(path))
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(SemdexError::corrupt(&path, e.to_string()))
        }
        Err(e) => return Err(SemdexError::io(&path, e)),
    };
    serde_json::from_str(&contents).map_err(|e| SemdexError::corrupt(&path, e.to_string()))
}

pub fn load_index(dir: impl AsRef<Path>) -> Result<Vec<IndexEntry>> {
    Ok(load_index_file(dir)?.entries)
}

pub fn index_info(dir: impl AsRef<Path>) -> Result<IndexInfo> {
    let dir = dir.as_ref();
    let (vectors, dimension) = vectors_header(dir)?;
    let index = load_index_file(dir)?;
    Ok(IndexInfo {
        entries: index.entries.len(),
        vectors,
        dimension,
        tokenizer: index.tokenizer,
    })
}

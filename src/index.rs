//! Flat inner-product vector index.
//!
//! Stores L2-normalized embedding vectors in a dense arena and answers
//! top-K nearest-neighbor queries by exhaustive inner product, which is
//! cosine similarity once both sides are normalized. Internal position `i`
//! is the join key into the document store's id mapping.
//!
//! Persistence uses a small native binary format rather than a generic
//! object serializer: a fixed header (magic, format version, dims, count)
//! followed by the vector data as little-endian `f32` values.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

const INDEX_MAGIC: [u8; 4] = *b"RIXV";
const INDEX_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;
const BYTES_PER_F32: usize = 4;

/// Dense inner-product index over L2-normalized vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self { dims, data: Vec::new() }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector. The caller normalizes before adding.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(Error::Embedding(format!(
                "expected a {}-dimensional vector, got {}",
                self.dims,
                vector.len()
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    fn row(&self, position: usize) -> &[f32] {
        &self.data[position * self.dims..(position + 1) * self.dims]
    }

    /// Top-`k` positions by inner product with `query`, highest first.
    /// Ties are broken by ascending position.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, dot(self.row(i), query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Write the index in its native binary form, via a temporary file
    /// renamed into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp).map_err(|e| {
            Error::Persistence(format!("failed to create {}: {}", tmp.display(), e))
        })?;
        let mut writer = BufWriter::new(file);

        let write = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
            writer.write_all(&INDEX_MAGIC)?;
            writer.write_all(&INDEX_FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(self.dims as u32).to_le_bytes())?;
            writer.write_all(&(self.len() as u32).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()
        };
        write(&mut writer)
            .map_err(|e| Error::Persistence(format!("failed to write {}: {}", tmp.display(), e)))?;
        drop(writer);

        fs::rename(&tmp, path).map_err(|e| {
            Error::Persistence(format!("failed to move index into place: {}", e))
        })
    }

    /// Read an index written by [`FlatIndex::save`]. A missing file, bad
    /// header, or truncated payload is a persistence error.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            Error::Persistence(format!("failed to read {}: {}", path.display(), e))
        })?;

        if bytes.len() < HEADER_LEN {
            return Err(Error::Persistence(format!(
                "{} is truncated: {} bytes",
                path.display(),
                bytes.len()
            )));
        }
        if bytes[0..4] != INDEX_MAGIC {
            return Err(Error::Persistence(format!(
                "{} is not a vector index file",
                path.display()
            )));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != INDEX_FORMAT_VERSION {
            return Err(Error::Persistence(format!(
                "unsupported index format version {}",
                version
            )));
        }

        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

        let expected = HEADER_LEN + count * dims * BYTES_PER_F32;
        if bytes.len() != expected {
            return Err(Error::Persistence(format!(
                "{} has {} bytes, expected {} for {} vectors of {} dims",
                path.display(),
                bytes.len(),
                expected,
                count,
                dims
            )));
        }

        let data: Vec<f32> = bytes[HEADER_LEN..]
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dims, data })
    }
}

/// Scale a vector to unit L2 norm. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

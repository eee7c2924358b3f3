use std::io;

use bitflags::bitflags;
use bstr::ByteSlice;
use cqdb::CQDB;

/// Binary model format version, the first field of every model file.
pub const MODEL_VERSION: u32 = 100;

bitflags! {
    /// Capability flags persisted in the binary model.
    #[derive(Default)]
    pub struct ModelFlags: u32 {
        /// The model carries an embedding table and embedding weights.
        const EMBEDDINGS = 0x01;
    }
}

#[inline]
pub(crate) fn unpack_u32(buf: &[u8]) -> io::Result<u32> {
    if buf.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough data for unpacking u32",
        ));
    }
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

#[inline]
fn unpack_f64(buf: &[u8]) -> io::Result<f64> {
    if buf.len() < 8 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough data for unpacking f64",
        ));
    }
    Ok(f64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ]))
}

#[inline]
fn unpack_f32(buf: &[u8]) -> io::Result<f32> {
    if buf.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough data for unpacking f32",
        ));
    }
    Ok(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Cursor over the borrowed model buffer.
struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected end of model data",
            ));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> io::Result<u32> {
        unpack_u32(self.take(4)?)
    }

    fn f64(&mut self) -> io::Result<f64> {
        unpack_f64(self.take(8)?)
    }

    fn f32(&mut self) -> io::Result<f32> {
        unpack_f32(self.take(4)?)
    }

    fn string(&mut self) -> io::Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid UTF-8 in model data"))
    }

    /// Ensure at least `count * item_size` bytes remain, so a corrupt count
    /// cannot trigger an oversized allocation.
    fn check_count(&self, count: u32, item_size: usize) -> io::Result<()> {
        if (count as u64) * (item_size as u64) > self.remaining() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "section length exceeds model data",
            ));
        }
        Ok(())
    }

    fn string_list(&mut self) -> io::Result<Vec<String>> {
        let count = self.u32()?;
        self.check_count(count, 4)?;
        (0..count).map(|_| self.string()).collect()
    }

    fn f64_vec(&mut self, count: u32) -> io::Result<Vec<f64>> {
        self.check_count(count, 8)?;
        (0..count).map(|_| self.f64()).collect()
    }

    fn f32_vec(&mut self, count: u32) -> io::Result<Vec<f32>> {
        self.check_count(count, 4)?;
        (0..count).map(|_| self.f32()).collect()
    }
}

/// A persisted model, parsed from a borrowed byte buffer.
///
/// The leading version token selects the concrete reader; unknown versions
/// are rejected. The dictionary stays in its stored form and is queried
/// through exact lookups.
#[derive(Debug, Clone)]
pub struct Model<'a> {
    version: u32,
    cost_factor: f64,
    max_id: u32,
    xsize: u32,
    labels: Vec<String>,
    unigram_templates: Vec<String>,
    bigram_templates: Vec<String>,
    num_keys: u32,
    dict: CQDB<'a>,
    alpha: Vec<f64>,
    flags: ModelFlags,
    max_embedding_id: u32,
    embedding_templates: Vec<String>,
    alpha_embedding: Vec<f64>,
    embedding_dim: u32,
    embedding: Vec<(String, Vec<f32>)>,
}

impl<'a> Model<'a> {
    /// Parse a model from an in-memory buffer.
    pub fn new(buf: &'a [u8]) -> io::Result<Model<'a>> {
        let mut reader = SliceReader::new(buf);
        let version = reader.u32()?;
        match version {
            MODEL_VERSION => Self::read_v100(version, reader),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported model version: {}", other),
            )),
        }
    }

    fn read_v100(version: u32, mut r: SliceReader<'a>) -> io::Result<Model<'a>> {
        let cost_factor = r.f64()?;
        let max_id = r.u32()?;
        let xsize = r.u32()?;
        let labels = r.string_list()?;
        let unigram_templates = r.string_list()?;
        let bigram_templates = r.string_list()?;

        let num_keys = r.u32()?;
        let blob_len = r.u32()? as usize;
        let dict = CQDB::new(r.take(blob_len)?)?;

        let alpha = r.f64_vec(max_id)?;

        let flags = ModelFlags::from_bits_truncate(r.u32()?);
        let max_embedding_id = r.u32()?;
        let embedding_templates = r.string_list()?;
        let alpha_embedding = r.f64_vec(max_embedding_id)?;
        let embedding_dim = r.u32()?;
        let num_vectors = r.u32()?;
        r.check_count(num_vectors, 4)?;
        let mut embedding = Vec::with_capacity(num_vectors as usize);
        for _ in 0..num_vectors {
            let key = r.string()?;
            let values = r.f32_vec(embedding_dim)?;
            embedding.push((key, values));
        }

        Ok(Model {
            version,
            cost_factor,
            max_id,
            xsize,
            labels,
            unigram_templates,
            bigram_templates,
            num_keys,
            dict,
            alpha,
            flags,
            max_embedding_id,
            embedding_templates,
            alpha_embedding,
            embedding_dim,
            embedding,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn cost_factor(&self) -> f64 {
        self.cost_factor
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    pub fn xsize(&self) -> u32 {
        self.xsize
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn unigram_templates(&self) -> &[String] {
        &self.unigram_templates
    }

    pub fn bigram_templates(&self) -> &[String] {
        &self.bigram_templates
    }

    /// Number of distinct feature keys in the dictionary.
    pub fn num_keys(&self) -> u32 {
        self.num_keys
    }

    /// Convert a feature key to its base ID.
    pub fn to_id(&self, key: &str) -> Option<u32> {
        self.dict.to_id(key)
    }

    /// Convert a base ID back to its feature key.
    pub fn to_key(&self, base_id: u32) -> Option<&str> {
        self.dict.to_str(base_id).and_then(|s| s.to_str().ok())
    }

    /// Enumerate the stored dictionary as `(key, base_id)` pairs, ordered by
    /// base ID. Occurrence counts are not persisted; recovered entries count
    /// as seen once.
    pub fn entries(&self) -> Vec<(String, u32)> {
        let mut out = Vec::with_capacity(self.num_keys.min(self.max_id) as usize);
        for id in 0..self.max_id {
            if out.len() == self.num_keys as usize {
                break;
            }
            if let Some(key) = self.to_key(id) {
                out.push((key.to_string(), id));
            }
        }
        out
    }

    /// Feature weights, one slot per allocated ID.
    pub fn weights(&self) -> &[f64] {
        &self.alpha
    }

    pub fn flags(&self) -> ModelFlags {
        self.flags
    }

    pub fn supports_embedding(&self) -> bool {
        self.flags.contains(ModelFlags::EMBEDDINGS)
    }

    pub fn max_embedding_id(&self) -> u32 {
        self.max_embedding_id
    }

    pub fn embedding_templates(&self) -> &[String] {
        &self.embedding_templates
    }

    pub fn embedding_weights(&self) -> &[f64] {
        &self.alpha_embedding
    }

    pub fn embedding_dim(&self) -> u32 {
        self.embedding_dim
    }

    /// Embedding vectors in stored (sorted-key) order.
    pub fn embedding_vectors(&self) -> &[(String, Vec<f32>)] {
        &self.embedding
    }
}

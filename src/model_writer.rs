use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cqdb::CQDBWriter;
use tempfile::NamedTempFile;

use crate::feature_index::FeatureIndex;
use crate::model::{ModelFlags, MODEL_VERSION};

/// Serializes a feature index into the binary model format, with an optional
/// human-readable text rendition.
pub struct ModelWriter;

impl ModelWriter {
    /// Write the binary model to `path`; with `text_model` set, also write
    /// the text form to a `.txt`-suffixed sibling.
    ///
    /// Each file is staged in a temporary sibling and atomically renamed
    /// into place, so a failed save leaves nothing at the target path.
    pub fn write(path: &Path, index: &FeatureIndex, text_model: bool) -> io::Result<()> {
        let result = Self::validate(index)
            .and_then(|_| Self::write_atomic(path, |file| Self::write_binary(file, index)));
        if let Err(e) = result {
            log::error!("error saving model to {}: {}", path.display(), e);
            return Err(e);
        }
        if text_model {
            let text_path = Self::text_model_path(path);
            let result = Self::write_atomic(&text_path, |file| {
                let mut w = BufWriter::new(file);
                Self::write_text(&mut w, index)?;
                w.flush()
            });
            if let Err(e) = result {
                log::error!("error saving model to {}: {}", text_path.display(), e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Path of the text model written next to a binary model.
    pub fn text_model_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".txt");
        PathBuf::from(name)
    }

    /// The persisted weight vectors must cover the allocated ID spaces
    /// exactly.
    fn validate(index: &FeatureIndex) -> io::Result<()> {
        if index.weights().len() != index.max_id() as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "weight vector length {} does not match maxid {}",
                    index.weights().len(),
                    index.max_id()
                ),
            ));
        }
        if index.embedding_weights().len() != index.max_embedding_id() as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "embedding weight vector length {} does not match maxembeddingid {}",
                    index.embedding_weights().len(),
                    index.max_embedding_id()
                ),
            ));
        }
        Ok(())
    }

    fn write_atomic<F>(path: &Path, write_fn: F) -> io::Result<()>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        write_fn(tmp.as_file_mut())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_binary(file: &mut File, index: &FeatureIndex) -> io::Result<()> {
        file.write_all(&MODEL_VERSION.to_le_bytes())?;
        file.write_all(&index.cost_factor().to_le_bytes())?;
        file.write_all(&index.max_id().to_le_bytes())?;
        file.write_all(&index.xsize().to_le_bytes())?;
        Self::write_string_list(file, index.labels())?;
        Self::write_string_list(file, index.templates().unigrams())?;
        Self::write_string_list(file, index.templates().bigrams())?;

        // dictionary: sorted keys with base-ID values, stored as a CQDB blob
        // behind a patched-in byte length
        let entries = index.dict().sorted_entries();
        let num_keys = u32::try_from(entries.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "too many dictionary keys")
        })?;
        file.write_all(&num_keys.to_le_bytes())?;
        let len_pos = file.stream_position()?;
        file.write_all(&0u32.to_le_bytes())?;
        let blob_start = file.stream_position()?;
        Self::write_cqdb(file, &entries)?;
        let blob_end = file.stream_position()?;
        let blob_len = u32::try_from(blob_end - blob_start).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "dictionary blob size exceeds u32::MAX",
            )
        })?;
        file.seek(SeekFrom::Start(len_pos))?;
        file.write_all(&blob_len.to_le_bytes())?;
        file.seek(SeekFrom::Start(blob_end))?;

        for weight in index.weights() {
            file.write_all(&weight.to_le_bytes())?;
        }

        let mut flags = ModelFlags::default();
        if index.supports_embedding() {
            flags |= ModelFlags::EMBEDDINGS;
        }
        file.write_all(&flags.bits().to_le_bytes())?;
        file.write_all(&index.max_embedding_id().to_le_bytes())?;
        Self::write_string_list(file, index.templates().embeddings())?;
        for weight in index.embedding_weights() {
            file.write_all(&weight.to_le_bytes())?;
        }
        file.write_all(&index.embedding_dim().to_le_bytes())?;
        match index.embedding() {
            Some(embedding) => {
                let count = u32::try_from(embedding.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "too many embedding vectors")
                })?;
                file.write_all(&count.to_le_bytes())?;
                for (key, values) in embedding.iter() {
                    Self::write_string(file, key)?;
                    for v in values {
                        file.write_all(&v.to_le_bytes())?;
                    }
                }
            }
            None => file.write_all(&0u32.to_le_bytes())?,
        }
        Ok(())
    }

    fn write_string(file: &mut File, s: &str) -> io::Result<()> {
        let len = u32::try_from(s.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string too long"))?;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(s.as_bytes())
    }

    fn write_string_list(file: &mut File, items: &[String]) -> io::Result<()> {
        let count = u32::try_from(items.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "list too long"))?;
        file.write_all(&count.to_le_bytes())?;
        for item in items {
            Self::write_string(file, item)?;
        }
        Ok(())
    }

    fn write_cqdb(file: &mut File, entries: &[(&str, u32)]) -> io::Result<()> {
        let mut writer = CQDBWriter::new(file)?;
        for (key, base_id) in entries {
            writer.put(key, *base_id)?;
        }
        // the writer flushes the database when dropped
        Ok(())
    }

    fn write_text<W: Write>(w: &mut W, index: &FeatureIndex) -> io::Result<()> {
        writeln!(w, "version: {}", MODEL_VERSION)?;
        writeln!(w, "cost-factor: {:.16}", index.cost_factor())?;
        writeln!(w, "maxid: {}", index.max_id())?;
        writeln!(w, "xsize: {}", index.xsize())?;
        writeln!(w)?;
        for label in index.labels() {
            writeln!(w, "{}", label)?;
        }
        writeln!(w)?;
        for template in index.templates().unigrams() {
            writeln!(w, "{}", template)?;
        }
        for template in index.templates().bigrams() {
            writeln!(w, "{}", template)?;
        }
        writeln!(w)?;
        for (key, base_id) in index.dict().sorted_entries() {
            writeln!(w, "{} {}", base_id, key)?;
        }
        writeln!(w)?;
        for weight in index.weights() {
            writeln!(w, "{:.16}", weight)?;
        }
        writeln!(w)?;
        writeln!(w, "embedding-support: {}", index.supports_embedding())?;
        writeln!(w, "maxembeddingid: {}", index.max_embedding_id())?;
        writeln!(w)?;
        for template in index.templates().embeddings() {
            writeln!(w, "{}", template)?;
        }
        writeln!(w)?;
        for weight in index.embedding_weights() {
            writeln!(w, "{:.16}", weight)?;
        }
        writeln!(w)?;
        writeln!(w, "embedding-size: {}", index.embedding_dim())?;
        if let Some(embedding) = index.embedding() {
            for (key, values) in embedding.iter() {
                write!(w, "{}", key)?;
                for v in values {
                    write!(w, "\t{}", v)?;
                }
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::dictionary::{remap_feature_ids, DictEntry, FeatureDict};
use crate::embedding::Embedding;
use crate::template::Templates;

/// Per-consumer feature cache: one row of feature IDs per cached item, each
/// row terminated by the sentinel `-1`. Owned by the tagging side and
/// rewritten by [`FeatureIndex::shrink`].
pub type FeatureCache = Vec<Vec<i32>>;

/// The owning feature allocator for one training run.
///
/// Bundles the parsed templates, the frozen label vocabulary, the feature
/// dictionary and the weight vectors. Allocation and compaction take `&mut
/// self`, so concurrent allocation is unrepresentable; a frozen index can be
/// shared freely for read-only access.
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    templates: Templates,
    labels: Vec<String>,
    xsize: u32,
    cost_factor: f64,
    dict: FeatureDict,
    alpha: Vec<f64>,
    embedding: Option<Embedding>,
    embedding_ids: HashMap<String, DictEntry>,
    max_embedding_id: u32,
    alpha_embedding: Vec<f64>,
}

impl FeatureIndex {
    /// Load templates and scan the labeled examples, producing an index with
    /// an empty dictionary. The label vocabulary is frozen here, before any
    /// ID can be allocated.
    pub fn open(template_path: &Path, train_path: &Path) -> io::Result<FeatureIndex> {
        Self::open_impl(template_path, train_path, None)
    }

    /// Like [`FeatureIndex::open`], additionally loading an embedding table
    /// when the template file contains at least one embedding template.
    pub fn open_with_embedding(
        template_path: &Path,
        train_path: &Path,
        embedding_path: &Path,
    ) -> io::Result<FeatureIndex> {
        Self::open_impl(template_path, train_path, Some(embedding_path))
    }

    fn open_impl(
        template_path: &Path,
        train_path: &Path,
        embedding_path: Option<&Path>,
    ) -> io::Result<FeatureIndex> {
        let templates = Templates::from_path(template_path).map_err(|e| {
            log::error!("error reading {}: {}", template_path.display(), e);
            e
        })?;
        // embedding support is enabled only when both an embedding template
        // and an embedding source are present
        let embedding = match embedding_path {
            Some(path) if !templates.embeddings().is_empty() => Some(Embedding::from_path(path)?),
            _ => None,
        };
        let (labels, xsize) = Self::scan_tag_set(train_path)?;
        let num_labels = labels.len() as u32;
        Ok(FeatureIndex {
            templates,
            labels,
            xsize,
            cost_factor: 1.0,
            dict: FeatureDict::new(num_labels),
            alpha: Vec::new(),
            embedding,
            embedding_ids: HashMap::new(),
            max_embedding_id: 0,
            alpha_embedding: Vec::new(),
        })
    }

    /// Collect the label vocabulary and the feature column count from a
    /// labeled example file. The first non-blank line fixes the column
    /// count; any later line with a different count aborts the load.
    fn scan_tag_set(path: &Path) -> io::Result<(Vec<String>, u32)> {
        let scan = || -> io::Result<(Vec<String>, u32)> {
            let file = File::open(path)?;
            let mut labels: Vec<String> = Vec::new();
            let mut columns = 0usize;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.is_empty() || line.starts_with(' ') || line.starts_with('\t') {
                    continue;
                }
                let cols: Vec<&str> = line.split_whitespace().collect();
                if columns == 0 {
                    columns = cols.len();
                }
                if cols.len() != columns {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "inconsistent column size: {} vs {} at line {}",
                            columns,
                            cols.len(),
                            line_no + 1
                        ),
                    ));
                }
                let label = cols[columns - 1];
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
            if columns == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "no labeled examples",
                ));
            }
            labels.sort();
            Ok((labels, (columns - 1) as u32))
        };
        scan().map_err(|e| {
            log::error!("error reading {}: {}", path.display(), e);
            io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        templates: Templates,
        labels: Vec<String>,
        xsize: u32,
        cost_factor: f64,
        dict: FeatureDict,
        alpha: Vec<f64>,
        embedding: Option<Embedding>,
        max_embedding_id: u32,
        alpha_embedding: Vec<f64>,
    ) -> FeatureIndex {
        FeatureIndex {
            templates,
            labels,
            xsize,
            cost_factor,
            dict,
            alpha,
            embedding,
            embedding_ids: HashMap::new(),
            max_embedding_id,
            alpha_embedding,
        }
    }

    /// Get or allocate the base ID for a feature key. See
    /// [`FeatureDict::get_id`].
    pub fn get_id(&mut self, key: &str) -> u32 {
        self.dict.get_id(key)
    }

    /// Get or allocate the base embedding ID for a key. Each new key reserves
    /// `dimension * |labels|` consecutive embedding-weight indices.
    ///
    /// Fails when embedding support is not enabled.
    pub fn get_embedding_id(&mut self, key: &str) -> io::Result<u32> {
        let dim = match &self.embedding {
            Some(embedding) => embedding.dim() as u32,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "embedding support is not enabled",
                ))
            }
        };
        if let Some(entry) = self.embedding_ids.get_mut(key) {
            entry.occurrences += 1;
            return Ok(entry.base_id);
        }
        let base_id = self.max_embedding_id;
        self.max_embedding_id += dim * self.labels.len() as u32;
        self.embedding_ids.insert(
            key.to_string(),
            DictEntry {
                base_id,
                occurrences: 1,
            },
        );
        Ok(base_id)
    }

    /// Drop features requested fewer than `min_freq` times, renumber the
    /// survivors from 0 and rewrite every consumer cache through the
    /// resulting ID map. A `min_freq` of 1 or less is a no-op.
    ///
    /// Embedding IDs are not affected. Weight vectors are expected to be
    /// uninitialized at this point; call [`FeatureIndex::init_alpha`] after
    /// shrinking.
    pub fn shrink(&mut self, min_freq: u32, caches: &mut [FeatureCache]) {
        if min_freq <= 1 {
            return;
        }
        let old2new = self.dict.shrink(min_freq);
        for cache in caches.iter_mut() {
            for row in cache.iter_mut() {
                *row = remap_feature_ids(row, &old2new);
            }
        }
    }

    /// Size both weight vectors to the frozen ID space, zero-filled.
    pub fn init_alpha(&mut self) {
        self.alpha.clear();
        self.alpha.resize(self.dict.max_id() as usize, 0.0);
        self.alpha_embedding.clear();
        self.alpha_embedding
            .resize(self.max_embedding_id as usize, 0.0);
    }

    pub fn dict(&self) -> &FeatureDict {
        &self.dict
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Sorted, deduplicated label vocabulary.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_labels(&self) -> u32 {
        self.labels.len() as u32
    }

    /// Number of feature columns per example line (label column excluded).
    pub fn xsize(&self) -> u32 {
        self.xsize
    }

    pub fn max_id(&self) -> u32 {
        self.dict.max_id()
    }

    pub fn cost_factor(&self) -> f64 {
        self.cost_factor
    }

    pub fn set_cost_factor(&mut self, cost_factor: f64) {
        self.cost_factor = cost_factor;
    }

    pub fn supports_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// Embedding vector dimension, 0 when embedding support is off.
    pub fn embedding_dim(&self) -> u32 {
        self.embedding.as_ref().map(|e| e.dim() as u32).unwrap_or(0)
    }

    pub fn max_embedding_id(&self) -> u32 {
        self.max_embedding_id
    }

    pub fn weights(&self) -> &[f64] {
        &self.alpha
    }

    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.alpha
    }

    pub fn embedding_weights(&self) -> &[f64] {
        &self.alpha_embedding
    }

    pub fn embedding_weights_mut(&mut self) -> &mut [f64] {
        &mut self.alpha_embedding
    }
}

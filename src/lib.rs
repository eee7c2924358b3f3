//! Feature indexing and model persistence for template-driven linear-chain
//! CRFs.
//!
//! This library turns textual feature templates and a label vocabulary into
//! a dense weight-vector ID space, manages a frequency-filtered feature
//! dictionary, and serializes the dictionary plus model weights (and an
//! optional embedding table) in two mutually convertible forms: a compact
//! binary model and a human-readable text model.
//!
//! Every unigram feature key reserves `|labels|` consecutive weight indices
//! and every bigram key `|labels|^2`, so a key's base ID addresses a whole
//! block of label (or label-pair) weights. The decoding and training
//! algorithms themselves live elsewhere; they consume this crate through
//! [`FeatureIndex`] and [`Model`].
//!
//! # Examples
//!
//! Building an index during a training pass:
//!
//! ```no_run
//! use std::path::Path;
//! use crfpp::{FeatureIndex, ModelWriter};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut index = FeatureIndex::open(Path::new("template"), Path::new("train.data"))?;
//! let id = index.get_id("U01:John");
//! let mut caches = vec![vec![vec![id as i32, -1]]];
//! index.shrink(2, &mut caches);
//! index.init_alpha();
//! ModelWriter::write(Path::new("model.bin"), &index, true)?;
//! # Ok(())
//! # }
//! ```
//!
//! Loading a model and converting the text form back to binary:
//!
//! ```no_run
//! use std::path::Path;
//! use crfpp::{convert, Model};
//!
//! # fn main() -> std::io::Result<()> {
//! let buf = std::fs::read("model.bin")?;
//! let model = Model::new(&buf)?;
//! assert_eq!(model.to_id("U01:John"), Some(0));
//! convert(Path::new("model.bin.txt"), Path::new("model2.bin"))?;
//! # Ok(())
//! # }
//! ```

mod convert;
mod dictionary;
mod embedding;
mod feature_index;
mod model;
mod model_writer;
mod template;

pub use self::convert::{convert, read_text_model};
pub use self::dictionary::{remap_feature_ids, DictEntry, FeatureDict};
pub use self::embedding::Embedding;
pub use self::feature_index::{FeatureCache, FeatureIndex};
pub use self::model::{Model, ModelFlags, MODEL_VERSION};
pub use self::model_writer::ModelWriter;
pub use self::template::{TemplateKind, Templates};

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::dictionary::FeatureDict;
use crate::embedding::Embedding;
use crate::feature_index::FeatureIndex;
use crate::model::MODEL_VERSION;
use crate::model_writer::ModelWriter;
use crate::template::Templates;

/// Parse a text model and rewrite it as a binary model.
///
/// The binary output is exactly what a direct binary save of the recovered
/// state would produce; only the occurrence statistics differ from the
/// original training run, since raw counts are not persisted.
pub fn convert(text_path: &Path, binary_path: &Path) -> io::Result<()> {
    let index = read_text_model(text_path)?;
    ModelWriter::write(binary_path, &index, false)
}

/// Parse a text model file back into a feature index. Sections must appear
/// in the exact written order; every recovered key counts as seen once.
pub fn read_text_model(path: &Path) -> io::Result<FeatureIndex> {
    let result = fs::read_to_string(path).and_then(|content| parse_text_model(&content));
    result.map_err(|e| {
        log::error!("error reading {}: {}", path.display(), e);
        io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
    })
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn header_value<'a>(line: Option<&'a str>, prefix: &str) -> io::Result<&'a str> {
    match line {
        Some(l) => l
            .strip_prefix(prefix)
            .ok_or_else(|| invalid(format!("expected `{}` header, got {:?}", prefix.trim(), l))),
        None => Err(invalid(format!("missing `{}` header", prefix.trim()))),
    }
}

fn parse_num<T: FromStr>(value: &str, what: &str) -> io::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(format!("invalid {}: {:?}", what, value)))
}

/// Collect lines up to the next blank separator (or end of input).
fn take_section<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        out.push(line);
    }
    out
}

fn expect_blank<'a>(lines: &mut impl Iterator<Item = &'a str>) -> io::Result<()> {
    match lines.next() {
        Some("") => Ok(()),
        Some(l) => Err(invalid(format!("expected blank separator, got {:?}", l))),
        None => Err(invalid("unexpected end of file".to_string())),
    }
}

fn parse_text_model(content: &str) -> io::Result<FeatureIndex> {
    let mut lines = content.lines();

    let version: u32 = parse_num(header_value(lines.next(), "version: ")?, "version")?;
    if version != MODEL_VERSION {
        return Err(invalid(format!("unsupported model version: {}", version)));
    }
    let cost_factor: f64 = parse_num(header_value(lines.next(), "cost-factor: ")?, "cost factor")?;
    let max_id: u32 = parse_num(header_value(lines.next(), "maxid: ")?, "maxid")?;
    let xsize: u32 = parse_num(header_value(lines.next(), "xsize: ")?, "xsize")?;
    expect_blank(&mut lines)?;

    let labels: Vec<String> = take_section(&mut lines)
        .into_iter()
        .map(|l| l.to_string())
        .collect();
    if labels.is_empty() {
        return Err(invalid("empty label section".to_string()));
    }

    let mut unigrams = Vec::new();
    let mut bigrams = Vec::new();
    for line in take_section(&mut lines) {
        if line.starts_with('U') {
            unigrams.push(line.to_string());
        } else if line.starts_with('B') {
            bigrams.push(line.to_string());
        } else {
            log::warn!("unknown template type: {}", line);
        }
    }

    let mut dict = FeatureDict::new(labels.len() as u32);
    for line in take_section(&mut lines) {
        let (id_str, key) = line
            .split_once(' ')
            .ok_or_else(|| invalid(format!("malformed dictionary entry: {:?}", line)))?;
        let base_id: u32 = parse_num(id_str, "feature id")?;
        dict.insert_entry(key.to_string(), base_id);
    }
    validate_id_ranges(&dict, max_id)?;
    dict.set_max_id(max_id);

    let weight_lines = take_section(&mut lines);
    if weight_lines.len() != max_id as usize {
        return Err(invalid(format!(
            "expected {} weights, got {}",
            max_id,
            weight_lines.len()
        )));
    }
    let alpha = weight_lines
        .iter()
        .map(|l| parse_num::<f64>(l, "weight"))
        .collect::<io::Result<Vec<f64>>>()?;

    let supports: bool = parse_num(
        header_value(lines.next(), "embedding-support: ")?,
        "embedding support flag",
    )?;
    let max_embedding_id: u32 = parse_num(
        header_value(lines.next(), "maxembeddingid: ")?,
        "maxembeddingid",
    )?;
    expect_blank(&mut lines)?;

    let mut embedding_templates = Vec::new();
    for line in take_section(&mut lines) {
        if line.starts_with('E') {
            embedding_templates.push(line.to_string());
        } else {
            log::warn!("unknown template type: {}", line);
        }
    }

    let emb_weight_lines = take_section(&mut lines);
    if emb_weight_lines.len() != max_embedding_id as usize {
        return Err(invalid(format!(
            "expected {} embedding weights, got {}",
            max_embedding_id,
            emb_weight_lines.len()
        )));
    }
    let alpha_embedding = emb_weight_lines
        .iter()
        .map(|l| parse_num::<f64>(l, "embedding weight"))
        .collect::<io::Result<Vec<f64>>>()?;

    let dim: usize = parse_num(
        header_value(lines.next(), "embedding-size: ")?,
        "embedding size",
    )?;
    let mut vectors = BTreeMap::new();
    for line in &mut lines {
        if line.is_empty() {
            break;
        }
        let mut fields = line.split('\t');
        let key = fields.next().unwrap_or_default();
        let values = fields
            .map(|v| parse_num::<f32>(v, "embedding value"))
            .collect::<io::Result<Vec<f32>>>()?;
        if values.len() != dim {
            return Err(invalid(format!(
                "embedding dimension mismatch for key {}: expected {}, got {}",
                key,
                dim,
                values.len()
            )));
        }
        vectors.insert(key.to_string(), values);
    }

    let embedding = if supports {
        if dim == 0 || vectors.is_empty() {
            return Err(invalid(
                "embedding support is set but no vectors are present".to_string(),
            ));
        }
        Some(Embedding::from_vectors(vectors, dim))
    } else {
        if dim != 0 || !vectors.is_empty() || max_embedding_id != 0 {
            return Err(invalid(
                "embedding data present without embedding support".to_string(),
            ));
        }
        None
    };

    Ok(FeatureIndex::from_parts(
        Templates::from_lists(unigrams, bigrams, embedding_templates),
        labels,
        xsize,
        cost_factor,
        dict,
        alpha,
        embedding,
        max_embedding_id,
        alpha_embedding,
    ))
}

/// The recovered base IDs must tile `0..max_id` exactly: sorted by base,
/// each range starts where the previous one ended.
fn validate_id_ranges(dict: &FeatureDict, max_id: u32) -> io::Result<()> {
    let mut ranges: Vec<(u32, u32)> = dict
        .iter()
        .map(|(key, entry)| (entry.base_id, dict.width_of(key)))
        .collect();
    ranges.sort_unstable();
    let mut expected = 0u64;
    for (base_id, width) in ranges {
        if base_id as u64 != expected {
            return Err(invalid(format!(
                "feature id ranges are not contiguous at id {}",
                base_id
            )));
        }
        expected += width as u64;
    }
    if expected != max_id as u64 {
        return Err(invalid(format!(
            "maxid {} does not match dictionary contents ({})",
            max_id, expected
        )));
    }
    Ok(())
}

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Fixed-dimension embedding vector table keyed by surface string.
///
/// The dimension is fixed by the first row of the source; every later row
/// must match it. Iteration order is sorted by key so serialized output is
/// reproducible.
#[derive(Debug, Clone, Default)]
pub struct Embedding {
    vectors: BTreeMap<String, Vec<f32>>,
    dim: usize,
}

impl Embedding {
    pub fn from_path(path: &Path) -> io::Result<Embedding> {
        let open = || -> io::Result<Embedding> {
            let file = File::open(path)?;
            Self::from_reader(BufReader::new(file))
        };
        open().map_err(|e| {
            log::error!("error reading {}: {}", path.display(), e);
            e
        })
    }

    /// Parse `key v0 v1 ... v(d-1)` lines, whitespace separated.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Embedding> {
        let mut vectors = BTreeMap::new();
        let mut dim = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let key = fields.next().unwrap_or_default();
            let values = fields
                .map(|v| {
                    v.parse::<f32>().map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("invalid embedding value {:?} for key {}", v, key),
                        )
                    })
                })
                .collect::<io::Result<Vec<f32>>>()?;
            if values.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("embedding row for key {} has no values", key),
                ));
            }
            if dim == 0 {
                dim = values.len();
            } else if values.len() != dim {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "embedding dimension mismatch for key {}: expected {}, got {}",
                        key,
                        dim,
                        values.len()
                    ),
                ));
            }
            vectors.insert(key.to_string(), values);
        }
        if vectors.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "embedding source contains no vectors",
            ));
        }
        Ok(Embedding { vectors, dim })
    }

    pub(crate) fn from_vectors(vectors: BTreeMap<String, Vec<f32>>, dim: usize) -> Embedding {
        Embedding { vectors, dim }
    }

    /// Vector dimension shared by every entry.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.vectors.get(key).map(|v| v.as_slice())
    }

    /// Entries in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.vectors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_vectors() {
        let input = "the 0.25 -0.5 1.0\nof 0.125 0.75 -1.5\n";
        let emb = Embedding::from_reader(Cursor::new(input)).unwrap();
        assert_eq!(emb.dim(), 3);
        assert_eq!(emb.len(), 2);
        assert_eq!(emb.get("the"), Some(&[0.25, -0.5, 1.0][..]));
        assert_eq!(emb.get("missing"), None);

        // iteration is sorted by key
        let keys: Vec<&str> = emb.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["of", "the"]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let input = "the 0.25 -0.5 1.0\nof 0.125 0.75\n";
        assert!(Embedding::from_reader(Cursor::new(input)).is_err());
    }

    #[test]
    fn test_bad_value() {
        let input = "the 0.25 x 1.0\n";
        assert!(Embedding::from_reader(Cursor::new(input)).is_err());
    }

    #[test]
    fn test_empty_source() {
        assert!(Embedding::from_reader(Cursor::new("")).is_err());
        assert!(Embedding::from_reader(Cursor::new("the\n")).is_err());
    }
}

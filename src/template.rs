use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Template class, selected by the first character of a template line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// `U` templates expand to one feature function per output label.
    Unigram,
    /// `B` templates expand to one feature function per label pair.
    Bigram,
    /// `E` templates reserve embedding-backed feature slots.
    Embedding,
}

impl TemplateKind {
    /// Classify a raw template line by its first character.
    pub fn of(line: &str) -> Option<TemplateKind> {
        match line.as_bytes().first() {
            Some(b'U') => Some(TemplateKind::Unigram),
            Some(b'B') => Some(TemplateKind::Bigram),
            Some(b'E') => Some(TemplateKind::Embedding),
            _ => None,
        }
    }
}

/// Parsed feature templates, grouped by class with file order preserved.
///
/// The template strings themselves are opaque here; they are persisted with
/// the model and re-expanded by the tagging side.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    unigrams: Vec<String>,
    bigrams: Vec<String>,
    embeddings: Vec<String>,
}

impl Templates {
    pub fn from_path(path: &Path) -> io::Result<Templates> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse template lines. Blank lines, `#` comments and lines starting
    /// with a space are skipped; a line with an unknown template class is
    /// logged and skipped, loading continues.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Templates> {
        let mut templates = Templates::default();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with(' ') || line.starts_with('#') {
                continue;
            }
            match TemplateKind::of(&line) {
                Some(TemplateKind::Unigram) => templates.unigrams.push(line.trim().to_string()),
                Some(TemplateKind::Bigram) => templates.bigrams.push(line.trim().to_string()),
                Some(TemplateKind::Embedding) => {
                    templates.embeddings.push(line.trim().to_string())
                }
                None => log::warn!("unknown template type: {}", line),
            }
        }
        Ok(templates)
    }

    pub(crate) fn from_lists(
        unigrams: Vec<String>,
        bigrams: Vec<String>,
        embeddings: Vec<String>,
    ) -> Templates {
        Templates {
            unigrams,
            bigrams,
            embeddings,
        }
    }

    pub fn unigrams(&self) -> &[String] {
        &self.unigrams
    }

    pub fn bigrams(&self) -> &[String] {
        &self.bigrams
    }

    pub fn embeddings(&self) -> &[String] {
        &self.embeddings
    }

    /// Total number of templates across all classes.
    pub fn len(&self) -> usize {
        self.unigrams.len() + self.bigrams.len() + self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_template_classification() {
        assert_eq!(TemplateKind::of("U01:%x[0,0]"), Some(TemplateKind::Unigram));
        assert_eq!(TemplateKind::of("B"), Some(TemplateKind::Bigram));
        assert_eq!(TemplateKind::of("E00:%x[0,0]"), Some(TemplateKind::Embedding));
        assert_eq!(TemplateKind::of("X99"), None);
        assert_eq!(TemplateKind::of(""), None);
    }

    #[test]
    fn test_parse_templates() {
        let input = "\
# comment line
U00:%x[-1,0]
U01:%x[0,0]

B
E00:%x[0,0]
X99:%x[0,0]
 U02:%x[1,0]
";
        let templates = Templates::from_reader(Cursor::new(input)).unwrap();
        assert_eq!(templates.unigrams(), &["U00:%x[-1,0]", "U01:%x[0,0]"]);
        assert_eq!(templates.bigrams(), &["B"]);
        assert_eq!(templates.embeddings(), &["E00:%x[0,0]"]);
        // comment, blank, unknown-class and space-prefixed lines are skipped
        assert_eq!(templates.len(), 4);
    }

    #[test]
    fn test_empty_input() {
        let templates = Templates::from_reader(Cursor::new("")).unwrap();
        assert!(templates.is_empty());
    }
}

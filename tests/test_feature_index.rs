use std::io::Write;

use crfpp::FeatureIndex;
use tempfile::NamedTempFile;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const TEMPLATES: &str = "\
# unigram features
U00:%x[-1,0]
U01:%x[0,0]
B
";

const TRAIN: &str = "\
John NNP B-PER
lives VBZ O
in IN O
Paris NNP B-LOC
";

#[test]
fn test_open_collects_sorted_labels() {
    let template = write_temp(TEMPLATES);
    let train = write_temp(TRAIN);
    let index = FeatureIndex::open(template.path(), train.path()).unwrap();

    assert_eq!(index.labels(), &["B-LOC", "B-PER", "O"]);
    assert_eq!(index.num_labels(), 3);
    assert_eq!(index.xsize(), 2);
    assert_eq!(index.templates().unigrams().len(), 2);
    assert_eq!(index.templates().bigrams().len(), 1);
    assert_eq!(index.max_id(), 0);
    assert!(!index.supports_embedding());
}

#[test]
fn test_inconsistent_columns_fail() {
    let template = write_temp(TEMPLATES);
    let train = write_temp("John NNP B-PER\nlives O\n");
    let err = FeatureIndex::open(template.path(), train.path()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(err.to_string().contains("inconsistent column size"));
}

#[test]
fn test_empty_train_file_fails() {
    let template = write_temp(TEMPLATES);
    let train = write_temp("\n\n");
    assert!(FeatureIndex::open(template.path(), train.path()).is_err());
}

#[test]
fn test_missing_files_fail() {
    let template = write_temp(TEMPLATES);
    let missing = std::path::Path::new("no/such/file");
    assert!(FeatureIndex::open(missing, template.path()).is_err());
    assert!(FeatureIndex::open(template.path(), missing).is_err());
}

#[test]
fn test_id_allocation() {
    let template = write_temp(TEMPLATES);
    let train = write_temp(TRAIN);
    let mut index = FeatureIndex::open(template.path(), train.path()).unwrap();

    // 3 labels: unigram keys advance by 3, bigram keys by 9
    assert_eq!(index.get_id("U01:John"), 0);
    assert_eq!(index.max_id(), 3);
    assert_eq!(index.get_id("B"), 3);
    assert_eq!(index.max_id(), 12);

    // repeated requests return the stored base id without advancing
    assert_eq!(index.get_id("U01:John"), 0);
    assert_eq!(index.max_id(), 12);
    assert_eq!(index.dict().get("U01:John").unwrap().occurrences, 2);
}

#[test]
fn test_shrink_scenario() {
    let template = write_temp("U01:%x[0,0]\n");
    let train = write_temp("John B-PER\nruns O\n");
    let mut index = FeatureIndex::open(template.path(), train.path()).unwrap();
    assert_eq!(index.labels(), &["B-PER", "O"]);

    let john = index.get_id("U01:John");
    index.get_id("U01:John");
    index.get_id("U01:John");
    let paris = index.get_id("U01:Paris");
    assert_eq!((john, paris), (0, 2));

    let mut caches = vec![vec![vec![john as i32, paris as i32, -1]]];
    index.shrink(2, &mut caches);

    assert_eq!(index.max_id(), 2);
    assert_eq!(index.dict().get("U01:John").unwrap().base_id, 0);
    assert!(index.dict().get("U01:Paris").is_none());
    assert_eq!(caches[0][0], vec![0, -1]);
}

#[test]
fn test_shrink_is_noop_for_min_freq_one() {
    let template = write_temp("U01:%x[0,0]\n");
    let train = write_temp("John B-PER\nruns O\n");
    let mut index = FeatureIndex::open(template.path(), train.path()).unwrap();
    index.get_id("U01:John");

    let mut caches = vec![vec![vec![0, -1]]];
    index.shrink(1, &mut caches);
    assert_eq!(index.max_id(), 2);
    assert_eq!(caches[0][0], vec![0, -1]);
}

#[test]
fn test_embedding_allocation() {
    let template = write_temp("U01:%x[0,0]\nE00:%x[0,0]\n");
    let train = write_temp("John B-PER\nruns O\n");
    let embedding = write_temp("john 0.5 0.25 -1.0\nruns 0.1 0.2 0.3\n");
    let mut index =
        FeatureIndex::open_with_embedding(template.path(), train.path(), embedding.path())
            .unwrap();

    assert!(index.supports_embedding());
    assert_eq!(index.embedding_dim(), 3);

    // 2 labels, dimension 3: each new key reserves 6 slots
    assert_eq!(index.get_embedding_id("E00:john").unwrap(), 0);
    assert_eq!(index.max_embedding_id(), 6);
    assert_eq!(index.get_embedding_id("E00:runs").unwrap(), 6);
    assert_eq!(index.max_embedding_id(), 12);
    assert_eq!(index.get_embedding_id("E00:john").unwrap(), 0);
    assert_eq!(index.max_embedding_id(), 12);
}

#[test]
fn test_embedding_requires_template() {
    let template = write_temp("U01:%x[0,0]\n");
    let train = write_temp("John B-PER\nruns O\n");
    let embedding = write_temp("john 0.5 0.25\n");
    let mut index =
        FeatureIndex::open_with_embedding(template.path(), train.path(), embedding.path())
            .unwrap();

    // no embedding template in the file, so support stays off
    assert!(!index.supports_embedding());
    assert!(index.get_embedding_id("E00:john").is_err());
}

#[test]
fn test_init_alpha_covers_id_space() {
    let template = write_temp(TEMPLATES);
    let train = write_temp(TRAIN);
    let mut index = FeatureIndex::open(template.path(), train.path()).unwrap();
    index.get_id("U01:John");
    index.get_id("B");
    index.init_alpha();
    assert_eq!(index.weights().len(), index.max_id() as usize);
    assert!(index.weights().iter().all(|&w| w == 0.0));
}

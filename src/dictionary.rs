use std::collections::HashMap;

/// First byte of a unigram feature key.
const UNIGRAM_MARKER: u8 = b'U';

/// A feature dictionary entry: the first ID of the key's reserved range and
/// the number of times the key was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    pub base_id: u32,
    pub occurrences: u32,
}

/// Mapping from template-expanded feature keys to contiguous ID ranges.
///
/// Every key owns a range of weight-vector indices starting at its base ID:
/// `|labels|` indices for a unigram key, `|labels|^2` for anything else.
/// `max_id` is the start of the next unallocated range and always equals the
/// sum of the widths of all allocated keys. The label count is fixed at
/// construction; the vocabulary must be frozen before the first allocation.
#[derive(Debug, Clone)]
pub struct FeatureDict {
    entries: HashMap<String, DictEntry>,
    max_id: u32,
    num_labels: u32,
}

impl FeatureDict {
    pub fn new(num_labels: u32) -> Self {
        Self {
            entries: HashMap::new(),
            max_id: 0,
            num_labels,
        }
    }

    /// ID-range width of a key: `|labels|` for unigram keys, `|labels|^2`
    /// otherwise.
    pub fn width_of(&self, key: &str) -> u32 {
        if key.as_bytes().first() == Some(&UNIGRAM_MARKER) {
            self.num_labels
        } else {
            self.num_labels * self.num_labels
        }
    }

    /// Get or allocate the base ID for a key.
    ///
    /// The first request reserves the next free range and returns its start;
    /// every later request bumps the occurrence count and returns the same
    /// base ID. Occurrences count requests for the key itself, independent of
    /// any co-occurring label.
    pub fn get_id(&mut self, key: &str) -> u32 {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.occurrences += 1;
            return entry.base_id;
        }
        let base_id = self.max_id;
        self.max_id += self.width_of(key);
        self.entries.insert(
            key.to_string(),
            DictEntry {
                base_id,
                occurrences: 1,
            },
        );
        base_id
    }

    pub fn get(&self, key: &str) -> Option<&DictEntry> {
        self.entries.get(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start of the next unallocated ID range; also the length of the weight
    /// vector covering all allocated ranges.
    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    pub fn num_labels(&self) -> u32 {
        self.num_labels
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DictEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// `(key, base_id)` pairs sorted by key, the order used for persistence
    /// and for shrink renumbering.
    pub fn sorted_entries(&self) -> Vec<(&str, u32)> {
        let mut entries: Vec<(&str, u32)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.as_str(), e.base_id))
            .collect();
        entries.sort();
        entries
    }

    /// Drop every key requested fewer than `min_freq` times and renumber the
    /// survivors contiguously from 0, iterating keys in lexicographic order
    /// so the renumbering is reproducible.
    ///
    /// Returns the old-to-new ID map covering every surviving offset: for a
    /// kept key of width `w`, `old_base + k` maps to `new_base + k` for all
    /// `k < w`. IDs of dropped keys are absent from the map.
    pub fn shrink(&mut self, min_freq: u32) -> HashMap<u32, u32> {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        let mut old2new = HashMap::new();
        let mut new_entries = HashMap::new();
        let mut new_max_id = 0u32;
        for key in keys {
            let entry = self.entries[key];
            if entry.occurrences < min_freq {
                continue;
            }
            let width = self.width_of(key);
            for k in 0..width {
                old2new.insert(entry.base_id + k, new_max_id + k);
            }
            new_entries.insert(
                key.clone(),
                DictEntry {
                    base_id: new_max_id,
                    occurrences: entry.occurrences,
                },
            );
            new_max_id += width;
        }
        self.entries = new_entries;
        self.max_id = new_max_id;
        old2new
    }

    /// Insert a recovered entry with its persisted base ID and an occurrence
    /// count of 1. Used when rebuilding a dictionary from a saved model.
    pub(crate) fn insert_entry(&mut self, key: String, base_id: u32) {
        self.entries.insert(
            key,
            DictEntry {
                base_id,
                occurrences: 1,
            },
        );
    }

    pub(crate) fn set_max_id(&mut self, max_id: u32) {
        self.max_id = max_id;
    }
}

/// Rewrite one feature-cache row through an old-to-new ID map.
///
/// IDs absent from the map (dropped keys and the old sentinel) are removed,
/// survivors keep their order, and the row is re-terminated with `-1`.
pub fn remap_feature_ids(row: &[i32], old2new: &HashMap<u32, u32>) -> Vec<i32> {
    let mut out = Vec::with_capacity(row.len());
    for &id in row {
        if id < 0 {
            continue;
        }
        if let Some(&new_id) = old2new.get(&(id as u32)) {
            out.push(new_id as i32);
        }
    }
    out.push(-1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_widths() {
        let mut dict = FeatureDict::new(3);
        assert_eq!(dict.width_of("U01:foo"), 3);
        assert_eq!(dict.width_of("B00:foo"), 9);

        assert_eq!(dict.get_id("U01:foo"), 0);
        assert_eq!(dict.max_id(), 3);
        assert_eq!(dict.get_id("B00:bar"), 3);
        assert_eq!(dict.max_id(), 12);
    }

    #[test]
    fn test_allocation_monotonicity() {
        let mut dict = FeatureDict::new(2);
        let before = dict.max_id();
        dict.get_id("U01:a");
        assert_eq!(dict.max_id(), before + 2);

        // an existing key leaves max_id unchanged
        let before = dict.max_id();
        dict.get_id("U01:a");
        assert_eq!(dict.max_id(), before);
    }

    #[test]
    fn test_occurrence_counting() {
        let mut dict = FeatureDict::new(2);
        let id = dict.get_id("U01:a");
        for _ in 0..4 {
            assert_eq!(dict.get_id("U01:a"), id);
        }
        assert_eq!(dict.get("U01:a").unwrap().occurrences, 5);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_shrink_renumbers_in_key_order() {
        let mut dict = FeatureDict::new(2);
        // allocation order differs from key order on purpose
        dict.get_id("U02:z");
        dict.get_id("U01:a");
        dict.get_id("B00:m");
        dict.get_id("U02:z");
        dict.get_id("U01:a");
        dict.get_id("B00:m");

        let old2new = dict.shrink(2);
        // survivors renumbered in sorted-key order: B00:m, U01:a, U02:z
        assert_eq!(dict.get("B00:m").unwrap().base_id, 0);
        assert_eq!(dict.get("U01:a").unwrap().base_id, 4);
        assert_eq!(dict.get("U02:z").unwrap().base_id, 6);
        assert_eq!(dict.max_id(), 8);
        // widths survive the renumbering
        assert_eq!(old2new.len(), 8);
    }

    #[test]
    fn test_shrink_drops_rare_keys_and_maps_offsets() {
        let mut dict = FeatureDict::new(2);
        let rare = dict.get_id("B00:x");
        let kept = dict.get_id("U01:y");
        dict.get_id("U01:y");

        let old2new = dict.shrink(2);
        assert!(dict.get("B00:x").is_none());
        assert_eq!(dict.get("U01:y").unwrap().base_id, 0);
        assert_eq!(dict.max_id(), 2);

        // every offset of the kept range maps isomorphically
        assert_eq!(old2new.get(&kept), Some(&0));
        assert_eq!(old2new.get(&(kept + 1)), Some(&1));
        // dropped ranges are absent
        for k in 0..4 {
            assert!(old2new.get(&(rare + k)).is_none());
        }
    }

    #[test]
    fn test_remap_feature_ids() {
        let mut dict = FeatureDict::new(2);
        dict.get_id("B00:x");
        let kept = dict.get_id("U01:y");
        dict.get_id("U01:y");
        let old2new = dict.shrink(2);

        let row = vec![0, kept as i32, kept as i32 + 1, -1];
        assert_eq!(remap_feature_ids(&row, &old2new), vec![0, 1, -1]);

        // a row whose every ID was dropped keeps only the sentinel
        let row = vec![0, 1, -1];
        assert_eq!(remap_feature_ids(&row, &old2new), vec![-1]);
    }
}

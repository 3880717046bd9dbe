use std::collections::HashMap;

use crate::formats::SpineEntry;

/// Linear reading order of the archive with dense 0-based positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpineIndex {
    entries: Vec<SpineEntry>,
    by_reference: HashMap<String, usize>,
}

impl SpineIndex {
    /// Builds the index from `(identifier, content_reference)` pairs in
    /// reading order. A reference listed twice keeps its first position.
    pub fn new<I, S, T>(items: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut entries = Vec::new();
        let mut by_reference = HashMap::new();

        for (position, (identifier, content_reference)) in items.into_iter().enumerate() {
            let content_reference = content_reference.into();
            by_reference
                .entry(content_reference.clone())
                .or_insert(position);
            entries.push(SpineEntry {
                identifier: identifier.into(),
                content_reference,
                position,
            });
        }

        Self {
            entries,
            by_reference,
        }
    }

    pub fn entries(&self) -> &[SpineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&SpineEntry> {
        self.entries.get(position)
    }

    pub fn position_of(&self, content_reference: &str) -> Option<usize> {
        self.by_reference.get(content_reference).copied()
    }

    /// First position whose content reference names the same file as
    /// `target`, ignoring any `#fragment` on either side.
    pub fn position_of_file(&self, target: &str) -> Option<usize> {
        let file = strip_fragment(target);
        if file.is_empty() {
            return None;
        }
        if let Some(position) = self.position_of(file) {
            return Some(position);
        }
        self.entries
            .iter()
            .find(|entry| strip_fragment(&entry.content_reference) == file)
            .map(|entry| entry.position)
    }
}

pub fn strip_fragment(reference: &str) -> &str {
    match reference.split_once('#') {
        Some((file, _)) => file,
        None => reference,
    }
}

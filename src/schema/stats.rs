//! Per-path value statistics collected in a single pass over XML trees.
//!
//! ```text
//! <quest>                      RootStats "quest"
//!   <quest id="1">               records: PathNode (attributes: id)
//!     <name>Rats</name>            children[0] "name"  max_text_len 4
//!     <reward>                     children[1] "reward"
//!       <data>a</data>               children[0] "data" max_repeat 2
//!       <data>b</data>
//!     </reward>
//!   </quest>
//! </quest>
//! ```

use std::collections::BTreeMap;

use crate::xml::XmlElement;

/// Statistics for one attribute name under one element path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeStats {
    pub occurrences: u64,
    /// Longest value, in characters.
    pub max_len: usize,
}

/// Statistics for one element path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathNode {
    pub name: String,
    /// Number of element instances seen at this path.
    pub occurrences: u64,
    /// Largest number of same-named siblings under one parent instance.
    pub max_repeat: usize,
    /// Longest text, in characters.
    pub max_text_len: usize,
    pub has_text: bool,
    /// Seen at least once with child elements.
    pub has_children: bool,
    /// Attributes in first-seen order.
    pub attributes: Vec<(String, AttributeStats)>,
    /// Child paths in merged document order.
    pub children: Vec<PathNode>,
}

impl PathNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&PathNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeStats> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    /// Repeats under its parent somewhere in the corpus.
    pub fn is_repeated(&self) -> bool {
        self.max_repeat > 1
    }

    /// Fold one element instance (and its subtree) into the statistics.
    pub fn observe(&mut self, element: &XmlElement) {
        self.occurrences += 1;

        if let Some(text) = element.text.as_deref() {
            if !text.is_empty() {
                self.has_text = true;
                self.max_text_len = self.max_text_len.max(text.chars().count());
            }
        }
        if !element.children.is_empty() {
            self.has_children = true;
        }

        for (key, value) in &element.attributes {
            let len = value.chars().count();
            let stats = match self.attributes.iter().position(|(n, _)| n == key) {
                Some(idx) => &mut self.attributes[idx].1,
                None => {
                    self.attributes.push((key.clone(), AttributeStats::default()));
                    let last = self.attributes.len() - 1;
                    &mut self.attributes[last].1
                }
            };
            stats.occurrences += 1;
            stats.max_len = stats.max_len.max(len);
        }

        // Distinct child names in first-appearance order, with their counts.
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for child in &element.children {
            match counts.iter_mut().find(|(n, _)| *n == child.name) {
                Some((_, count)) => *count += 1,
                None => counts.push((child.name.as_str(), 1)),
            }
        }

        let mut previous: Option<usize> = None;
        for (name, count) in counts {
            let idx = match self.children.iter().position(|c| c.name == name) {
                Some(idx) => idx,
                None => {
                    let at = previous.map_or(0, |p| p + 1);
                    self.children.insert(at, PathNode::new(name));
                    at
                }
            };
            let node = &mut self.children[idx];
            node.max_repeat = node.max_repeat.max(count);
            for child in element.children.iter().filter(|c| c.name == name) {
                node.observe(child);
            }
            previous = Some(idx);
        }
    }
}

/// Statistics for every document sharing one document element name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootStats {
    pub documents: u64,
    /// All record elements (children of the document element), merged.
    pub records: PathNode,
    /// Record tag counts, in first-seen order.
    pub record_tags: Vec<(String, u64)>,
}

impl RootStats {
    /// The most frequent record tag; ties go to the first seen.
    pub fn primary_tag(&self) -> Option<&str> {
        let mut best: Option<&(String, u64)> = None;
        for entry in &self.record_tags {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(tag, _)| tag.as_str())
    }
}

/// Walks XML documents once, collecting per-path lengths and repetition counts.
#[derive(Debug, Clone, Default)]
pub struct ValueStatsCollector {
    roots: BTreeMap<String, RootStats>,
}

impl ValueStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every child of the document element is a record.
    pub fn observe_document(&mut self, document: &XmlElement) {
        let stats = self
            .roots
            .entry(document.name.clone())
            .or_insert_with(|| RootStats {
                records: PathNode::new(document.name.clone()),
                ..RootStats::default()
            });
        stats.documents += 1;

        for record in &document.children {
            match stats.record_tags.iter_mut().find(|(t, _)| *t == record.name) {
                Some((_, count)) => *count += 1,
                None => stats.record_tags.push((record.name.clone(), 1)),
            }
            stats.records.observe(record);
        }
    }

    pub fn root(&self, name: &str) -> Option<&RootStats> {
        self.roots.get(name)
    }

    pub fn roots(&self) -> impl Iterator<Item = (&str, &RootStats)> {
        self.roots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn test_lengths_and_repeats() {
        let doc = parse_document(
            r#"<quest>
                <quest id="10"><name>Rats</name><reward><data>a</data><data>bb</data></reward></quest>
                <quest id="2"><name>Bats and more</name></quest>
            </quest>"#,
        )
        .unwrap();

        let mut collector = ValueStatsCollector::new();
        collector.observe_document(&doc);

        let root = collector.root("quest").unwrap();
        assert_eq!(root.documents, 1);
        assert_eq!(root.records.occurrences, 2);
        assert_eq!(root.primary_tag(), Some("quest"));
        assert_eq!(root.records.attribute("id").unwrap().max_len, 2);

        let name = root.records.child("name").unwrap();
        assert_eq!(name.max_text_len, 13);
        assert_eq!(name.occurrences, 2);
        assert!(!name.is_repeated());

        let data = root.records.child("reward").unwrap().child("data").unwrap();
        assert_eq!(data.max_repeat, 2);
        assert_eq!(data.max_text_len, 2);
    }

    #[test]
    fn test_child_order_merges_across_records() {
        let doc = parse_document(
            "<r><x><a/><c/></x><x><a/><b/><c/></x><x><d/><a/></x></r>",
        )
        .unwrap();
        let mut collector = ValueStatsCollector::new();
        collector.observe_document(&doc);

        let names: Vec<&str> = collector
            .root("r")
            .unwrap()
            .records
            .children
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_text_length_counts_chars() {
        let doc = parse_document("<r><x><n>héllo</n></x></r>").unwrap();
        let mut collector = ValueStatsCollector::new();
        collector.observe_document(&doc);
        let n = collector.root("r").unwrap().records.child("n").unwrap();
        assert_eq!(n.max_text_len, 5);
    }

    #[test]
    fn test_heterogeneous_record_tags() {
        let doc = parse_document("<items><weapon/><armor/><weapon/></items>").unwrap();
        let mut collector = ValueStatsCollector::new();
        collector.observe_document(&doc);
        let root = collector.root("items").unwrap();
        assert_eq!(root.record_tags, vec![("weapon".into(), 2), ("armor".into(), 1)]);
        assert_eq!(root.primary_tag(), Some("weapon"));
    }
}

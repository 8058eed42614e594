use serde::{Deserialize, Serialize};

/// A review parsed out of a raw dataset block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRecord {
    pub name: String,
    pub category: String,
    pub body_text: String,
}

impl ReviewRecord {
    /// Records without a body carry nothing worth indexing.
    pub fn is_indexable(&self) -> bool {
        !self.body_text.trim().is_empty()
    }

    /// Name, category and body joined by single spaces, skipping empty
    /// fields.
    pub fn combined_text(&self) -> String {
        [&self.name, &self.category, &self.body_text]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Field markers that introduce each value in a raw block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordMarkers {
    pub name: String,
    pub category: String,
    pub text: String,
}

impl Default for RecordMarkers {
    fn default() -> Self {
        Self {
            name: "name=".to_string(),
            category: "category=".to_string(),
            text: "text=".to_string(),
        }
    }
}

/// Splits dataset blobs into review blocks and parses them.
///
/// # Examples
///
/// ```
/// use simple_rag::record::ReviewRecordParser;
///
/// let parser = ReviewRecordParser::default();
/// let record = parser.parse("name=A category=B text=C").unwrap();
/// assert_eq!(record.name, "A");
/// assert_eq!(record.category, "B");
/// assert_eq!(record.body_text, "C");
/// assert!(parser.parse("").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReviewRecordParser {
    markers: RecordMarkers,
}

impl ReviewRecordParser {
    pub fn new(markers: RecordMarkers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &RecordMarkers {
        &self.markers
    }

    /// Split a multi-record blob into per-record blocks.
    ///
    /// Every block starts at a `name` marker; text before the first marker
    /// is dropped.
    pub fn split<'a>(&self, blob: &'a str) -> Vec<&'a str> {
        let starts = marker_positions(blob, &self.markers.name);
        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(blob.len());
                &blob[start..end]
            })
            .collect()
    }

    /// Parse a single raw block.
    ///
    /// Each value runs until the next marker or the end of the block.
    /// Returns `None` for empty or whitespace-only input; missing fields
    /// parse as empty strings.
    pub fn parse(&self, raw: &str) -> Option<ReviewRecord> {
        if raw.trim().is_empty() {
            return None;
        }

        let markers = [
            self.markers.name.as_str(),
            self.markers.category.as_str(),
            self.markers.text.as_str(),
        ];

        // (marker slot, position of the marker) for markers present in the
        // block, ordered by position.
        let mut found: Vec<(usize, usize)> = markers
            .iter()
            .enumerate()
            .filter_map(|(slot, marker)| {
                marker_positions(raw, marker)
                    .first()
                    .map(|&pos| (slot, pos))
            })
            .collect();
        found.sort_by_key(|&(_, pos)| pos);

        let mut values = [String::new(), String::new(), String::new()];
        for (i, &(slot, pos)) in found.iter().enumerate() {
            let value_start = pos + markers[slot].len();
            let value_end = found.get(i + 1).map_or(raw.len(), |&(_, p)| p);
            if value_start <= value_end {
                values[slot] = raw[value_start..value_end].trim().to_string();
            }
        }

        let [name, category, body_text] = values;
        Some(ReviewRecord {
            name,
            category,
            body_text,
        })
    }
}

/// Byte offsets where `marker` starts a field: at the start of the text or
/// right after whitespace.
fn marker_positions(text: &str, marker: &str) -> Vec<usize> {
    if marker.is_empty() {
        return Vec::new();
    }
    text.match_indices(marker)
        .map(|(pos, _)| pos)
        .filter(|&pos| {
            text[..pos]
                .chars()
                .next_back()
                .is_none_or(char::is_whitespace)
        })
        .collect()
}

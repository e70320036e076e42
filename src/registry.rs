//! Template loader & dispatcher: compiles templates, indexes them by
//! header-start byte sequence with longest-match preference, and
//! locates the next candidate message start in a buffer that didn't
//! match at the current offset.

use std::collections::HashMap;

use crate::bitio::BitReader;
use crate::error::{Error, Result};
use crate::template::Template;

/// Boyer-Moore-Horspool bad-character table, pre-processed once per
/// distinct pattern and cached for reuse across scans.
struct BmhTable {
    shift: [usize; 256],
    pattern_len: usize,
}

impl BmhTable {
    fn build(pattern: &[u8]) -> Self {
        let m = pattern.len();
        let mut shift = [m.max(1); 256];
        for (i, &b) in pattern.iter().enumerate().take(m.saturating_sub(1)) {
            shift[b as usize] = m - 1 - i;
        }
        Self { shift, pattern_len: m }
    }

    /// Earliest occurrence of `pattern` in `haystack` at index >= `from`.
    fn search(&self, haystack: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
        let m = self.pattern_len;
        if m == 0 {
            return Some(from.min(haystack.len()));
        }
        let n = haystack.len();
        let mut i = from;
        while i + m <= n {
            let mut j = m - 1;
            loop {
                if haystack[i + j] != pattern[j] {
                    break;
                }
                if j == 0 {
                    return Some(i);
                }
                j -= 1;
            }
            i += self.shift[haystack[i + m - 1] as usize];
        }
        None
    }
}

struct HeaderEntry {
    bytes: Vec<u8>,
    template_idx: usize,
    table: BmhTable,
}

/// Immutable, sealed registry of templates. Templates are stored by
/// stable index so that choice alternatives can refer to each other
/// (including cyclically) without borrow-checker gymnastics.
pub struct TemplateRegistry {
    templates: Vec<Template>,
    by_type_name: HashMap<String, usize>,
    /// Header-start entries ordered longest-first, then lexicographic.
    header_entries: Vec<HeaderEntry>,
}

impl TemplateRegistry {
    pub fn build(templates: Vec<Template>) -> Result<Self> {
        let mut by_type_name = HashMap::new();
        let mut header_entries: Vec<HeaderEntry> = Vec::new();
        let mut seen_keys: HashMap<Vec<u8>, usize> = HashMap::new();

        for (idx, template) in templates.iter().enumerate() {
            by_type_name.insert(template.type_name().clone(), idx);
            if let Some(header) = template.header() {
                for start in &header.starts {
                    if let Some(&other) = seen_keys.get(start) {
                        if other != idx {
                            return Err(Error::DuplicateKey(hex_string(start)));
                        }
                    }
                    seen_keys.insert(start.clone(), idx);
                    header_entries.push(HeaderEntry {
                        table: BmhTable::build(start),
                        bytes: start.clone(),
                        template_idx: idx,
                    });
                }
            }
        }

        header_entries.sort_by(|a, b| b.bytes.len().cmp(&a.bytes.len()).then_with(|| a.bytes.cmp(&b.bytes)));

        tracing::debug!(templates = templates.len(), headers = header_entries.len(), "template registry sealed");

        Ok(Self {
            templates,
            by_type_name,
            header_entries,
        })
    }

    pub fn template(&self, idx: usize) -> &Template {
        &self.templates[idx]
    }

    pub fn index_of(&self, type_name: &str) -> Option<usize> {
        self.by_type_name.get(type_name).copied()
    }

    pub fn by_type_name(&self, type_name: &str) -> Option<&Template> {
        self.index_of(type_name).map(|idx| self.template(idx))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// At the reader's current byte offset, try header-start keys
    /// longest-first; the first one whose bytes match wins.
    pub fn match_template(&self, reader: &BitReader) -> Result<&Template> {
        let remaining = reader.remaining_bytes();
        for entry in &self.header_entries {
            if remaining.len() >= entry.bytes.len() && &remaining[..entry.bytes.len()] == entry.bytes.as_slice() {
                return Ok(&self.templates[entry.template_idx]);
            }
        }
        Err(Error::NoMatch)
    }

    /// Earliest byte index >= `from_byte` + 1 at which any header-start
    /// occurs, searched with a Boyer-Moore-Horspool matcher per pattern
    /// using its pre-built table; `None` if no header ever reappears.
    pub fn find_next_message_index(&self, haystack: &[u8], from_byte: usize) -> Option<usize> {
        let start = from_byte + 1;
        self.header_entries
            .iter()
            .filter_map(|entry| entry.table.search(haystack, &entry.bytes, start))
            .min()
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::Charset;
    use crate::template::builder::integer_be;
    use crate::template::TemplateBuilder;
    use crate::value::DataType;

    fn dummy_template(name: &str, starts: Vec<Vec<u8>>) -> Template {
        TemplateBuilder::new(name)
            .header(starts, Charset::Ascii, None)
            .field("a", DataType::Integer, integer_be("8"))
            .add()
            .build()
            .unwrap()
    }

    #[test]
    fn longest_header_wins() {
        let t1 = dummy_template("short", vec![vec![0xAA]]);
        let t2 = dummy_template("long", vec![vec![0xAA, 0xBB]]);
        let reg = TemplateRegistry::build(vec![t1, t2]).unwrap();
        let buf = [0xAA, 0xBB, 0x00];
        let reader = BitReader::new(&buf);
        let matched = reg.match_template(&reader).unwrap();
        assert_eq!(matched.type_name(), "long");
    }

    #[test]
    fn duplicate_header_start_is_rejected() {
        let t1 = dummy_template("a", vec![vec![0xAA]]);
        let t2 = dummy_template("b", vec![vec![0xAA]]);
        assert!(TemplateRegistry::build(vec![t1, t2]).is_err());
    }

    #[test]
    fn no_match_returns_minus_one_equivalent() {
        let t1 = dummy_template("a", vec![vec![0xAA]]);
        let reg = TemplateRegistry::build(vec![t1]).unwrap();
        let buf = [0x01, 0x02, 0x03];
        assert_eq!(reg.find_next_message_index(&buf, 0), None);
    }

    #[test]
    fn finds_next_occurrence_after_offset() {
        let t1 = dummy_template("a", vec![b"+ACK".to_vec()]);
        let reg = TemplateRegistry::build(vec![t1]).unwrap();
        let mut buf = b"+ACKxxxx".to_vec();
        buf.extend_from_slice(b"+ACKyyyy");
        let idx = reg.find_next_message_index(&buf, 0).unwrap();
        assert_eq!(idx, 8);
    }

    #[test]
    fn by_type_name_resolves_registered_templates() {
        let t1 = dummy_template("a", vec![vec![0xAA]]);
        let reg = TemplateRegistry::build(vec![t1]).unwrap();
        assert!(reg.by_type_name("a").is_some());
        assert!(reg.by_type_name("missing").is_none());
    }
}

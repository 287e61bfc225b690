//! Two-column delimited text for cluster assignments.
//!
//! Uploads are parsed leniently: a malformed line is skipped and counted,
//! never fatal to the whole file.

use crate::model::ClusterItem;
use std::path::Path;
use tracing::debug;

/// Name of the id column; also used to recognize a header line.
pub const ID_COLUMN: &str = "test_case_id";

/// Name of the cluster column in exported files.
pub const CLUSTER_COLUMN: &str = "cluster_id";

/// Field separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Comma,
    Tab,
    Semicolon,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
            Delimiter::Semicolon => ';',
        }
    }

    /// Pick a delimiter from the file extension (`.tsv`/`.tab` mean tab).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("tsv") | Some("tab") => Delimiter::Tab,
            _ => Delimiter::Comma,
        }
    }

    /// Parse a CLI name (`comma`, `tab`, `semicolon` or the character itself).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "comma" | "," => Some(Delimiter::Comma),
            "tab" | "\\t" | "\t" => Some(Delimiter::Tab),
            "semicolon" | ";" => Some(Delimiter::Semicolon),
            _ => None,
        }
    }
}

/// Result of parsing an upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUpload {
    pub items: Vec<ClusterItem>,
    /// Non-blank data records that did not yield exactly two non-empty fields.
    pub skipped: usize,
    pub had_header: bool,
}

/// Parse delimited `id, cluster` records.
///
/// The first non-blank record is a header if it mentions [`ID_COLUMN`]
/// (case-insensitive); otherwise it is data. Unquoted fields are trimmed.
/// A field wrapped in double quotes is taken verbatim, with `""` read as a
/// literal quote, and may span lines.
pub fn parse_cluster_upload(text: &str, delimiter: Delimiter) -> ParsedUpload {
    let mut parsed = ParsedUpload::default();
    let mut records = split_records(text, delimiter.as_char()).into_iter().peekable();

    if let Some(first) = records.peek() {
        if first.raw.to_ascii_lowercase().contains(ID_COLUMN) {
            parsed.had_header = true;
            records.next();
        }
    }

    for record in records {
        match record.fields.and_then(into_item) {
            Some(item) => parsed.items.push(item),
            None => {
                debug!(line = record.line, "skipping malformed cluster map line");
                parsed.skipped += 1;
            }
        }
    }

    parsed
}

/// One logical record and the 1-based line it starts on.
struct Record {
    line: usize,
    raw: String,
    /// `None` when the quoting is broken.
    fields: Option<Vec<String>>,
}

enum Fields {
    Complete(Vec<String>),
    Malformed,
    /// A quoted field is still open at the end of the input.
    Unterminated,
}

fn split_records(text: &str, delimiter: char) -> Vec<Record> {
    let mut records = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, line) in text.lines().enumerate() {
        let (start, raw) = match pending.take() {
            Some((start, mut raw)) => {
                raw.push('\n');
                raw.push_str(line);
                (start, raw)
            }
            None if line.trim().is_empty() => continue,
            None => (idx + 1, line.to_string()),
        };

        match split_fields(&raw, delimiter) {
            Fields::Unterminated => pending = Some((start, raw)),
            Fields::Complete(fields) => records.push(Record {
                line: start,
                raw,
                fields: Some(fields),
            }),
            Fields::Malformed => records.push(Record {
                line: start,
                raw,
                fields: None,
            }),
        }
    }

    if let Some((line, raw)) = pending {
        records.push(Record { line, raw, fields: None });
    }
    records
}

fn split_fields(record: &str, delimiter: char) -> Fields {
    let is_padding = |c: char| c != delimiter && c.is_whitespace();
    let mut fields = Vec::new();
    let mut chars = record.chars().peekable();

    loop {
        while chars.next_if(|&c| is_padding(c)).is_some() {}

        if chars.next_if_eq(&'"').is_some() {
            let mut field = String::new();
            loop {
                match chars.next() {
                    Some('"') if chars.next_if_eq(&'"').is_some() => field.push('"'),
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Fields::Unterminated,
                }
            }
            fields.push(field);

            while chars.next_if(|&c| is_padding(c)).is_some() {}
            match chars.next() {
                None => return Fields::Complete(fields),
                Some(c) if c == delimiter => continue,
                Some(_) => return Fields::Malformed,
            }
        }

        let mut field = String::new();
        let mut at_end = true;
        for c in chars.by_ref() {
            if c == delimiter {
                at_end = false;
                break;
            }
            field.push(c);
        }
        fields.push(field.trim().to_string());
        if at_end {
            return Fields::Complete(fields);
        }
    }
}

fn into_item(fields: Vec<String>) -> Option<ClusterItem> {
    let [id, cluster]: [String; 2] = fields.try_into().ok()?;
    (!id.is_empty() && !cluster.is_empty()).then(|| ClusterItem::new(id, cluster))
}

/// Quote a field when reading it back unquoted would change it.
fn escape_field(field: &str, delimiter: char) -> String {
    let needs_quotes = field.contains([delimiter, '"', '\n', '\r']) || field.trim() != field;
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render items as delimited text with a header line.
///
/// Fields are quoted only when needed, so [`parse_cluster_upload`] reads
/// back the same id to cluster mapping.
pub fn export_cluster_items(items: &[ClusterItem], delimiter: Delimiter) -> String {
    let d = delimiter.as_char();
    let mut out = format!("{ID_COLUMN}{d}{CLUSTER_COLUMN}\n");
    for item in items {
        out.push_str(&escape_field(&item.test_case_id, d));
        out.push(d);
        out.push_str(&escape_field(&item.cluster_id, d));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn as_map(items: &[ClusterItem]) -> HashMap<String, String> {
        items
            .iter()
            .map(|i| (i.test_case_id.clone(), i.cluster_id.clone()))
            .collect()
    }

    #[test]
    fn test_export_then_parse_round_trip() {
        let items = vec![ClusterItem::new("t1", "cluster-a"), ClusterItem::new("t2", "cluster-b")];
        for delimiter in [Delimiter::Comma, Delimiter::Tab, Delimiter::Semicolon] {
            let text = export_cluster_items(&items, delimiter);
            let parsed = parse_cluster_upload(&text, delimiter);
            assert!(parsed.had_header);
            assert_eq!(parsed.skipped, 0);
            assert_eq!(as_map(&parsed.items), as_map(&items));
        }
    }

    #[test]
    fn test_round_trip_with_awkward_ids() {
        let items = vec![
            ClusterItem::new("q,17", "cluster-a"),
            ClusterItem::new("a\"b", "cluster;b"),
            ClusterItem::new("t2", " padded "),
            ClusterItem::new("multi\nline", "tab\there"),
        ];
        for delimiter in [Delimiter::Comma, Delimiter::Tab, Delimiter::Semicolon] {
            let text = export_cluster_items(&items, delimiter);
            let parsed = parse_cluster_upload(&text, delimiter);
            assert_eq!(parsed.skipped, 0, "delimiter {:?}: {}", delimiter, text);
            assert_eq!(as_map(&parsed.items), as_map(&items));
        }
    }

    #[test]
    fn test_export_quotes_only_when_needed() {
        let items = vec![ClusterItem::new("q,17", "a"), ClusterItem::new("t2", "say \"hi\"")];
        let text = export_cluster_items(&items, Delimiter::Comma);
        assert_eq!(text, "test_case_id,cluster_id\n\"q,17\",a\nt2,\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn test_broken_quoting_is_skipped() {
        let text = "t1,\"a\"x\nt2,b\n\"t3,c\n";
        let parsed = parse_cluster_upload(text, Delimiter::Comma);
        assert_eq!(parsed.items, vec![ClusterItem::new("t2", "b")]);
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_headerless_upload() {
        let parsed = parse_cluster_upload("\n\nt1,a\nt2,b\n", Delimiter::Comma);
        assert!(!parsed.had_header);
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0], ClusterItem::new("t1", "a"));
    }

    #[test]
    fn test_header_detection_is_case_insensitive() {
        let parsed = parse_cluster_upload("Test_Case_ID , Cluster\nt1 , a\n", Delimiter::Comma);
        assert!(parsed.had_header);
        assert_eq!(parsed.items, vec![ClusterItem::new("t1", "a")]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "test_case_id,cluster_id\nt1,a\nonly_one_field\nt2,\n,b\nt3,b,extra\n  \nt4, \"c\" \n";
        let parsed = parse_cluster_upload(text, Delimiter::Comma);
        assert_eq!(parsed.items, vec![ClusterItem::new("t1", "a"), ClusterItem::new("t4", "c")]);
        assert_eq!(parsed.skipped, 4);
    }

    #[test]
    fn test_delimiter_selection() {
        assert_eq!(Delimiter::from_path(Path::new("map.tsv")), Delimiter::Tab);
        assert_eq!(Delimiter::from_path(Path::new("map.CSV")), Delimiter::Comma);
        assert_eq!(Delimiter::from_path(Path::new("map")), Delimiter::Comma);
        assert_eq!(Delimiter::parse("semicolon"), Some(Delimiter::Semicolon));
        assert_eq!(Delimiter::parse("pipe"), None);
    }
}

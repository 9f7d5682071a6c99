//! Line Parser
//!
//! Turns one raw input line into at most one [`ParsedCandidate`]. Parsing is
//! pure and stateless; any number of workers may run it in any order.
//!
//! A line that yields no candidate is a [`ParseSkip`], never an error: the
//! pipeline counts it and moves on.
//!
//! # Formats
//!
//! ```text
//! tsv:  <itemId> \t <name> \t <value> \t <timestamp>
//! json: {"itemId": "u1", "name": "email", "value": "a@x.com", "timestamp": 100}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Number of tab-separated fields in a TSV line.
pub const TSV_FIELDS: usize = 4;

/// Input line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFormat {
    /// Four tab-separated fields
    #[default]
    Tsv,
    /// One JSON object per line
    Json,
}

impl LineFormat {
    /// Config-file name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            LineFormat::Tsv => "tsv",
            LineFormat::Json => "json",
        }
    }
}

impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tsv" => Ok(LineFormat::Tsv),
            "json" => Ok(LineFormat::Json),
            other => Err(format!(
                "unknown line format '{}', expected \"tsv\" or \"json\"",
                other
            )),
        }
    }
}

/// Raw fields of a line, not yet validated.
///
/// The timestamp stays text here; turning it into an integer is the
/// extractor's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCandidate {
    /// Item id (never empty)
    pub item_id: String,
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
    /// Timestamp text
    pub timestamp: String,
}

/// Why a line produced no candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSkip {
    /// Empty or whitespace-only line
    #[error("blank line")]
    Blank,

    /// Line starting with `#`
    #[error("comment line")]
    Comment,

    /// TSV line without exactly four fields
    #[error("expected 4 tab-separated fields, found {found}")]
    FieldCount {
        /// Fields present
        found: usize,
    },

    /// Item id field is empty
    #[error("empty item id")]
    EmptyItemId,

    /// JSON line that is not a well-formed event object
    #[error("malformed JSON: {0}")]
    Json(String),
}

impl ParseSkip {
    /// Blank and comment lines are expected input, not malformed data.
    pub fn is_benign(&self) -> bool {
        matches!(self, ParseSkip::Blank | ParseSkip::Comment)
    }
}

/// Stateless parser for one [`LineFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser {
    format: LineFormat,
}

impl LineParser {
    /// Create a parser for `format`.
    pub fn new(format: LineFormat) -> Self {
        LineParser { format }
    }

    /// Format this parser reads.
    pub fn format(&self) -> LineFormat {
        self.format
    }

    /// Parse a line, reporting why it was skipped.
    pub fn try_parse(&self, line: &str) -> Result<ParsedCandidate, ParseSkip> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ParseSkip::Blank);
        }
        if trimmed.starts_with('#') {
            return Err(ParseSkip::Comment);
        }

        let candidate = match self.format {
            LineFormat::Tsv => parse_tsv(line)?,
            LineFormat::Json => parse_json(trimmed)?,
        };
        if candidate.item_id.is_empty() {
            return Err(ParseSkip::EmptyItemId);
        }
        Ok(candidate)
    }

    /// Parse a line, discarding the skip reason.
    pub fn parse(&self, line: &str) -> Option<ParsedCandidate> {
        self.try_parse(line).ok()
    }
}

/// Parse a line in `format`, reporting why it was skipped.
pub fn try_parse_line(line: &str, format: LineFormat) -> Result<ParsedCandidate, ParseSkip> {
    LineParser::new(format).try_parse(line)
}

/// Parse a line in `format`; malformed lines yield `None`.
pub fn parse_line(line: &str, format: LineFormat) -> Option<ParsedCandidate> {
    LineParser::new(format).parse(line)
}

fn parse_tsv(line: &str) -> Result<ParsedCandidate, ParseSkip> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != TSV_FIELDS {
        return Err(ParseSkip::FieldCount {
            found: fields.len(),
        });
    }

    Ok(ParsedCandidate {
        item_id: fields[0].to_string(),
        name: fields[1].to_string(),
        value: fields[2].to_string(),
        timestamp: fields[3].to_string(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonLine {
    item_id: String,
    name: String,
    #[serde(default)]
    value: serde_json::Value,
    timestamp: serde_json::Value,
}

fn parse_json(line: &str) -> Result<ParsedCandidate, ParseSkip> {
    let parsed: JsonLine =
        serde_json::from_str(line).map_err(|e| ParseSkip::Json(e.to_string()))?;

    Ok(ParsedCandidate {
        item_id: parsed.item_id,
        name: parsed.name,
        value: scalar_text(parsed.value),
        timestamp: scalar_text(parsed.timestamp),
    })
}

/// Strings keep their contents; null is empty; anything else is its JSON text.
fn scalar_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

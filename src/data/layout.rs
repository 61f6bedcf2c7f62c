use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Layout descriptor: where the data sits inside a raw table
// ---------------------------------------------------------------------------

/// Decimal-separator convention of numeric text cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalSeparator {
    Dot,
    Comma,
    /// Accept `1.5`, and `1,5` when the text holds no `.`.
    #[default]
    Auto,
}

impl DecimalSeparator {
    /// Parse a numeric text cell. Spaces (including the no-break space some
    /// instrument software uses as a thousands separator) are ignored.
    pub fn parse(self, raw: &str) -> Option<f64> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        let normalized = match self {
            DecimalSeparator::Dot => cleaned,
            DecimalSeparator::Comma => cleaned.replace('.', "").replace(',', "."),
            DecimalSeparator::Auto if !cleaned.contains('.') => cleaned.replace(',', "."),
            DecimalSeparator::Auto => cleaned,
        };
        normalized.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Field separator of a text export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Comma,
    Semicolon,
    Tab,
    /// Any run of spaces or tabs.
    Whitespace,
    /// Sniffed from the first non-blank lines.
    #[default]
    Auto,
}

impl Delimiter {
    /// Resolve `Auto` from a sample of lines. Tab wins over semicolon, which
    /// wins over comma. Under a dot decimal any comma is a separator; under
    /// `Auto` comma is chosen when it splits every line into the same number
    /// of fields and whitespace does not.
    pub fn sniff<'a>(
        self,
        lines: impl IntoIterator<Item = &'a str>,
        decimal: DecimalSeparator,
    ) -> Delimiter {
        if self != Delimiter::Auto {
            return self;
        }
        let sample: Vec<&str> = lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .take(20)
            .collect();
        if sample.iter().any(|l| l.contains('\t')) {
            Delimiter::Tab
        } else if sample.iter().any(|l| l.contains(';')) {
            Delimiter::Semicolon
        } else if decimal == DecimalSeparator::Dot && sample.iter().any(|l| l.contains(',')) {
            Delimiter::Comma
        } else if decimal == DecimalSeparator::Auto
            && consistent_fields(&sample, |l| l.split(',').count())
            && !consistent_fields(&sample, |l| l.split_whitespace().count())
        {
            Delimiter::Comma
        } else {
            Delimiter::Whitespace
        }
    }

    pub fn byte(self) -> Option<u8> {
        match self {
            Delimiter::Comma => Some(b','),
            Delimiter::Semicolon => Some(b';'),
            Delimiter::Tab => Some(b'\t'),
            Delimiter::Whitespace | Delimiter::Auto => None,
        }
    }
}

/// True when every sample line splits into the same number of fields, and
/// that number is at least two.
fn consistent_fields(sample: &[&str], count: impl Fn(&str) -> usize) -> bool {
    let mut counts = sample.iter().map(|l| count(l.trim()));
    match counts.next() {
        Some(first) if first >= 2 => counts.all(|n| n == first),
        _ => false,
    }
}

/// How to find the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLocator {
    /// Every row is data; columns must be referenced by index.
    #[default]
    None,
    /// Zero-based row index of the header; data starts on the next row.
    Offset(usize),
    /// First row whose first non-blank cell contains this text.
    Marker(String),
}

/// A column referenced by header name or by zero-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{i}"),
            ColumnRef::Name(n) => write!(f, "{n}"),
        }
    }
}

/// Everything needed to turn a raw table into typed rows, apart from the
/// choice of columns, which belongs to the measurement or curve layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    pub header: HeaderLocator,
    pub decimal: DecimalSeparator,
    pub delimiter: Delimiter,
    /// Text lines starting with this prefix are dropped before parsing.
    pub comment_prefix: Option<String>,
    /// Workbook sheet; the first sheet when absent.
    pub sheet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_decimal_accepts_both_conventions() {
        assert_eq!(DecimalSeparator::Auto.parse("99.87"), Some(99.87));
        assert_eq!(DecimalSeparator::Auto.parse("99,87"), Some(99.87));
        assert_eq!(DecimalSeparator::Auto.parse(" 1 250,5 "), Some(1250.5));
        assert_eq!(DecimalSeparator::Auto.parse("n/a"), None);
        assert_eq!(DecimalSeparator::Auto.parse(""), None);
    }

    #[test]
    fn comma_decimal_treats_dot_as_grouping() {
        assert_eq!(DecimalSeparator::Comma.parse("1.250,5"), Some(1250.5));
        assert_eq!(DecimalSeparator::Dot.parse("1,5"), None);
    }

    #[test]
    fn sniff_prefers_tab_then_semicolon() {
        let tab = ["30.0\t12", "30.1\t14"];
        assert_eq!(
            Delimiter::Auto.sniff(tab, DecimalSeparator::Auto),
            Delimiter::Tab
        );
        let semi = ["#Temp;Time;DSC", "600,5;10,0;0,12"];
        assert_eq!(
            Delimiter::Auto.sniff(semi, DecimalSeparator::Auto),
            Delimiter::Semicolon
        );
        let spaced = ["30.00  1520", "30.02  1498"];
        assert_eq!(
            Delimiter::Auto.sniff(spaced, DecimalSeparator::Auto),
            Delimiter::Whitespace
        );
        let comma = ["strain,stress", "0.1,120"];
        assert_eq!(
            Delimiter::Auto.sniff(comma, DecimalSeparator::Dot),
            Delimiter::Comma
        );
        assert_eq!(
            Delimiter::Semicolon.sniff(tab, DecimalSeparator::Auto),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn sniff_finds_comma_under_auto_decimal() {
        let csv = ["regime,density", "C1,99.90", "L4,99.85"];
        assert_eq!(
            Delimiter::Auto.sniff(csv, DecimalSeparator::Auto),
            Delimiter::Comma
        );
        // Comma decimals in a space-separated export stay whitespace.
        let spaced = ["30,00  1520", "30,02  1498"];
        assert_eq!(
            Delimiter::Auto.sniff(spaced, DecimalSeparator::Auto),
            Delimiter::Whitespace
        );
        let ragged = ["C1,99,90", "L4,99"];
        assert_eq!(
            Delimiter::Auto.sniff(ragged, DecimalSeparator::Comma),
            Delimiter::Whitespace
        );
    }

    #[test]
    fn column_refs_deserialize_from_number_or_name() {
        let cols: Vec<ColumnRef> = serde_json::from_str(r#"[0, "stress"]"#).unwrap();
        assert_eq!(cols, vec![ColumnRef::Index(0), ColumnRef::Name("stress".into())]);
    }

    #[test]
    fn header_locator_json_forms() {
        let h: HeaderLocator = serde_json::from_str(r##"{"marker": "#Temp"}"##).unwrap();
        assert_eq!(h, HeaderLocator::Marker("#Temp".into()));
        let h: HeaderLocator = serde_json::from_str(r#"{"offset": 8}"#).unwrap();
        assert_eq!(h, HeaderLocator::Offset(8));
        let h: HeaderLocator = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(h, HeaderLocator::None);
    }
}

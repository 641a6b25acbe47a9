//! Row Tokenizing
//!
//! The ledger is handled line by line: merge and delete keep foreign rows
//! byte-for-byte, so only the rows being inspected are split. Fields are
//! written fully quoted and never span lines.

use crate::LedgerError;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};

/// Split one ledger line into unescaped fields.
///
/// Commas inside quotes are literal and doubled quotes collapse to one. An
/// empty or blank line yields no fields.
pub fn split_row(line: &str) -> Result<Vec<String>, LedgerError> {
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Ok(Vec::new());
    }
    Ok(record.iter().map(str::to_string).collect())
}

/// First field of a line with any iteration suffix kept, or `None` if the line has none
pub fn row_test_id(line: &str) -> Option<String> {
    split_row(line)
        .ok()
        .and_then(|fields| fields.into_iter().next())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Encode fields as one fully quoted line without a terminator
pub fn format_row<I, S>(fields: I) -> Result<String, LedgerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let flattened: Vec<String> = fields
        .into_iter()
        .map(|f| f.as_ref().replace(['\r', '\n'], " "))
        .collect();
    writer.write_record(&flattened)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| LedgerError::Io(std::io::Error::other(e.error().to_string())))?;
    let mut line = String::from_utf8_lossy(&bytes).into_owned();
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_quoted_fields() {
        let fields = split_row(r#""test-0001","10.0.7","npm""#).unwrap();
        assert_eq!(fields, vec!["test-0001", "10.0.7", "npm"]);
    }

    #[test]
    fn test_split_unquoted_and_mixed() {
        let fields = split_row(r#"Test ID,"Version",Package Manager"#).unwrap();
        assert_eq!(fields, vec!["Test ID", "Version", "Package Manager"]);
    }

    #[test]
    fn test_commas_inside_quotes_are_literal() {
        let fields = split_row(r#""a","Process exited, code 1","c""#).unwrap();
        assert_eq!(fields, vec!["a", "Process exited, code 1", "c"]);
    }

    #[test]
    fn test_doubled_quotes_unescape() {
        let fields = split_row(r#""a","say ""hi""","""""#).unwrap();
        assert_eq!(fields, vec!["a", r#"say "hi""#, r#"""#]);
    }

    #[test]
    fn test_empty_fields_are_kept() {
        let fields = split_row(r#""a","","c",,"#).unwrap();
        assert_eq!(fields, vec!["a", "", "c", "", ""]);
    }

    #[test]
    fn test_blank_lines() {
        assert!(split_row("").unwrap().is_empty());
        assert!(split_row("   ").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_quote_does_not_panic() {
        let fields = split_row(r#""a","unterminated"#).unwrap();
        assert_eq!(fields[0], "a");
    }

    #[test]
    fn test_format_quotes_everything() {
        let line = format_row(["test-0001", "say \"hi\"", "a,b", ""]).unwrap();
        assert_eq!(line, r#""test-0001","say ""hi""","a,b","""#);
    }

    #[test]
    fn test_format_flattens_newlines() {
        let line = format_row(["multi\nline\r\nerror"]).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(split_row(&line).unwrap(), vec!["multi line  error"]);
    }

    #[test]
    fn test_row_test_id() {
        assert_eq!(
            row_test_id(r#""test-0007-iter1","x""#).as_deref(),
            Some("test-0007-iter1")
        );
        assert_eq!(row_test_id(""), None);
        assert_eq!(row_test_id(r#""","x""#), None);
    }
}

//! COPY statement options and their SQL rendering.

use crate::error::{Error, Result};

/// COPY data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyFormat {
    /// Tab-separated text (server default)
    #[default]
    Text,
    /// CSV
    Csv,
    /// PostgreSQL binary COPY format
    Binary,
}

impl CopyFormat {
    fn as_sql(self) -> &'static str {
        match self {
            CopyFormat::Text => "text",
            CopyFormat::Csv => "csv",
            CopyFormat::Binary => "binary",
        }
    }
}

/// Column selection for the FORCE_QUOTE option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceQuote {
    /// Quote the named columns
    Columns(Vec<String>),
    /// Quote every non-NULL value (`FORCE_QUOTE *`)
    All,
}

/// One COPY option.
///
/// Option kinds mirror the server's COPY option list; each kind may appear
/// at most once per statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOption {
    /// FORMAT
    Format(CopyFormat),
    /// OIDS
    Oids(bool),
    /// DELIMITER (text and CSV formats)
    Delimiter(char),
    /// NULL string (text and CSV formats)
    Null(String),
    /// HEADER (CSV format)
    Header(bool),
    /// QUOTE character (CSV format)
    Quote(char),
    /// ESCAPE character (CSV format)
    Escape(char),
    /// FORCE_QUOTE (CSV output)
    ForceQuote(ForceQuote),
    /// FORCE_NOT_NULL (CSV input)
    ForceNotNull(Vec<String>),
    /// ENCODING
    Encoding(String),
}

impl CopyOption {
    fn kind(&self) -> CopyOptionKind {
        match self {
            CopyOption::Format(_) => CopyOptionKind::Format,
            CopyOption::Oids(_) => CopyOptionKind::Oids,
            CopyOption::Delimiter(_) => CopyOptionKind::Delimiter,
            CopyOption::Null(_) => CopyOptionKind::Null,
            CopyOption::Header(_) => CopyOptionKind::Header,
            CopyOption::Quote(_) => CopyOptionKind::Quote,
            CopyOption::Escape(_) => CopyOptionKind::Escape,
            CopyOption::ForceQuote(_) => CopyOptionKind::ForceQuote,
            CopyOption::ForceNotNull(_) => CopyOptionKind::ForceNotNull,
            CopyOption::Encoding(_) => CopyOptionKind::Encoding,
        }
    }

    /// Render this option's clause fragment, or `None` for a fragment that
    /// would be empty (e.g. an empty column list).
    fn fragment(&self) -> Option<String> {
        let mut out = String::new();
        match self {
            CopyOption::Format(format) => {
                out.push_str("FORMAT ");
                push_string_literal(&mut out, format.as_sql());
            }
            CopyOption::Oids(enabled) => {
                out.push_str("OIDS ");
                out.push_str(bool_sql(*enabled));
            }
            CopyOption::Delimiter(delimiter) => {
                out.push_str("DELIMITER ");
                push_char_literal(&mut out, *delimiter);
            }
            CopyOption::Null(null_string) => {
                out.push_str("NULL ");
                push_string_literal(&mut out, null_string);
            }
            CopyOption::Header(enabled) => {
                out.push_str("HEADER ");
                out.push_str(bool_sql(*enabled));
            }
            CopyOption::Quote(quote) => {
                out.push_str("QUOTE ");
                push_char_literal(&mut out, *quote);
            }
            CopyOption::Escape(escape) => {
                out.push_str("ESCAPE ");
                push_char_literal(&mut out, *escape);
            }
            CopyOption::ForceQuote(force_quote) => match force_quote {
                ForceQuote::All => out.push_str("FORCE_QUOTE *"),
                ForceQuote::Columns(columns) => {
                    if columns.is_empty() {
                        return None;
                    }
                    out.push_str("FORCE_QUOTE ");
                    push_column_list(&mut out, columns);
                }
            },
            CopyOption::ForceNotNull(columns) => {
                if columns.is_empty() {
                    return None;
                }
                out.push_str("FORCE_NOT_NULL ");
                push_column_list(&mut out, columns);
            }
            CopyOption::Encoding(encoding) => {
                out.push_str("ENCODING ");
                push_string_literal(&mut out, encoding);
            }
        }
        Some(out)
    }
}

/// The kind of a [`CopyOption`], used for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOptionKind {
    /// FORMAT
    Format,
    /// OIDS
    Oids,
    /// DELIMITER
    Delimiter,
    /// NULL
    Null,
    /// HEADER
    Header,
    /// QUOTE
    Quote,
    /// ESCAPE
    Escape,
    /// FORCE_QUOTE
    ForceQuote,
    /// FORCE_NOT_NULL
    ForceNotNull,
    /// ENCODING
    Encoding,
}

impl std::fmt::Display for CopyOptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CopyOptionKind::Format => "FORMAT",
            CopyOptionKind::Oids => "OIDS",
            CopyOptionKind::Delimiter => "DELIMITER",
            CopyOptionKind::Null => "NULL",
            CopyOptionKind::Header => "HEADER",
            CopyOptionKind::Quote => "QUOTE",
            CopyOptionKind::Escape => "ESCAPE",
            CopyOptionKind::ForceQuote => "FORCE_QUOTE",
            CopyOptionKind::ForceNotNull => "FORCE_NOT_NULL",
            CopyOptionKind::Encoding => "ENCODING",
        };
        f.write_str(name)
    }
}

/// A validated COPY option set.
///
/// Construction rejects duplicate option kinds instead of silently keeping
/// one of them; rendering preserves the order options were given in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyOptions {
    options: Vec<CopyOption>,
}

impl CopyOptions {
    /// An empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an option list.
    pub fn build(options: impl IntoIterator<Item = CopyOption>) -> Result<Self> {
        let options: Vec<CopyOption> = options.into_iter().collect();
        let mut seen: Vec<CopyOptionKind> = Vec::with_capacity(options.len());
        for option in &options {
            let kind = option.kind();
            if seen.contains(&kind) {
                return Err(Error::Build(format!("duplicate COPY option: {kind}")));
            }
            seen.push(kind);
        }
        Ok(Self { options })
    }

    /// Whether the set contains no options.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Render as a ` WITH (...)` clause, or an empty string when no option
    /// produces a fragment.
    pub fn render(&self) -> String {
        let fragments: Vec<String> = self
            .options
            .iter()
            .filter_map(CopyOption::fragment)
            .collect();
        if fragments.is_empty() {
            return String::new();
        }
        let mut out = String::from(" WITH (");
        out.push_str(&fragments.join(", "));
        out.push(')');
        out
    }
}

fn bool_sql(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn push_string_literal(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
}

fn push_char_literal(out: &mut String, value: char) {
    let mut buf = [0_u8; 4];
    push_string_literal(out, value.encode_utf8(&mut buf));
}

fn push_column_list(out: &mut String, columns: &[String]) {
    out.push('(');
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(&super::Identifier::new(column).sanitize());
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_renders_nothing() {
        assert_eq!(CopyOptions::new().render(), "");
        assert_eq!(CopyOptions::build([]).unwrap().render(), "");
    }

    #[test]
    fn renders_with_clause_in_given_order() {
        let options = CopyOptions::build([
            CopyOption::Format(CopyFormat::Csv),
            CopyOption::Header(true),
            CopyOption::Delimiter(';'),
        ])
        .unwrap();
        assert_eq!(
            options.render(),
            " WITH (FORMAT 'csv', HEADER true, DELIMITER ';')"
        );
    }

    #[test]
    fn renders_all_ten_kinds() {
        let options = CopyOptions::build([
            CopyOption::Format(CopyFormat::Text),
            CopyOption::Oids(true),
            CopyOption::Delimiter('|'),
            CopyOption::Null("\\N".to_owned()),
            CopyOption::Header(false),
            CopyOption::Quote('"'),
            CopyOption::Escape('\\'),
            CopyOption::ForceQuote(ForceQuote::Columns(vec!["a".to_owned(), "b".to_owned()])),
            CopyOption::ForceNotNull(vec!["c".to_owned()]),
            CopyOption::Encoding("UTF8".to_owned()),
        ])
        .unwrap();
        let rendered = options.render();
        assert_eq!(
            rendered,
            " WITH (FORMAT 'text', OIDS true, DELIMITER '|', NULL '\\N', \
             HEADER false, QUOTE '\"', ESCAPE '\\', \
             FORCE_QUOTE (\"a\", \"b\"), FORCE_NOT_NULL (\"c\"), \
             ENCODING 'UTF8')"
        );
        assert_eq!(rendered.matches(", ").count() - 1, 9); // ten fragments
    }

    #[test]
    fn force_quote_star() {
        let options = CopyOptions::build([CopyOption::ForceQuote(ForceQuote::All)]).unwrap();
        assert_eq!(options.render(), " WITH (FORCE_QUOTE *)");
    }

    #[test]
    fn empty_column_list_fragment_is_omitted() {
        let options = CopyOptions::build([
            CopyOption::Header(true),
            CopyOption::ForceQuote(ForceQuote::Columns(Vec::new())),
        ])
        .unwrap();
        assert_eq!(options.render(), " WITH (HEADER true)");

        let options =
            CopyOptions::build([CopyOption::ForceNotNull(Vec::new())]).unwrap();
        assert_eq!(options.render(), "");
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let err = CopyOptions::build([
            CopyOption::Header(true),
            CopyOption::Header(false),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Build(_)));
        assert!(err.to_string().contains("HEADER"));

        // Different kinds with equal payloads are fine.
        CopyOptions::build([CopyOption::Header(true), CopyOption::Oids(true)]).unwrap();
    }

    #[test]
    fn literals_are_escaped() {
        let options = CopyOptions::build([CopyOption::Null("o'clock".to_owned())]).unwrap();
        assert_eq!(options.render(), " WITH (NULL 'o''clock')");

        let options = CopyOptions::build([CopyOption::Quote('\'')]).unwrap();
        assert_eq!(options.render(), " WITH (QUOTE '''')");
    }
}

use serde::Serialize;
use sqlformat::{FormatOptions, Indent, QueryParams};
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// Pretty-printer applied to model output: re-indented, keywords upper-cased.
#[derive(Debug, Clone, Copy)]
pub struct SqlFormatter {
    indent: u8,
}

impl Default for SqlFormatter {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

impl SqlFormatter {
    /// Best effort: any text goes in, something readable comes out.
    pub fn format(&self, text: &str) -> String {
        let options = FormatOptions {
            indent: Indent::Spaces(self.indent),
            uppercase: Some(true),
            lines_between_queries: 1,
            ..Default::default()
        };

        sqlformat::format(text, &QueryParams::None, &options)
    }
}

/// Whether the formatted output parses. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SqlCheck {
    Valid { statements: usize },
    Invalid { reason: String },
}

impl SqlCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

pub fn check(sql: &str) -> SqlCheck {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) if statements.is_empty() => SqlCheck::Invalid {
            reason: "no statement found".to_string(),
        },
        Ok(statements) => SqlCheck::Valid {
            statements: statements.len(),
        },
        Err(e) => SqlCheck::Invalid {
            reason: e.to_string(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Class {
    Keyword,
    Ident,
    String,
    Number,
    Comment,
    Punct,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub class: Class,
    pub text: String,
}

/// One rendered source line.
pub type Line = Vec<Span>;

/// Split `sql` into classified spans, one `Line` per source line.
pub fn highlight(sql: &str) -> Vec<Line> {
    let tokens = match Tokenizer::new(&GenericDialect {}, sql)
        .with_unescape(false)
        .tokenize()
    {
        Ok(tokens) => tokens,
        Err(_) => return plain(sql),
    };

    let mut lines = vec![Line::new()];

    for token in &tokens {
        let class = classify(token);
        let text = token.to_string();
        let mut parts = text.split('\n');

        if let Some(first) = parts.next() {
            push(&mut lines, class, first);
        }
        for part in parts {
            lines.push(Line::new());
            push(&mut lines, class, part);
        }
    }

    lines
}

fn plain(sql: &str) -> Vec<Line> {
    sql.split('\n')
        .map(|l| {
            let mut line = Line::new();
            if !l.is_empty() {
                line.push(Span {
                    class: Class::Plain,
                    text: l.to_string(),
                });
            }
            line
        })
        .collect()
}

fn push(lines: &mut [Line], class: Class, text: &str) {
    if text.is_empty() {
        return;
    }

    let Some(line) = lines.last_mut() else {
        return;
    };

    match line.last_mut() {
        Some(span) if span.class == class => span.text.push_str(text),
        _ => line.push(Span {
            class,
            text: text.to_string(),
        }),
    }
}

fn classify(token: &Token) -> Class {
    match token {
        Token::Word(w) if w.quote_style.is_none() && w.keyword != Keyword::NoKeyword => {
            Class::Keyword
        }
        Token::Word(_) => Class::Ident,
        Token::Number(..) => Class::Number,
        Token::SingleQuotedString(_)
        | Token::DoubleQuotedString(_)
        | Token::TripleSingleQuotedString(_)
        | Token::TripleDoubleQuotedString(_)
        | Token::DollarQuotedString(_)
        | Token::SingleQuotedByteStringLiteral(_)
        | Token::DoubleQuotedByteStringLiteral(_)
        | Token::TripleSingleQuotedByteStringLiteral(_)
        | Token::TripleDoubleQuotedByteStringLiteral(_)
        | Token::SingleQuotedRawStringLiteral(_)
        | Token::DoubleQuotedRawStringLiteral(_)
        | Token::TripleSingleQuotedRawStringLiteral(_)
        | Token::TripleDoubleQuotedRawStringLiteral(_)
        | Token::NationalStringLiteral(_)
        | Token::EscapedStringLiteral(_)
        | Token::UnicodeStringLiteral(_)
        | Token::HexStringLiteral(_) => Class::String,
        Token::Whitespace(Whitespace::SingleLineComment { .. })
        | Token::Whitespace(Whitespace::MultiLineComment(_)) => Class::Comment,
        Token::Whitespace(_) => Class::Plain,
        _ => Class::Punct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(lines: &[Line]) -> String {
        lines
            .iter()
            .map(|l| l.iter().map(|s| s.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn uppercases_keywords() {
        let out = SqlFormatter::default().format("select * from employees");

        assert!(out.contains("SELECT"));
        assert!(out.contains("FROM"));
        assert!(!out.contains("select"));
        assert!(!out.contains("from"));
        assert!(out.contains("employees"));
    }

    #[test]
    fn reindents() {
        let out = SqlFormatter::default()
            .format("select name, hire_date from employees where hire_date > '2020-12-31'");

        assert!(out.lines().count() > 1);
        assert!(out.lines().any(|l| l.starts_with("  ")));
        assert!(out.contains("'2020-12-31'"));
    }

    #[test]
    fn idempotent() {
        let formatter = SqlFormatter::default();

        for input in [
            "select * from employees",
            "select name, hire_date from employees where hire_date > '2020-12-31' order by name",
        ] {
            let once = formatter.format(input);
            assert_eq!(formatter.format(&once), once, "input: {input}");
        }
    }

    #[test]
    fn tolerates_non_sql() {
        let out = SqlFormatter::default().format("I am sorry, I cannot answer that");

        assert!(!out.is_empty());
        assert!(out.contains("sorry"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(SqlFormatter::default().format("").trim(), "");
    }

    #[test]
    fn check_accepts_valid_sql() {
        assert_eq!(
            check("SELECT * FROM employees WHERE hire_date > '2020-12-31'"),
            SqlCheck::Valid { statements: 1 }
        );
        assert_eq!(
            check("SELECT 1; SELECT 2"),
            SqlCheck::Valid { statements: 2 }
        );
    }

    #[test]
    fn check_rejects_prose_and_blank() {
        assert!(!check("I am sorry, I cannot answer that").is_valid());
        assert!(!check("").is_valid());
    }

    #[test]
    fn highlight_classifies_tokens() {
        let lines = highlight("SELECT name\nFROM employees\nWHERE id = 42 AND note = 'x'");

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0][0].class, Class::Keyword);
        assert_eq!(lines[0][0].text, "SELECT");

        let spans: Vec<_> = lines.iter().flatten().collect();
        assert!(spans
            .iter()
            .any(|s| s.class == Class::Ident && s.text == "employees"));
        assert!(spans.iter().any(|s| s.class == Class::Number && s.text == "42"));
        assert!(spans.iter().any(|s| s.class == Class::String && s.text == "'x'"));
        assert!(spans.iter().any(|s| s.class == Class::Punct && s.text == "="));
    }

    #[test]
    fn highlight_keeps_the_text() {
        let sql = "SELECT\n  *\nFROM\n  employees";

        assert_eq!(text(&highlight(sql)), sql);
    }

    #[test]
    fn highlight_keeps_escaped_quotes() {
        let sql = "SELECT\n  *\nFROM\n  employees\nWHERE\n  name = 'O''Brien'";
        let lines = highlight(sql);

        assert_eq!(text(&lines), sql);
        assert!(lines
            .iter()
            .flatten()
            .any(|s| s.class == Class::String && s.text == "'O''Brien'"));
    }

    #[test]
    fn highlight_classifies_other_literals() {
        let lines = highlight("SELECT X'1F', N'abc' FROM t");
        let strings: Vec<_> = lines
            .iter()
            .flatten()
            .filter(|s| s.class == Class::String)
            .map(|s| s.text.as_str())
            .collect();

        assert!(strings.iter().any(|s| s.contains("1F")), "{strings:?}");
        assert!(strings.iter().any(|s| s.contains("abc")), "{strings:?}");
    }

    #[test]
    fn highlight_falls_back_on_tokenizer_errors() {
        let lines = highlight("SELECT 'unterminated\nFROM t");

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().flatten().all(|s| s.class == Class::Plain));
    }
}

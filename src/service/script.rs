//! Splits a multi-statement script into individual statements.
//!
//! Line comments (`--`) are dropped outside string literals; a `;` outside single or
//! double quotes ends a statement; `/* ... */` blocks are stripped per statement.
//! A quote preceded by a backslash does not toggle string state.
//! Not handled: block comments spanning several statements and dollar-quoted bodies.

use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));

pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in script.lines() {
        let mut chars = line.chars().peekable();
        let mut prev: Option<char> = None;
        while let Some(ch) = chars.next() {
            let quoted = in_single_quote || in_double_quote;
            if !quoted && ch == '-' && chars.peek() == Some(&'-') {
                break;
            }
            match ch {
                '\'' if !in_double_quote && prev != Some('\\') => in_single_quote = !in_single_quote,
                '"' if !in_single_quote && prev != Some('\\') => in_double_quote = !in_double_quote,
                ';' if !quoted => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    prev = Some(ch);
                    continue;
                }
                _ => {}
            }
            current.push(ch);
            prev = Some(ch);
        }
        current.push('\n');
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(out: &mut Vec<String>, raw: &str) {
    let cleaned = BLOCK_COMMENT_RE.replace_all(raw, " ");
    let stmt = cleaned.trim();
    if !stmt.is_empty() {
        out.push(stmt.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicolon_inside_literal_does_not_split() {
        assert_eq!(split_statements("SELECT 'a;b'; SELECT 2"), vec!["SELECT 'a;b'", "SELECT 2"]);
    }

    #[test]
    fn line_comments_are_dropped_outside_strings() {
        let script = "-- setup\nCREATE TABLE t (id int); -- trailing\nINSERT INTO t VALUES (1);\nSELECT '--not a comment';";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE t (id int)", "INSERT INTO t VALUES (1)", "SELECT '--not a comment'"]
        );
    }

    #[test]
    fn block_comments_and_empty_statements() {
        let script = "/* header */ SELECT 1;;\n ; SELECT /* inline */ 2;";
        assert_eq!(split_statements(script), vec!["SELECT 1", "SELECT   2"]);
    }

    #[test]
    fn multi_line_strings_keep_their_semicolons() {
        let script = "INSERT INTO notes VALUES ('line one;\nline two');\nSELECT 1";
        assert_eq!(
            split_statements(script),
            vec!["INSERT INTO notes VALUES ('line one;\nline two')", "SELECT 1"]
        );
    }

    #[test]
    fn escaped_quote_does_not_close_string() {
        assert_eq!(split_statements(r"SELECT 'it\'s;fine'; SELECT 3"), vec![r"SELECT 'it\'s;fine'", "SELECT 3"]);
    }

    #[test]
    fn quoted_identifier_may_contain_semicolon() {
        assert_eq!(split_statements("SELECT 1 AS \"a;b\"; SELECT 2"), vec!["SELECT 1 AS \"a;b\"", "SELECT 2"]);
    }

    #[test]
    fn blank_script_yields_nothing() {
        assert!(split_statements("  \n -- only a comment\n").is_empty());
    }
}

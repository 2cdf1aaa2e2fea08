//! The `::TOOL name(args)::` wire protocol.
//!
//! Extraction is line-oriented and forgiving: a malformed call becomes a
//! `parse_error` item so the model can self-correct, while later calls on
//! other lines still execute in emission order.

use warden_types::{ArgValue, ToolCall};

/// A line that looked like a tool call but did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// Tool name, when it could be recovered from the line.
    pub name: Option<String>,
    pub message: String,
    pub span: (usize, usize),
}

/// One extracted item, in emission order.
#[derive(Debug, Clone)]
pub enum Extracted {
    Call(ToolCall),
    Malformed(ParseIssue),
}

/// Scan model output for tool-call lines.
///
/// A line participates if, after trimming, it starts with `::TOOL ` and ends
/// with `::`. Everything else is prose and ignored.
#[must_use]
pub fn extract(model_output: &str) -> Vec<Extracted> {
    let mut out = Vec::new();
    let mut offset = 0;
    for line in model_output.split_inclusive('\n') {
        let bare = line.strip_suffix('\n').unwrap_or(line);
        let trimmed = bare.trim();
        if trimmed.starts_with("::TOOL") {
            let start = offset + (bare.len() - bare.trim_start().len());
            let span = (start, start + trimmed.len());
            match parse_call_line(trimmed, span) {
                Ok(call) => out.push(Extracted::Call(call)),
                Err(issue) => out.push(Extracted::Malformed(issue)),
            }
        }
        offset += line.len();
    }
    out
}

fn parse_call_line(line: &str, span: (usize, usize)) -> Result<ToolCall, ParseIssue> {
    let fail = |name: Option<String>, message: &str| ParseIssue {
        name,
        message: message.to_string(),
        span,
    };

    let body = line
        .strip_prefix("::TOOL")
        .and_then(|rest| rest.strip_suffix("::"))
        .ok_or_else(|| fail(None, "expected '::TOOL name(args)::'"))?
        .trim();

    let open = body
        .find('(')
        .ok_or_else(|| fail(None, "missing '(' after tool name"))?;
    let name = body[..open].trim();
    if name.is_empty() || !is_identifier(name) {
        return Err(fail(None, "tool name must be an identifier"));
    }
    let rest = &body[open + 1..];
    let close = rest
        .rfind(')')
        .ok_or_else(|| fail(Some(name.to_string()), "missing closing ')'"))?;
    if !rest[close + 1..].trim().is_empty() {
        return Err(fail(Some(name.to_string()), "trailing text after ')'"));
    }

    let mut call = ToolCall::new(name);
    call.span = span;
    for piece in split_args(&rest[..close]).map_err(|m| fail(Some(name.to_string()), &m))? {
        match piece {
            Piece::Positional(value) => {
                if !call.keyword.is_empty() {
                    return Err(fail(
                        Some(name.to_string()),
                        "positional argument after keyword argument",
                    ));
                }
                call.positional.push(value);
            }
            Piece::Keyword(key, value) => call.keyword.push((key, value)),
        }
    }
    Ok(call)
}

enum Piece {
    Positional(ArgValue),
    Keyword(String, ArgValue),
}

/// Split a comma-separated arglist, honoring quotes, then classify each item
/// as positional or `key=value`.
fn split_args(arglist: &str) -> Result<Vec<Piece>, String> {
    let items = split_top_level(arglist)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        // A '=' before any quote marks a keyword argument.
        let eq = item
            .char_indices()
            .take_while(|(_, c)| *c != '"' && *c != '\'')
            .find(|(_, c)| *c == '=')
            .map(|(i, _)| i);
        if let Some(eq) = eq {
            let key = item[..eq].trim();
            if !is_identifier(key) {
                return Err(format!("invalid keyword name '{key}'"));
            }
            let value = parse_value(item[eq + 1..].trim())?;
            out.push(Piece::Keyword(key.to_string(), value));
        } else {
            out.push(Piece::Positional(parse_value(item)?));
        }
    }
    Ok(out)
}

/// Split on commas that are not inside quotes.
fn split_top_level(arglist: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in arglist.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                ',' => items.push(std::mem::take(&mut current)),
                c => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err("unterminated quoted string".to_string());
    }
    if !current.trim().is_empty() {
        items.push(current);
    }
    Ok(items)
}

/// Parse a single value: quoted string or bare token.
///
/// The only escapes are `\"` and `\\`; a backslash before anything else is
/// a literal backslash.
fn parse_value(raw: &str) -> Result<ArgValue, String> {
    let mut chars = raw.chars();
    match chars.next() {
        Some(q @ ('"' | '\'')) => {
            let mut value = String::new();
            let mut escaped = false;
            let mut closed = false;
            for ch in chars.by_ref() {
                if escaped {
                    if ch != '"' && ch != '\\' {
                        value.push('\\');
                    }
                    value.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    closed = true;
                    break;
                } else {
                    value.push(ch);
                }
            }
            if !closed {
                return Err("unterminated quoted string".to_string());
            }
            if chars.next().is_some() {
                return Err("trailing text after closing quote".to_string());
            }
            Ok(ArgValue::quoted(value, q))
        }
        Some(_) => {
            if raw.contains('"') || raw.contains('\'') {
                return Err(format!("bare token '{raw}' contains a quote"));
            }
            Ok(ArgValue::bare(raw))
        }
        None => Err("empty argument".to_string()),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_call(output: &str) -> ToolCall {
        let extracted = extract(output);
        assert_eq!(extracted.len(), 1, "expected one extraction");
        match &extracted[0] {
            Extracted::Call(call) => call.clone(),
            Extracted::Malformed(issue) => panic!("unexpected parse issue: {issue:?}"),
        }
    }

    #[test]
    fn extracts_simple_call() {
        let call = only_call("::TOOL file_read(\"notes.txt\")::");
        assert_eq!(call.name, "file_read");
        assert_eq!(call.positional[0].value, "notes.txt");
    }

    #[test]
    fn prose_lines_are_ignored() {
        let output = "Let me look at that file.\n::TOOL file_read(\"a.txt\")::\nDone.";
        assert_eq!(extract(output).len(), 1);
    }

    #[test]
    fn multiple_calls_in_emission_order() {
        let output = "::TOOL file_read(\"a\")::\nthinking...\n::TOOL bash_exec(command=\"ls\")::";
        let extracted = extract(output);
        assert_eq!(extracted.len(), 2);
        match (&extracted[0], &extracted[1]) {
            (Extracted::Call(a), Extracted::Call(b)) => {
                assert_eq!(a.name, "file_read");
                assert_eq!(b.name, "bash_exec");
                assert!(a.span.1 <= b.span.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn keyword_and_positional_mix() {
        let call = only_call("::TOOL file_read(\"a.txt\", offset=10, limit=20)::");
        assert_eq!(call.positional.len(), 1);
        assert_eq!(call.keyword_arg("offset").unwrap().value, "10");
        assert_eq!(call.keyword_arg("limit").unwrap().value, "20");
    }

    #[test]
    fn escapes_inside_double_quotes() {
        let call = only_call(r#"::TOOL file_write("a.txt", content="say \"hi\" \\ done")::"#);
        assert_eq!(
            call.keyword_arg("content").unwrap().value,
            r#"say "hi" \ done"#
        );
    }

    #[test]
    fn comma_inside_quotes_does_not_split() {
        let call = only_call("::TOOL grep_search(\"a, b\")::");
        assert_eq!(call.positional.len(), 1);
        assert_eq!(call.positional[0].value, "a, b");
    }

    #[test]
    fn single_quoted_value() {
        let call = only_call("::TOOL bash_exec(command='git status')::");
        assert_eq!(call.keyword_arg("command").unwrap().value, "git status");
    }

    #[test]
    fn malformed_missing_paren_is_reported_not_fatal() {
        let output = "::TOOL file_read \"a.txt\"::\n::TOOL glob_search(\"*.rs\")::";
        let extracted = extract(output);
        assert_eq!(extracted.len(), 2);
        assert!(matches!(extracted[0], Extracted::Malformed(_)));
        assert!(matches!(extracted[1], Extracted::Call(_)));
    }

    #[test]
    fn malformed_unterminated_quote() {
        let extracted = extract("::TOOL file_read(\"a.txt)::");
        match &extracted[0] {
            Extracted::Malformed(issue) => {
                assert_eq!(issue.name.as_deref(), Some("file_read"));
                assert!(issue.message.contains("unterminated"));
            }
            Extracted::Call(_) => panic!("should not parse"),
        }
    }

    #[test]
    fn positional_after_keyword_rejected() {
        let extracted = extract("::TOOL file_read(offset=1, \"a.txt\")::");
        assert!(matches!(extracted[0], Extracted::Malformed(_)));
    }

    #[test]
    fn parse_then_render_is_identity() {
        for line in [
            "::TOOL file_read(\"notes.txt\")::",
            "::TOOL file_read(\"a.txt\", offset=10, limit=20)::",
            "::TOOL bash_exec(command='git status')::",
            r#"::TOOL file_write("a.txt", content="say \"hi\" \\ done")::"#,
            "::TOOL glob_search(pattern=\"**/*.rs\")::",
        ] {
            let call = only_call(line);
            assert_eq!(call.render(), line, "roundtrip failed for {line}");
        }
    }

    #[test]
    fn spans_point_at_the_call_line() {
        let output = "intro\n  ::TOOL file_read(\"a\")::\n";
        let call = only_call(output);
        let (start, end) = call.span;
        assert_eq!(&output[start..end], "::TOOL file_read(\"a\")::");
    }
}

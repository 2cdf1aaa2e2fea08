//! Parsed tool calls.

use serde::{Deserialize, Serialize};

/// A single argument value as it appeared in the call syntax.
///
/// The quoting marker is retained so that parsing followed by rendering is
/// the identity on well-formed input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgValue {
    pub value: String,
    /// `None` for bare tokens, otherwise the quote character used.
    pub quote: Option<char>,
}

impl ArgValue {
    #[must_use]
    pub fn bare(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quote: None,
        }
    }

    #[must_use]
    pub fn quoted(value: impl Into<String>, quote: char) -> Self {
        Self {
            value: value.into(),
            quote: Some(quote),
        }
    }

    /// Render back to call syntax, re-applying the original quoting.
    ///
    /// Only the grammar's two escapes exist (`\"` and `\\`); a single-quoted
    /// value containing a single quote is unrepresentable and can never have
    /// been parsed, so parse∘render stays the identity on well-formed input.
    #[must_use]
    pub fn render(&self) -> String {
        match self.quote {
            None => self.value.clone(),
            Some(q) => {
                let mut out = String::with_capacity(self.value.len() + 2);
                out.push(q);
                for ch in self.value.chars() {
                    if ch == '\\' || (ch == '"' && q == '"') {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push(q);
                out
            }
        }
    }
}

/// A structured tool invocation extracted from model output.
///
/// Keyword arguments keep emission order so `render` reproduces the input
/// byte-for-byte; lookup goes through [`ToolCall::keyword`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub positional: Vec<ArgValue>,
    pub keyword: Vec<(String, ArgValue)>,
    /// Byte range of the `::TOOL …::` line within the model output.
    pub span: (usize, usize),
}

impl ToolCall {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positional: Vec::new(),
            keyword: Vec::new(),
            span: (0, 0),
        }
    }

    /// Look up a keyword argument by name.
    #[must_use]
    pub fn keyword_arg(&self, key: &str) -> Option<&ArgValue> {
        self.keyword
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Nth positional argument.
    #[must_use]
    pub fn positional_arg(&self, index: usize) -> Option<&ArgValue> {
        self.positional.get(index)
    }

    /// Serialize back to `::TOOL name(args)::` syntax.
    #[must_use]
    pub fn render(&self) -> String {
        let mut args: Vec<String> = Vec::with_capacity(self.positional.len() + self.keyword.len());
        for arg in &self.positional {
            args.push(arg.render());
        }
        for (key, value) in &self.keyword {
            args.push(format!("{key}={}", value.render()));
        }
        format!("::TOOL {}({})::", self.name, args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_value_renders_verbatim() {
        assert_eq!(ArgValue::bare("42").render(), "42");
    }

    #[test]
    fn quoted_value_escapes_quote_and_backslash() {
        let arg = ArgValue::quoted("say \"hi\" \\ bye", '"');
        assert_eq!(arg.render(), r#""say \"hi\" \\ bye""#);
    }

    #[test]
    fn single_quoted_value_keeps_double_quotes() {
        let arg = ArgValue::quoted("a \"b\"", '\'');
        assert_eq!(arg.render(), "'a \"b\"'");
    }

    #[test]
    fn call_renders_positional_then_keyword() {
        let mut call = ToolCall::new("file_read");
        call.positional.push(ArgValue::quoted("notes.txt", '"'));
        call.keyword
            .push(("limit".to_string(), ArgValue::bare("100")));
        assert_eq!(call.render(), "::TOOL file_read(\"notes.txt\", limit=100)::");
    }

    #[test]
    fn keyword_lookup_finds_first_occurrence() {
        let mut call = ToolCall::new("x");
        call.keyword
            .push(("path".to_string(), ArgValue::bare("a")));
        call.keyword
            .push(("path".to_string(), ArgValue::bare("b")));
        assert_eq!(call.keyword_arg("path").unwrap().value, "a");
        assert!(call.keyword_arg("missing").is_none());
    }
}

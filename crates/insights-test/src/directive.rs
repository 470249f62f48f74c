//! Per-file directives carried in the leading comment lines of a test source.
//!
//! Grammar: the first [`HEADER_LINES`] lines are scanned independently for two optional
//! `key:value` directives. The value runs to the end of the line. Order between the two
//! keys and between the lines does not matter; when the same key appears on both lines the
//! first line wins.

use insights_contracts::{DIRECTIVE_STANDARD, DIRECTIVE_TOOL_OPTIONS};

pub const HEADER_LINES: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    /// Full standard flag, e.g. `-std=c++20`.
    pub standard: Option<String>,
    pub tool_options: Vec<String>,
}

impl Directives {
    pub fn parse(source: &str) -> Self {
        let mut out = Directives::default();
        for line in source.lines().take(HEADER_LINES) {
            for (key, value) in tokenize_line(line) {
                match key {
                    DirectiveKey::Standard if out.standard.is_none() => {
                        out.standard = Some(value.to_string());
                    }
                    DirectiveKey::ToolOptions if out.tool_options.is_empty() => {
                        out.tool_options = value.split_whitespace().map(str::to_string).collect();
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKey {
    Standard,
    ToolOptions,
}

impl DirectiveKey {
    const ALL: [DirectiveKey; 2] = [DirectiveKey::Standard, DirectiveKey::ToolOptions];

    fn marker(self) -> &'static str {
        match self {
            DirectiveKey::Standard => DIRECTIVE_STANDARD,
            DirectiveKey::ToolOptions => DIRECTIVE_TOOL_OPTIONS,
        }
    }
}

/// Yields each directive present on `line` with its trimmed, non-empty value.
///
/// A key matches only when immediately followed by `:`, so `cmdline` never matches inside
/// `cmdlineinsights:`. If a key occurs more than once on a line the last occurrence wins.
fn tokenize_line(line: &str) -> Vec<(DirectiveKey, &str)> {
    let mut out = Vec::new();
    for key in DirectiveKey::ALL {
        let needle = format!("{}:", key.marker());
        let Some(pos) = line.rfind(&needle) else {
            continue;
        };
        let value = line[pos + needle.len()..].trim();
        if !value.is_empty() {
            out.push((key, value));
        }
    }
    out
}

//! Parameter list helpers shared by header value parsers

use crate::types::param::Param;

/// Split `input` on `separator`, ignoring separators inside double quotes
/// and inside `<...>` brackets.
pub fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle_depth = 0usize;
    let mut start = 0;

    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes => angle_depth = angle_depth.saturating_sub(1),
            c if c == separator && !in_quotes && angle_depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Strip surrounding double quotes and unescape `\"` / `\\`
pub fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        value.to_string()
    }
}

/// Parse a `;name=value;flag` list. Empty segments are skipped.
pub fn parse_params(input: &str) -> Vec<Param> {
    split_unquoted(input, ';')
        .into_iter()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((name, value)) => Param::new(name.trim(), Some(unquote(value))),
            None => Param::flag(segment),
        })
        .collect()
}

/// Parse a comma separated `name=value` auth-param list as found after the
/// scheme token of WWW-Authenticate / Authorization values.
pub fn parse_auth_params(input: &str) -> Vec<(String, String)> {
    split_unquoted(input, ',')
        .into_iter()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| {
            let (name, value) = segment.split_once('=')?;
            Some((name.trim().to_ascii_lowercase(), unquote(value)))
        })
        .collect()
}

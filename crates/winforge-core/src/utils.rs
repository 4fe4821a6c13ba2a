//! Shared helpers: environment-token expansion, path resolution, and
//! process-output normalization.

use std::path::PathBuf;

/// Home directory of the current user
pub fn get_home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Expand `%VAR%`-style environment tokens in a string
///
/// Unset variables leave the token untouched so a failed lookup is visible
/// in logs rather than silently collapsing to an empty segment.
pub fn expand_env_tokens(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) if !name.is_empty() => output.push_str(&value),
                    _ => {
                        output.push('%');
                        output.push_str(name);
                        output.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                output.push('%');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Resolve a path that may embed `%VAR%` tokens and wildcard segments
///
/// Wildcards return the first match; a pattern with no matches resolves to
/// `None`. Paths without wildcards resolve unconditionally, whether or not
/// they exist yet.
pub fn resolve_path(target: &str) -> Option<PathBuf> {
    let expanded = expand_env_tokens(target);

    if !expanded.contains('*') {
        return Some(PathBuf::from(expanded));
    }

    glob::glob(&expanded)
        .ok()?
        .flatten()
        .next()
}

/// Collapse runs of blank lines into a single blank line
///
/// Interleaved process output tends to double its line breaks; both the
/// per-command capture and the final install-log pass run through this.
pub fn normalize_blank_lines(text: &str) -> String {
    let trailing_newline = text.ends_with('\n');

    let mut lines: Vec<&str> = text.split('\n').collect();
    if trailing_newline {
        lines.pop();
    }

    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut previous_blank = false;

    for line in lines {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        kept.push(line);
        previous_blank = blank;
    }

    let mut output = kept.join("\n");
    if trailing_newline && !output.is_empty() {
        output.push('\n');
    }

    output
}

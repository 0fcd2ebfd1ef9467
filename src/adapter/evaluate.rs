//! Helpers for expression evaluation, completions and the `.scripts`
//! meta-command.

use crate::adapter::scripts::Script;
use crate::transform::{PathTransformer, SourceMapTransformer};
use itertools::Itertools;
use std::fmt::Write as _;

/// Prefix that switches an evaluate request into the scripts meta-command.
pub const SCRIPTS_COMMAND: &str = ".scripts";

/// Longest script source echoed back by `.scripts <url>`.
pub const MAX_SOURCE_CHARS: usize = 100_000;

/// Elide overly long script sources.
pub fn truncate_source(source: &str) -> String {
    if source.chars().count() <= MAX_SOURCE_CHARS {
        return source.to_string();
    }
    let truncated: String = source.chars().take(MAX_SOURCE_CHARS).collect();
    format!("{truncated}[⋯]")
}

/// Render the known-scripts listing: every URL with its mapped client path
/// and bullet-listed authored sources.
pub fn format_scripts_listing<'a>(
    scripts: impl Iterator<Item = &'a Script>,
    paths: &dyn PathTransformer,
    sourcemaps: &dyn SourceMapTransformer,
) -> String {
    let mut out = String::new();

    for script in scripts {
        match paths.target_url_to_client_path(&script.url) {
            Some(path) if path != script.url => {
                _ = writeln!(out, "{} ({})", script.url, path);
            }
            _ => {
                _ = writeln!(out, "{}", script.url);
            }
        }

        for authored in sourcemaps.authored_sources(&script.url) {
            _ = writeln!(out, "  - {authored}");
        }
    }

    out
}

/// Split a completions prefix at the last `.`: the expression to evaluate
/// (when any) and the partial name being completed.
pub fn split_completion_prefix(text: &str, column: u64) -> (Option<String>, String) {
    let upto: String = text
        .chars()
        .take(column.saturating_sub(1) as usize)
        .collect();

    match upto.rfind('.') {
        Some(idx) => (
            Some(upto[..idx].to_string()).filter(|e| !e.is_empty()),
            upto[idx + 1..].to_string(),
        ),
        None => (None, upto),
    }
}

/// Debuggee-side expression collecting own property names along the prototype
/// chain of `expr`.
pub fn proto_walk_expression(expr: &str) -> String {
    format!(
        "(function(x){{var a=[];for(var o=x;o!==null&&typeof o!=='undefined';o=o.__proto__){{a.push(Object.getOwnPropertyNames(o))}};return a}})({expr})"
    )
}

/// Flatten the proto-walk result (an array of name arrays) into unique,
/// non-indexed completion labels.
pub fn flatten_completion_names(value: &serde_json::Value) -> Vec<String> {
    let Some(outer) = value.as_array() else {
        return Vec::new();
    };

    outer
        .iter()
        .filter_map(|names| names.as_array())
        .flatten()
        .filter_map(|name| name.as_str())
        .filter(|name| !crate::adapter::variables::is_indexed_prop_name(name))
        .map(str::to_string)
        .unique()
        .collect()
}

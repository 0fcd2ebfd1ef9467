//! Skip-file (blackbox) management.
//!
//! Two layers decide whether a source is skipped: a pattern list compiled from
//! the `skipFiles` globs and `skipFileRegExps` options, and a per-source
//! override map driven by the user's toggle action. The override wins.
//!
//! The debuggee-side regex dialect supports lookahead, so path exclusions are
//! pushed to CDP as `(?!^path$)(pattern)` wrappers. Locally the exclusion list
//! is consulted instead since the `regex` crate has no lookahead.

use crate::adapter::scripts::ScriptRegistry;
use crate::cdp::CdpClient;
use crate::cdp::types::ScriptPosition;
use crate::muted_error;
use crate::transform::SourceDetail;
use regex::Regex;
use std::collections::HashMap;

struct SkipPattern {
    base_source: String,
    exclusions: Vec<String>,
    regex: Regex,
}

impl SkipPattern {
    fn compile(source: &str) -> Option<SkipPattern> {
        match Regex::new(&format!("(?i){source}")) {
            Ok(regex) => Some(SkipPattern {
                base_source: source.to_string(),
                exclusions: Vec::new(),
                regex,
            }),
            Err(e) => {
                log::warn!(target: "adapter", "invalid skipFiles pattern `{source}`: {e}");
                None
            }
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path) && !self.exclusions.iter().any(|excl| excl == path)
    }

    /// The pattern as pushed to the debuggee, exclusions folded in as
    /// negative lookaheads.
    fn cdp_source(&self) -> String {
        self.exclusions.iter().fold(self.base_source.clone(), |src, excl| {
            format!("(?!^{}$)({src})", regex::escape(excl))
        })
    }
}

#[derive(Default)]
pub struct SkipFileManager {
    patterns: Vec<SkipPattern>,
    overrides: HashMap<String, bool>,
    warned_unsupported: bool,
}

impl SkipFileManager {
    /// Build the pattern list from launch configuration.
    pub fn new(skip_files: &[String], skip_file_reg_exps: &[String]) -> Self {
        let mut patterns = Vec::new();
        for glob in skip_files {
            patterns.extend(SkipPattern::compile(&glob_to_regex(glob)));
        }
        for source in skip_file_reg_exps {
            patterns.extend(SkipPattern::compile(source));
        }

        SkipFileManager {
            patterns,
            overrides: HashMap::new(),
            warned_unsupported: false,
        }
    }

    /// Skip decision for a source: the user override when present, otherwise
    /// `Some(true)` if any pattern matches, otherwise `None` (unknown).
    pub fn should_skip_source(&self, path: &str) -> Option<bool> {
        let normalized = ScriptRegistry::normalize_url(path);
        if let Some(overridden) = self.overrides.get(&normalized) {
            return Some(*overridden);
        }

        if self.patterns.iter().any(|p| p.matches(&normalized)) {
            return Some(true);
        }

        None
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        self.should_skip_source(path) == Some(true)
    }

    /// Start skipping a source: record the override and make the pattern list
    /// agree, either by dropping an exclusion carved out earlier or by adding
    /// an exact-path pattern.
    pub fn enable_skip(&mut self, path: &str) {
        let normalized = ScriptRegistry::normalize_url(path);
        self.overrides.insert(normalized.clone(), true);

        for pattern in &mut self.patterns {
            if let Some(pos) = pattern.exclusions.iter().position(|excl| *excl == normalized) {
                pattern.exclusions.remove(pos);
                return;
            }
        }

        let source = format!("^{}$", regex::escape(&normalized));
        if !self.patterns.iter().any(|p| p.base_source == source) {
            self.patterns.extend(SkipPattern::compile(&source));
        }
    }

    /// Stop skipping a source: record the override, drop an exact-path
    /// pattern added by an earlier enable and carve the path out of every
    /// remaining pattern that matches it.
    pub fn disable_skip(&mut self, path: &str) {
        let normalized = ScriptRegistry::normalize_url(path);
        self.overrides.insert(normalized.clone(), false);

        let exact = format!("^{}$", regex::escape(&normalized));
        self.patterns.retain(|p| p.base_source != exact);

        for pattern in &mut self.patterns {
            if pattern.regex.is_match(&normalized) && !pattern.exclusions.contains(&normalized) {
                pattern.exclusions.push(normalized.clone());
            }
        }
    }

    /// Pattern list as sent to `Debugger.setBlackboxPatterns`.
    pub fn cdp_patterns(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.cdp_source()).collect()
    }

    /// Blackboxed positional ranges for a generated script whose authored
    /// sources have mixed skip state. Walks the authored intervals in order,
    /// every skip-state transition emits a position.
    pub fn library_positions(&self, details: &[SourceDetail], parent_skipped: bool) -> Vec<ScriptPosition> {
        let mut positions = Vec::new();
        let mut in_lib_range = false;

        if parent_skipped {
            positions.push(ScriptPosition {
                line_number: 0,
                column_number: 0,
            });
            in_lib_range = true;
        }

        for detail in details {
            let skipped = self.is_skipped(&detail.path);
            if skipped != in_lib_range {
                positions.push(ScriptPosition {
                    line_number: detail.start_line,
                    column_number: detail.start_column,
                });
                in_lib_range = skipped;
            }
        }

        positions
    }

    /// Push the pattern list to the debuggee. Rejection only means the runtime
    /// has no blackbox support.
    pub fn push_patterns(&mut self, client: &mut CdpClient) {
        let patterns = self.cdp_patterns();
        if muted_error!(client.set_blackbox_patterns(&patterns), "setBlackboxPatterns:").is_none() {
            self.note_unsupported();
        }
    }

    /// Replace the blackboxed ranges of one script: an empty set first to
    /// clear previous state, then the computed positions. The clearing call
    /// completes before the second is issued, keeping the order deterministic.
    pub fn push_ranges(&mut self, client: &mut CdpClient, script_id: &str, positions: &[ScriptPosition]) {
        if muted_error!(client.set_blackboxed_ranges(script_id, &[]), "clear blackboxed ranges:").is_none() {
            self.note_unsupported();
            return;
        }
        if muted_error!(client.set_blackboxed_ranges(script_id, positions), "setBlackboxedRanges:").is_none() {
            self.note_unsupported();
        }
    }

    fn note_unsupported(&mut self) {
        if !self.warned_unsupported {
            self.warned_unsupported = true;
            log::warn!(target: "adapter", "runtime does not support skipFiles");
        }
    }
}

/// Convert a `skipFiles` glob to a regex source. `**/` crosses directories,
/// `*` stays inside one path segment.
fn glob_to_regex(glob: &str) -> String {
    let normalized = glob.replace('\\', "/");
    let mut out = String::from("^");

    let mut rest = normalized.as_str();
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix("**/") {
            out.push_str("(?:.*/)?");
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("**") {
            out.push_str(".*");
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('*') {
            out.push_str("[^/]*");
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('?') {
            out.push('.');
            rest = stripped;
        } else {
            let ch = rest.chars().next().expect("non-empty");
            out.push_str(&regex::escape(&ch.to_string()));
            rest = &rest[ch.len_utf8()..];
        }
    }

    out.push('$');
    out
}

//! Collaborator seams for path translation and source maps.
//!
//! The adapter core never parses a source map itself. It talks to two
//! transformers: a path transformer (client paths <-> target URLs) and a
//! source-map transformer (authored <-> generated positions). Both have
//! do-nothing implementations for sessions that debug plain scripts.

/// A position inside a generated (runtime) script. CDP space, 0-based.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedLocation {
    pub url: String,
    pub line: u64,
    pub column: u64,
}

/// A position inside an authored (pre-transpile) source. CDP space, 0-based.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredLocation {
    pub path: String,
    pub line: u64,
    pub column: u64,
}

/// An authored source mapped into a generated script, with the position at
/// which its generated code begins. Details are reported in generated order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDetail {
    pub path: String,
    pub start_line: u64,
    pub start_column: u64,
}

pub trait PathTransformer {
    /// Rewrite a freshly parsed script URL (for instance a `http://` URL to a
    /// local workspace path). Returning the URL unchanged is always valid.
    fn script_parsed(&mut self, url: &str) -> String;

    /// Translate a client path to the URL of a loaded script, `None` when no
    /// loaded script matches (yet).
    fn client_path_to_target_url(&self, path: &str) -> Option<String>;

    /// Translate a target URL to the path the client knows the file by.
    fn target_url_to_client_path(&self, url: &str) -> Option<String>;
}

pub trait SourceMapTransformer {
    /// Consume a newly parsed script, returns authored sources discovered
    /// through its source map (empty when it has none).
    fn script_parsed(&mut self, url: &str, source_map_url: Option<&str>) -> Vec<String>;

    fn authored_to_generated(&self, path: &str, line: u64, column: u64) -> Option<GeneratedLocation>;

    fn generated_to_authored(&self, url: &str, line: u64, column: u64) -> Option<AuthoredLocation>;

    /// Authored sources mapped into a generated script.
    fn authored_sources(&self, url: &str) -> Vec<String>;

    /// Authored sources of a generated script with their start positions,
    /// in generated order.
    fn source_details(&self, url: &str) -> Vec<SourceDetail>;

    /// The generated script an authored source belongs to.
    fn generated_url_for(&self, authored_path: &str) -> Option<String>;

    /// Contents of an authored source that exists only inside its source map
    /// (`sourcesContent`), `None` when the client can open the file itself.
    fn source_content(&self, _authored_path: &str) -> Option<String> {
        None
    }

    /// Number of source-map fetch/parse jobs still in flight. The session
    /// delays the `initialized` event until this drains to zero.
    fn outstanding_work(&self) -> usize {
        0
    }
}

/// Path transformer for sessions where client paths and script URLs coincide
/// modulo a `file://` prefix.
#[derive(Default)]
pub struct DirectPaths;

impl PathTransformer for DirectPaths {
    fn script_parsed(&mut self, url: &str) -> String {
        url.to_string()
    }

    fn client_path_to_target_url(&self, path: &str) -> Option<String> {
        Some(path.to_string())
    }

    fn target_url_to_client_path(&self, url: &str) -> Option<String> {
        let path = url
            .strip_prefix("file:///")
            .map(|rest| format!("/{rest}"))
            .unwrap_or_else(|| url.to_string());
        Some(path)
    }
}

/// Source-map transformer for sessions without source maps.
#[derive(Default)]
pub struct NoSourceMaps;

impl SourceMapTransformer for NoSourceMaps {
    fn script_parsed(&mut self, _url: &str, _source_map_url: Option<&str>) -> Vec<String> {
        Vec::new()
    }

    fn authored_to_generated(&self, _path: &str, _line: u64, _column: u64) -> Option<GeneratedLocation> {
        None
    }

    fn generated_to_authored(&self, _url: &str, _line: u64, _column: u64) -> Option<AuthoredLocation> {
        None
    }

    fn authored_sources(&self, _url: &str) -> Vec<String> {
        Vec::new()
    }

    fn source_details(&self, _url: &str) -> Vec<SourceDetail> {
        Vec::new()
    }

    fn generated_url_for(&self, _authored_path: &str) -> Option<String> {
        None
    }
}

/// Conversion between the client's line/column base (recorded at `initialize`)
/// and the 0-based debugger space.
#[derive(Debug, Clone, Copy)]
pub struct LineNumbering {
    pub client_lines_start_at1: bool,
    pub client_columns_start_at1: bool,
}

impl Default for LineNumbering {
    fn default() -> Self {
        // the DAP default when the client does not say otherwise
        LineNumbering {
            client_lines_start_at1: true,
            client_columns_start_at1: true,
        }
    }
}

impl LineNumbering {
    pub fn to_debugger_line(&self, line: u64) -> u64 {
        if self.client_lines_start_at1 { line.saturating_sub(1) } else { line }
    }

    pub fn to_debugger_column(&self, column: u64) -> u64 {
        if self.client_columns_start_at1 { column.saturating_sub(1) } else { column }
    }

    pub fn to_client_line(&self, line: u64) -> u64 {
        if self.client_lines_start_at1 { line + 1 } else { line }
    }

    pub fn to_client_column(&self, column: u64) -> u64 {
        if self.client_columns_start_at1 { column + 1 } else { column }
    }
}

//! Registry of every script the runtime reported.

use indexmap::IndexMap;
use std::collections::HashMap;

/// Scheme of the stand-in URL assigned to scripts the runtime reports without one.
pub const PLACEHOLDER_SCHEME: &str = "eval://";

/// A script observed via `Debugger.scriptParsed`. Immutable after first observation.
#[derive(Debug, Clone)]
pub struct Script {
    pub script_id: String,
    pub url: String,
    pub source_map_url: Option<String>,
}

/// Scripts indexed by CDP script id and by normalized URL.
#[derive(Default)]
pub struct ScriptRegistry {
    by_id: IndexMap<String, Script>,
    by_url: HashMap<String, String>,
}

impl ScriptRegistry {
    /// Whether a reported URL belongs to a browser extension and must never
    /// reach the client.
    pub fn is_extension_url(url: &str) -> bool {
        url.starts_with("extensions::") || url.starts_with("chrome-extension://")
    }

    pub fn placeholder_url(script_id: &str) -> String {
        format!("{PLACEHOLDER_SCHEME}{script_id}")
    }

    pub fn is_placeholder_url(url: &str) -> bool {
        url.starts_with(PLACEHOLDER_SCHEME)
    }

    /// Normalize a script URL or path for indexing: forward slashes only,
    /// lower-cased Windows drive letter.
    pub fn normalize_url(url: &str) -> String {
        let mut url = url.replace('\\', "/");

        fn lowercase_drive_at(s: &mut String, at: usize) {
            let drive = s.as_bytes().get(at).copied();
            let colon = s.as_bytes().get(at + 1).copied();
            if let (Some(drive), Some(b':')) = (drive, colon) {
                if drive.is_ascii_uppercase() {
                    let lower = (drive.to_ascii_lowercase() as char).to_string();
                    s.replace_range(at..at + 1, &lower);
                }
            }
        }

        if let Some(rest) = url.strip_prefix("file:///") {
            let offset = url.len() - rest.len();
            lowercase_drive_at(&mut url, offset);
        } else {
            lowercase_drive_at(&mut url, 0);
        }

        url
    }

    /// Register a parsed script, returns it. `url` must already be resolved
    /// (placeholder substituted, path transformer applied).
    pub fn register(&mut self, script_id: String, url: String, source_map_url: Option<String>) -> &Script {
        let normalized = Self::normalize_url(&url);
        self.by_url.insert(normalized, script_id.clone());
        self.by_id
            .entry(script_id.clone())
            .or_insert(Script {
                script_id,
                url,
                source_map_url,
            })
    }

    pub fn get_by_id(&self, script_id: &str) -> Option<&Script> {
        self.by_id.get(script_id)
    }

    pub fn get_by_url(&self, url: &str) -> Option<&Script> {
        let script_id = self.by_url.get(&Self::normalize_url(url))?;
        self.by_id.get(script_id)
    }

    /// All scripts in observation order.
    pub fn all(&self) -> impl Iterator<Item = &Script> {
        self.by_id.values()
    }

    /// Forget everything (execution contexts cleared, e.g. a navigation).
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_url.clear();
    }
}

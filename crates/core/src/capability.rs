//! Session capabilities — which optional tools a run may use.
//!
//! Computed once when a session starts and threaded through every turn
//! configuration unchanged.

use serde::{Deserialize, Serialize};

/// Tools every session gets, backed by the project's sandbox.
pub const SANDBOX_TOOLS: &[&str] = &["shell", "files", "browser", "deploy", "expose", "message"];

pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const DATA_PROVIDERS_TOOL: &str = "data_providers";

/// Immutable capability flags for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Web search is available (search credential configured)
    pub web_search: bool,

    /// External data-provider lookups are available (both provider
    /// credentials configured)
    pub data_providers: bool,
}

impl Capabilities {
    /// Names of every tool enabled for the session, sandbox tools first.
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names = SANDBOX_TOOLS.to_vec();
        if self.web_search {
            names.push(WEB_SEARCH_TOOL);
        }
        if self.data_providers {
            names.push(DATA_PROVIDERS_TOOL);
        }
        names
    }
}

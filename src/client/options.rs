//! What the client registers with the host: which documents it applies to,
//! which files it watches, and how it identifies itself.

use std::path::Path;

/// Identifier the host uses for this client in UI and logs.
pub const CLIENT_ID: &str = "earthlyls";
/// Human-readable display name.
pub const CLIENT_NAME: &str = "Earthly Language Server";
/// Language the document selector is restricted to.
pub const LANGUAGE_ID: &str = "earthfile";
/// URI scheme the document selector is restricted to.
pub const DOCUMENT_SCHEME: &str = "file";
/// Workspace files whose create/change/delete events are forwarded.
pub const WATCH_GLOB: &str = "**/Earthfile";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub id: String,
    pub name: String,
    pub language_id: String,
    pub document_scheme: String,
    pub watch_glob: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            id: CLIENT_ID.to_string(),
            name: CLIENT_NAME.to_string(),
            language_id: LANGUAGE_ID.to_string(),
            document_scheme: DOCUMENT_SCHEME.to_string(),
            watch_glob: WATCH_GLOB.to_string(),
        }
    }
}

impl ClientOptions {
    /// True when `path` falls under the watch subscription.
    ///
    /// The pattern has the fixed `**/<file name>` shape, so matching reduces
    /// to comparing the final path component. Depth under the workspace root
    /// does not matter.
    pub fn watches(&self, path: &Path) -> bool {
        let Some(watched_name) = self.watch_glob.rsplit('/').next() else {
            return false;
        };
        path.file_name().is_some_and(|name| name == watched_name)
    }
}

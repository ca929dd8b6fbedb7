//! Rules document lookup. The rules document is mandatory for any answer that is grounded in it.

use tracing::debug;

use crate::document::{Document, DocumentStore};
use crate::errors::{CoreError, Result};
use crate::settings::Settings;

/// File name appended to `rules_directory`.
pub const RULES_FILE_NAME: &str = "rules.md";

/// Path of the rules document: `rules_directory` followed by `rules.md`.
///
/// The two are concatenated as-is, so a directory must carry its own
/// trailing `/` ("Projects/dishrag/" → "Projects/dishrag/rules.md").
pub fn rules_path(settings: &Settings) -> String {
    format!("{}{}", settings.rules_directory, RULES_FILE_NAME)
}

/// Read the rules document, failing with [`CoreError::RuleFileMissing`] if it is absent.
pub async fn load_rules(store: &dyn DocumentStore, settings: &Settings) -> Result<Document> {
    let path = rules_path(settings);
    match store.read_by_path(&path).await? {
        Some(doc) => {
            debug!(%path, bytes = doc.content.len(), "loaded rules");
            Ok(doc)
        }
        None => Err(CoreError::RuleFileMissing { path }),
    }
}

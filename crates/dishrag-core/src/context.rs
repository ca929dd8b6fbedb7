//! Plain-text corpus context.
//!
//! Every document outside the reserved `Templates/` namespace whose path
//! starts with the configured filter is read, framed under its name, and
//! appended in enumeration order. Reads happen one at a time, and a failed
//! read fails the whole aggregation.

use std::io::{Error as IoError, ErrorKind};

use tracing::debug;

use crate::document::{DocumentMeta, DocumentStore};
use crate::errors::{CoreError, Result};
use crate::settings::Settings;

/// Namespace never used as context, whatever the filter (matched ASCII case-insensitively).
pub const EXCLUDED_PREFIX: &str = "Templates/";

/// Concatenated corpus context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle {
    pub text: String,
    /// Paths of the included documents, in order.
    pub documents: Vec<String>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub fn is_excluded(path: &str) -> bool {
    path.get(..EXCLUDED_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(EXCLUDED_PREFIX))
}

/// Documents that would be used as context, in enumeration order.
pub fn select(entries: Vec<DocumentMeta>, filter: &str) -> Vec<DocumentMeta> {
    entries
        .into_iter()
        .filter(|d| !is_excluded(&d.path) && d.path.starts_with(filter))
        .collect()
}

/// Header and body for one document.
pub fn frame(name: &str, content: &str) -> String {
    format!("\n\n---\n# {name}\n\n{content}")
}

pub async fn aggregate(store: &dyn DocumentStore, settings: &Settings) -> Result<ContextBundle> {
    let listed = store.list().await?;
    let total = listed.len();
    let kept = select(listed, &settings.corpus_root_filter);

    let mut bundle = ContextBundle::default();
    for meta in kept {
        let doc = store.read_by_path(&meta.path).await?.ok_or_else(|| {
            CoreError::io(
                &meta.path,
                IoError::new(ErrorKind::NotFound, "listed document disappeared"),
            )
        })?;
        bundle.text.push_str(&frame(&doc.name, &doc.content));
        bundle.documents.push(doc.path);
    }

    debug!(
        total,
        included = bundle.documents.len(),
        bytes = bundle.text.len(),
        filter = %settings.corpus_root_filter,
        "aggregated corpus context"
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, MemoryStore};
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn settings(filter: &str) -> Settings {
        Settings {
            corpus_root_filter: filter.to_string(),
            ..Settings::default()
        }
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn exclusion_is_case_insensitive_on_the_prefix_only() {
        assert!(is_excluded("Templates/daily.md"));
        assert!(is_excluded("templates/a.md"));
        assert!(!is_excluded("Projects/Templates/a.md"));
        assert!(!is_excluded("Templates.md"));
        assert!(!is_excluded("é"));
    }

    #[tokio::test]
    async fn templates_never_included_even_when_filtered_for() {
        let store = MemoryStore::from_pairs([("templates/a.md", "X"), ("b.md", "Y")]);
        let bundle = aggregate(&store, &settings("")).await.unwrap();
        assert!(bundle.text.contains('Y'));
        assert!(!bundle.text.contains('X'));
        assert_eq!(bundle.documents, vec!["b.md"]);

        let bundle = aggregate(&store, &settings("templates/")).await.unwrap();
        assert!(bundle.is_empty());
        assert_eq!(bundle.text, "");
    }

    #[tokio::test]
    async fn filter_keeps_matching_prefix() {
        let store = MemoryStore::from_pairs([
            ("Projects/dishrag/a.md", "alpha"),
            ("Journal/b.md", "beta"),
            ("Projects/other.md", "gamma"),
        ]);
        let bundle = aggregate(&store, &settings("Projects/")).await.unwrap();
        assert_eq!(
            bundle.documents,
            vec!["Projects/dishrag/a.md", "Projects/other.md"]
        );
        assert_eq!(
            bundle.text,
            "\n\n---\n# a\n\nalpha\n\n---\n# other\n\ngamma"
        );
    }

    #[tokio::test]
    async fn empty_corpus_yields_empty_bundle() {
        let bundle = aggregate(&MemoryStore::new(), &settings("")).await.unwrap();
        assert_eq!(bundle, ContextBundle::default());
    }

    struct VanishingStore;

    #[async_trait]
    impl DocumentStore for VanishingStore {
        async fn list(&self) -> Result<Vec<DocumentMeta>> {
            Ok(vec![DocumentMeta::new("a.md"), DocumentMeta::new("b.md")])
        }

        async fn read_by_path(&self, path: &str) -> Result<Option<Document>> {
            Ok((path == "a.md").then(|| Document {
                path: path.into(),
                name: "a".into(),
                content: "A".into(),
            }))
        }
    }

    #[tokio::test]
    async fn failed_read_fails_the_whole_aggregation() {
        let err = aggregate(&VanishingStore, &settings("")).await.unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    fn corpus() -> impl Strategy<Value = Vec<String>> {
        let prefix = prop_oneof![
            Just(""),
            Just("Templates/"),
            Just("templates/"),
            Just("Notes/"),
            Just("Projects/"),
            Just("Projects/Templates/"),
        ];
        proptest::collection::vec((prefix, "[a-z]{1,6}"), 0..12)
            .prop_map(|items| {
                items
                    .into_iter()
                    .map(|(p, n)| format!("{p}{n}.md"))
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn included_documents_appear_once_in_order_and_templates_never(
            paths in corpus(),
            filter in prop_oneof![Just(""), Just("Notes/"), Just("Projects/"), Just("Templates/")],
        ) {
            let mut store = MemoryStore::new();
            for (i, path) in paths.iter().enumerate() {
                store.insert(path.clone(), format!("<<{i}>>"));
            }
            let listed = block_on(store.list()).unwrap();
            let bundle = block_on(aggregate(&store, &settings(filter))).unwrap();

            let mut last = 0;
            for meta in &listed {
                let doc = block_on(store.read_by_path(&meta.path)).unwrap().unwrap();
                let framed = frame(&doc.name, &doc.content);
                let hits = bundle.text.matches(&framed).count();
                if is_excluded(&meta.path) || !meta.path.starts_with(filter) {
                    prop_assert!(!bundle.text.contains(&doc.content));
                } else {
                    prop_assert_eq!(hits, 1);
                    let at = bundle.text.find(&framed).unwrap();
                    prop_assert!(at >= last);
                    last = at;
                }
            }
            prop_assert!(bundle.documents.iter().all(|p| !is_excluded(p)));
        }
    }
}

//! Core data model and document access for dishrag.
//!
//! - [`settings`]: the persisted configuration and its update path
//! - [`document`]: the corpus abstraction and its filesystem/in-memory stores
//! - [`rules`]: the mandatory rules document
//! - [`context`]: plain-text corpus context for retrieval-augmented answers

pub mod context;
pub mod document;
pub mod errors;
pub mod rules;
pub mod settings;

pub use context::{aggregate, ContextBundle};
pub use document::{Document, DocumentMeta, DocumentStore, FsStore, MemoryStore};
pub use errors::{CoreError, Result};
pub use rules::{load_rules, rules_path};
pub use settings::{MaskedSettings, Settings, SettingsPatch};

//! One answer run: validate → rules → context → prompt → dispatch → post-process.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dishrag_core::{CoreError, DocumentStore, Settings};

use crate::engine::{Dispatcher, InferenceError};
use crate::{parse, prompt};

/// Inserted in place of an answer when the backend fails.
pub const FAILURE_PLACEHOLDER: &str = "[dishrag: no answer, the model backend failed]";

/// How much grounding an answer gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Selection only.
    Plain,
    /// Selection plus the rules document.
    Rules,
    /// Selection, rules document and corpus context.
    #[default]
    Rag,
}

impl AnswerMode {
    fn needs_rules(self) -> bool {
        matches!(self, Self::Rules | Self::Rag)
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Rules => "rules",
            Self::Rag => "rag",
        })
    }
}

impl FromStr for AnswerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "rules" => Ok(Self::Rules),
            "rag" => Ok(Self::Rag),
            other => Err(format!("unknown mode '{other}' (expected plain, rules or rag)")),
        }
    }
}

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ValidatingInput,
    AggregatingContext,
    AssemblingPrompt,
    Dispatching,
    PostProcessing,
    Delivered,
}

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("no text selected")]
    EmptySelection,
    #[error("rules file not found at '{path}'")]
    RuleFileMissing { path: String },
    #[error("could not read documents: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: CoreError,
    },
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

impl AnswerError {
    /// The stage the run stopped in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::EmptySelection | Self::RuleFileMissing { .. } => Stage::ValidatingInput,
            Self::Store { stage, .. } => *stage,
            Self::Inference(InferenceError::ReasoningOnly { .. }) => Stage::PostProcessing,
            Self::Inference(_) => Stage::Dispatching,
        }
    }

    /// Aborted runs stop before dispatch; failed runs stop in it.
    pub fn is_inference_failure(&self) -> bool {
        matches!(self, Self::Inference(_))
    }

    fn from_store(stage: Stage, err: CoreError) -> Self {
        match err {
            CoreError::RuleFileMissing { path } => Self::RuleFileMissing { path },
            source => Self::Store { stage, source },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Corpus paths folded into the prompt.
    pub sources: Vec<String>,
}

/// What the editor should do with a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorReply {
    pub insert: Option<String>,
    pub notice: Option<String>,
}

/// Answers go in; backend failures insert the placeholder and notify; aborts only notify.
pub fn editor_reply(result: &Result<Answer, AnswerError>) -> EditorReply {
    match result {
        Ok(answer) => EditorReply {
            insert: Some(answer.text.clone()),
            notice: None,
        },
        Err(err) if err.is_inference_failure() => EditorReply {
            insert: Some(FAILURE_PLACEHOLDER.to_string()),
            notice: Some(err.to_string()),
        },
        Err(err) => EditorReply {
            insert: None,
            notice: Some(err.to_string()),
        },
    }
}

/// Runs the answer pipeline against one corpus.
#[derive(Clone)]
pub struct Answerer {
    store: Arc<dyn DocumentStore>,
    dispatcher: Dispatcher,
}

impl Answerer {
    pub fn new(store: Arc<dyn DocumentStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Answer `selection`. `settings` is a snapshot taken when the run was triggered.
    pub async fn answer(
        &self,
        settings: &Settings,
        selection: &str,
        mode: AnswerMode,
    ) -> Result<Answer, AnswerError> {
        let result = self.run(settings, selection, mode).await;
        match &result {
            Ok(answer) => info!(
                %mode,
                sources = answer.sources.len(),
                bytes = answer.text.len(),
                "answer delivered"
            ),
            Err(err) => warn!(%mode, stage = ?err.stage(), error = %err, "answer not delivered"),
        }
        result
    }

    async fn run(
        &self,
        settings: &Settings,
        selection: &str,
        mode: AnswerMode,
    ) -> Result<Answer, AnswerError> {
        enter(Stage::ValidatingInput);
        if selection.trim().is_empty() {
            return Err(AnswerError::EmptySelection);
        }
        let rules = if mode.needs_rules() {
            dishrag_core::load_rules(self.store(), settings)
                .await
                .map_err(|e| AnswerError::from_store(Stage::ValidatingInput, e))?
                .content
        } else {
            String::new()
        };

        let bundle = if mode == AnswerMode::Rag {
            enter(Stage::AggregatingContext);
            dishrag_core::aggregate(self.store(), settings)
                .await
                .map_err(|e| AnswerError::from_store(Stage::AggregatingContext, e))?
        } else {
            Default::default()
        };

        enter(Stage::AssemblingPrompt);
        let payload = prompt::assemble(&rules, &bundle.text, selection).render();

        enter(Stage::Dispatching);
        let raw = self.dispatcher.dispatch(settings, &payload).await?;

        enter(Stage::PostProcessing);
        let text = parse::strip_reasoning(&raw);
        if text.is_empty() {
            let backend = self.dispatcher.select(settings).kind();
            return Err(InferenceError::ReasoningOnly { backend }.into());
        }

        enter(Stage::Delivered);
        Ok(Answer {
            text,
            sources: bundle.documents,
        })
    }
}

fn enter(stage: Stage) {
    debug!(?stage, "pipeline stage");
}

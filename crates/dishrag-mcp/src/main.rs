use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dishrag_answer::{editor_reply, AnswerMode, Answerer, Dispatcher, EditorReply};
use dishrag_core::settings::{self, Settings, SettingsPatch};
use dishrag_core::{context, DocumentStore, FsStore};

// --- Requests ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AskRequest {
    /// The selected text to answer
    selection: String,
    /// "plain" (selection only), "rules" (plus the rules document) or "rag" (plus corpus context). Defaults to "rag".
    mode: Option<String>,
}

// --- Server ---

/// Source of `DISHRAG_*` overrides; the process environment outside tests.
type Overrides = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The persisted file layer and the effective settings derived from it.
struct SettingsLayers {
    stored: Settings,
    effective: Settings,
}

#[derive(Clone)]
pub struct DishragServer {
    answerer: Answerer,
    settings: Arc<RwLock<SettingsLayers>>,
    overrides: Overrides,
    settings_file: PathBuf,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DishragServer {
    /// `stored` is the file layer only; `overrides` are applied on top of it.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        dispatcher: Dispatcher,
        stored: Settings,
        settings_file: PathBuf,
        overrides: Overrides,
    ) -> Self {
        let effective = with_overrides(&stored, &overrides);
        Self {
            answerer: Answerer::new(store, dispatcher),
            settings: Arc::new(RwLock::new(SettingsLayers { stored, effective })),
            overrides,
            settings_file,
            tool_router: Self::tool_router(),
        }
    }

    /// Settings as of now; later updates never reach a run already started.
    fn snapshot(&self) -> Settings {
        self.settings.read().effective.clone()
    }

    #[tool(
        description = "Answer the selected text with the configured model. Returns the text to insert at the cursor; errors carry a notice for the user and, when the model failed, a placeholder to insert instead."
    )]
    async fn ask(
        &self,
        Parameters(req): Parameters<AskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mode = match req.mode.as_deref().map(str::parse::<AnswerMode>).transpose() {
            Ok(mode) => mode.unwrap_or_default(),
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        let settings = self.snapshot();
        let result = self.answerer.answer(&settings, &req.selection, mode).await;
        Ok(reply_result(editor_reply(&result)))
    }

    #[tool(description = "Get the current settings. The API key is reported only as hasKey.")]
    fn get_settings(&self) -> Result<CallToolResult, McpError> {
        Ok(json_result(&self.settings.read().effective.masked()))
    }

    #[tool(
        description = "Update settings. Only the given fields change; an empty apiKey or base URL clears it. Changes are saved and apply to the next ask."
    )]
    fn update_settings(
        &self,
        Parameters(patch): Parameters<SettingsPatch>,
    ) -> Result<CallToolResult, McpError> {
        let mut layers = self.settings.write();
        let mut stored = layers.stored.clone();
        patch.apply(&mut stored);
        if let Err(e) = settings::write_settings_to_path(&self.settings_file, &stored) {
            error!(error = %e, "failed to save settings");
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to save settings: {e}"
            ))]));
        }
        layers.effective = with_overrides(&stored, &self.overrides);
        layers.stored = stored;
        let effective = &layers.effective;
        info!(model = %effective.model_id, local = effective.use_local_backend, "settings updated");
        Ok(json_result(&effective.masked()))
    }

    #[tool(description = "List the corpus documents that rag mode would use as context")]
    async fn list_documents(&self) -> Result<CallToolResult, McpError> {
        let filter = self.settings.read().effective.corpus_root_filter.clone();
        match self.answerer.store().list().await {
            Ok(listed) => {
                let paths: Vec<String> = context::select(listed, &filter)
                    .into_iter()
                    .map(|d| d.path)
                    .collect();
                let text = if paths.is_empty() {
                    "No documents match the corpus filter.".to_string()
                } else {
                    paths.join("\n")
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to list documents: {e}"
            ))])),
        }
    }

    #[tool(description = "Get the rules document that every rules and rag answer must follow")]
    async fn get_rules(&self) -> Result<CallToolResult, McpError> {
        let settings = self.snapshot();
        match dishrag_core::load_rules(self.answerer.store(), &settings).await {
            Ok(doc) => Ok(CallToolResult::success(vec![Content::text(doc.content)])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

#[tool_handler]
impl ServerHandler for DishragServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn with_overrides(stored: &Settings, overrides: &Overrides) -> Settings {
    let mut effective = stored.clone();
    settings::apply_overrides_from(&mut effective, overrides.as_ref());
    effective
}

/// Insert-only replies succeed; anything with a notice is an error result.
fn reply_result(reply: EditorReply) -> CallToolResult {
    match reply.notice {
        None => CallToolResult::success(vec![Content::text(reply.insert.unwrap_or_default())]),
        Some(notice) => {
            let mut content = vec![Content::text(notice)];
            content.extend(reply.insert.map(Content::text));
            CallToolResult::error(content)
        }
    }
}

fn json_result<T: serde::Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(json) => CallToolResult::success(vec![Content::text(json)]),
        Err(e) => CallToolResult::error(vec![Content::text(format!("Serialization error: {e}"))]),
    }
}

/// Corpus root from the first argument, then `DISHRAG_VAULT`. Empty values are skipped.
fn vault_root(arg: Option<String>, env: Option<String>) -> Option<PathBuf> {
    arg.into_iter()
        .chain(env)
        .find(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

const INSTRUCTIONS: &str = r#"dishrag answers questions selected in a markdown vault.

Call `ask` with the selected text and insert the returned text at the cursor. Modes:
- `plain`: the selection alone is sent to the model.
- `rules`: the rules document (`<rulesDirectory>rules.md`) is sent ahead of the selection.
- `rag` (default): the rules document and every vault document under the corpus filter are sent. Documents under `Templates/` are never used.

An error result carries a notice for the user. If it also carries a second text, insert that placeholder where the answer would have gone.

Use `get_settings` / `update_settings` to switch between the local (Ollama) and hosted backend, the model, and the filters."#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dishrag=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let root = match vault_root(std::env::args().nth(1), std::env::var("DISHRAG_VAULT").ok()) {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let settings_file = settings::settings_path();
    let stored = settings::read_settings_file(&settings_file)?;
    let server = DishragServer::new(
        Arc::new(FsStore::new(root.clone())),
        Dispatcher::default(),
        stored,
        settings_file,
        Arc::new(|name: &str| std::env::var(name).ok()),
    );
    let effective = server.snapshot();
    info!(
        vault = %root.display(),
        local = effective.use_local_backend,
        model = %effective.model_id,
        "starting dishrag-mcp"
    );
    let service = server
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}

//! Action modules: the explicit plugin interface the engine hosts.
//!
//! An action module is an externally supplied unit exposing metadata (its
//! kind, selection key, and output extension), declared [`Terms`] it provides
//! or consumes, and one executable entry point. The engine depends only on
//! this interface, never on how a given plugin is packaged: a manifest file
//! on disk carries the metadata and terms, and names an [`ActionRunner`]
//! registered in a [`RunnerMap`].
//!
//! ## Key components
//!
//! - [`ActionRunner`] trait — the fixed set of entry points a plugin
//!   implements (`run` required, `setup`/`cleanup` optional)
//! - [`RunnerMap`] — registry of named runner entry points (accessible via
//!   the global [`RUNNERS`], or an injected instance in tests)
//! - [`ActionRecord`] — one discovered module: manifest reference, metadata,
//!   terms, and entry-point name
//! - [`ActionManager`] — wraps one resolved module plus its contract and
//!   hook manager, owning its lifecycle
//!
//! Register custom runners via [`RunnerMap::insert`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use scriv_core::{
//!     action::{ActionRunner, Invocation, RunPayload, RunnerContext, RUNNERS},
//!     ScrivError,
//! };
//!
//! struct MyParser;
//!
//! #[async_trait::async_trait]
//! impl ActionRunner for MyParser {
//!     async fn run(
//!         &self,
//!         invocation: Invocation,
//!         _ctx: &RunnerContext,
//!     ) -> Result<RunPayload, ScrivError> {
//!         let content = invocation.content.unwrap_or_default();
//!         Ok(RunPayload::parsed(serde_json::json!({
//!             "lines": content.lines().count(),
//!         })))
//!     }
//! }
//!
//! RUNNERS.insert("my-parser", Arc::new(MyParser));
//! ```

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    contract::Contract,
    error::ScrivError,
    hook::{HookEvent, HookManager},
    terms::Terms,
};

/// Global default runner registry, modelled as a singleton so embedding code
/// can register plugin entry points once at startup.
pub static RUNNERS: Lazy<RunnerMap> = Lazy::new(RunnerMap::create);

/// The two action kinds the engine negotiates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Parser,
    Printer,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Parser => "parser",
            ActionKind::Printer => "printer",
        }
    }

    /// The manifest field carrying this kind's selection key.
    pub fn selector_key(&self) -> &'static str {
        match self {
            ActionKind::Parser => "language",
            ActionKind::Printer => "format",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable metadata an action module exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMeta {
    pub kind: ActionKind,
    /// Selection key: a language name for parsers, a format name for
    /// printers.
    pub selector: String,
    /// Output extension a printer declares (without leading dot). Parsers
    /// carry the source extension they understand.
    pub extension: String,
}

/// Arguments handed to a runner's `run` entry point.
///
/// Parsers receive the source `content`; printers receive the structured
/// `document` the parser produced.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub file: PathBuf,
    pub content: Option<String>,
    pub document: Option<Value>,
}

/// What a runner's `run` entry point resolves with.
#[derive(Debug, Clone, Default)]
pub struct RunPayload {
    /// Structured document (parser output), validated against both
    /// negotiated contracts before printing.
    pub document: Option<Value>,
    /// Rendered output text (printer output). `None` or empty marks the file
    /// as "warning: no content".
    pub rendered: Option<String>,
}

impl RunPayload {
    pub fn parsed(document: Value) -> Self {
        RunPayload {
            document: Some(document),
            rendered: None,
        }
    }

    pub fn rendered(output: impl Into<String>) -> Self {
        RunPayload {
            document: None,
            rendered: Some(output.into()),
        }
    }
}

/// Explicit context handed to runner entry points: the owning manager's
/// metadata plus its hook manager, so plugins can raise `enter`/`exit`/
/// `section_load` events while running.
#[derive(Clone)]
pub struct RunnerContext {
    pub meta: ActionMeta,
    pub hooks: Arc<HookManager>,
}

/// The fixed plugin interface.
///
/// `run` is required; `setup` and `cleanup` default to no-ops. Runners are
/// shared read-only by all concurrent pipeline invocations and must be
/// `Send + Sync`.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn setup(&self, _ctx: &RunnerContext) -> Result<(), ScrivError> {
        Ok(())
    }

    async fn run(&self, invocation: Invocation, ctx: &RunnerContext)
        -> Result<RunPayload, ScrivError>;

    async fn cleanup(&self) -> Result<(), ScrivError> {
        Ok(())
    }
}

/// Registry of named runner entry points.
pub struct RunnerMap(Arc<RwLock<Vec<(String, Arc<dyn ActionRunner>)>>>);

impl Clone for RunnerMap {
    fn clone(&self) -> Self {
        RunnerMap(self.0.clone())
    }
}

impl Default for RunnerMap {
    fn default() -> Self {
        Self::create()
    }
}

impl RunnerMap {
    pub fn create() -> Self {
        RunnerMap(Arc::new(RwLock::new(Vec::new())))
    }

    pub fn insert(&self, entry: impl Into<String>, runner: Arc<dyn ActionRunner>) {
        let entry = entry.into();
        let mut writer = self.0.write();
        if let Some(existing) = writer.iter_mut().find(|(name, _)| name == &entry) {
            existing.1 = runner;
        } else {
            writer.push((entry, runner));
        }
    }

    pub fn get(&self, entry: &str) -> Option<Arc<dyn ActionRunner>> {
        self.0
            .read()
            .iter()
            .find(|(name, _)| name == entry)
            .map(|(_, runner)| runner.clone())
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.read().iter().map(|(name, _)| name.clone()).collect()
    }
}

/// One discovered action module.
///
/// Created during discovery, owned by discovery until handed to negotiation,
/// read-only thereafter.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    /// Manifest file this record was loaded from.
    pub file: PathBuf,
    pub meta: ActionMeta,
    /// Provided terms for parsers, consumed terms for printers.
    pub terms: Terms,
    /// Name of the runner entry point in the [`RunnerMap`].
    pub entry: String,
    /// Set when this record was loaded as an explicit override for a kind.
    pub override_kind: Option<ActionKind>,
}

/// Wraps one resolved action module, owning its lifecycle and its attached
/// hook manager.
pub struct ActionManager {
    record: ActionRecord,
    runner: Arc<dyn ActionRunner>,
    contract: Contract,
    hooks: Arc<HookManager>,
}

impl std::fmt::Debug for ActionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionManager")
            .field("record", &self.record)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

impl ActionManager {
    /// Resolve `record`'s entry point against `runners`.
    ///
    /// A record naming an entry point no runner registered is a fatal
    /// configuration error, not a per-file error.
    pub fn new(
        record: ActionRecord,
        contract: Contract,
        runners: &RunnerMap,
        hooks: Arc<HookManager>,
    ) -> Result<Self, ScrivError> {
        let runner = runners
            .get(&record.entry)
            .ok_or_else(|| ScrivError::MissingEntryPoint(record.entry.clone()))?;

        tracing::debug!(
            "[ActionManager] Resolved {} action `{}` (entry `{}`)",
            record.meta.kind,
            record.meta.selector,
            record.entry
        );

        Ok(ActionManager {
            record,
            runner,
            contract,
            hooks,
        })
    }

    pub fn meta(&self) -> &ActionMeta {
        &self.record.meta
    }

    pub fn record(&self) -> &ActionRecord {
        &self.record
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    fn context(&self) -> RunnerContext {
        RunnerContext {
            meta: self.record.meta.clone(),
            hooks: self.hooks.clone(),
        }
    }

    fn lifecycle_args(&self) -> Value {
        json!({
            "action": self.record.meta.selector,
            "kind": self.record.meta.kind,
        })
    }

    /// Run the module's `setup`, wrapped by the hook `start` lifecycle call.
    pub async fn setup_action(&self) -> Result<(), ScrivError> {
        tracing::debug!(
            "[ActionManager] Setting up {} action",
            self.record.meta.kind
        );

        self.hooks
            .trigger(HookEvent::Start, self.lifecycle_args())
            .await?;
        self.runner.setup(&self.context()).await
    }

    /// Invoke the module's `run` entry point and return its result unchanged.
    pub async fn run_action(&self, invocation: Invocation) -> Result<RunPayload, ScrivError> {
        self.runner.run(invocation, &self.context()).await
    }

    /// Run the module's `cleanup`, wrapped by the hook `end` lifecycle call.
    pub async fn cleanup_action(&self) -> Result<(), ScrivError> {
        tracing::debug!(
            "[ActionManager] Cleaning up {} action",
            self.record.meta.kind
        );

        self.runner.cleanup().await?;
        self.hooks
            .trigger(HookEvent::End, self.lifecycle_args())
            .await?;
        Ok(())
    }
}

//! User-supplied lifecycle hooks with bounded-timeout invocation.
//!
//! A hooks file maps an action kind (`parse`/`print`) to a mapping from event
//! name to handler. The engine resolves the configured file against a
//! [`HookLibrary`] (keyed by file stem), attaches one [`HookManager`] to each
//! action manager, and triggers events at defined pipeline points. Plugins
//! may raise additional events ([`HookEvent::Enter`], [`HookEvent::Exit`],
//! [`HookEvent::SectionLoad`]) through their manager while running.
//!
//! Every hook invocation races the handler against a configurable timeout.
//! Whichever settles first decides the outcome: a late-firing handler result
//! after the timeout is discarded, never awaited further.

use std::{collections::HashMap, future::Future, path::Path, sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{action::ActionKind, error::ScrivError};

/// Global default hook library. Embedding code registers hook sets here;
/// tests construct their own [`HookLibrary`] instances instead.
pub static HOOKS: Lazy<HookLibrary> = Lazy::new(HookLibrary::create);

/// Lifecycle events a hook handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    Start,
    SectionLoad,
    Enter,
    Exit,
    End,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Start => "start",
            HookEvent::SectionLoad => "section_load",
            HookEvent::Enter => "enter",
            HookEvent::Exit => "exit",
            HookEvent::End => "end",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status a handler reports back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    Success,
    Error,
}

/// The value a hook handler resolves with.
///
/// A handler reporting [`HookStatus::Error`] aborts the triggering stage:
/// the trigger call re-raises the handler's own error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookOutcome {
    pub status: HookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl HookOutcome {
    pub fn success() -> Self {
        HookOutcome {
            status: HookStatus::Success,
            error: None,
            payload: None,
        }
    }

    pub fn with_payload(payload: Value) -> Self {
        HookOutcome {
            status: HookStatus::Success,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        HookOutcome {
            status: HookStatus::Error,
            error: Some(message.into()),
            payload: None,
        }
    }
}

/// Explicit context handed to every hook handler.
///
/// Handlers receive the owning action's identity rather than any implicit
/// binding, so the same hook set can serve both pipeline sides.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub kind: ActionKind,
    pub selector: String,
}

type HookFn = Arc<dyn Fn(Value, HookContext) -> BoxFuture<'static, HookOutcome> + Send + Sync>;

/// The handler mapping a hooks file exports: action kind × event → handler.
///
/// Loaded once per run and shared read-only by all concurrent pipeline
/// invocations for that action kind.
#[derive(Default, Clone)]
pub struct HookSet {
    handlers: HashMap<(ActionKind, HookEvent), HookFn>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event` on the given action kind.
    pub fn on<F, Fut>(&mut self, kind: ActionKind, event: HookEvent, handler: F)
    where
        F: Fn(Value, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookOutcome> + Send + 'static,
    {
        self.handlers.insert(
            (kind, event),
            Arc::new(move |args, ctx| handler(args, ctx).boxed()),
        );
    }

    pub fn get(&self, kind: ActionKind, event: HookEvent) -> Option<&HookFn> {
        self.handlers.get(&(kind, event))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Registry of named hook sets, keyed by the stem of the hooks file that
/// exported them.
pub struct HookLibrary(Arc<RwLock<Vec<(String, Arc<HookSet>)>>>);

impl Clone for HookLibrary {
    fn clone(&self) -> Self {
        HookLibrary(self.0.clone())
    }
}

impl Default for HookLibrary {
    fn default() -> Self {
        Self::create()
    }
}

impl HookLibrary {
    pub fn create() -> Self {
        HookLibrary(Arc::new(RwLock::new(Vec::new())))
    }

    pub fn insert(&self, name: impl Into<String>, set: HookSet) {
        let name = name.into();
        let mut writer = self.0.write();
        if let Some(existing) = writer.iter_mut().find(|(n, _)| n == &name) {
            existing.1 = Arc::new(set);
        } else {
            writer.push((name, Arc::new(set)));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<HookSet>> {
        self.0
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, set)| set.clone())
    }
}

/// Invokes hook handlers for one action kind, racing each against a timeout.
pub struct HookManager {
    kind: ActionKind,
    selector: String,
    set: Option<Arc<HookSet>>,
    timeout: Duration,
}

impl HookManager {
    /// Resolve the configured hooks file against `library`.
    ///
    /// A missing file, or a file whose stem no hook set was registered
    /// under, logs a warning and yields a manager that triggers nothing —
    /// absent hooks are never an error.
    pub fn load(
        library: &HookLibrary,
        hooks_file: Option<&Path>,
        kind: ActionKind,
        selector: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        let set = hooks_file.and_then(|file| {
            if !file.exists() {
                tracing::warn!("[HookManager] File not found: {:?}", file);
                return None;
            }

            let stem = file.file_stem()?.to_string_lossy().to_string();
            let found = library.get(&stem);

            if found.is_none() {
                tracing::warn!("[HookManager] No hooks registered for {:?}", file);
            }

            found
        });

        if let Some(set) = &set {
            tracing::debug!(
                "[HookManager] Loaded hook set for {} ({} handlers overall)",
                kind,
                set.handlers.len()
            );
        }

        HookManager {
            kind,
            selector: selector.into(),
            set,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// A manager with no hooks attached. Every trigger is a no-op success.
    pub fn disabled(kind: ActionKind, selector: impl Into<String>, timeout_ms: u64) -> Self {
        HookManager {
            kind,
            selector: selector.into(),
            set: None,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Invoke the handler registered for `event`, if any.
    ///
    /// The handler races a timer: if the timer elapses first the invocation
    /// fails with [`ScrivError::HookTimeout`] and the handler future is
    /// dropped. A handler that resolves with an error status has that error
    /// re-raised as the trigger's failure.
    pub async fn trigger(&self, event: HookEvent, args: Value) -> Result<Option<Value>, ScrivError> {
        let Some(handler) = self.set.as_ref().and_then(|s| s.get(self.kind, event)) else {
            tracing::debug!("[HookManager] No {} hook for event {}", self.kind, event);
            return Ok(None);
        };

        tracing::debug!("[HookManager] Triggering {} hook for {}", self.kind, event);

        let ctx = HookContext {
            kind: self.kind,
            selector: self.selector.clone(),
        };

        let outcome = tokio::time::timeout(self.timeout, handler(args, ctx))
            .await
            .map_err(|_| ScrivError::HookTimeout {
                event: event.as_str().to_string(),
                millis: self.timeout.as_millis() as u64,
            })?;

        match outcome.status {
            HookStatus::Error => Err(ScrivError::Hook(outcome.error.unwrap_or_else(|| {
                format!("hook `{event}` reported an error without a message")
            }))),
            HookStatus::Success => Ok(outcome.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager_with(set: HookSet, timeout_ms: u64) -> HookManager {
        HookManager {
            kind: ActionKind::Parser,
            selector: "lpc".to_string(),
            set: Some(Arc::new(set)),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn trigger_without_handler_is_noop_success() {
        let manager = HookManager::disabled(ActionKind::Parser, "lpc", 100);
        let result = manager.trigger(HookEvent::Start, json!({})).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn trigger_returns_handler_payload() {
        let mut set = HookSet::new();
        set.on(ActionKind::Parser, HookEvent::Enter, |args, ctx| async move {
            assert_eq!(ctx.selector, "lpc");
            HookOutcome::with_payload(json!({"echo": args}))
        });

        let manager = manager_with(set, 1_000);
        let payload = manager
            .trigger(HookEvent::Enter, json!({"section": "name"}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(payload["echo"]["section"], "name");
    }

    #[tokio::test]
    async fn trigger_reraises_handler_error() {
        let mut set = HookSet::new();
        set.on(ActionKind::Parser, HookEvent::Enter, |_, _| async {
            HookOutcome::error("upstream service unavailable")
        });

        let manager = manager_with(set, 1_000);
        let err = manager
            .trigger(HookEvent::Enter, json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ScrivError::Hook(ref msg) if msg.contains("unavailable")));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_times_out_a_stalled_handler() {
        let mut set = HookSet::new();
        set.on(ActionKind::Parser, HookEvent::Enter, |_, _| async {
            // Never resolves within the configured timeout
            tokio::time::sleep(Duration::from_secs(3600)).await;
            HookOutcome::success()
        });

        let manager = manager_with(set, 50);
        let err = manager
            .trigger(HookEvent::Enter, json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScrivError::HookTimeout { ref event, millis: 50 } if event == "enter"
        ));
    }

    #[tokio::test]
    async fn library_resolves_by_file_stem() {
        let library = HookLibrary::create();
        let mut set = HookSet::new();
        set.on(ActionKind::Printer, HookEvent::Start, |_, _| async {
            HookOutcome::success()
        });
        library.insert("my_hooks", set);

        let dir = tempfile::tempdir().unwrap();
        let hooks_file = dir.path().join("my_hooks.yaml");
        std::fs::write(&hooks_file, "").unwrap();

        let manager = HookManager::load(
            &library,
            Some(&hooks_file),
            ActionKind::Printer,
            "markdown",
            100,
        );
        assert!(manager.set.is_some());

        // Missing file yields a silent no-hook manager
        let missing = HookManager::load(
            &library,
            Some(&dir.path().join("absent.yaml")),
            ActionKind::Printer,
            "markdown",
            100,
        );
        assert!(missing.set.is_none());
    }
}

//! Shared test utilities for unit tests.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use crate::{
    action::{
        ActionKind, ActionManager, ActionMeta, ActionRecord, ActionRunner, Invocation, RunPayload,
        RunnerContext, RunnerMap,
    },
    contract::Contract,
    discovery::{Discovery, SearchRoots, SelectionCriteria},
    error::ScrivError,
    hook::HookManager,
    terms::{DataType, TermEntry, Terms},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A scalar term entry.
pub fn entry(data_type: DataType, array: bool, required: bool) -> TermEntry {
    TermEntry {
        data_type,
        array,
        required,
        contains: None,
    }
}

/// An object term entry with nested terms.
pub fn object_entry(array: bool, required: bool, contains: Terms) -> TermEntry {
    TermEntry {
        data_type: DataType::Object,
        array,
        required,
        contains: Some(contains),
    }
}

/// Build a terms mapping from key/entry pairs.
pub fn terms(entries: &[(&str, TermEntry)]) -> Terms {
    let mut t = Terms::default();
    for (key, entry) in entries {
        t.insert(*key, entry.clone());
    }
    t
}

/// A parser record with empty terms, as discovery would produce it.
pub fn parser_record(selector: &str, entry: &str) -> ActionRecord {
    ActionRecord {
        file: PathBuf::from(format!("{selector}-parser.yaml")),
        meta: ActionMeta {
            kind: ActionKind::Parser,
            selector: selector.to_string(),
            extension: "c".to_string(),
        },
        terms: Terms::default(),
        entry: entry.to_string(),
        override_kind: None,
    }
}

/// A printer record with empty terms.
pub fn printer_record(selector: &str, entry: &str) -> ActionRecord {
    ActionRecord {
        file: PathBuf::from(format!("{selector}-printer.yaml")),
        meta: ActionMeta {
            kind: ActionKind::Printer,
            selector: selector.to_string(),
            extension: "md".to_string(),
        },
        terms: Terms::default(),
        entry: entry.to_string(),
        override_kind: None,
    }
}

/// Write a `<selector>-parser.yaml` manifest providing a `functions` array
/// of named, described entries.
pub fn write_parser_manifest(dir: &Path, selector: &str, entry: &str) -> PathBuf {
    let file = dir.join(format!("{selector}-parser.yaml"));
    std::fs::write(
        &file,
        format!(
            "kind: parser\n\
             language: {selector}\n\
             extension: c\n\
             entry: {entry}\n\
             provides:\n\
             \x20 functions:\n\
             \x20   dataType: object\n\
             \x20   array: true\n\
             \x20   required: true\n\
             \x20   contains:\n\
             \x20     name: {{dataType: string, required: true}}\n\
             \x20     description: {{dataType: string}}\n"
        ),
    )
    .unwrap();
    file
}

/// Write a `<selector>-printer.yaml` manifest consuming named `functions`.
pub fn write_printer_manifest(dir: &Path, selector: &str, entry: &str) -> PathBuf {
    let file = dir.join(format!("{selector}-printer.yaml"));
    std::fs::write(
        &file,
        format!(
            "kind: printer\n\
             format: {selector}\n\
             extension: md\n\
             entry: {entry}\n\
             consumes:\n\
             \x20 functions:\n\
             \x20   dataType: object\n\
             \x20   array: true\n\
             \x20   required: true\n\
             \x20   contains:\n\
             \x20     name: {{dataType: string, required: true}}\n"
        ),
    )
    .unwrap();
    file
}

/// Write a source file and return its path.
pub fn write_source_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let file = dir.join(name);
    std::fs::write(&file, content).unwrap();
    file
}

fn echo_document(invocation: &Invocation) -> RunPayload {
    let name = invocation
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "module".to_string());
    let description = invocation.content.clone().unwrap_or_default();

    RunPayload::parsed(json!({
        "functions": [{"name": name, "description": description.trim()}],
    }))
}

/// A parser producing one function entry named after the input file.
pub struct EchoParser;

#[async_trait]
impl ActionRunner for EchoParser {
    async fn run(
        &self,
        invocation: Invocation,
        _ctx: &RunnerContext,
    ) -> Result<RunPayload, ScrivError> {
        Ok(echo_document(&invocation))
    }
}

/// A parser that fails on inputs containing `explode`.
pub struct FailingParser;

#[async_trait]
impl ActionRunner for FailingParser {
    async fn run(
        &self,
        invocation: Invocation,
        _ctx: &RunnerContext,
    ) -> Result<RunPayload, ScrivError> {
        if invocation
            .content
            .as_deref()
            .is_some_and(|c| c.contains("explode"))
        {
            return Err(ScrivError::Custom(
                "refusing to parse poisoned input".to_string(),
            ));
        }
        Ok(echo_document(&invocation))
    }
}

/// A parser tracking how many invocations overlap.
#[derive(Default)]
pub struct CountingParser {
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl ActionRunner for CountingParser {
    async fn run(
        &self,
        invocation: Invocation,
        _ctx: &RunnerContext,
    ) -> Result<RunPayload, ScrivError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Hold the slot long enough for other pipelines to overlap
        tokio::time::sleep(Duration::from_millis(20)).await;

        let payload = echo_document(&invocation);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(payload)
    }
}

/// A printer rendering `functions` entries as markdown sections.
pub struct MarkdownPrinter;

#[async_trait]
impl ActionRunner for MarkdownPrinter {
    async fn run(
        &self,
        invocation: Invocation,
        _ctx: &RunnerContext,
    ) -> Result<RunPayload, ScrivError> {
        let document = invocation.document.unwrap_or(serde_json::Value::Null);
        let mut out = String::new();

        if let Some(functions) = document.get("functions").and_then(|f| f.as_array()) {
            for function in functions {
                if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                    out.push_str(&format!("## {name}\n\n"));
                }
                if let Some(desc) = function.get("description").and_then(|d| d.as_str()) {
                    out.push_str(desc);
                    out.push('\n');
                }
            }
        }

        Ok(RunPayload::rendered(out))
    }
}

/// A negotiated lpc→markdown action manager pair backed by [`EchoParser`].
pub fn managed_pair(temp: &TempDir) -> (Arc<ActionManager>, Arc<ActionManager>) {
    managed_pair_with(temp, Arc::new(EchoParser))
}

/// Like [`managed_pair`] but with a caller-supplied parser runner.
pub fn managed_pair_with(
    temp: &TempDir,
    parser_runner: Arc<dyn ActionRunner>,
) -> (Arc<ActionManager>, Arc<ActionManager>) {
    init_logging();

    write_parser_manifest(temp.path(), "lpc", "lpc-parser");
    write_printer_manifest(temp.path(), "markdown", "markdown-printer");

    let discovery = Discovery::new(SearchRoots {
        mock_dir: Some(temp.path().to_path_buf()),
        ..Default::default()
    });
    let discovered = discovery
        .discover_actions(&SelectionCriteria::default())
        .unwrap();
    let parser = discovered.parser[0].clone();
    let printer = discovered.printer[0].clone();

    let (producer, consumer) = Contract::negotiate(&parser.terms, &printer.terms).unwrap();

    let runners = RunnerMap::create();
    runners.insert("lpc-parser", parser_runner);
    runners.insert("markdown-printer", Arc::new(MarkdownPrinter));

    let parse_hooks = Arc::new(HookManager::disabled(ActionKind::Parser, "lpc", 1_000));
    let print_hooks = Arc::new(HookManager::disabled(ActionKind::Printer, "markdown", 1_000));

    let parse = Arc::new(ActionManager::new(parser, producer, &runners, parse_hooks).unwrap());
    let print = Arc::new(ActionManager::new(printer, consumer, &runners, print_hooks).unwrap());

    (parse, print)
}

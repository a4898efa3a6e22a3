//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use scriv_core::{
    action::{ActionRunner, Invocation, RunPayload, RunnerContext, RunnerMap},
    hook::HookEvent,
    ScrivError,
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times — subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write a parser manifest declaring `functions` with named, described
/// entries. Returns the manifest path.
#[allow(dead_code)]
pub fn write_parser_manifest(dir: &Path, language: &str, entry: &str) -> PathBuf {
    let file = dir.join(format!("{language}-parser.yaml"));
    std::fs::write(
        &file,
        format!(
            r#"kind: parser
language: {language}
extension: c
entry: {entry}
provides:
  functions:
    dataType: object
    array: true
    required: true
    contains:
      name: {{dataType: string, required: true}}
      description: {{dataType: string}}
"#
        ),
    )
    .unwrap();
    file
}

/// Write a printer manifest consuming named `functions`. Returns the
/// manifest path.
#[allow(dead_code)]
pub fn write_printer_manifest(dir: &Path, format: &str, entry: &str) -> PathBuf {
    let file = dir.join(format!("{format}-printer.yaml"));
    std::fs::write(
        &file,
        format!(
            r#"kind: printer
format: {format}
extension: md
entry: {entry}
consumes:
  functions:
    dataType: object
    array: true
    required: true
    contains:
      name: {{dataType: string, required: true}}
"#
        ),
    )
    .unwrap();
    file
}

/// Write a printer manifest that additionally requires a `sections` array no
/// fixture parser provides.
#[allow(dead_code)]
pub fn write_demanding_printer_manifest(dir: &Path, format: &str, entry: &str) -> PathBuf {
    let file = dir.join(format!("{format}-printer.yaml"));
    std::fs::write(
        &file,
        format!(
            r#"kind: printer
format: {format}
extension: md
entry: {entry}
consumes:
  functions:
    dataType: object
    array: true
    required: true
    contains:
      name: {{dataType: string, required: true}}
  sections:
    dataType: string
    array: true
    required: true
"#
        ),
    )
    .unwrap();
    file
}

/// Write a source file under `dir` and return its path.
#[allow(dead_code)]
pub fn write_source(dir: &Path, name: &str, content: &str) -> PathBuf {
    let file = dir.join(name);
    std::fs::write(&file, content).unwrap();
    file
}

/// Extract `(name, doc comment)` pairs from C-ish source text.
///
/// A `/** ... */` line documents the next line containing a call signature.
fn parse_functions(content: &str) -> Vec<(String, String)> {
    let mut functions = Vec::new();
    let mut doc = String::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("/**") {
            doc = trimmed
                .trim_start_matches("/**")
                .trim_end_matches("*/")
                .trim()
                .to_string();
        } else if let Some(open) = trimmed.find('(') {
            if let Some(name) = trimmed[..open].split_whitespace().last() {
                functions.push((name.to_string(), std::mem::take(&mut doc)));
            }
        }
    }

    functions
}

/// Parser fixture: extracts documented functions from C-ish sources.
pub struct LpcParser;

#[async_trait]
impl ActionRunner for LpcParser {
    async fn run(
        &self,
        invocation: Invocation,
        _ctx: &RunnerContext,
    ) -> Result<RunPayload, ScrivError> {
        let content = invocation.content.unwrap_or_default();
        let functions: Vec<_> = parse_functions(&content)
            .into_iter()
            .map(|(name, description)| json!({"name": name, "description": description}))
            .collect();

        Ok(RunPayload::parsed(json!({ "functions": functions })))
    }
}

/// Parser fixture that raises the `enter` hook for every file it parses.
pub struct HookRaisingParser;

#[async_trait]
impl ActionRunner for HookRaisingParser {
    async fn run(
        &self,
        invocation: Invocation,
        ctx: &RunnerContext,
    ) -> Result<RunPayload, ScrivError> {
        ctx.hooks
            .trigger(
                HookEvent::Enter,
                json!({"file": invocation.file.display().to_string()}),
            )
            .await?;

        LpcParser.run(invocation, ctx).await
    }
}

/// Printer fixture: renders each function as a markdown section.
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
                    if !desc.is_empty() {
                        out.push_str(desc);
                        out.push('\n');
                    }
                }
            }
        }

        Ok(RunPayload::rendered(out))
    }
}

/// A runner map with the standard lpc/markdown fixture pair registered.
#[allow(dead_code)]
pub fn fixture_runners() -> RunnerMap {
    let runners = RunnerMap::create();
    runners.insert("lpc-parser", Arc::new(LpcParser));
    runners.insert("markdown-printer", Arc::new(MarkdownPrinter));
    runners
}

//! The per-run execution engine: a bounded-concurrency file pipeline.
//!
//! For a set of input files and a concurrency limit, the conveyor drives each
//! file through a fixed stage sequence — **read** → **parse** → **validate**
//! → **print** → **write** — isolating failures per file and returning
//! categorized outcomes.
//!
//! ## Concurrency model
//!
//! Files are scheduled against a fixed-size worker pool sized by
//! `max_concurrent`: each file runs as its own tokio task gated by a shared
//! semaphore. The pool refills eagerly — as soon as one file's pipeline
//! settles its permit frees and the next queued file starts — so the number
//! of in-flight pipelines never exceeds the limit and never drops below
//! `min(remaining, max_concurrent)` while files remain.
//!
//! There is no completion-order guarantee, but the categorized result
//! attributes each outcome to the correct input record by position. A
//! failing (or panicking) file never aborts or blocks its siblings; only a
//! hook timeout cancels that single hook invocation, and the surrounding
//! file is then reported as errored.
//!
//! ## Shared resources
//!
//! The two action managers (with their contracts and hook registries) are
//! read-only and shared by every pipeline invocation. Each file's
//! [`PipelineContext`] is exclusively owned by its own invocation. The
//! output directory is ensured once, before any concurrent write begins.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinError};

use crate::{
    action::{ActionManager, Invocation},
    error::ScrivError,
};

/// Per-file mutable state threaded through the pipeline stages.
///
/// Created fresh per file at pipeline start, exclusively owned by that
/// file's invocation, and discarded after categorization.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub file: PathBuf,
    pub content: Option<String>,
    pub parse_result: Option<Value>,
    pub format_result: Option<String>,
    pub output_file: Option<PathBuf>,
    pub status: PipelineStatus,
    pub error: Option<ScrivError>,
    pub warning: Option<String>,
}

impl PipelineContext {
    fn new(file: PathBuf) -> Self {
        PipelineContext {
            file,
            content: None,
            parse_result: None,
            format_result: None,
            output_file: None,
            status: PipelineStatus::Pending,
            error: None,
            warning: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    Success,
    Warning,
    Error,
}

/// A file that produced output.
#[derive(Debug, Clone)]
pub struct Succeeded {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// A file that completed without producing output.
#[derive(Debug, Clone)]
pub struct Warned {
    pub input: PathBuf,
    pub warning: String,
}

/// A file whose pipeline failed.
#[derive(Debug, Clone)]
pub struct Errored {
    pub input: PathBuf,
    pub error: ScrivError,
}

/// Categorized per-run outcomes. Aggregated once per run; never mutated
/// after the run completes.
#[derive(Debug, Clone, Default)]
pub struct ConveyResult {
    pub succeeded: Vec<Succeeded>,
    pub warned: Vec<Warned>,
    pub errored: Vec<Errored>,
}

impl ConveyResult {
    /// Total settled files. Always equals the input count: the conveyor
    /// never loses or duplicates a file.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.warned.len() + self.errored.len()
    }
}

/// Drives files through the parse→print pipeline with bounded concurrency.
pub struct Conveyor {
    parse: Arc<ActionManager>,
    print: Arc<ActionManager>,
    output: Option<PathBuf>,
}

impl Conveyor {
    pub fn new(
        parse: Arc<ActionManager>,
        print: Arc<ActionManager>,
        output: Option<PathBuf>,
    ) -> Self {
        Conveyor {
            parse,
            print,
            output,
        }
    }

    /// Process `files` through the pipeline.
    ///
    /// Setup and teardown run exactly once around the whole batch: both
    /// action managers are set up (hook lifecycle included) before the first
    /// file is read, and cleaned up after every file has settled, even when
    /// some files failed. Setup failures are configuration-time and abort
    /// the run; per-file failures land in the errored bucket.
    pub async fn convey(
        &self,
        files: &[PathBuf],
        max_concurrent: usize,
    ) -> Result<ConveyResult, ScrivError> {
        // 1. Setup both actions once
        self.parse.setup_action().await?;
        self.print.setup_action().await?;

        // 2. Ensure the output location exists before any concurrent write
        if let Some(output) = &self.output {
            if !output.exists() {
                tracing::info!(
                    "[Conveyor] Directory {:?} does not exist. Creating.",
                    output
                );
            }
            tokio::fs::create_dir_all(output).await?;
        }

        // 3. Schedule every file; the semaphore bounds in-flight pipelines
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(files.len());

        for file in files {
            let parse = self.parse.clone();
            let print = self.print.clone();
            let output = self.output.clone();
            let semaphore = semaphore.clone();
            let file = file.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let mut ctx = PipelineContext::new(file);
                        ctx.status = PipelineStatus::Error;
                        ctx.error = Some(ScrivError::Custom("worker pool closed".to_string()));
                        return ctx;
                    }
                };

                Self::process_file(&parse, &print, output.as_deref(), file).await
            }));
        }

        let mut settled = Vec::with_capacity(handles.len());
        for handle in handles {
            settled.push(handle.await);
        }

        // 4. Teardown always, even when some files failed
        for (manager, side) in [(&self.parse, "parser"), (&self.print, "printer")] {
            if let Err(e) = manager.cleanup_action().await {
                tracing::warn!("[Conveyor] {} cleanup failed: {}", side, e);
            }
        }

        // 5. Categorize by original input position
        Ok(Self::categorize(settled, files))
    }

    /// Run the fixed stage sequence for one file. Any stage error is
    /// captured into the context; nothing escapes to siblings.
    async fn process_file(
        parse: &ActionManager,
        print: &ActionManager,
        output: Option<&Path>,
        file: PathBuf,
    ) -> PipelineContext {
        let mut ctx = PipelineContext::new(file);

        if let Err(e) = Self::drive(parse, print, output, &mut ctx).await {
            tracing::warn!("[Conveyor] Error processing file {:?}: {}", ctx.file, e);
            ctx.status = PipelineStatus::Error;
            ctx.error = Some(e);
        }

        ctx
    }

    async fn drive(
        parse: &ActionManager,
        print: &ActionManager,
        output: Option<&Path>,
        ctx: &mut PipelineContext,
    ) -> Result<(), ScrivError> {
        // read
        let content = tokio::fs::read_to_string(&ctx.file).await?;
        tracing::debug!(
            "[Conveyor] Read file content {:?} ({} bytes)",
            ctx.file,
            content.len()
        );
        ctx.content = Some(content.clone());

        // parse
        let payload = parse
            .run_action(Invocation {
                file: ctx.file.clone(),
                content: Some(content),
                document: None,
            })
            .await?;
        let document = payload.document.ok_or_else(|| {
            ScrivError::Contract("parser produced no document".to_string())
        })?;

        // validate against both negotiated contracts
        parse.contract().validate(&document)?;
        print.contract().validate(&document)?;
        ctx.parse_result = Some(document.clone());

        // print
        let printed = print
            .run_action(Invocation {
                file: ctx.file.clone(),
                content: None,
                document: Some(document),
            })
            .await?;
        ctx.format_result = printed.rendered.clone();

        // write, when an output location is configured and printing
        // produced content
        match (output, printed.rendered.filter(|r| !r.is_empty())) {
            (Some(out_dir), Some(rendered)) => {
                let stem = ctx
                    .file
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "output".to_string());
                let out_file = out_dir.join(format!("{}.{}", stem, print.meta().extension));

                tokio::fs::write(&out_file, rendered.as_bytes()).await?;
                tracing::debug!(
                    "[Conveyor] Wrote output {:?} ({} bytes)",
                    out_file,
                    rendered.len()
                );

                ctx.output_file = Some(out_file);
                ctx.status = PipelineStatus::Success;
            }
            (None, _) => {
                ctx.status = PipelineStatus::Warning;
                ctx.warning = Some("no output directory configured".to_string());
            }
            (_, None) => {
                ctx.status = PipelineStatus::Warning;
                ctx.warning = Some("printer produced no content".to_string());
            }
        }

        Ok(())
    }

    /// Zip settlement results back against the input list by position and
    /// bucket them. A panicked task is interpreted identically to a regular
    /// error result.
    fn categorize(
        settled: Vec<Result<PipelineContext, JoinError>>,
        files: &[PathBuf],
    ) -> ConveyResult {
        let mut result = ConveyResult::default();

        for (entry, file) in settled.into_iter().zip(files.iter()) {
            let ctx = match entry {
                Ok(ctx) => ctx,
                Err(join_error) => {
                    result.errored.push(Errored {
                        input: file.clone(),
                        error: ScrivError::Custom(format!(
                            "pipeline task failed: {join_error}"
                        )),
                    });
                    continue;
                }
            };

            match ctx.status {
                PipelineStatus::Success => result.succeeded.push(Succeeded {
                    input: file.clone(),
                    output: ctx.output_file.unwrap_or_default(),
                }),
                PipelineStatus::Warning => result.warned.push(Warned {
                    input: file.clone(),
                    warning: ctx
                        .warning
                        .unwrap_or_else(|| "unspecified warning".to_string()),
                }),
                PipelineStatus::Error => result.errored.push(Errored {
                    input: file.clone(),
                    error: ctx
                        .error
                        .unwrap_or_else(|| ScrivError::Custom("unknown error".to_string())),
                }),
                PipelineStatus::Pending => result.errored.push(Errored {
                    input: file.clone(),
                    error: ScrivError::Custom("pipeline settled without a status".to_string()),
                }),
            }
        }

        result
    }
}

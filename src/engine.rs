//! Orchestration: resolve one parser/printer pair and process files.
//!
//! The engine ties the other modules together. Construction performs every
//! configuration-time step — criteria validation, action discovery,
//! negotiation down to exactly one module per kind, contract compilation,
//! and hook resolution — so that by the time [`Engine::process_files`] runs,
//! only per-file failures remain possible.
//!
//! ## Negotiation
//!
//! Candidate pairs are checked structurally: every discovered printer's
//! consumed terms are negotiated against every discovered parser's provided
//! terms. A printer survives when at least one parser satisfies it; a parser
//! survives when it satisfies at least one surviving printer. The run
//! proceeds only if exactly one candidate of each kind survives — zero is
//! [`ScrivError::NoMatchingAction`], more than one is
//! [`ScrivError::AmbiguousAction`]. The result is deterministic for a given
//! candidate set: candidates are considered in discovery order.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    action::{ActionKind, ActionManager, ActionRecord, RunnerMap},
    config::RunConfig,
    contract::Contract,
    conveyor::{ConveyResult, Conveyor},
    discovery::{Discovered, Discovery, SearchRoots},
    error::ScrivError,
    hook::{HookLibrary, HookManager},
    terms::Terms,
};

/// What one engine run reports back.
#[derive(Debug)]
pub struct RunSummary {
    pub total_files: usize,
    pub result: ConveyResult,
    pub duration: Duration,
}

/// The pair negotiation resolves to, with both compiled contracts.
#[derive(Debug)]
struct NegotiatedPair {
    parser: ActionRecord,
    printer: ActionRecord,
    producer: Contract,
    consumer: Contract,
}

/// A fully resolved run: one parser, one printer, ready to process files.
pub struct Engine {
    config: RunConfig,
    parse: Arc<ActionManager>,
    print: Arc<ActionManager>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Resolve `config` into a runnable engine.
    ///
    /// Runs discovery over `roots`, filters by the configured criteria,
    /// negotiates the survivors down to one pair, and binds each side to its
    /// runner entry point and hook manager. Every error here is fatal — no
    /// file has been touched yet.
    pub fn new(
        config: RunConfig,
        roots: SearchRoots,
        runners: &RunnerMap,
        hook_library: &HookLibrary,
    ) -> Result<Self, ScrivError> {
        config.validate()?;

        let criteria = config.criteria();
        let discovery = Discovery::new(roots);
        let discovered = discovery.discover_actions(&criteria)?;
        let candidates = discovery.satisfy_criteria(&discovered, &criteria);

        let NegotiatedPair {
            parser,
            printer,
            producer,
            consumer,
        } = negotiate_pair(&candidates)?;

        tracing::info!(
            "[Engine] Negotiated {} parser with {} printer",
            parser.meta.selector,
            printer.meta.selector
        );

        let hooks_file = config.hooks.as_deref();
        let parse_hooks = Arc::new(HookManager::load(
            hook_library,
            hooks_file,
            ActionKind::Parser,
            parser.meta.selector.clone(),
            config.hook_timeout_ms,
        ));
        let print_hooks = Arc::new(HookManager::load(
            hook_library,
            hooks_file,
            ActionKind::Printer,
            printer.meta.selector.clone(),
            config.hook_timeout_ms,
        ));

        let parse = Arc::new(ActionManager::new(parser, producer, runners, parse_hooks)?);
        let print = Arc::new(ActionManager::new(printer, consumer, runners, print_hooks)?);

        Ok(Engine {
            config,
            parse,
            print,
        })
    }

    pub fn parser(&self) -> &ActionManager {
        &self.parse
    }

    pub fn printer(&self) -> &ActionManager {
        &self.print
    }

    /// Run the conveyor over the configured input files.
    pub async fn process_files(&self) -> Result<RunSummary, ScrivError> {
        if self.config.input.is_empty() {
            return Err(ScrivError::Config("No input files specified".to_string()));
        }

        tracing::info!(
            "[Engine] Processing {} files (max {} concurrent)",
            self.config.input.len(),
            self.config.max_concurrent
        );

        let start = Instant::now();
        let conveyor = Conveyor::new(
            self.parse.clone(),
            self.print.clone(),
            self.config.output.clone(),
        );
        let result = conveyor
            .convey(&self.config.input, self.config.max_concurrent)
            .await?;
        let duration = start.elapsed();

        tracing::info!(
            "[Engine] Processed {} files in {:?}: {} succeeded, {} warned, {} errored",
            result.total(),
            duration,
            result.succeeded.len(),
            result.warned.len(),
            result.errored.len()
        );

        Ok(RunSummary {
            total_files: self.config.input.len(),
            result,
            duration,
        })
    }
}

/// Reduce candidates to exactly one parser and one printer by structural
/// negotiation of their terms.
fn negotiate_pair(candidates: &Discovered) -> Result<NegotiatedPair, ScrivError> {
    let mut surviving_parsers: Vec<&ActionRecord> = Vec::new();
    let mut surviving_printers: Vec<&ActionRecord> = Vec::new();

    for printer in &candidates.printer {
        let mut satisfied = false;

        for parser in &candidates.parser {
            match Terms::negotiate(&parser.terms, &printer.terms) {
                Ok(()) => {
                    satisfied = true;
                    if !surviving_parsers.iter().any(|p| p.file == parser.file) {
                        surviving_parsers.push(parser);
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        "[Engine] Parser `{}` cannot satisfy printer `{}`: {}",
                        parser.meta.selector,
                        printer.meta.selector,
                        e
                    );
                }
            }
        }

        if satisfied {
            surviving_printers.push(printer);
        }
    }

    let parser = reduce_to_one(&surviving_parsers, ActionKind::Parser)?;
    let printer = reduce_to_one(&surviving_printers, ActionKind::Printer)?;

    let (producer, consumer) = Contract::negotiate(&parser.terms, &printer.terms)?;

    Ok(NegotiatedPair {
        parser,
        printer,
        producer,
        consumer,
    })
}

fn reduce_to_one(survivors: &[&ActionRecord], kind: ActionKind) -> Result<ActionRecord, ScrivError> {
    match survivors {
        [] => Err(ScrivError::NoMatchingAction(kind.as_str().to_string())),
        [one] => Ok((*one).clone()),
        many => {
            let names: Vec<&str> = many.iter().map(|r| r.meta.selector.as_str()).collect();
            tracing::error!(
                "[Engine] {} {} candidates survived negotiation: {:?}",
                many.len(),
                kind,
                names
            );
            Err(ScrivError::AmbiguousAction(kind.as_str().to_string()))
        }
    }
}

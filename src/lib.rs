//! # scriv-core
//!
//! A Rust library for pluggable documentation generation: structurally
//! negotiated parser/printer pipelines with bounded concurrency.
//!
//! The name "scriv" comes from "scrivener" - one who writes documents out
//! for others.
//!
//! ## Overview
//!
//! scriv-core turns source files into rendered documentation through pairs of
//! pluggable **action modules**: a *parser* that reads a source language into
//! a structured document, and a *printer* that renders that document into an
//! output format. The engine never inspects file contents itself - it
//! discovers candidate modules, verifies structural compatibility between
//! what a parser **provides** and what a printer **consumes**, and drives
//! every input file through the resolved pair concurrently.
//!
//! ### Key Features
//!
//! - **Structural negotiation**: Parsers and printers declare [`terms`];
//!   a pair is only run when the provider's shape satisfies the consumer's
//! - **Runtime contracts**: Negotiated terms compile into validators applied
//!   to every document an action produces
//! - **Bounded concurrency**: Files run through a semaphore-gated worker
//!   pool; one file's failure never aborts its siblings
//! - **Lifecycle hooks**: User-supplied handlers fire at defined pipeline
//!   points, each raced against a configurable timeout
//! - **Explicit discovery**: Manifest-driven module search over declared
//!   roots, with per-kind override files for development
//!
//! ## Architecture
//!
//! The library is organized around several key components:
//!
//! - **[`engine`]**: Run orchestration (`Engine`, pair negotiation)
//! - **[`conveyor`]**: The per-file read→parse→validate→print→write pipeline
//! - **[`action`]**: The plugin interface (`ActionRunner`, `ActionManager`)
//! - **[`discovery`]**: Manifest enumeration and validation over search roots
//! - **[`terms`]** / **[`contract`]**: Shape declarations and their runtime
//!   validators
//! - **[`hook`]**: Lifecycle hook registration and timeout-raced invocation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scriv_core::{
//!     action::RUNNERS,
//!     config::RunConfig,
//!     discovery::SearchRoots,
//!     engine::Engine,
//!     hook::HOOKS,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Entry points are registered in RUNNERS before engine construction
//!     let config = RunConfig {
//!         input: vec!["src/room.c".into()],
//!         output: Some("docs".into()),
//!         language: Some("lpc".to_string()),
//!         format: Some("markdown".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let roots = SearchRoots {
//!         action_dirs: vec!["./scriv_modules".into()],
//!         ..Default::default()
//!     };
//!
//!     let engine = Engine::new(config, roots, &RUNNERS, &HOOKS)?;
//!     let summary = engine.process_files().await?;
//!
//!     for ok in &summary.result.succeeded {
//!         println!("{} -> {}", ok.input.display(), ok.output.display());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Guide
//!
//! Start with [`engine::Engine`] for running pipelines, then explore
//! [`action::ActionRunner`] for writing plugins. See [`terms`] for how
//! structural compatibility is declared and checked.

pub mod action;
pub mod config;
pub mod contract;
pub mod conveyor;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hook;
pub mod terms;
#[cfg(test)]
mod tests;

pub use error::*;

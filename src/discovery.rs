//! Action discovery across explicit search roots.
//!
//! Discovery walks known locations for candidate action manifests, loads
//! each, validates it against its kind's meta-requirements, and groups the
//! survivors by kind. Search roots are passed in explicitly — discovery
//! never reads the current working directory or process environment.
//!
//! ## Search roots
//!
//! - **Mock directory** — a flat directory of `*-parser.yaml` /
//!   `*-printer.yaml` manifests, used by tests and local development. When
//!   set, it replaces all other roots.
//! - **Project actions** — manifest files a project declares directly.
//! - **Action directories** — installed plugin trees: each subdirectory may
//!   carry an `actions.yaml` listing the action manifests it exports.
//!   Directories named with an `@` prefix are scoped namespaces and are
//!   expanded one further level; dot-directories are skipped.
//!
//! ## Manifest format
//!
//! ```yaml
//! kind: parser            # or printer
//! language: lpc           # printers declare `format:` instead
//! extension: c            # printers: the output extension
//! entry: lpc-parser       # runner name registered in the RunnerMap
//! provides:               # printers declare `consumes:`
//!   functions:
//!     dataType: object
//!     array: true
//!     required: true
//! ```
//!
//! Modules failing their kind's meta-requirements are silently dropped, not
//! errored. An explicit override file, by contrast, must survive loading or
//! discovery fails with a "specific action not found" error.

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::{
    action::{ActionKind, ActionMeta, ActionRecord},
    error::ScrivError,
    terms::Terms,
};

/// Explicit locations discovery enumerates, in order.
#[derive(Debug, Clone, Default)]
pub struct SearchRoots {
    /// When set, discovery looks only here.
    pub mock_dir: Option<PathBuf>,
    /// Manifest files declared directly by the project.
    pub project_actions: Vec<PathBuf>,
    /// Local and global plugin directories.
    pub action_dirs: Vec<PathBuf>,
}

/// Caller-supplied selection criteria.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub language: Option<String>,
    pub format: Option<String>,
    /// Explicit parser manifest overriding language-based selection.
    pub parser_file: Option<PathBuf>,
    /// Explicit printer manifest overriding format-based selection.
    pub printer_file: Option<PathBuf>,
}

impl SelectionCriteria {
    fn override_file(&self, kind: ActionKind) -> Option<&Path> {
        match kind {
            ActionKind::Parser => self.parser_file.as_deref(),
            ActionKind::Printer => self.printer_file.as_deref(),
        }
    }

    fn selector(&self, kind: ActionKind) -> Option<&str> {
        match kind {
            ActionKind::Parser => self.language.as_deref(),
            ActionKind::Printer => self.format.as_deref(),
        }
    }
}

/// Validated action records grouped by kind.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    pub parser: Vec<ActionRecord>,
    pub printer: Vec<ActionRecord>,
}

impl Discovered {
    pub fn records(&self, kind: ActionKind) -> &[ActionRecord] {
        match kind {
            ActionKind::Parser => &self.parser,
            ActionKind::Printer => &self.printer,
        }
    }

    fn records_mut(&mut self, kind: ActionKind) -> &mut Vec<ActionRecord> {
        match kind {
            ActionKind::Parser => &mut self.parser,
            ActionKind::Printer => &mut self.printer,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parser.is_empty() && self.printer.is_empty()
    }
}

/// Raw manifest shape before meta-requirement validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    kind: Option<ActionKind>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    provides: Option<serde_yaml::Value>,
    #[serde(default)]
    consumes: Option<serde_yaml::Value>,
}

/// The `actions.yaml` a plugin directory exports.
#[derive(Debug, Deserialize)]
struct DirManifest {
    actions: Vec<PathBuf>,
}

/// Walks search roots and loads candidate action modules.
pub struct Discovery {
    roots: SearchRoots,
}

impl Discovery {
    pub fn new(roots: SearchRoots) -> Self {
        Discovery { roots }
    }

    /// Enumerate, load, and validate candidate modules.
    ///
    /// Explicit override files from `criteria` are tagged with their
    /// requested kind and must be found among the validated set, otherwise
    /// discovery fails. All other load or validation failures drop the
    /// candidate silently.
    pub fn discover_actions(&self, criteria: &SelectionCriteria) -> Result<Discovered, ScrivError> {
        tracing::debug!("[Discovery] Discovering actions");

        let files = self.enumerate_manifests()?;
        tracing::debug!("[Discovery] Discovered {} candidate manifests", files.len());

        let mut discovered = Discovered::default();

        for file in &files {
            match load_record(file, None) {
                Ok(Some(record)) => {
                    discovered.records_mut(record.meta.kind).push(record);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("[Discovery] Skipping unloadable manifest {:?}: {}", file, e);
                }
            }
        }

        // Explicit overrides are tagged with their requested kind and must
        // load; a missing or invalid override is a configuration error.
        for kind in [ActionKind::Parser, ActionKind::Printer] {
            let Some(file) = criteria.override_file(kind) else {
                continue;
            };

            tracing::debug!("[Discovery] Tagging specific module {:?} as {}", file, kind);

            let record = load_record(file, Some(kind))?.filter(|r| r.meta.kind == kind);

            let Some(record) = record else {
                return Err(ScrivError::NotFound(format!(
                    "Could not find specific {} action: {}",
                    kind,
                    file.display()
                )));
            };

            discovered.records_mut(kind).push(record);
        }

        for kind in [ActionKind::Parser, ActionKind::Printer] {
            tracing::debug!(
                "[Discovery] Found {} {} actions",
                discovered.records(kind).len(),
                kind
            );
        }

        Ok(discovered)
    }

    /// Filter validated candidates down to those matching the caller's
    /// criteria. For each kind an explicitly tagged override is preferred;
    /// otherwise every candidate whose selector equals the requested
    /// language/format is kept. No negotiation happens here.
    pub fn satisfy_criteria(
        &self,
        discovered: &Discovered,
        criteria: &SelectionCriteria,
    ) -> Discovered {
        let mut satisfied = Discovered::default();

        for kind in [ActionKind::Parser, ActionKind::Printer] {
            tracing::debug!("[Discovery] Satisfying criteria for {} actions", kind);

            if criteria.override_file(kind).is_some() {
                if let Some(found) = discovered
                    .records(kind)
                    .iter()
                    .find(|r| r.override_kind == Some(kind))
                {
                    tracing::debug!("[Discovery] Found specific {} action", kind);
                    satisfied.records_mut(kind).push(found.clone());
                    continue;
                }

                tracing::debug!("[Discovery] No specific {} action found", kind);
            }

            let Some(selector) = criteria.selector(kind) else {
                continue;
            };

            let found: Vec<ActionRecord> = discovered
                .records(kind)
                .iter()
                .filter(|r| r.meta.selector == selector)
                .cloned()
                .collect();

            tracing::debug!(
                "[Discovery] Found {} {} actions with {} = {}",
                found.len(),
                kind,
                kind.selector_key(),
                selector
            );

            satisfied.records_mut(kind).extend(found);
        }

        satisfied
    }

    fn enumerate_manifests(&self) -> Result<Vec<PathBuf>, ScrivError> {
        let mut files = Vec::new();

        if let Some(mock) = &self.roots.mock_dir {
            tracing::debug!("[Discovery] Discovering mock actions in {:?}", mock);

            for entry in WalkDir::new(mock).max_depth(1).into_iter().flatten() {
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_file()
                    && (name.ends_with("-parser.yaml") || name.ends_with("-printer.yaml"))
                {
                    files.push(entry.into_path());
                }
            }

            files.sort();
            return Ok(files);
        }

        tracing::debug!(
            "[Discovery] Looking for {} project-declared actions",
            self.roots.project_actions.len()
        );
        files.extend(self.roots.project_actions.iter().cloned());

        for dir in &self.roots.action_dirs {
            if !dir.is_dir() {
                continue;
            }

            let mut packages = Vec::new();

            for child in visible_subdirs(dir)? {
                // Scoped namespaces get one further level of expansion
                if child
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('@'))
                    .unwrap_or(false)
                {
                    packages.extend(visible_subdirs(&child)?);
                } else {
                    packages.push(child);
                }
            }

            tracing::debug!(
                "[Discovery] Found {} directories to search in {:?}",
                packages.len(),
                dir
            );

            for package in packages {
                let dir_manifest = package.join("actions.yaml");
                if !dir_manifest.is_file() {
                    continue;
                }

                let parsed: DirManifest = match read_to_string(&dir_manifest)
                    .map_err(ScrivError::from)
                    .and_then(|c| serde_yaml::from_str(&c).map_err(ScrivError::from))
                {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(
                            "[Discovery] Skipping invalid actions manifest {:?}: {}",
                            dir_manifest,
                            e
                        );
                        continue;
                    }
                };

                let exported: Vec<PathBuf> = parsed
                    .actions
                    .iter()
                    .map(|rel| package.join(rel))
                    .filter(|p| p.is_file())
                    .collect();

                tracing::debug!(
                    "[Discovery] Discovered {} modules from {:?}",
                    exported.len(),
                    dir_manifest
                );

                files.extend(exported);
            }
        }

        Ok(files)
    }
}

/// Load one manifest into an [`ActionRecord`].
///
/// Returns `Ok(None)` when the module fails its kind's meta-requirements:
/// a parseable kind, a non-empty selector, a named entry point, and a terms
/// declaration matching the kind (`provides` for parsers, `consumes` for
/// printers).
fn load_record(
    file: &Path,
    override_kind: Option<ActionKind>,
) -> Result<Option<ActionRecord>, ScrivError> {
    let content = read_to_string(file)?;
    let raw: RawManifest = serde_yaml::from_str(&content)?;
    let base_dir = file.parent().unwrap_or_else(|| Path::new("."));

    let Some(kind) = raw.kind else {
        tracing::debug!("[Discovery] Manifest {:?} declares no kind, dropping", file);
        return Ok(None);
    };

    let selector = match kind {
        ActionKind::Parser => raw.language,
        ActionKind::Printer => raw.format,
    };
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        tracing::debug!(
            "[Discovery] Manifest {:?} has no {} field, dropping",
            file,
            kind.selector_key()
        );
        return Ok(None);
    };

    let Some(entry) = raw.entry.filter(|e| !e.is_empty()) else {
        tracing::debug!("[Discovery] Manifest {:?} names no entry point, dropping", file);
        return Ok(None);
    };

    let terms_value = match kind {
        ActionKind::Parser => raw.provides,
        ActionKind::Printer => raw.consumes,
    };
    let Some(terms_value) = terms_value else {
        tracing::debug!("[Discovery] Manifest {:?} declares no terms, dropping", file);
        return Ok(None);
    };
    let terms = Terms::parse(&terms_value, base_dir)?;

    let extension = raw
        .extension
        .map(|e| e.trim_start_matches('.').to_string())
        .unwrap_or_else(|| "txt".to_string());

    tracing::debug!(
        "[Discovery] Loaded valid {} action `{}` from {:?}",
        kind,
        selector,
        file
    );

    Ok(Some(ActionRecord {
        file: file.to_path_buf(),
        meta: ActionMeta {
            kind,
            selector,
            extension,
        },
        terms,
        entry,
        override_kind,
    }))
}

fn visible_subdirs(dir: &Path) -> Result<Vec<PathBuf>, ScrivError> {
    let mut dirs = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}

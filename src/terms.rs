//! Structural term declarations for action modules.
//!
//! A parser declares the shape of the document it *provides*; a printer
//! declares the shape it *consumes*. Both are expressed as [`Terms`]: a named
//! mapping where each entry carries a base [`DataType`], an array flag, a
//! required flag, and optionally a nested [`Terms`] for structured fields.
//!
//! Terms are parsed once per module during discovery and are immutable
//! afterwards. Two operations consume them:
//!
//! - [`Terms::negotiate`] — the directional compatibility check between a
//!   provider and a consumer, run pairwise during engine construction
//! - [`Contract`](crate::contract::Contract) compilation — the runtime
//!   validator applied to every document an action produces
//!
//! ## Declaration format
//!
//! Terms appear in an action manifest either inline:
//!
//! ```yaml
//! provides:
//!   functions:
//!     dataType: object
//!     array: true
//!     required: true
//!     contains:
//!       name: {dataType: string, required: true}
//!       description: {dataType: string, array: true}
//! ```
//!
//! or as a reference to an external file, resolved against the manifest's
//! directory:
//!
//! ```yaml
//! provides: "ref://terms.yaml"
//! ```

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    fs::read_to_string,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::ScrivError;

/// Prefix marking a terms declaration that lives in an external file.
const REF_PREFIX: &str = "ref://";

/// Base semantic type of a term entry.
///
/// A deliberately small, tagged set: structural compatibility is decided by
/// variant equality plus the array flag, independent of any runtime's own
/// type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named entry in a [`Terms`] mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermEntry {
    pub data_type: DataType,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub required: bool,
    /// Nested terms for structured (object) fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<Terms>,
}

/// A named, possibly nested mapping describing data shape.
///
/// Ordered by key so that negotiation and validation reports are
/// deterministic across runs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Terms(BTreeMap<String, TermEntry>);

impl Terms {
    /// Parse a terms declaration from manifest YAML.
    ///
    /// `value` is either a mapping of entries or a `ref://<path>` string
    /// naming an external YAML file relative to `base_dir` (the manifest's
    /// directory).
    pub fn parse(value: &serde_yaml::Value, base_dir: &Path) -> Result<Self, ScrivError> {
        match value {
            serde_yaml::Value::String(s) => {
                let Some(rel) = s.strip_prefix(REF_PREFIX) else {
                    return Err(ScrivError::Serialization(format!(
                        "Invalid terms declaration: expected a mapping or `{REF_PREFIX}` \
                         reference, got string `{s}`"
                    )));
                };
                let path = base_dir.join(rel);
                tracing::debug!("[Terms] Loading referenced terms from {:?}", path);
                let content = read_to_string(&path)?;
                Ok(serde_yaml::from_str(&content)?)
            }
            serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(value.clone())?),
            other => Err(ScrivError::Serialization(format!(
                "Invalid terms declaration: expected a mapping or `{REF_PREFIX}` reference, \
                 got {other:?}"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TermEntry> {
        self.0.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &TermEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: TermEntry) {
        self.0.insert(key.into(), entry);
    }

    /// Check that `provider` terms can satisfy `consumer` terms.
    ///
    /// The check is directional: every consumer entry drives validation.
    /// A required entry absent from the provider fails; a present entry must
    /// match on base type and array-ness; an entry declaring nested
    /// `contains` recurses into the provider's corresponding sub-terms.
    /// Short-circuits on the first unmet requirement with a dotted
    /// breadcrumb identifying the offending key.
    pub fn negotiate(provider: &Terms, consumer: &Terms) -> Result<(), ScrivError> {
        Self::negotiate_at(provider, consumer, &mut Vec::new())
    }

    fn negotiate_at(
        provider: &Terms,
        consumer: &Terms,
        stack: &mut Vec<String>,
    ) -> Result<(), ScrivError> {
        for (key, want) in consumer.entries() {
            let crumb = breadcrumb(stack, key);
            tracing::debug!(
                "[Terms] Checking key {} [required = {}]",
                crumb,
                want.required
            );

            let Some(have) = provider.get(key) else {
                if want.required {
                    return Err(ScrivError::Negotiation(format!(
                        "missing required key `{crumb}`"
                    )));
                }
                continue;
            };

            if have.data_type != want.data_type {
                return Err(ScrivError::Negotiation(format!(
                    "type mismatch for key `{}`: consumer expects {}, provider declares {}",
                    crumb, want.data_type, have.data_type
                )));
            }

            if have.array != want.array {
                return Err(ScrivError::Negotiation(format!(
                    "array mismatch for key `{}`: consumer expects array = {}, \
                     provider declares array = {}",
                    crumb, want.array, have.array
                )));
            }

            if let Some(want_inner) = &want.contains {
                let Some(have_inner) = &have.contains else {
                    return Err(ScrivError::Negotiation(format!(
                        "consumer requires nested terms under `{crumb}` but the provider \
                         declares none"
                    )));
                };
                stack.push(key.clone());
                Self::negotiate_at(have_inner, want_inner, stack)?;
                stack.pop();
            }
        }

        Ok(())
    }
}

/// Render a dotted path for negotiation and validation reports.
pub(crate) fn breadcrumb(stack: &[String], key: &str) -> String {
    if stack.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", stack.join("."), key)
    }
}

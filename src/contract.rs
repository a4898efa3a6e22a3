//! Runtime contracts compiled from negotiated terms.
//!
//! Structural compatibility at negotiation time does not guarantee that every
//! individual document instance is well-formed, so a successfully negotiated
//! pair yields two [`Contract`]s: the parser's producer contract and the
//! printer's consumer contract. Both validate the actual data handed from
//! parser to printer, once per file, inside the conveyor's validate stage.

use serde_json::Value;

use crate::{
    error::ScrivError,
    terms::{breadcrumb, DataType, TermEntry, Terms},
};

/// A compiled validator over a schema derived from [`Terms`].
///
/// Compilation is cheap (the terms are already parsed); the value of the type
/// is the negotiated-pair semantics: a `Contract` only exists for terms that
/// survived negotiation, and validation errors carry the same dotted
/// breadcrumbs negotiation reports use.
#[derive(Debug, Clone)]
pub struct Contract {
    terms: Terms,
}

impl Contract {
    pub fn new(terms: Terms) -> Self {
        Contract { terms }
    }

    pub fn terms(&self) -> &Terms {
        &self.terms
    }

    /// Negotiate a provider/consumer pair and compile both runtime contracts.
    ///
    /// Returns `(producer, consumer)` on success. The producer contract
    /// checks the parser honors its own declaration; the consumer contract
    /// checks the printer receives the shape it negotiated for.
    pub fn negotiate(provides: &Terms, consumes: &Terms) -> Result<(Contract, Contract), ScrivError> {
        Terms::negotiate(provides, consumes)?;

        Ok((
            Contract::new(provides.clone()),
            Contract::new(consumes.clone()),
        ))
    }

    /// Validate a runtime document against this contract.
    ///
    /// The document must be a JSON object; each term entry is checked for
    /// presence (if required), base type, array-ness, and recursively through
    /// `contains` for structured fields. A key present with a `null` value is
    /// treated as absent.
    pub fn validate(&self, document: &Value) -> Result<(), ScrivError> {
        let mut stack = Vec::new();
        Self::validate_object(&self.terms, document, &mut stack)
    }

    fn validate_object(
        terms: &Terms,
        value: &Value,
        stack: &mut Vec<String>,
    ) -> Result<(), ScrivError> {
        let Value::Object(map) = value else {
            return Err(ScrivError::Contract(format!(
                "expected an object at `{}`, got {}",
                if stack.is_empty() {
                    "(root)".to_string()
                } else {
                    stack.join(".")
                },
                type_name(value)
            )));
        };

        for (key, entry) in terms.entries() {
            let crumb = breadcrumb(stack, key);

            match map.get(key) {
                None | Some(Value::Null) => {
                    if entry.required {
                        return Err(ScrivError::Contract(format!(
                            "missing required key `{crumb}`"
                        )));
                    }
                }
                Some(found) => {
                    Self::validate_entry(entry, found, stack, key)?;
                }
            }
        }

        Ok(())
    }

    fn validate_entry(
        entry: &TermEntry,
        value: &Value,
        stack: &mut Vec<String>,
        key: &str,
    ) -> Result<(), ScrivError> {
        let crumb = breadcrumb(stack, key);

        if entry.array {
            let Value::Array(items) = value else {
                return Err(ScrivError::Contract(format!(
                    "expected an array at `{}`, got {}",
                    crumb,
                    type_name(value)
                )));
            };

            for item in items {
                Self::validate_scalar(entry, item, stack, key)?;
            }

            return Ok(());
        }

        Self::validate_scalar(entry, value, stack, key)
    }

    fn validate_scalar(
        entry: &TermEntry,
        value: &Value,
        stack: &mut Vec<String>,
        key: &str,
    ) -> Result<(), ScrivError> {
        let crumb = breadcrumb(stack, key);

        let matches = match entry.data_type {
            DataType::String => value.is_string(),
            DataType::Number => value.is_number(),
            DataType::Boolean => value.is_boolean(),
            DataType::Object => value.is_object(),
        };

        if !matches {
            return Err(ScrivError::Contract(format!(
                "type mismatch at `{}`: expected {}, got {}",
                crumb,
                entry.data_type,
                type_name(value)
            )));
        }

        if let Some(inner) = &entry.contains {
            stack.push(key.to_string());
            let result = Self::validate_object(inner, value, stack);
            stack.pop();
            result?;
        }

        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

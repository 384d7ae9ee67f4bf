//! Save-time coercion of UI strings into typed document values.
//!
//! Text controls only produce strings, so a list parameter arrives as
//! `"1,2,3"` and an unset one as `""`. Coercion splits on `,`, parses every
//! element on its own as a YAML scalar and collapses the result by arity:
//!
//! - no element (`""`, `"undefined"`, absent) → null
//! - one element (`"42"`) → that element (`42`, never `[42]`)
//! - several elements (`"1,2,3"`) → the ordered sequence (`[1, 2, 3]`)
//!
//! Values that are already typed pass through untouched. Loading never
//! coerces; see [`ParameterBinding::display_value`] for the other direction.

pub use crate::domain::model::UNDEFINED_SENTINEL;

use crate::domain::model::{ModuleInstance, ParameterBinding, Project, SlotValue};
use crate::domain::spec::ParameterKind;
use crate::utils::error::{ProjectError, Result};
use serde_yaml::Value;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("cannot parse {element:?}: {source}")]
pub struct ScalarError {
    pub element: String,
    #[source]
    pub source: serde_yaml::Error,
}

/// Parses one element with YAML flow-scalar rules. Blank text is the YAML
/// empty scalar, i.e. null.
pub fn parse_scalar(text: &str) -> std::result::Result<Value, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(text)
}

fn split_elements(text: &str) -> Vec<&str> {
    let elements: Vec<&str> = text.split(',').collect();
    match elements.as_slice() {
        [] | [""] | [UNDEFINED_SENTINEL] => Vec::new(),
        _ => elements,
    }
}

/// Coerces edited text. `empty` is what an empty list collapses to.
pub fn coerce_text(text: &str, empty: Value) -> std::result::Result<Value, ScalarError> {
    let mut parsed = split_elements(text)
        .into_iter()
        .map(|element| {
            parse_scalar(element).map_err(|source| ScalarError {
                element: element.to_string(),
                source,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(match parsed.len() {
        0 => empty,
        1 => parsed.remove(0),
        _ => Value::Sequence(parsed),
    })
}

/// Coerces a raw UI value; `None` is an absent value.
pub fn coerce(raw: Option<&str>) -> std::result::Result<Value, ScalarError> {
    match raw {
        Some(text) => coerce_text(text, Value::Null),
        None => Ok(Value::Null),
    }
}

pub fn coerce_slot(value: &SlotValue, empty: Value) -> std::result::Result<Value, ScalarError> {
    match value {
        SlotValue::Typed(typed) => Ok(typed.clone()),
        SlotValue::Raw(Some(text)) => coerce_text(text, empty),
        SlotValue::Raw(None) => Ok(Value::Null),
    }
}

/// Coerces one binding in place, keeping its slot (`key` or `value`).
///
/// An edited parameter declared as a sequence kind collapses to `[]` instead of null
/// when left empty.
pub fn coerce_binding(
    binding: &mut ParameterBinding,
    module: &str,
    declared: Option<ParameterKind>,
) -> Result<()> {
    let empty = match declared {
        Some(kind) if kind.is_sequence() => Value::Sequence(Vec::new()),
        _ => Value::Null,
    };

    let typed = coerce_slot(&binding.value, empty).map_err(|e| ProjectError::Coercion {
        module: module.to_string(),
        parameter: binding.name.clone(),
        element: e.element,
        source: e.source,
    })?;

    if binding.is_edited() {
        tracing::trace!(
            "coerced {}.{} ({}) to {:?}",
            module,
            binding.name,
            binding.slot_kind.field(),
            typed
        );
    }
    binding.set_typed(typed);
    Ok(())
}

pub fn coerce_module(module: &mut ModuleInstance) -> Result<()> {
    let specification = module.shared_specification();
    for binding in module
        .description
        .input
        .iter_mut()
        .chain(module.description.output.iter_mut())
    {
        let declared = specification
            .as_ref()
            .and_then(|s| s.kind_of(&binding.name))
            .or_else(|| binding.declared_kind());
        coerce_binding(binding, &module.name, declared)?;
    }
    Ok(())
}

/// Coerces every binding of every module. The first failure aborts the pass.
pub fn coerce_project(project: &mut Project) -> Result<()> {
    for module in project.handles.iter_mut() {
        coerce_module(module)?;
    }
    Ok(())
}

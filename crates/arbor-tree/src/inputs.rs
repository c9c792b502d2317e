//! Validation of engine-chosen tool inputs against declared inputs.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::tool::{ToolDescriptor, ToolInputs};

/// Check `raw` against `descriptor.inputs`.
///
/// Unknown names are rejected, missing optional inputs take their default,
/// and a `null` is treated as absent.
pub fn validate_inputs(descriptor: &ToolDescriptor, raw: Map<String, Value>) -> Result<ToolInputs, String> {
    if let Some(unknown) = raw
        .keys()
        .find(|name| !descriptor.inputs.iter().any(|spec| &spec.name == *name))
    {
        return Err(format!("unknown input '{unknown}'"));
    }

    let mut values = BTreeMap::new();
    for spec in &descriptor.inputs {
        match raw.get(&spec.name).filter(|v| !v.is_null()) {
            Some(value) if spec.kind.accepts(value) => {
                values.insert(spec.name.clone(), value.clone());
            }
            Some(value) => {
                return Err(format!(
                    "input '{}' expects {:?}, got {}",
                    spec.name, spec.kind, value
                ));
            }
            None if spec.required => {
                return Err(format!("missing required input '{}'", spec.name));
            }
            None => {
                if let Some(default) = &spec.default {
                    values.insert(spec.name.clone(), default.clone());
                }
            }
        }
    }
    Ok(ToolInputs::from_map(values))
}

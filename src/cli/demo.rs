//! Simulated host for the demo CLI: an in-memory document of named numeric
//! parameters.

use std::collections::BTreeMap;

use serde_json::json;

use crate::tools::{FnTool, HostContext, ToolArguments, ToolRegistry, ToolSchema};
use crate::types::ToolResult;

/// A document with named parameters, mutated only on the host thread.
#[derive(Debug, Clone)]
pub struct DemoDocument {
    pub parameters: BTreeMap<String, f64>,
}

impl Default for DemoDocument {
    fn default() -> Self {
        let parameters = [("width", 120.0), ("height", 80.0), ("depth", 40.0), ("wall", 2.5)]
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self { parameters }
    }
}

impl HostContext for DemoDocument {}

pub fn demo_registry() -> ToolRegistry<DemoDocument> {
    ToolRegistry::new()
        .with(FnTool::new(
            "list_parameters",
            "List every parameter of the active document with its current value.",
            ToolSchema::empty(),
            |doc: &mut DemoDocument, _| {
                let data: serde_json::Map<_, _> = doc
                    .parameters
                    .iter()
                    .map(|(name, value)| (name.clone(), json!(value)))
                    .collect();
                ToolResult::success(format!("{} parameters", data.len()))
                    .with_data("parameters", serde_json::Value::Object(data))
            },
        ))
        .with(FnTool::new(
            "get_parameter",
            "Read one parameter value by name.",
            ToolSchema::object().string("name", "Parameter name", true).build(),
            get_parameter,
        ))
        .with(FnTool::new(
            "set_parameter",
            "Set a parameter to a new value.",
            ToolSchema::object()
                .string("name", "Parameter name", true)
                .number("value", "New value", true)
                .build(),
            set_parameter,
        ))
}

fn get_parameter(doc: &mut DemoDocument, args: &ToolArguments) -> ToolResult {
    let name = match args.get_str("name") {
        Ok(name) => name,
        Err(err) => return err.into(),
    };
    match doc.parameters.get(name) {
        Some(value) => ToolResult::success(format!("{name} = {value}")).with_data("value", *value),
        None => ToolResult::failure(format!("Parameter '{name}' not found")),
    }
}

fn set_parameter(doc: &mut DemoDocument, args: &ToolArguments) -> ToolResult {
    let (name, value) = match (args.get_str("name"), args.get_f64("value")) {
        (Ok(name), Ok(value)) => (name, value),
        (Err(err), _) | (_, Err(err)) => return err.into(),
    };
    let Some(slot) = doc.parameters.get_mut(name) else {
        return ToolResult::failure(format!("Parameter '{name}' not found"));
    };
    let previous = *slot;
    *slot = value;
    let result = ToolResult::success(format!("{name}: {previous} -> {value}"))
        .with_data("previous", previous)
        .with_data("value", value);
    if value <= 0.0 {
        result.with_warning(format!("{name} is not positive"))
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn args(value: Value) -> ToolArguments {
        let Value::Object(map) = value else { unreachable!() };
        ToolArguments::new(map)
    }

    #[test]
    fn set_then_get() {
        let registry = demo_registry();
        let mut doc = DemoDocument::default();

        let set = registry.lookup("set_parameter").unwrap();
        let result = set.execute(&mut doc, &args(json!({"name": "width", "value": 150})));
        assert!(result.success, "{}", result.message);
        assert_eq!(result.message, "width: 120 -> 150");

        let get = registry.lookup("get_parameter").unwrap();
        let result = get.execute(&mut doc, &args(json!({"name": "width"})));
        assert_eq!(result.message, "width = 150");
    }

    #[test]
    fn unknown_and_missing_parameters_fail() {
        let registry = demo_registry();
        let mut doc = DemoDocument::default();
        let get = registry.lookup("get_parameter").unwrap();

        assert!(!get.execute(&mut doc, &args(json!({"name": "mass"}))).success);
        let missing = get.execute(&mut doc, &args(json!({})));
        assert!(!missing.success);
        assert!(missing.message.contains("name"), "{}", missing.message);
    }

    #[test]
    fn registry_lists_in_registration_order() {
        assert_eq!(
            demo_registry().names(),
            vec!["list_parameters", "get_parameter", "set_parameter"]
        );
    }
}

//! Required-parameter validation against a tool's [`ParamSchema`].
//!
//! Messages are PT-BR and already user-facing; the classifier passes them
//! through verbatim.

use deskpilot_core::message::Arguments;
use deskpilot_core::tool::ParamSchema;
use serde_json::Value;

/// Check every required parameter of an object schema.
///
/// Non-object schemas impose no constraints.
pub fn validate_arguments(schema: &ParamSchema, args: &Arguments) -> Result<(), String> {
    let ParamSchema::Object { properties, required, .. } = schema else {
        return Ok(());
    };

    for name in required {
        let value = match args.get(name) {
            None | Some(Value::Null) => return Err(format!("parâmetro obrigatório ausente: {name}")),
            Some(v) => v,
        };
        if let Some(declared) = properties.get(name) {
            check_type(name, declared, value)?;
        }
    }
    Ok(())
}

fn check_type(name: &str, declared: &ParamSchema, value: &Value) -> Result<(), String> {
    match declared {
        ParamSchema::String { allowed, .. } => {
            let Some(s) = value.as_str() else {
                return Err(format!("parâmetro {name} deve ser string"));
            };
            if s.trim().is_empty() {
                return Err(format!("parâmetro {name} não pode ser vazio"));
            }
            if !allowed.is_empty() && !allowed.iter().any(|a| a == s) {
                return Err(format!("parâmetro {name} deve ser um de: [{}]", allowed.join(", ")));
            }
            Ok(())
        }
        ParamSchema::Integer { .. } | ParamSchema::Number { .. } => {
            let numeric = match value {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            };
            if numeric {
                Ok(())
            } else {
                Err(format!("parâmetro {name} deve ser numérico"))
            }
        }
        _ => Ok(()),
    }
}

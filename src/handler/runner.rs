/// Second-stage runner
///
/// Executed inside a step by `galaxy invoke`: decodes the handler payload,
/// reconstructs the arguments from the args file written by the entry script,
/// validates them against the declared fields, runs the handler and writes
/// each output value to `<base_dir>/output-parameters/<name>`.
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{HandlerRegistry, StepArgs, StepOutputs};
use crate::contract::{Field, Role};
use crate::error::{GalaxyError, Result};
use crate::logging::operations;
use crate::template::{decode_payload, HandlerPayload, OUTPUT_PARAMETERS_DIR};

/// Run the handler described by `encoded_payload` against an args file
pub fn invoke(registry: &HandlerRegistry, encoded_payload: &str, args_file: &Path) -> Result<StepOutputs> {
    let payload = decode_payload(encoded_payload)?;
    let args = read_args(&payload, args_file)?;

    let handler = registry.get(&payload.handler).ok_or_else(|| GalaxyError::Handler {
        handler: payload.handler.clone(),
        reason: "no handler registered under this name".to_string(),
    })?;

    info!(
        operation = operations::HANDLER_INVOKE,
        handler = %payload.handler,
        "running handler"
    );
    let outputs = handler
        .run(&payload.config, &args)
        .map_err(|e| GalaxyError::Handler {
            handler: payload.handler.clone(),
            reason: format!("{:#}", e),
        })?;

    check_outputs(&payload, &outputs)?;
    write_output_parameters(&payload, &outputs)?;

    Ok(outputs)
}

fn read_args(payload: &HandlerPayload, args_file: &Path) -> Result<StepArgs> {
    let text = fs::read_to_string(args_file).map_err(|e| {
        GalaxyError::payload(format!(
            "failed to read args file {}: {}",
            args_file.display(),
            e
        ))
    })?;
    let raw: Map<String, Value> = serde_json::from_str(&text)
        .map_err(|e| GalaxyError::payload(format!("args file is not a JSON object: {}", e)))?;

    for field in &payload.inputs {
        let value = raw
            .get(&field.name)
            .ok_or_else(|| GalaxyError::payload(format!("missing argument '{}'", field.name)))?;
        check_arg(field, value)?;
    }

    if let Some(extra) = raw
        .keys()
        .find(|k| !payload.inputs.iter().any(|f| &f.name == *k))
    {
        return Err(GalaxyError::payload(format!(
            "undeclared argument '{}'",
            extra
        )));
    }

    debug!(arguments = raw.len(), "reconstructed handler arguments");
    Ok(StepArgs::new(raw))
}

fn check_arg(field: &Field, value: &Value) -> Result<()> {
    let ok = match field.role {
        Role::InputArtifact | Role::OutputArtifact => value.is_string(),
        _ => field.value_type.accepts(value),
    };
    if !ok {
        return Err(GalaxyError::payload(format!(
            "argument '{}' = {} is not a valid {:?}",
            field.name, value, field.value_type
        )));
    }
    Ok(())
}

fn check_outputs(payload: &HandlerPayload, outputs: &StepOutputs) -> Result<()> {
    let handler_error = |reason: String| GalaxyError::Handler {
        handler: payload.handler.clone(),
        reason,
    };

    for field in &payload.outputs {
        let value = outputs
            .get(&field.name)
            .ok_or_else(|| handler_error(format!("output '{}' was not set", field.name)))?;
        if !field.value_type.accepts(value) {
            return Err(handler_error(format!(
                "output '{}' = {} is not a valid {:?}",
                field.name, value, field.value_type
            )));
        }
    }

    if let Some((extra, _)) = outputs
        .iter()
        .find(|(k, _)| !payload.outputs.iter().any(|f| &f.name == *k))
    {
        return Err(handler_error(format!("undeclared output '{}'", extra)));
    }
    Ok(())
}

fn write_output_parameters(payload: &HandlerPayload, outputs: &StepOutputs) -> Result<()> {
    if payload.outputs.is_empty() {
        return Ok(());
    }

    let dir = PathBuf::from(&payload.base_dir).join(OUTPUT_PARAMETERS_DIR);
    fs::create_dir_all(&dir)?;

    for field in &payload.outputs {
        if let Some(value) = outputs.get(&field.name) {
            fs::write(dir.join(&field.name), field.value_type.render(value))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ValueType;
    use crate::template::{encode_payload, payload::PAYLOAD_VERSION};
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(base_dir: &Path) -> String {
        encode_payload(&HandlerPayload {
            version: PAYLOAD_VERSION,
            handler: "test.greet".to_string(),
            config: json!({"greeting": "hello"}),
            base_dir: base_dir.to_string_lossy().to_string(),
            inputs: vec![
                Field {
                    name: "who".to_string(),
                    role: Role::InputValue,
                    value_type: ValueType::String,
                },
                Field {
                    name: "times".to_string(),
                    role: Role::InputValue,
                    value_type: ValueType::Integer,
                },
            ],
            outputs: vec![
                Field {
                    name: "message".to_string(),
                    role: Role::OutputValue,
                    value_type: ValueType::String,
                },
                Field {
                    name: "length".to_string(),
                    role: Role::OutputValue,
                    value_type: ValueType::Integer,
                },
            ],
        })
        .unwrap()
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("test.greet", |config, args| {
            let greeting = config["greeting"].as_str().unwrap_or("hi");
            let message = format!("{} {}", greeting, args.str("who")?).repeat(args.i64("times")? as usize);
            Ok(StepOutputs::new()
                .set("length", message.len() as i64)
                .set("message", message))
        });
        registry
    }

    #[test]
    fn test_invoke_writes_output_parameters() {
        let temp = TempDir::new().unwrap();
        let args_file = temp.path().join("args.json");
        fs::write(&args_file, r#"{"who": "world", "times": 1}"#).unwrap();

        invoke(&registry(), &payload(temp.path()), &args_file).unwrap();

        let params = temp.path().join("output-parameters");
        assert_eq!(fs::read_to_string(params.join("message")).unwrap(), "hello world");
        assert_eq!(fs::read_to_string(params.join("length")).unwrap(), "11");
    }

    #[test]
    fn test_invalid_args() {
        let temp = TempDir::new().unwrap();
        let args_file = temp.path().join("args.json");

        fs::write(&args_file, r#"{"who": "world"}"#).unwrap();
        assert!(matches!(
            invoke(&registry(), &payload(temp.path()), &args_file),
            Err(GalaxyError::Payload(_))
        ));

        fs::write(&args_file, r#"{"who": "world", "times": "2"}"#).unwrap();
        assert!(invoke(&registry(), &payload(temp.path()), &args_file).is_err());

        fs::write(&args_file, r#"{"who": "world", "times": 2, "extra": 1}"#).unwrap();
        assert!(invoke(&registry(), &payload(temp.path()), &args_file).is_err());
    }

    #[test]
    fn test_unknown_handler() {
        let temp = TempDir::new().unwrap();
        let args_file = temp.path().join("args.json");
        fs::write(&args_file, r#"{"who": "world", "times": 1}"#).unwrap();

        assert!(matches!(
            invoke(&HandlerRegistry::new(), &payload(temp.path()), &args_file),
            Err(GalaxyError::Handler { .. })
        ));
    }

    #[test]
    fn test_missing_output_is_handler_error() {
        let temp = TempDir::new().unwrap();
        let args_file = temp.path().join("args.json");
        fs::write(&args_file, r#"{"who": "world", "times": 1}"#).unwrap();

        let mut registry = HandlerRegistry::new();
        registry.register_fn("test.greet", |_, _| Ok(StepOutputs::new()));

        let err = invoke(&registry, &payload(temp.path()), &args_file).unwrap_err();
        assert!(err.to_string().contains("was not set"));
    }
}

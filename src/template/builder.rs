/// Template builder
///
/// Turns a validated work unit into a [`Template`]:
///
/// 1. Entry script (bash): reads injected input values, assigns artifact mount
///    paths, writes the args map to `tmp/args.json` and runs the second stage.
/// 2. Second stage (bash): hands the args file and the embedded payload to the
///    runner (`galaxy invoke`), which executes the registered handler.
///
/// The content hash covers the second stage only, so work units sharing a
/// handler, config and shape share one uploaded blob.
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

use super::payload::{encode_payload, HandlerPayload, PAYLOAD_VERSION};
use super::script::{
    input_placeholder, join_remote, json_string, remote_parent, shell_quote, JSON_ESCAPE_FN,
    PAYLOAD_HEREDOC, RUNNER_ENV, VALUE_HEREDOC,
};
use super::{
    ArtifactDecl, Template, ValueDecl, INPUT_ARTIFACTS_DIR, OUTPUT_ARTIFACTS_DIR,
    OUTPUT_PARAMETERS_DIR, TMP_DIR,
};
use crate::contract::{validate_input_shape, validate_output_shape, Field, Role, WorkUnit};
use crate::error::{GalaxyError, Result};
use crate::logging::operations;

/// Build a template from a work unit
pub fn build_template(unit: &WorkUnit, base_dir: &str) -> Result<Template> {
    if unit.params().len() != 1 {
        return Err(GalaxyError::Signature {
            unit: unit.name().to_string(),
            found: unit.params().len(),
        });
    }
    if base_dir.trim().is_empty() {
        return Err(GalaxyError::Template("base dir must not be empty".to_string()));
    }

    let inputs = validate_input_shape(&unit.params()[0])?;
    let outputs = validate_output_shape(unit.output())?;

    let stage_two = render_stage_two(unit, base_dir, &inputs, &outputs)?;
    let content_hash = hex::encode(Sha256::digest(stage_two.as_bytes()));
    let name = format!("{}-{}", unit.name(), &content_hash[..12]);

    let mut input_values = BTreeMap::new();
    let mut input_artifacts = BTreeMap::new();
    let mut output_artifacts = BTreeMap::new();
    let mut output_values = BTreeMap::new();

    for field in &inputs {
        match field.role {
            Role::InputValue => {
                input_values.insert(
                    field.name.clone(),
                    ValueDecl {
                        name: field.name.clone(),
                        value_type: field.value_type,
                        path: None,
                    },
                );
            }
            Role::InputArtifact => {
                input_artifacts.insert(
                    field.name.clone(),
                    ArtifactDecl {
                        name: field.name.clone(),
                        path: join_remote(base_dir, &[INPUT_ARTIFACTS_DIR, &field.name]),
                    },
                );
            }
            Role::OutputArtifact => {
                output_artifacts.insert(
                    field.name.clone(),
                    ArtifactDecl {
                        name: field.name.clone(),
                        path: join_remote(base_dir, &[OUTPUT_ARTIFACTS_DIR, &field.name]),
                    },
                );
            }
            Role::OutputValue => {}
        }
    }

    for field in &outputs {
        output_values.insert(
            field.name.clone(),
            ValueDecl {
                name: field.name.clone(),
                value_type: field.value_type,
                path: Some(join_remote(
                    base_dir,
                    &[OUTPUT_PARAMETERS_DIR, &field.name],
                )),
            },
        );
    }

    let entry_script = render_entry_script(&name, base_dir, &inputs);
    check_relocatable(&entry_script, base_dir)?;

    debug!(
        operation = operations::TEMPLATE_BUILD,
        template = %name,
        handler = unit.handler(),
        object_id = %content_hash,
        "built template"
    );

    Ok(Template {
        name,
        unit: unit.name().to_string(),
        handler: unit.handler().to_string(),
        base_dir: base_dir.to_string(),
        entry_script,
        stage_two,
        content_hash,
        input_values,
        input_artifacts,
        output_artifacts,
        output_values,
    })
}

fn render_stage_two(
    unit: &WorkUnit,
    base_dir: &str,
    inputs: &[Field],
    outputs: &[Field],
) -> Result<String> {
    let payload = HandlerPayload {
        version: PAYLOAD_VERSION,
        handler: unit.handler().to_string(),
        config: unit.config().clone(),
        base_dir: base_dir.to_string(),
        inputs: inputs.to_vec(),
        outputs: outputs.to_vec(),
    };
    let encoded = encode_payload(&payload)?;

    Ok(format!(
        "#!/usr/bin/env bash\n\
         # galaxy stage two: handler {handler}\n\
         set -euo pipefail\n\
         exec \"${{{runner_env}:-galaxy}}\" invoke \"$1\" <<'{delim}'\n\
         {encoded}\n\
         {delim}\n",
        handler = unit.handler(),
        runner_env = RUNNER_ENV,
        delim = PAYLOAD_HEREDOC,
        encoded = encoded,
    ))
}

fn render_entry_script(name: &str, base_dir: &str, inputs: &[Field]) -> String {
    let tmp_dir = join_remote(base_dir, &[TMP_DIR]);
    let args_file = join_remote(base_dir, &[TMP_DIR, super::ARGS_FILE]);
    let stage_two = join_remote(base_dir, &[TMP_DIR, super::STAGE_TWO_FILE]);

    let mut lines = vec![
        "#!/usr/bin/env bash".to_string(),
        format!("# galaxy entry script: template {}", name),
        "set -euo pipefail".to_string(),
        String::new(),
        JSON_ESCAPE_FN.to_string(),
        String::new(),
        "__galaxy_args=()".to_string(),
    ];

    for field in inputs {
        match field.role {
            Role::InputValue => {
                lines.push(String::new());
                // The trailing sentinel keeps newlines that $(...) would strip
                lines.push(format!("__galaxy_value=$(cat <<'{}'", VALUE_HEREDOC));
                lines.push(input_placeholder(&field.name));
                lines.push(VALUE_HEREDOC.to_string());
                lines.push("printf x)".to_string());
                lines.push("__galaxy_value=${__galaxy_value%x}".to_string());
                lines.push("__galaxy_value=${__galaxy_value%$'\\n'}".to_string());
                if field.value_type.is_raw_text() {
                    lines.push(format!(
                        "__galaxy_args+=(\"\\\"{}\\\": \\\"$(__galaxy_json_str \"$__galaxy_value\")\\\"\")",
                        field.name
                    ));
                } else {
                    lines.push(format!(
                        "__galaxy_args+=(\"\\\"{}\\\": ${{__galaxy_value}}\")",
                        field.name
                    ));
                }
            }
            Role::InputArtifact => {
                let path = join_remote(base_dir, &[INPUT_ARTIFACTS_DIR, &field.name]);
                lines.push(format!(
                    "__galaxy_args+=({})",
                    shell_quote(&format!("{}: {}", json_string(&field.name), json_string(&path)))
                ));
            }
            Role::OutputArtifact => {
                let path = join_remote(base_dir, &[OUTPUT_ARTIFACTS_DIR, &field.name]);
                lines.push(format!("mkdir -p {}", shell_quote(remote_parent(&path))));
                lines.push(format!(
                    "__galaxy_args+=({})",
                    shell_quote(&format!("{}: {}", json_string(&field.name), json_string(&path)))
                ));
            }
            Role::OutputValue => {}
        }
    }

    lines.extend([
        String::new(),
        format!("mkdir -p {}", shell_quote(&tmp_dir)),
        "{".to_string(),
        "  printf '{\\n'".to_string(),
        "  __galaxy_sep=''".to_string(),
        "  for __galaxy_entry in ${__galaxy_args[@]+\"${__galaxy_args[@]}\"}; do".to_string(),
        "    printf '%s  %s' \"$__galaxy_sep\" \"$__galaxy_entry\"".to_string(),
        "    __galaxy_sep=$',\\n'".to_string(),
        "  done".to_string(),
        "  printf '\\n}\\n'".to_string(),
        format!("}} > {}", shell_quote(&args_file)),
        format!(
            "bash {} {}",
            shell_quote(&stage_two),
            shell_quote(&args_file)
        ),
        String::new(),
    ]);

    lines.join("\n")
}

/// Reject scripts referencing temp-directory paths outside the base dir
///
/// Such paths are shared between concurrently running step instances on the
/// same host.
fn check_relocatable(script: &str, base_dir: &str) -> Result<()> {
    let base = base_dir.trim_end_matches('/');
    let mut temp_roots = vec!["/tmp/".to_string(), "/var/tmp/".to_string()];
    let sys_tmp = std::env::temp_dir().to_string_lossy().to_string();
    if sys_tmp.starts_with('/') {
        temp_roots.push(format!("{}/", sys_tmp.trim_end_matches('/')));
    }

    for root in &temp_roots {
        for (idx, _) in script.match_indices(root.as_str()) {
            // Only consider path starts, not suffixes of longer paths
            let preceded_by_path = script[..idx]
                .chars()
                .last()
                .map(|c| !matches!(c, '\'' | '"' | ' ' | '\n' | '(' | '='))
                .unwrap_or(false);
            if preceded_by_path {
                continue;
            }

            let token: String = script[idx..]
                .chars()
                .take_while(|c| !matches!(c, '\'' | '"' | ' ' | '\n' | ')' | ';'))
                .collect();
            let inside_base = !base.is_empty()
                && (token == base || token.starts_with(&format!("{}/", base)));
            if !inside_base {
                return Err(GalaxyError::Template(format!(
                    "script references '{}' outside of base dir '{}'",
                    token, base_dir
                )));
            }
        }
    }
    Ok(())
}

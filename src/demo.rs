//! Square-sum demo pipeline.
//!
//! fan-out writes `num` files holding `0..num`, square squares each of them,
//! fan-in sums the squares and show prints the result file. The final output
//! is `sum(i * i for i in 0..num)`.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use crate::contract::{ShapeSpec, ValueType, WorkUnit};
use crate::handler::shell::SHELL_HANDLER;
use crate::handler::{HandlerRegistry, StepArgs, StepOutputs};
use crate::step::{ArtifactSource, Bindings, StepHandle};
use crate::workflow::WorkflowBuilder;

pub const FAN_OUT_HANDLER: &str = "demo.fan_out";
pub const SQUARE_HANDLER: &str = "demo.square";
pub const FAN_IN_HANDLER: &str = "demo.fan_in";

pub fn register_handlers(registry: &mut HandlerRegistry) {
    registry.register_fn(FAN_OUT_HANDLER, fan_out);
    registry.register_fn(SQUARE_HANDLER, square);
    registry.register_fn(FAN_IN_HANDLER, fan_in);
}

fn fan_out(_config: &Value, args: &StepArgs) -> Result<StepOutputs> {
    let num = args.i64("num")?;
    let output_dir = args.path("output_dir")?;
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    for i in 0..num {
        fs::write(output_dir.join(format!("file_{}.txt", i)), i.to_string())?;
    }
    Ok(StepOutputs::new())
}

fn read_number(path: &Path) -> Result<i64> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    text.trim()
        .parse()
        .with_context(|| format!("{} does not hold a number", path.display()))
}

fn list_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let pattern = format!("{}/*", dir.display());
    let mut files = Vec::new();
    for entry in glob::glob(&pattern).context("Invalid glob pattern")? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn square(_config: &Value, args: &StepArgs) -> Result<StepOutputs> {
    let input_dir = args.path("input_dir")?;
    let output_dir = args.path("output_dir")?;
    fs::create_dir_all(&output_dir)?;

    for file in list_files(&input_dir)? {
        let num = read_number(&file)?;
        let name = file.file_name().context("File has no name")?;
        fs::write(output_dir.join(name), (num * num).to_string())?;
    }
    Ok(StepOutputs::new())
}

fn fan_in(_config: &Value, args: &StepArgs) -> Result<StepOutputs> {
    let input_dir = args.path("input_dir")?;
    let result_file = args.path("result_file")?;

    let mut total = 0;
    for file in list_files(&input_dir)? {
        total += read_number(&file)?;
    }

    if let Some(parent) = result_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&result_file, total.to_string())?;
    Ok(StepOutputs::new().set("total", total))
}

pub fn fan_out_unit() -> WorkUnit {
    WorkUnit::new("fan-out", FAN_OUT_HANDLER).param(
        ShapeSpec::frozen("FanOutArgs")
            .input_value("num", ValueType::Integer)
            .output_artifact("output_dir"),
    )
}

pub fn square_unit() -> WorkUnit {
    WorkUnit::new("square", SQUARE_HANDLER).param(
        ShapeSpec::frozen("SquareArgs")
            .input_artifact("input_dir")
            .output_artifact("output_dir"),
    )
}

pub fn fan_in_unit() -> WorkUnit {
    WorkUnit::new("fan-in", FAN_IN_HANDLER)
        .param(
            ShapeSpec::frozen("FanInArgs")
                .input_artifact("input_dir")
                .output_artifact("result_file"),
        )
        .returns(ShapeSpec::mutable("FanInOutput").output_value("total", ValueType::Integer))
}

pub fn show_unit() -> WorkUnit {
    WorkUnit::new("show", SHELL_HANDLER)
        .param(ShapeSpec::frozen("ShowArgs").input_artifact("result_file"))
        .returns(ShapeSpec::mutable("ShowOutput").output_value("stdout", ValueType::String))
        .with_config(json!({"script": "cat \"$result_file\"", "capture": "stdout"}))
}

/// Handles of the square-sum steps
#[derive(Debug, Clone)]
pub struct SquareSum {
    pub fan_out: StepHandle,
    pub square: StepHandle,
    pub fan_in: StepHandle,
    pub show: StepHandle,
}

/// Register the square-sum steps on `builder`
pub fn build_square_sum(builder: &mut WorkflowBuilder, num: i64) -> crate::error::Result<SquareSum> {
    let fan_out = builder.add_step(
        &fan_out_unit(),
        "fan-out",
        Bindings::new()
            .value("num", num)
            .artifact("output_dir", ArtifactSource::stored("fanout")),
    )?;

    let square = builder.add_step(
        &square_unit(),
        "square",
        Bindings::new()
            .artifact("input_dir", fan_out.output_artifact("output_dir"))
            .artifact("output_dir", ArtifactSource::stored("square")),
    )?;

    let fan_in = builder.add_step(
        &fan_in_unit(),
        "fan-in",
        Bindings::new()
            .artifact("input_dir", square.output_artifact("output_dir"))
            .artifact("result_file", ArtifactSource::stored("result.txt")),
    )?;

    let show = builder.add_step(
        &show_unit(),
        "show",
        Bindings::new().artifact("result_file", fan_in.output_artifact("result_file")),
    )?;

    Ok(SquareSum {
        fan_out,
        square,
        fan_in,
        show,
    })
}

/// Expected result of the pipeline
pub fn expected_total(num: i64) -> i64 {
    (0..num).map(|i| i * i).sum()
}

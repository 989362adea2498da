/// Input/output contract of a work unit
///
/// A work unit declares its interface as explicit field descriptor lists. Each
/// input field is tagged with exactly one role (input value, input artifact or
/// output artifact); each output field is an output value. Shapes are validated
/// once, before any template is built.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GalaxyError, Result};

/// Role of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    InputValue,
    InputArtifact,
    OutputArtifact,
    OutputValue,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::InputValue => "input_value",
            Role::InputArtifact => "input_artifact",
            Role::OutputArtifact => "output_artifact",
            Role::OutputValue => "output_value",
        }
    }

    fn is_input_role(&self) -> bool {
        matches!(
            self,
            Role::InputValue | Role::InputArtifact | Role::OutputArtifact
        )
    }

    fn is_artifact(&self) -> bool {
        matches!(self, Role::InputArtifact | Role::OutputArtifact)
    }
}

/// Declared type of a field value
///
/// String-like values travel as raw text; everything else is JSON encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Json,
    Path,
}

impl ValueType {
    /// Whether values of this type are passed around as raw text
    pub fn is_raw_text(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Path)
    }

    /// Check a JSON value against this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::String | ValueType::Path => value.is_string(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Json => true,
        }
    }

    /// Render a value the way it is injected into a script or written to an
    /// output parameter file
    pub fn render(&self, value: &Value) -> String {
        match (self.is_raw_text(), value) {
            (true, Value::String(s)) => s.clone(),
            _ => value.to_string(),
        }
    }

    /// Parse rendered text back into a JSON value
    pub fn parse(&self, text: &str) -> Result<Value> {
        if self.is_raw_text() {
            return Ok(Value::String(text.to_string()));
        }
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| GalaxyError::payload(format!("'{}' is not valid JSON: {}", text, e)))?;
        if !self.accepts(&value) {
            return Err(GalaxyError::payload(format!(
                "'{}' is not a valid {:?}",
                text, self
            )));
        }
        Ok(value)
    }
}

/// Field declaration as written by the caller, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    roles: Vec<Role>,
    value_type: ValueType,
}

impl FieldSpec {
    /// An untagged field; add roles with [`FieldSpec::tagged`]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
            value_type,
        }
    }

    pub fn tagged(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A declared input or output shape
///
/// Once a shape is handed to a [`WorkUnit`] it cannot be modified; the builder
/// methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeSpec {
    name: String,
    frozen: bool,
    fields: Vec<FieldSpec>,
}

impl ShapeSpec {
    /// An immutable shape, the only kind accepted as an input shape
    pub fn frozen(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frozen: true,
            fields: Vec::new(),
        }
    }

    /// A shape whose instances may be reassigned (valid for outputs only)
    pub fn mutable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frozen: false,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn input_value(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.field(FieldSpec::new(name, value_type).tagged(Role::InputValue))
    }

    pub fn input_artifact(self, name: impl Into<String>) -> Self {
        self.field(FieldSpec::new(name, ValueType::Path).tagged(Role::InputArtifact))
    }

    pub fn output_artifact(self, name: impl Into<String>) -> Self {
        self.field(FieldSpec::new(name, ValueType::Path).tagged(Role::OutputArtifact))
    }

    pub fn output_value(self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.field(FieldSpec::new(name, value_type).tagged(Role::OutputValue))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// A validated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub role: Role,
    pub value_type: ValueType,
}

/// Validate an input shape
///
/// The shape must be frozen and every field must carry exactly one of the
/// input value, input artifact or output artifact roles.
pub fn validate_input_shape(shape: &ShapeSpec) -> Result<Vec<Field>> {
    if !shape.frozen {
        return Err(GalaxyError::schema(
            &shape.name,
            "input shape must be frozen",
        ));
    }

    validate_fields(shape, Role::is_input_role, "an input value, input artifact or output artifact")
}

/// Validate an optional output shape; an absent shape has no fields
pub fn validate_output_shape(shape: Option<&ShapeSpec>) -> Result<Vec<Field>> {
    match shape {
        Some(shape) => validate_fields(shape, |r| *r == Role::OutputValue, "an output value"),
        None => Ok(Vec::new()),
    }
}

fn validate_fields(
    shape: &ShapeSpec,
    allowed: impl Fn(&Role) -> bool,
    expected: &str,
) -> Result<Vec<Field>> {
    let mut fields: Vec<Field> = Vec::with_capacity(shape.fields.len());

    for spec in &shape.fields {
        validate_field_name(&shape.name, &spec.name)?;

        let role = match spec.roles.as_slice() {
            [role] if allowed(role) => *role,
            [] => {
                return Err(GalaxyError::schema(
                    &shape.name,
                    format!("field '{}' is not tagged, expected {}", spec.name, expected),
                ))
            }
            [role] => {
                return Err(GalaxyError::schema(
                    &shape.name,
                    format!(
                        "field '{}' is tagged {}, expected {}",
                        spec.name,
                        role.as_str(),
                        expected
                    ),
                ))
            }
            roles => {
                return Err(GalaxyError::schema(
                    &shape.name,
                    format!(
                        "field '{}' carries {} roles, expected exactly one",
                        spec.name,
                        roles.len()
                    ),
                ))
            }
        };

        if role.is_artifact() && spec.value_type != ValueType::Path {
            return Err(GalaxyError::schema(
                &shape.name,
                format!("artifact field '{}' must be path typed", spec.name),
            ));
        }

        if fields.iter().any(|f| f.name == spec.name) {
            return Err(GalaxyError::schema(
                &shape.name,
                format!("field '{}' is declared twice", spec.name),
            ));
        }

        fields.push(Field {
            name: spec.name.clone(),
            role,
            value_type: spec.value_type,
        });
    }

    Ok(fields)
}

/// Field names end up in paths, JSON keys and script placeholders
fn validate_field_name(shape: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest {
        return Err(GalaxyError::schema(
            shape,
            format!("field name '{}' must be an identifier", name),
        ));
    }
    if name.starts_with("__") {
        return Err(GalaxyError::schema(
            shape,
            format!("field name '{}' uses the reserved '__' prefix", name),
        ));
    }
    Ok(())
}

/// An isolated computation with a declared input/output contract
///
/// The computation itself is a statically compiled handler selected by
/// `handler`; `config` is the serialized configuration handed to it.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    name: String,
    handler: String,
    config: Value,
    params: Vec<ShapeSpec>,
    output: Option<ShapeSpec>,
}

impl WorkUnit {
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            config: Value::Null,
            params: Vec::new(),
            output: None,
        }
    }

    /// Declare a parameter; a valid work unit declares exactly one
    pub fn param(mut self, shape: ShapeSpec) -> Self {
        self.params.push(shape);
        self
    }

    pub fn returns(mut self, shape: ShapeSpec) -> Self {
        self.output = Some(shape);
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn params(&self) -> &[ShapeSpec] {
        &self.params
    }

    pub fn output(&self) -> Option<&ShapeSpec> {
        self.output.as_ref()
    }
}

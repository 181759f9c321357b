use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SIGMA_PARAMETER: &str = "sigma";

/// Filter as the client sends it: a name and free-form parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        FilterSpec {
            name: name.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Numeric parameter lookup. Any JSON number is accepted.
    pub fn float_parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(Value::as_f64)
    }
}

/// The closed set of supported filters with their typed parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    Grayscale,
    Blur { sigma: f32 },
    Sharpen { sigma: f32 },
    Negative,
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Grayscale => "Grayscale",
            Filter::Blur { .. } => "Blur",
            Filter::Sharpen { .. } => "Sharpen",
            Filter::Negative => "Negative",
        }
    }

    /// Resolve a wire filter into a typed one
    pub fn resolve(spec: &FilterSpec) -> Result<Self> {
        match spec.name.as_str() {
            "Grayscale" => Ok(Filter::Grayscale),
            "Blur" => Ok(Filter::Blur {
                sigma: required_sigma(spec)?,
            }),
            "Sharpen" => Ok(Filter::Sharpen {
                sigma: required_sigma(spec)?,
            }),
            "Negative" => Ok(Filter::Negative),
            other => Err(CoreError::UnknownFilter(other.to_string())),
        }
    }
}

impl TryFrom<&FilterSpec> for Filter {
    type Error = CoreError;

    fn try_from(spec: &FilterSpec) -> Result<Self> {
        Filter::resolve(spec)
    }
}

fn required_sigma(spec: &FilterSpec) -> Result<f32> {
    spec.float_parameter(SIGMA_PARAMETER)
        .map(|sigma| sigma as f32)
        .ok_or_else(|| CoreError::InvalidParameters {
            filter: spec.name.clone(),
            parameter: SIGMA_PARAMETER.to_string(),
        })
}

//! Read-only module declarations.
//!
//! A specification lists what a module consumes and produces. It is loaded
//! once, shared between module instances through an `Arc`, and never edited.

use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

/// Closed set of parameter kinds a module may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    IntensityImage,
    /// Binary mask image.
    BinaryImage,
    LabelImage,
    SegmentedObjects,
    Measurement,
    Figure,
    Numeric,
    Scalar,
    Boolean,
    /// Flag controlling whether a module renders its figure.
    Plot,
    Character,
    Sequence,
    Set,
}

impl ParameterKind {
    /// Kinds whose value is the name of another module's output rather than
    /// an inline literal.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            ParameterKind::IntensityImage
                | ParameterKind::BinaryImage
                | ParameterKind::LabelImage
                | ParameterKind::SegmentedObjects
                | ParameterKind::Measurement
        )
    }

    pub fn is_sequence(self) -> bool {
        matches!(self, ParameterKind::Sequence | ParameterKind::Set)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpecification {
    pub name: String,
    #[serde(default)]
    pub input: Vec<ParameterSpec>,
    #[serde(default)]
    pub output: Vec<ParameterSpec>,
}

impl ModuleSpecification {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Declared kind of a parameter, looked up across inputs and outputs.
    pub fn kind_of(&self, parameter: &str) -> Option<ParameterKind> {
        self.input
            .iter()
            .chain(self.output.iter())
            .find(|p| p.name == parameter)
            .map(|p| p.kind)
    }
}

use crate::domain::spec::{ModuleSpecification, ParameterKind, ParameterSpec};
use crate::utils::error::{ProjectError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// Deserializes an explicit `null` the same way as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Text some form controls report for a value that was never set.
pub const UNDEFINED_SENTINEL: &str = "undefined";

fn default_active() -> bool {
    true
}

/// Where a binding keeps its value in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// `key`: the name of another module's output.
    KeyRef,
    /// `value`: the value itself.
    Literal,
}

impl SlotKind {
    pub fn field(self) -> &'static str {
        match self {
            SlotKind::KeyRef => "key",
            SlotKind::Literal => "value",
        }
    }
}

/// The authoritative value of a binding. `Raw` while the UI edits it,
/// `Typed` at rest in a loaded or coerced document.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Raw(Option<String>),
    Typed(Value),
}

impl SlotValue {
    fn into_document_value(self) -> Value {
        match self {
            SlotValue::Typed(value) => value,
            SlotValue::Raw(Some(text)) => Value::String(text),
            SlotValue::Raw(None) => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Mapping", into = "Mapping")]
pub struct ParameterBinding {
    pub name: String,
    pub slot_kind: SlotKind,
    pub value: SlotValue,
    /// Document fields this layer does not interpret (`type`, `help`, ...).
    pub extra: Mapping,
}

impl ParameterBinding {
    pub fn typed(name: impl Into<String>, slot_kind: SlotKind, value: Value) -> Self {
        Self {
            name: name.into(),
            slot_kind,
            value: SlotValue::Typed(value),
            extra: Mapping::new(),
        }
    }

    pub fn set_raw(&mut self, raw: Option<String>) {
        self.value = SlotValue::Raw(raw);
    }

    /// For widgets that produce a native value (e.g. a checkbox) instead of text.
    pub fn set_typed(&mut self, value: Value) {
        self.value = SlotValue::Typed(value);
    }

    pub fn is_edited(&self) -> bool {
        matches!(self.value, SlotValue::Raw(_))
    }

    /// Kind named by the binding's own `type` field, if it is a known one.
    pub fn declared_kind(&self) -> Option<ParameterKind> {
        self.extra
            .get("type")
            .and_then(|kind| serde_yaml::from_value(kind.clone()).ok())
    }

    /// The string a text control shows for this binding.
    ///
    /// Typed values are rendered by the YAML serializer, so strings that
    /// would read back as another type come out quoted. Sequences are
    /// comma-joined, null is the empty string. A string equal to
    /// [`UNDEFINED_SENTINEL`] is shown quoted so it does not read back as
    /// empty.
    ///
    /// Text cannot tell a one-element or empty sequence from a scalar or null,
    /// and a string containing `,` reads back as a sequence.
    pub fn display_value(&self) -> String {
        match &self.value {
            SlotValue::Raw(raw) => raw.clone().unwrap_or_default(),
            SlotValue::Typed(Value::Null) => String::new(),
            SlotValue::Typed(Value::Sequence(items)) => items
                .iter()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(","),
            SlotValue::Typed(value) => stringify(value),
        }
    }
}

fn stringify(value: &Value) -> String {
    if let Value::String(text) = value {
        if text == UNDEFINED_SENTINEL {
            return format!("'{}'", text);
        }
    }
    serde_yaml::to_string(value)
        .map(|text| text.trim_end().to_string())
        .unwrap_or_default()
}

impl TryFrom<Mapping> for ParameterBinding {
    type Error = ProjectError;

    fn try_from(mapping: Mapping) -> Result<Self> {
        let mut name = None;
        let mut key = None;
        let mut value = None;
        let mut extra = Mapping::new();

        for (field, content) in mapping {
            match field.as_str() {
                Some("name") => name = Some(content),
                Some("key") => key = Some(content),
                Some("value") => value = Some(content),
                _ => {
                    extra.insert(field, content);
                }
            }
        }

        let name = match name {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(ProjectError::MalformedDocument {
                    message: format!("parameter name must be a string, found {:?}", other),
                })
            }
            None => {
                return Err(ProjectError::MalformedDocument {
                    message: "parameter without a name".to_string(),
                })
            }
        };

        let (slot_kind, typed) = match (key, value) {
            (Some(_), Some(_)) => {
                return Err(ProjectError::MalformedDocument {
                    message: format!("parameter '{}' carries both key and value", name),
                })
            }
            (Some(key), None) => (SlotKind::KeyRef, key),
            (None, Some(value)) => (SlotKind::Literal, value),
            (None, None) => (SlotKind::Literal, Value::Null),
        };

        Ok(Self {
            name,
            slot_kind,
            value: SlotValue::Typed(typed),
            extra,
        })
    }
}

impl From<ParameterBinding> for Mapping {
    fn from(binding: ParameterBinding) -> Self {
        let mut mapping = Mapping::new();
        mapping.insert(Value::from("name"), Value::String(binding.name));
        mapping.insert(
            Value::from(binding.slot_kind.field()),
            binding.value.into_document_value(),
        );
        for (field, content) in binding.extra {
            mapping.insert(field, content);
        }
        mapping
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandleDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub input: Vec<ParameterBinding>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output: Vec<ParameterBinding>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInstance {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: HandleDescription,
    #[serde(flatten)]
    pub extra: Mapping,
    #[serde(skip)]
    specification: Option<Arc<ModuleSpecification>>,
}

impl ModuleInstance {
    pub fn new(name: impl Into<String>, description: HandleDescription) -> Self {
        Self {
            name: name.into(),
            description,
            extra: Mapping::new(),
            specification: None,
        }
    }

    /// A fresh instance holding the declared defaults of `specification`.
    pub fn from_specification(name: impl Into<String>, specification: Arc<ModuleSpecification>) -> Self {
        let bind = |spec: &ParameterSpec| {
            let slot_kind = if spec.kind.is_reference() {
                SlotKind::KeyRef
            } else {
                SlotKind::Literal
            };
            let mut binding = ParameterBinding::typed(
                spec.name.clone(),
                slot_kind,
                spec.default.clone().unwrap_or(Value::Null),
            );
            if let Ok(kind) = serde_yaml::to_value(spec.kind) {
                binding.extra.insert(Value::from("type"), kind);
            }
            binding
        };

        let description = HandleDescription {
            input: specification.input.iter().map(bind).collect(),
            output: specification.output.iter().map(bind).collect(),
            extra: Mapping::new(),
        };

        let mut instance = Self::new(name, description);
        instance.specification = Some(specification);
        instance
    }

    pub fn attach_specification(&mut self, specification: Arc<ModuleSpecification>) {
        self.specification = Some(specification);
    }

    pub fn shared_specification(&self) -> Option<Arc<ModuleSpecification>> {
        self.specification.clone()
    }

    /// The attached specification decides; without one, the binding's own
    /// `type` field does.
    pub fn declared_kind(&self, parameter: &str) -> Option<ParameterKind> {
        self.specification
            .as_ref()
            .and_then(|s| s.kind_of(parameter))
            .or_else(|| self.parameter(parameter)?.declared_kind())
    }

    /// Looks the name up among inputs first, then outputs.
    pub fn parameter(&self, name: &str) -> Option<&ParameterBinding> {
        self.description
            .input
            .iter()
            .chain(self.description.output.iter())
            .find(|b| b.name == name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut ParameterBinding> {
        self.description
            .input
            .iter_mut()
            .chain(self.description.output.iter_mut())
            .find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEntry {
    #[serde(default)]
    pub handles: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl PipelineEntry {
    pub fn new(handles: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            handles: handles.into(),
            source: source.into(),
            active: true,
            extra: Mapping::new(),
        }
    }

    /// Module name this entry refers to: the handles file name without its
    /// `.handles.yaml` suffix.
    pub fn module_name(&self) -> &str {
        let file = self.handles.rsplit('/').next().unwrap_or(&self.handles);
        let stem = file
            .strip_suffix(".yaml")
            .or_else(|| file.strip_suffix(".yml"))
            .unwrap_or(file);
        stem.strip_suffix(".handles").unwrap_or(stem)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerPattern {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl LayerPattern {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Mapping::new(),
        }
    }

    /// An empty name marks a layer that has not been configured yet.
    pub fn is_configured(&self) -> bool {
        !self.name.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagesDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub layers: Vec<LayerPattern>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub pipeline: Vec<PipelineEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: ImagesDescription,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipeDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: PipelineDescription,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(skip)]
    pub experiment_id: String,
    pub name: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "PipeDocument::is_empty"
    )]
    pub pipe: PipeDocument,
    #[serde(default, deserialize_with = "null_as_default")]
    pub handles: Vec<ModuleInstance>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl PipeDocument {
    pub fn is_empty(&self) -> bool {
        *self == PipeDocument::default()
    }
}

impl Project {
    /// Places a loaded document into the model as-is. Values stay typed.
    pub fn from_yaml(experiment_id: impl Into<String>, content: &str) -> Result<Self> {
        let mut project: Project = serde_yaml::from_str(content)?;
        project.experiment_id = experiment_id.into();
        Ok(project)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Independent deep copy. Module specifications stay shared.
    pub fn snapshot(&self) -> Project {
        self.clone()
    }

    pub fn module(&self, name: &str) -> Option<&ModuleInstance> {
        self.handles.iter().find(|m| m.name == name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleInstance> {
        self.handles.iter_mut().find(|m| m.name == name)
    }

    /// Records a UI edit of one parameter.
    pub fn set_raw(&mut self, module: &str, parameter: &str, raw: Option<String>) -> Result<()> {
        let instance = self
            .module_mut(module)
            .ok_or_else(|| ProjectError::UnknownModule {
                name: module.to_string(),
            })?;
        let binding =
            instance
                .parameter_mut(parameter)
                .ok_or_else(|| ProjectError::UnknownParameter {
                    module: module.to_string(),
                    name: parameter.to_string(),
                })?;
        binding.set_raw(raw);
        Ok(())
    }

    pub fn layers(&self) -> &[LayerPattern] {
        &self.pipe.description.images.layers
    }

    /// Appends an unconfigured layer for the user to fill in.
    pub fn add_layer(&mut self) -> &mut LayerPattern {
        let layers = &mut self.pipe.description.images.layers;
        layers.push(LayerPattern::default());
        let last = layers.len() - 1;
        &mut layers[last]
    }

    /// Drops every unconfigured layer, keeping the order of the others.
    /// Configured layers are never removed.
    pub fn prune_unconfigured_layers(&mut self) -> usize {
        let layers = &mut self.pipe.description.images.layers;
        let before = layers.len();
        layers.retain(LayerPattern::is_configured);
        before - layers.len()
    }

    pub fn verify_lockstep(&self) -> Result<()> {
        let entries = &self.pipe.description.pipeline;
        if entries.len() != self.handles.len() {
            return Err(ProjectError::Lockstep {
                message: format!(
                    "{} pipeline entries but {} module handles",
                    entries.len(),
                    self.handles.len()
                ),
            });
        }

        for (position, (entry, module)) in entries.iter().zip(&self.handles).enumerate() {
            if entry.module_name() != module.name {
                return Err(ProjectError::Lockstep {
                    message: format!(
                        "position {} lists '{}' in the pipeline but '{}' in handles",
                        position,
                        entry.module_name(),
                        module.name
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn add_module(&mut self, entry: PipelineEntry, module: ModuleInstance) -> Result<()> {
        if entry.module_name() != module.name {
            return Err(ProjectError::Lockstep {
                message: format!(
                    "pipeline entry '{}' does not describe module '{}'",
                    entry.module_name(),
                    module.name
                ),
            });
        }
        if self.module(&module.name).is_some() {
            return Err(ProjectError::Lockstep {
                message: format!("module '{}' already exists", module.name),
            });
        }

        self.pipe.description.pipeline.push(entry);
        self.handles.push(module);
        Ok(())
    }

    pub fn remove_module(&mut self, name: &str) -> Result<(PipelineEntry, ModuleInstance)> {
        let position = self.module_position(name)?;
        Ok((
            self.pipe.description.pipeline.remove(position),
            self.handles.remove(position),
        ))
    }

    pub fn move_module(&mut self, name: &str, to: usize) -> Result<()> {
        let from = self.module_position(name)?;
        if to >= self.handles.len() {
            return Err(ProjectError::Lockstep {
                message: format!(
                    "cannot move '{}' to position {} of {}",
                    name,
                    to,
                    self.handles.len()
                ),
            });
        }

        let entry = self.pipe.description.pipeline.remove(from);
        self.pipe.description.pipeline.insert(to, entry);
        let module = self.handles.remove(from);
        self.handles.insert(to, module);
        Ok(())
    }

    fn module_position(&self, name: &str) -> Result<usize> {
        let position = self
            .handles
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| ProjectError::UnknownModule {
                name: name.to_string(),
            })?;
        if position >= self.pipe.description.pipeline.len() {
            return Err(ProjectError::Lockstep {
                message: format!("module '{}' has no pipeline entry", name),
            });
        }
        Ok(position)
    }
}

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::TomlConfig;

pub use crate::adapters::HttpProjectStore;
pub use crate::core::gateway::{ChannelDescriptor, FigureDocument, ProjectGateway};
pub use crate::domain::model::{
    LayerPattern, ModuleInstance, ParameterBinding, PipelineEntry, Project, SlotKind, SlotValue,
};
pub use crate::domain::spec::{ModuleSpecification, ParameterKind};
pub use crate::utils::error::{ProjectError, Rejection, Result};

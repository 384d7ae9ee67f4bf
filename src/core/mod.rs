pub mod coercion;
pub mod gateway;
pub mod project;

pub use crate::domain::model::{ModuleInstance, ParameterBinding, Project};
pub use crate::domain::ports::{ConfigProvider, ProjectStore};
pub use crate::utils::error::Result;

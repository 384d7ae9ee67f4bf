// Domain layer: project document model, module declarations and ports.

pub mod model;
pub mod ports;
pub mod spec;

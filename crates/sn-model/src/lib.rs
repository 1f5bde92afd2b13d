pub mod architecture;
pub mod checkpoint;
pub mod error;
pub mod image;
pub mod squeezenet;
pub mod transform;
pub mod variables;

pub use architecture::ModelArchitecture;
pub use checkpoint::{CheckpointLoader, Manifest, ManifestEntry};
pub use error::{ModelError, Result};
pub use image::{rgba_to_tensor, tensor_to_rgba};
pub use squeezenet::{top_k_classes, FireModule, SqueezeNet, SqueezeNetConfig, SqueezeNetOutput};
pub use transform::{TransformNet, TransformNetConfig, TransformPlan};
pub use variables::{var_name, MemoryLoader, VariableLoader, VariableStore};

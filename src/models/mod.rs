//! Classifier interface, ONNX backend and inference engine

pub mod classifier;
pub mod inference;
pub mod loader;
pub mod onnx;

pub use classifier::{predict, ClassOutput, Classifier};
pub use inference::{InferenceEngine, Scored};
pub use loader::{ModelLoader, ModelManifest};
pub use onnx::OnnxClassifier;

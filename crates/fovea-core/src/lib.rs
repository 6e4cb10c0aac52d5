//! fovea-core — Model loading and tensor layout negotiation.
//!
//! Loads an opaque model blob, initializes the inference engine from it,
//! and negotiates the input/output tensor layout that fixes the capture
//! pipeline's buffer geometry for the process lifetime.

pub mod engine;
pub mod layout;
pub mod model;

pub use engine::{EngineError, EngineInfo, InferenceEngine, IoCounts, OrtEngine};
pub use layout::{
    negotiate, ElementType, InputBinding, LayoutTag, NegotiatedLayout, TensorAttr, MAX_IO_TENSORS,
};
pub use model::{ModelBlob, ModelError};

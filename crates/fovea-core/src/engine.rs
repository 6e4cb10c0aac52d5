//! Inference engine abstraction and its ONNX Runtime implementation.
//!
//! The pipeline treats the engine as an opaque capability: query tensor
//! attributes for layout negotiation, accept a converted frame for a future
//! inference pass. `OrtEngine` is the production implementation; tests drive
//! the negotiator through mock engines.

use crate::layout::{ElementType, InputBinding, LayoutTag, TensorAttr};
use crate::model::ModelBlob;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use thiserror::Error;

const ORT_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine init failed: {0}")]
    Init(String),
    #[error("engine query failed: {0}")]
    Query(String),
    #[error("model declares {count} {kind} tensors, limit is {max}")]
    TooManyTensors {
        kind: &'static str,
        count: usize,
        max: usize,
    },
    #[error("model has no input tensors")]
    NoInputs,
    #[error("input tensor 0 has unusable shape {0:?}")]
    MalformedShape(Vec<i64>),
    #[error("input size mismatch: binding wants {expected} bytes, got {actual}")]
    InputSize { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Informational engine/model strings. A failed query for these is loud but
/// never fatal.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub producer: String,
    pub graph_name: String,
}

/// Declared input/output tensor counts.
#[derive(Debug, Clone, Copy)]
pub struct IoCounts {
    pub inputs: usize,
    pub outputs: usize,
}

/// Opaque inference capability: attribute queries for layout negotiation,
/// plus the run-inference entry point the pipeline feeds toward.
pub trait InferenceEngine {
    /// Informational producer/graph strings.
    fn describe(&self) -> Result<EngineInfo, EngineError>;
    /// Declared input and output tensor counts.
    fn io_counts(&self) -> Result<IoCounts, EngineError>;
    fn input_attr(&self, index: usize) -> Result<TensorAttr, EngineError>;
    fn output_attr(&self, index: usize) -> Result<TensorAttr, EngineError>;
    /// Run one inference pass over a converted frame buffer matching the
    /// negotiated binding.
    fn infer(&mut self, binding: &InputBinding, pixels: &[u8]) -> Result<(), EngineError>;
}

/// ONNX Runtime-backed engine.
pub struct OrtEngine {
    session: Session,
}

impl OrtEngine {
    /// Initialize a session from a loaded model blob.
    ///
    /// Consumes the blob; the runtime keeps its own copy of the graph, so
    /// the bytes are released when this call returns.
    pub fn new(blob: ModelBlob) -> Result<Self, EngineError> {
        let mut builder = Session::builder()
            .map_err(|e| EngineError::Init(e.to_string()))?
            .with_intra_threads(ORT_INTRA_THREADS)
            .map_err(|e| EngineError::Init(e.to_string()))?;
        let session = builder
            .commit_from_memory(blob.as_bytes())
            .map_err(|e| EngineError::Init(e.to_string()))?;

        tracing::info!(
            inputs = ?session.inputs().iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "initialized inference session"
        );

        Ok(Self { session })
    }

    fn attr_of(
        value_type: &ValueType,
        index: usize,
        kind: &'static str,
    ) -> Result<TensorAttr, EngineError> {
        let ValueType::Tensor { ty, shape, .. } = value_type else {
            return Err(EngineError::Query(format!(
                "{kind} {index} is not a tensor value"
            )));
        };
        let dims: Vec<i64> = shape.iter().copied().collect();
        Ok(TensorAttr {
            index,
            elem: element_type(*ty),
            layout: LayoutTag::guess(&dims),
            dims,
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn describe(&self) -> Result<EngineInfo, EngineError> {
        let meta = self.session.metadata()?;
        Ok(EngineInfo {
            producer: meta.producer()?,
            graph_name: meta.name()?,
        })
    }

    fn io_counts(&self) -> Result<IoCounts, EngineError> {
        Ok(IoCounts {
            inputs: self.session.inputs().len(),
            outputs: self.session.outputs().len(),
        })
    }

    fn input_attr(&self, index: usize) -> Result<TensorAttr, EngineError> {
        let inputs = self.session.inputs();
        let input = inputs
            .get(index)
            .ok_or_else(|| EngineError::Query(format!("input tensor {index} out of range")))?;
        Self::attr_of(input.dtype(), index, "input")
    }

    fn output_attr(&self, index: usize) -> Result<TensorAttr, EngineError> {
        let outputs = self.session.outputs();
        let output = outputs
            .get(index)
            .ok_or_else(|| EngineError::Query(format!("output tensor {index} out of range")))?;
        Self::attr_of(output.dtype(), index, "output")
    }

    fn infer(&mut self, binding: &InputBinding, pixels: &[u8]) -> Result<(), EngineError> {
        if pixels.len() != binding.size {
            return Err(EngineError::InputSize {
                expected: binding.size,
                actual: pixels.len(),
            });
        }

        let g = binding.geometry;
        let tensor = Array4::from_shape_vec(
            (
                1,
                g.height as usize,
                g.width as usize,
                g.channels as usize,
            ),
            pixels.to_vec(),
        )
        .map_err(|e| EngineError::Query(format!("input reshape failed: {e}")))?;

        let _outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;
        // TODO: surface output tensors once a downstream consumer lands.
        Ok(())
    }
}

fn element_type(ty: ort::value::TensorElementType) -> ElementType {
    use ort::value::TensorElementType as T;
    match ty {
        T::Uint8 => ElementType::Uint8,
        T::Int8 => ElementType::Int8,
        T::Float16 => ElementType::Float16,
        T::Float32 => ElementType::Float32,
        T::Int64 => ElementType::Int64,
        _ => ElementType::Other,
    }
}

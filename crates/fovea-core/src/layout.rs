//! Tensor attribute negotiation and input-geometry derivation.
//!
//! Runs once at startup against an initialized engine. The derived geometry
//! is immutable for the process lifetime and fixes the converter's
//! destination buffer.

use crate::engine::{EngineError, InferenceEngine};
use fovea_hw::Geometry;
use serde::Serialize;

/// Hard bound on declared input/output tensor counts. Models declaring more
/// are rejected during negotiation rather than truncated.
pub const MAX_IO_TENSORS: usize = 8;

/// Dimension-ordering convention of a tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayoutTag {
    /// Channel dimension immediately after batch.
    ChannelFirst,
    /// Channel dimension last.
    ChannelLast,
}

impl LayoutTag {
    /// Guess the layout of a 4-D shape: a small second dimension reads as a
    /// channel count.
    pub fn guess(dims: &[i64]) -> LayoutTag {
        match dims {
            [_, c, _, _] if (1..=4).contains(c) => LayoutTag::ChannelFirst,
            _ => LayoutTag::ChannelLast,
        }
    }
}

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementType {
    Uint8,
    Int8,
    Float16,
    Float32,
    Int64,
    Other,
}

/// Engine-reported descriptor of one model input or output.
#[derive(Debug, Clone, Serialize)]
pub struct TensorAttr {
    pub index: usize,
    pub elem: ElementType,
    pub dims: Vec<i64>,
    pub layout: LayoutTag,
}

/// Prepared input-tensor descriptor for the inference call: unsigned 8-bit,
/// channel-last, sized to the negotiated geometry. Produced at negotiation
/// time so the converted buffer can be bound without recomputation.
#[derive(Debug, Clone, Serialize)]
pub struct InputBinding {
    pub index: usize,
    pub elem: ElementType,
    pub layout: LayoutTag,
    pub geometry: Geometry,
    pub size: usize,
}

/// Everything negotiation produces. Read-only after startup.
#[derive(Debug, Clone, Serialize)]
pub struct NegotiatedLayout {
    pub inputs: Vec<TensorAttr>,
    pub outputs: Vec<TensorAttr>,
    pub geometry: Geometry,
    pub binding: InputBinding,
}

/// Query the engine for its tensor layout and derive the input geometry.
///
/// The informational description query may fail without aborting. Every
/// other query is required: a failed count or attribute query aborts
/// negotiation, inputs and outputs alike — a model whose tensors cannot be
/// described is unusable downstream.
pub fn negotiate(engine: &dyn InferenceEngine) -> Result<NegotiatedLayout, EngineError> {
    match engine.describe() {
        Ok(info) => tracing::info!(
            producer = %info.producer,
            graph = %info.graph_name,
            "engine described"
        ),
        Err(e) => tracing::warn!(error = %e, "engine description query failed"),
    }

    let counts = engine.io_counts()?;
    tracing::info!(
        inputs = counts.inputs,
        outputs = counts.outputs,
        "model io counts"
    );

    if counts.inputs > MAX_IO_TENSORS {
        return Err(EngineError::TooManyTensors {
            kind: "input",
            count: counts.inputs,
            max: MAX_IO_TENSORS,
        });
    }
    if counts.outputs > MAX_IO_TENSORS {
        return Err(EngineError::TooManyTensors {
            kind: "output",
            count: counts.outputs,
            max: MAX_IO_TENSORS,
        });
    }
    if counts.inputs == 0 {
        return Err(EngineError::NoInputs);
    }

    let mut inputs = Vec::with_capacity(counts.inputs);
    for i in 0..counts.inputs {
        inputs.push(engine.input_attr(i)?);
    }

    let mut outputs = Vec::with_capacity(counts.outputs);
    for i in 0..counts.outputs {
        outputs.push(engine.output_attr(i)?);
    }

    let geometry = derive_geometry(&inputs[0])?;
    tracing::info!(
        width = geometry.width,
        height = geometry.height,
        channels = geometry.channels,
        layout = ?inputs[0].layout,
        "derived input geometry"
    );

    let binding = InputBinding {
        index: 0,
        elem: ElementType::Uint8,
        layout: LayoutTag::ChannelLast,
        geometry,
        size: geometry.required_len(),
    };

    Ok(NegotiatedLayout {
        inputs,
        outputs,
        geometry,
        binding,
    })
}

/// Map input tensor 0's shape to width/height/channels.
///
/// The layout tag decides how shape entries 1..4 are read:
/// channel-first as (channels, width, height), channel-last as
/// (width, height, channels). This branch must match the model exactly;
/// a wrong read silently corrupts every converted frame.
fn derive_geometry(attr: &TensorAttr) -> Result<Geometry, EngineError> {
    if attr.dims.len() < 4 || attr.dims[1..4].iter().any(|&d| d <= 0) {
        return Err(EngineError::MalformedShape(attr.dims.clone()));
    }

    let (channels, width, height) = match attr.layout {
        LayoutTag::ChannelFirst => (attr.dims[1], attr.dims[2], attr.dims[3]),
        LayoutTag::ChannelLast => (attr.dims[3], attr.dims[1], attr.dims[2]),
    };

    Ok(Geometry {
        width: width as u32,
        height: height as u32,
        channels: channels as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineInfo, IoCounts};

    struct MockEngine {
        inputs: Vec<TensorAttr>,
        outputs: Vec<TensorAttr>,
        declared_inputs: Option<usize>,
        declared_outputs: Option<usize>,
        describe_fails: bool,
        fail_output_at: Option<usize>,
    }

    fn attr(index: usize, dims: Vec<i64>) -> TensorAttr {
        TensorAttr {
            index,
            elem: ElementType::Float32,
            layout: LayoutTag::guess(&dims),
            dims,
        }
    }

    fn mock(input_dims: Vec<i64>) -> MockEngine {
        MockEngine {
            inputs: vec![attr(0, input_dims)],
            outputs: vec![attr(0, vec![1, 1000])],
            declared_inputs: None,
            declared_outputs: None,
            describe_fails: false,
            fail_output_at: None,
        }
    }

    impl InferenceEngine for MockEngine {
        fn describe(&self) -> Result<EngineInfo, EngineError> {
            if self.describe_fails {
                return Err(EngineError::Query("metadata unavailable".into()));
            }
            Ok(EngineInfo {
                producer: "mock".into(),
                graph_name: "test".into(),
            })
        }

        fn io_counts(&self) -> Result<IoCounts, EngineError> {
            Ok(IoCounts {
                inputs: self.declared_inputs.unwrap_or(self.inputs.len()),
                outputs: self.declared_outputs.unwrap_or(self.outputs.len()),
            })
        }

        fn input_attr(&self, index: usize) -> Result<TensorAttr, EngineError> {
            self.inputs
                .get(index)
                .cloned()
                .ok_or_else(|| EngineError::Query(format!("input {index} attr query failed")))
        }

        fn output_attr(&self, index: usize) -> Result<TensorAttr, EngineError> {
            if self.fail_output_at == Some(index) {
                return Err(EngineError::Query(format!(
                    "output {index} attr query failed"
                )));
            }
            self.outputs
                .get(index)
                .cloned()
                .ok_or_else(|| EngineError::Query(format!("output {index} attr query failed")))
        }

        fn infer(&mut self, _: &InputBinding, _: &[u8]) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[test]
    fn test_nhwc_224_scenario() {
        let layout = negotiate(&mock(vec![1, 224, 224, 3])).unwrap();
        assert_eq!(
            layout.geometry,
            Geometry {
                width: 224,
                height: 224,
                channels: 3
            }
        );
        assert_eq!(layout.binding.size, 150_528);
        assert_eq!(layout.binding.elem, ElementType::Uint8);
        assert_eq!(layout.binding.layout, LayoutTag::ChannelLast);
        assert_eq!(layout.binding.index, 0);
    }

    #[test]
    fn test_channel_first_mapping_is_exact() {
        // channel-first reads dims 1..4 as (channels, width, height).
        let layout = negotiate(&mock(vec![1, 3, 640, 480])).unwrap();
        assert_eq!(layout.geometry.channels, 3);
        assert_eq!(layout.geometry.width, 640);
        assert_eq!(layout.geometry.height, 480);
    }

    #[test]
    fn test_channel_last_mapping_is_exact() {
        // channel-last reads dims 1..4 as (width, height, channels).
        let layout = negotiate(&mock(vec![1, 640, 480, 3])).unwrap();
        assert_eq!(layout.geometry.width, 640);
        assert_eq!(layout.geometry.height, 480);
        assert_eq!(layout.geometry.channels, 3);
    }

    #[test]
    fn test_layout_guess() {
        assert_eq!(LayoutTag::guess(&[1, 3, 224, 224]), LayoutTag::ChannelFirst);
        assert_eq!(LayoutTag::guess(&[1, 224, 224, 3]), LayoutTag::ChannelLast);
        assert_eq!(LayoutTag::guess(&[1, 1000]), LayoutTag::ChannelLast);
    }

    #[test]
    fn test_too_many_inputs_rejected() {
        let mut engine = mock(vec![1, 224, 224, 3]);
        engine.declared_inputs = Some(MAX_IO_TENSORS + 1);
        assert!(matches!(
            negotiate(&engine),
            Err(EngineError::TooManyTensors { kind: "input", .. })
        ));
    }

    #[test]
    fn test_too_many_outputs_rejected() {
        let mut engine = mock(vec![1, 224, 224, 3]);
        engine.declared_outputs = Some(MAX_IO_TENSORS + 1);
        assert!(matches!(
            negotiate(&engine),
            Err(EngineError::TooManyTensors { kind: "output", .. })
        ));
    }

    #[test]
    fn test_no_inputs_rejected() {
        let mut engine = mock(vec![1, 224, 224, 3]);
        engine.declared_inputs = Some(0);
        assert!(matches!(negotiate(&engine), Err(EngineError::NoInputs)));
    }

    #[test]
    fn test_output_attr_failure_aborts_negotiation() {
        let mut engine = mock(vec![1, 224, 224, 3]);
        engine.fail_output_at = Some(0);
        assert!(matches!(negotiate(&engine), Err(EngineError::Query(_))));
    }

    #[test]
    fn test_describe_failure_is_not_fatal() {
        let mut engine = mock(vec![1, 224, 224, 3]);
        engine.describe_fails = true;
        assert!(negotiate(&engine).is_ok());
    }

    #[test]
    fn test_malformed_shape_rejected() {
        assert!(matches!(
            negotiate(&mock(vec![1, 1000])),
            Err(EngineError::MalformedShape(_))
        ));
        assert!(matches!(
            negotiate(&mock(vec![1, -1, 224, 224])),
            Err(EngineError::MalformedShape(_))
        ));
    }
}

use std::collections::HashSet;

use sxcad_core::document::{DrawingModel, FileFormat, GeometryElement, Layer};

use crate::diagnostics::{CodecIssue, Collector, Diagnostics};
use crate::options::{ExportOptions, ImportOptions};

/// 一种交换格式的编解码器。实现不持有跨调用的可变状态，可在多个线程中并行使用。
pub trait DrawingCodec: Send + Sync {
    fn format(&self) -> FileFormat;

    fn decode(&self, input: &[u8], options: &ImportOptions) -> DecodeOutcome;

    fn encode(&self, model: &DrawingModel, options: &ExportOptions) -> EncodeOutcome;
}

/// 解码结果。出现致命错误时 `model` 为 `None`，其余错误仍返回部分模型。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub model: Option<DrawingModel>,
    pub diagnostics: Diagnostics,
}

impl DecodeOutcome {
    pub(crate) fn with_model(model: DrawingModel, diagnostics: Diagnostics) -> Self {
        Self {
            model: Some(model),
            diagnostics,
        }
    }

    pub(crate) fn without_model(diagnostics: Diagnostics) -> Self {
        Self {
            model: None,
            diagnostics,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.model.is_some() && self.diagnostics.is_success()
    }
}

/// 编码结果。单个元素失败时仍返回其余部分的输出。
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutcome {
    pub output: Option<Vec<u8>>,
    pub diagnostics: Diagnostics,
}

impl EncodeOutcome {
    pub(crate) fn with_output(output: Vec<u8>, diagnostics: Diagnostics) -> Self {
        Self {
            output: Some(output),
            diagnostics,
        }
    }

    pub(crate) fn without_output(diagnostics: Diagnostics) -> Self {
        Self {
            output: None,
            diagnostics,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.output.is_some() && self.diagnostics.is_success()
    }
}

/// 重复的图层 ID 与引用未知图层的元素都只记录警告。
pub(crate) fn report_layer_issues(
    layers: &[Layer],
    elements: &[GeometryElement],
    collector: &mut Collector,
) {
    let mut seen = HashSet::new();
    for layer in layers {
        if !seen.insert(layer.id.as_str()) {
            collector.warning(CodecIssue::DuplicateLayer(layer.id.clone()));
        }
    }
    for element in elements {
        if !seen.contains(element.layer_id()) {
            collector.warning(CodecIssue::UnknownLayer {
                element: element.id().to_string(),
                layer: element.layer_id().to_string(),
            });
        }
    }
}

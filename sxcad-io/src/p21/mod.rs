//! ISO-10303-21 文本交换格式（P21）。
//!
//! 文件由 `ISO-10303-21;`、`HEADER;`、`DATA;` 三个段组成，DATA 段中每条
//! `#<id> = TYPE(<params>);` 语句描述一个实体。图层与图元都是实体，图元通过
//! 第一个参数（字符串或 `SXF_LAYER` 引用）关联图层。

mod decoder;
mod encoder;
pub mod params;

pub use decoder::decode_p21;
pub use encoder::{encode_p21, format_number};

use sxcad_core::document::{DrawingModel, FileFormat};

use crate::codec::{DecodeOutcome, DrawingCodec, EncodeOutcome};
use crate::diagnostics::{CodecIssue, Collector, DiagnosticPolicy};
use crate::options::{ExportOptions, ImportOptions};

pub const SXF_LAYER: &str = "SXF_LAYER";
pub const SXF_LINE: &str = "SXF_LINE";
pub const SXF_CIRCLE: &str = "SXF_CIRCLE";
pub const SXF_TEXT: &str = "SXF_TEXT";
pub const SXF_POINT: &str = "SXF_POINT";
pub const SXF_POLYLINE: &str = "SXF_POLYLINE";
pub const CARTESIAN_POINT: &str = "CARTESIAN_POINT";

pub(crate) const DEFAULT_SCHEMA: &str = "SXF_SCHEMA";

#[derive(Debug, Default, Clone, Copy)]
pub struct P21Codec;

impl P21Codec {
    pub fn new() -> Self {
        Self
    }

    /// 直接解码已经是字符串的输入。
    pub fn decode_str(&self, text: &str, options: &ImportOptions) -> DecodeOutcome {
        decode_p21(text, options)
    }
}

impl DrawingCodec for P21Codec {
    fn format(&self) -> FileFormat {
        FileFormat::P21
    }

    fn decode(&self, input: &[u8], options: &ImportOptions) -> DecodeOutcome {
        match std::str::from_utf8(input) {
            Ok(text) => decode_p21(text, options),
            Err(_) => {
                let mut collector = Collector::new(DiagnosticPolicy::from_import(options));
                collector.warning(CodecIssue::InvalidUtf8 {
                    context: "P21 输入".to_string(),
                });
                let text = String::from_utf8_lossy(input);
                decoder::decode_with_collector(&text, options, collector)
            }
        }
    }

    fn encode(&self, model: &DrawingModel, options: &ExportOptions) -> EncodeOutcome {
        encode_p21(model, options)
    }
}

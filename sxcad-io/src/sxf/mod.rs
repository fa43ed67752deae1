//! SXF 二进制交换格式。
//!
//! 文件由 108 字节的定长文件头、图层段与图元段组成，所有多字节数值均为小端序。
//! 每条记录以 1 字节标签和 4 字节长度开头，长度字段保证未知记录可以被跳过。

mod decoder;
mod encoder;

pub use decoder::decode_sxf;
pub use encoder::encode_sxf;

use sxcad_core::document::{DrawingModel, ElementKind, FileFormat, Layer};

use crate::codec::{DecodeOutcome, DrawingCodec, EncodeOutcome};
use crate::diagnostics::{CodecIssue, Collector};
use crate::options::{ExportOptions, ImportOptions, TextEncoding};

pub const SIGNATURE: &[u8] = b"SXF-CAD BINARY";

pub(crate) const MAGIC_LEN: usize = 8;
pub(crate) const SIGNATURE_LEN: usize = 32;
pub(crate) const VERSION_LEN: usize = 16;
pub(crate) const AUTHOR_LEN: usize = 32;
pub(crate) const UNITS_LEN: usize = 8;
pub(crate) const ENCODING_LEN: usize = 16;
pub const HEADER_LEN: usize = SIGNATURE_LEN + VERSION_LEN + AUTHOR_LEN + 4 + UNITS_LEN + ENCODING_LEN;

pub(crate) const ID_LEN: usize = 16;
pub(crate) const LAYER_NAME_LEN: usize = 32;
pub(crate) const LINE_TYPE_LEN: usize = 16;
/// 图元记录中 ID 与图层 ID 两个字段的长度，不计入记录长度。
pub(crate) const GEOMETRY_PREFIX_LEN: usize = ID_LEN * 2;
pub(crate) const MAX_TEXT_BYTES: usize = u16::MAX as usize;

pub const TAG_LAYER: u8 = 0x03;
pub const TAG_LINE: u8 = 0x10;
pub const TAG_CIRCLE: u8 = 0x11;
pub const TAG_ARC: u8 = 0x12;
pub const TAG_TEXT: u8 = 0x13;
pub const TAG_POINT: u8 = 0x14;
pub const TAG_POLYLINE: u8 = 0x15;
/// 不小于该值的标签属于图元段。
pub const FIRST_GEOMETRY_TAG: u8 = TAG_LINE;

pub fn tag_for(kind: ElementKind) -> u8 {
    match kind {
        ElementKind::Line => TAG_LINE,
        ElementKind::Circle => TAG_CIRCLE,
        ElementKind::Arc => TAG_ARC,
        ElementKind::Text => TAG_TEXT,
        ElementKind::Point => TAG_POINT,
        ElementKind::Polyline => TAG_POLYLINE,
    }
}

pub fn kind_for(tag: u8) -> Option<ElementKind> {
    ElementKind::ALL.into_iter().find(|kind| tag_for(*kind) == tag)
}

/// 前 8 字节以 `SXF` 开头或包含 `CAD` 即视为 SXF 文件。
pub fn has_magic(bytes: &[u8]) -> bool {
    let Some(head) = bytes.get(..MAGIC_LEN) else {
        return false;
    };
    head.starts_with(b"SXF") || head.windows(3).any(|window| window == b"CAD")
}

/// 解码定长或变长文本字段，去掉末尾的 `0x00`。
pub(crate) fn decode_text(
    bytes: &[u8],
    encoding: TextEncoding,
    context: &str,
    collector: &mut Collector,
) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |idx| idx + 1);
    let bytes = &bytes[..end];
    match encoding {
        TextEncoding::ShiftJis => {
            let replaced = bytes.iter().filter(|b| !b.is_ascii()).count();
            if replaced > 0 {
                collector.warning(CodecIssue::CharacterReplaced {
                    context: context.to_string(),
                    count: replaced,
                });
            }
            bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect()
        }
        TextEncoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                collector.warning(CodecIssue::InvalidUtf8 {
                    context: context.to_string(),
                });
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    }
}

/// 按编码转换文本并截断到 `limit` 字节以内，截断点总在字符边界上。
pub(crate) fn encode_text(
    text: &str,
    encoding: TextEncoding,
    limit: usize,
    context: &str,
    collector: &mut Collector,
) -> Vec<u8> {
    let mut encoded = match encoding {
        TextEncoding::ShiftJis => {
            let replaced = text.chars().filter(|c| !c.is_ascii()).count();
            if replaced > 0 {
                collector.warning(CodecIssue::CharacterReplaced {
                    context: context.to_string(),
                    count: replaced,
                });
            }
            text.chars()
                .map(|c| if c.is_ascii() { c } else { '?' })
                .collect::<String>()
        }
        TextEncoding::Utf8 => text.to_string(),
    };
    if encoded.len() > limit {
        let mut cut = limit;
        while !encoded.is_char_boundary(cut) {
            cut -= 1;
        }
        encoded.truncate(cut);
        collector.warning(CodecIssue::FieldTruncated {
            context: context.to_string(),
            width: limit,
        });
    }
    encoded.into_bytes()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SxfCodec;

impl SxfCodec {
    pub fn new() -> Self {
        Self
    }

    /// 图层列表与模型分开传入；模型自身的图层在此处不参与写出。
    pub fn encode_with_layers(
        &self,
        model: &DrawingModel,
        layers: &[Layer],
        options: &ExportOptions,
    ) -> EncodeOutcome {
        encode_sxf(model, layers, options)
    }
}

impl DrawingCodec for SxfCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Sxf
    }

    fn decode(&self, input: &[u8], options: &ImportOptions) -> DecodeOutcome {
        decode_sxf(input, options)
    }

    fn encode(&self, model: &DrawingModel, options: &ExportOptions) -> EncodeOutcome {
        encode_sxf(model, &model.layers, options)
    }
}

use std::collections::HashSet;
use std::io::{self, Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::Utc;
use sxcad_core::document::{DrawingModel, GeometryElement, Layer};
use sxcad_core::geometry::Point3;
use tracing::{debug, warn};

use super::{
    AUTHOR_LEN, ENCODING_LEN, GEOMETRY_PREFIX_LEN, ID_LEN, LAYER_NAME_LEN, LINE_TYPE_LEN,
    MAX_TEXT_BYTES, SIGNATURE, SIGNATURE_LEN, TAG_LAYER, UNITS_LEN, VERSION_LEN, encode_text,
    tag_for,
};
use crate::codec::EncodeOutcome;
use crate::diagnostics::{CodecIssue, Collector, DiagnosticPolicy};
use crate::options::{ExportOptions, TextEncoding};

/// 写出记录时保存的长度占位位置。
struct RecordMark {
    length_at: u64,
    prefix: u64,
}

/// 将模型写为 SXF 二进制。图层列表单独传入，元素引用其外的图层时记录警告。
pub fn encode_sxf(model: &DrawingModel, layers: &[Layer], options: &ExportOptions) -> EncodeOutcome {
    let estimate = (512 + 128 * layers.len() + 256 * model.elements.len()) * 2;
    let mut writer = SxfWriter {
        cursor: Cursor::new(Vec::with_capacity(estimate)),
        encoding: options.text_encoding(),
        collector: Collector::new(DiagnosticPolicy::default()),
    };

    if let Err(err) = writer.write_header(options) {
        writer.collector.error(CodecIssue::Write {
            element: "HEADER".to_string(),
            message: err.to_string(),
        });
        return EncodeOutcome::without_output(writer.collector.finish());
    }

    let mut known = HashSet::new();
    for layer in layers {
        if !known.insert(layer.id.as_str()) {
            writer
                .collector
                .warning(CodecIssue::DuplicateLayer(layer.id.clone()));
        }
        writer.isolate(&layer.id, |w| w.write_layer(layer));
    }

    for element in &model.elements {
        if !known.contains(element.layer_id()) {
            writer.collector.warning(CodecIssue::UnknownLayer {
                element: element.id().to_string(),
                layer: element.layer_id().to_string(),
            });
        }
        writer.isolate(element.id(), |w| w.write_element(element));
    }

    let written = writer.cursor.position() as usize;
    let mut out = writer.cursor.into_inner();
    out.truncate(written);
    debug!(
        bytes = out.len(),
        estimate,
        errors = writer.collector.error_count(),
        warnings = writer.collector.warning_count(),
        "SXF 编码完成"
    );
    EncodeOutcome::with_output(out, writer.collector.finish())
}

struct SxfWriter {
    cursor: Cursor<Vec<u8>>,
    encoding: TextEncoding,
    collector: Collector,
}

impl SxfWriter {
    /// 单条记录失败时回滚到记录开头，不影响其余记录。
    fn isolate<F>(&mut self, element: &str, write: F)
    where
        F: FnOnce(&mut Self) -> Result<(), CodecIssue>,
    {
        let start = self.cursor.position();
        if let Err(issue) = write(self) {
            warn!(element, %issue, "跳过无法写出的记录");
            self.cursor.get_mut().truncate(start as usize);
            self.cursor.set_position(start);
            self.collector.error(issue);
        }
    }

    fn write_header(&mut self, options: &ExportOptions) -> io::Result<()> {
        self.write_fixed(&String::from_utf8_lossy(SIGNATURE), SIGNATURE_LEN, "文件头签名")?;
        self.write_fixed(&options.version, VERSION_LEN, "文件头版本")?;
        self.write_fixed(&options.author, AUTHOR_LEN, "文件头作者")?;
        let created = u32::try_from(Utc::now().timestamp()).unwrap_or(0);
        self.cursor.write_u32::<LittleEndian>(created)?;
        self.write_fixed(&options.units, UNITS_LEN, "文件头单位")?;
        self.write_fixed(self.encoding.as_str(), ENCODING_LEN, "文件头编码")?;
        Ok(())
    }

    fn write_layer(&mut self, layer: &Layer) -> Result<(), CodecIssue> {
        let io_error = |err: io::Error| CodecIssue::Write {
            element: layer.id.clone(),
            message: err.to_string(),
        };
        let mark = self.begin_record(TAG_LAYER, 0).map_err(io_error)?;
        self.write_fixed(&layer.id, ID_LEN, "图层 ID").map_err(io_error)?;
        self.write_fixed(&layer.name, LAYER_NAME_LEN, "图层名称")
            .map_err(io_error)?;
        let color = layer.color;
        self.cursor
            .write_all(&[color.r, color.g, color.b, u8::MAX])
            .map_err(io_error)?;
        self.write_fixed(&layer.line_type, LINE_TYPE_LEN, "图层线型")
            .map_err(io_error)?;
        self.cursor
            .write_f32::<LittleEndian>(layer.line_width as f32)
            .map_err(io_error)?;
        self.cursor
            .write_u8(u8::from(layer.visible))
            .map_err(io_error)?;
        self.cursor
            .write_u8(u8::from(layer.locked))
            .map_err(io_error)?;
        self.end_record(mark).map_err(io_error)
    }

    fn write_element(&mut self, element: &GeometryElement) -> Result<(), CodecIssue> {
        let id = element.id();
        if !is_finite(element) {
            return Err(CodecIssue::NonFiniteValue {
                element: id.to_string(),
            });
        }
        self.write_element_record(element)
            .map_err(|err| CodecIssue::Write {
                element: id.to_string(),
                message: err.to_string(),
            })
    }

    fn write_element_record(&mut self, element: &GeometryElement) -> io::Result<()> {
        let mark = self.begin_record(tag_for(element.kind()), GEOMETRY_PREFIX_LEN)?;
        self.write_fixed(element.id(), ID_LEN, "图元 ID")?;
        self.write_fixed(element.layer_id(), ID_LEN, "图元图层")?;
        match element {
            GeometryElement::Line(line) => {
                self.write_point(line.start)?;
                self.write_point(line.end)?;
            }
            GeometryElement::Circle(circle) => {
                self.write_point(circle.center)?;
                self.write_f64(circle.radius)?;
            }
            GeometryElement::Arc(arc) => {
                self.write_point(arc.center)?;
                self.write_f64(arc.radius)?;
                self.write_f64(arc.start_angle)?;
                self.write_f64(arc.end_angle)?;
            }
            GeometryElement::Text(text) => {
                self.write_point(text.position)?;
                self.write_f64(text.height)?;
                self.write_f64(text.rotation)?;
                let context = format!("图元 {} 的文本", text.id);
                let bytes = encode_text(
                    &text.text,
                    self.encoding,
                    MAX_TEXT_BYTES,
                    &context,
                    &mut self.collector,
                );
                self.cursor.write_u16::<LittleEndian>(bytes.len() as u16)?;
                self.cursor.write_all(&bytes)?;
            }
            GeometryElement::Point(point) => self.write_point(point.position)?,
            GeometryElement::Polyline(polyline) => {
                let count = u32::try_from(polyline.points.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "折线顶点数超出 u32 范围")
                })?;
                self.cursor.write_u32::<LittleEndian>(count)?;
                for point in &polyline.points {
                    self.write_point(*point)?;
                }
                self.cursor.write_u8(u8::from(polyline.closed))?;
            }
        }
        self.end_record(mark)
    }

    /// 写出标签与长度占位。`prefix` 为长度之后、不计入长度的字节数。
    fn begin_record(&mut self, tag: u8, prefix: usize) -> io::Result<RecordMark> {
        self.cursor.write_u8(tag)?;
        let length_at = self.cursor.position();
        self.cursor.write_u32::<LittleEndian>(0)?;
        Ok(RecordMark {
            length_at,
            prefix: prefix as u64,
        })
    }

    /// 回填长度：`end - length_at - 4 - prefix`。
    fn end_record(&mut self, mark: RecordMark) -> io::Result<()> {
        let end = self.cursor.position();
        let length = end - mark.length_at - 4 - mark.prefix;
        let length = u32::try_from(length)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "记录长度超出 u32 范围"))?;
        self.cursor.seek(SeekFrom::Start(mark.length_at))?;
        self.cursor.write_u32::<LittleEndian>(length)?;
        self.cursor.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// 定长字段：超长截断并记录警告，不足部分以 `0x00` 补齐。
    fn write_fixed(&mut self, text: &str, width: usize, context: &str) -> io::Result<()> {
        let bytes = encode_text(text, self.encoding, width, context, &mut self.collector);
        self.cursor.write_all(&bytes)?;
        let padding = vec![0u8; width - bytes.len()];
        self.cursor.write_all(&padding)
    }

    fn write_f64(&mut self, value: f64) -> io::Result<()> {
        self.cursor.write_f64::<LittleEndian>(value)
    }

    fn write_point(&mut self, point: Point3) -> io::Result<()> {
        self.write_f64(point.x())?;
        self.write_f64(point.y())?;
        self.write_f64(point.z())
    }
}

fn is_finite(element: &GeometryElement) -> bool {
    let scalars_finite = match element {
        GeometryElement::Circle(circle) => circle.radius.is_finite(),
        GeometryElement::Arc(arc) => {
            arc.radius.is_finite() && arc.start_angle.is_finite() && arc.end_angle.is_finite()
        }
        GeometryElement::Text(text) => text.height.is_finite() && text.rotation.is_finite(),
        GeometryElement::Line(_) | GeometryElement::Point(_) | GeometryElement::Polyline(_) => {
            true
        }
    };
    scalars_finite && element.points().iter().all(|point| point.is_finite())
}

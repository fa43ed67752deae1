use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, SecondsFormat};
use sxcad_core::document::{
    Arc, Circle, DrawingModel, ElementKind, FileFormat, GeometryElement, Layer, Line,
    PointElement, Polyline, Text,
};
use sxcad_core::geometry::{Point3, Rgb};
use tracing::debug;

use super::{
    AUTHOR_LEN, ENCODING_LEN, FIRST_GEOMETRY_TAG, GEOMETRY_PREFIX_LEN, HEADER_LEN, ID_LEN,
    LAYER_NAME_LEN, LINE_TYPE_LEN, SIGNATURE_LEN, TAG_LAYER, UNITS_LEN, VERSION_LEN, decode_text,
    has_magic, kind_for,
};
use crate::codec::{DecodeOutcome, report_layer_issues};
use crate::diagnostics::{CodecIssue, Collector, DiagnosticPolicy};
use crate::options::{ImportOptions, TextEncoding};

/// 记录在读完前遇到缓冲区末尾。
struct Truncated;

impl From<io::Error> for Truncated {
    fn from(_: io::Error) -> Self {
        Truncated
    }
}

/// 解码 SXF 二进制数据。魔数或文件头不合法时只返回错误。
pub fn decode_sxf(bytes: &[u8], options: &ImportOptions) -> DecodeOutcome {
    let mut collector = Collector::new(DiagnosticPolicy::from_import(options));
    if !has_magic(bytes) {
        collector.error(CodecIssue::InvalidMagic);
        return DecodeOutcome::without_model(collector.finish());
    }
    if bytes.len() < HEADER_LEN {
        collector.error(CodecIssue::TruncatedHeader {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
        return DecodeOutcome::without_model(collector.finish());
    }

    let mut reader = SxfReader {
        cursor: Cursor::new(bytes),
        encoding: options.text_encoding(),
        scale: options.effective_unit_scale(),
        records: 0,
        collector,
    };
    let mut model = DrawingModel::new(FileFormat::Sxf);
    reader.read_header(&mut model, options);

    let mut complete = reader.read_layers(&mut model.layers);
    if complete {
        complete = reader.read_elements(&mut model.elements);
    }
    if !complete {
        debug!(offset = reader.cursor.position(), "SXF 数据提前结束");
    }

    report_layer_issues(&model.layers, &model.elements, &mut reader.collector);

    model.set_metadata("format", FileFormat::Sxf.as_str());
    model.set_metadata("recordCount", reader.records);
    model.set_metadata("unitScale", reader.scale);
    if let Some(cs) = options.coordinate_system.as_ref() {
        model.set_metadata("coordinateSystem", cs.as_str());
    }

    debug!(
        layers = model.layers.len(),
        elements = model.elements.len(),
        errors = reader.collector.error_count(),
        warnings = reader.collector.warning_count(),
        "SXF 解码完成"
    );
    DecodeOutcome::with_model(model, reader.collector.finish())
}

struct SxfReader<'a> {
    cursor: Cursor<&'a [u8]>,
    encoding: TextEncoding,
    scale: f64,
    records: usize,
    collector: Collector,
}

impl SxfReader<'_> {
    fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    fn at_end(&self) -> bool {
        self.cursor.position() >= self.len()
    }

    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    /// 调用前已确认文件头完整，这里按固定偏移读取。
    fn read_header(&mut self, model: &mut DrawingModel, options: &ImportOptions) {
        let bytes = *self.cursor.get_ref();
        let mut offset = SIGNATURE_LEN;
        let version = header_field(bytes, &mut offset, VERSION_LEN);
        let author = header_field(bytes, &mut offset, AUTHOR_LEN);
        let created = header_field(bytes, &mut offset, 4);
        let units = header_field(bytes, &mut offset, UNITS_LEN);
        let encoding = header_field(bytes, &mut offset, ENCODING_LEN);

        let declared = String::from_utf8_lossy(encoding);
        if let Some(known) = TextEncoding::from_name(&declared) {
            self.encoding = known;
        }

        let header = &mut model.header;
        header.version = decode_text(version, self.encoding, "文件头版本", &mut self.collector);
        header.author = decode_text(author, self.encoding, "文件头作者", &mut self.collector);
        header.units = decode_text(units, self.encoding, "文件头单位", &mut self.collector);
        header.encoding = self.encoding.as_str().to_string();
        let seconds = u32::from_le_bytes([created[0], created[1], created[2], created[3]]);
        header.timestamp = DateTime::from_timestamp(i64::from(seconds), 0)
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        if let Some(cs) = options.coordinate_system.as_ref() {
            header.coordinate_system = cs.clone();
        }

        self.cursor.set_position(HEADER_LEN as u64);
    }

    /// 读取图层段，遇到图元标签时回退一个字节交给图元段。返回 `false` 表示数据被截断。
    fn read_layers(&mut self, layers: &mut Vec<Layer>) -> bool {
        while !self.at_end() {
            let start = self.offset();
            let Ok(tag) = self.cursor.read_u8() else {
                return false;
            };
            if tag >= FIRST_GEOMETRY_TAG {
                self.cursor.set_position(start as u64);
                return true;
            }
            let parsed = if tag == TAG_LAYER {
                self.read_layer(start).map(Some)
            } else {
                self.skip_record(start, tag, 0).map(|_| None)
            };
            match parsed {
                Ok(Some(layer)) => {
                    self.records += 1;
                    layers.push(layer);
                }
                Ok(None) => self.records += 1,
                Err(Truncated) => {
                    self.collector
                        .error(CodecIssue::TruncatedRecord { offset: start, tag });
                    return false;
                }
            }
        }
        true
    }

    fn read_elements(&mut self, elements: &mut Vec<GeometryElement>) -> bool {
        while !self.at_end() {
            let start = self.offset();
            let Ok(tag) = self.cursor.read_u8() else {
                return false;
            };
            let parsed = match kind_for(tag) {
                Some(kind) => self.read_element(start, kind).map(Some),
                None if tag == TAG_LAYER => self.skip_record(start, tag, 0).map(|_| None),
                None => self
                    .skip_record(start, tag, GEOMETRY_PREFIX_LEN)
                    .map(|_| None),
            };
            match parsed {
                Ok(Some(element)) => {
                    self.records += 1;
                    elements.push(element);
                }
                Ok(None) => self.records += 1,
                Err(Truncated) => {
                    self.collector
                        .error(CodecIssue::TruncatedRecord { offset: start, tag });
                    return false;
                }
            }
        }
        true
    }

    fn read_layer(&mut self, start: usize) -> Result<Layer, Truncated> {
        let declared = self.cursor.read_u32::<LittleEndian>()?;
        let body_start = self.offset();

        let id = self.read_fixed(ID_LEN, "图层 ID")?;
        let name = self.read_fixed(LAYER_NAME_LEN, "图层名称")?;
        let mut rgba = [0u8; 4];
        self.cursor.read_exact(&mut rgba)?;
        let line_type = self.read_fixed(LINE_TYPE_LEN, "图层线型")?;
        let width = self.cursor.read_f32::<LittleEndian>()?;
        let visible = self.cursor.read_u8()? != 0;
        let locked = self.cursor.read_u8()? != 0;

        self.finish_record(start, body_start, declared)?;
        Ok(Layer {
            id,
            name,
            color: Rgb::new(rgba[0], rgba[1], rgba[2]),
            line_type,
            line_width: f64::from(width),
            visible,
            locked,
        })
    }

    fn read_element(
        &mut self,
        start: usize,
        kind: ElementKind,
    ) -> Result<GeometryElement, Truncated> {
        let declared = self.cursor.read_u32::<LittleEndian>()?;
        let id = self.read_fixed(ID_LEN, "图元 ID")?;
        let layer_id = self.read_fixed(ID_LEN, "图元图层")?;
        let body_start = self.offset();

        let element = match kind {
            ElementKind::Line => GeometryElement::Line(Line {
                id,
                layer_id,
                start: self.read_point()?,
                end: self.read_point()?,
            }),
            ElementKind::Circle => GeometryElement::Circle(Circle {
                id,
                layer_id,
                center: self.read_point()?,
                radius: self.read_f64()?,
            }),
            ElementKind::Arc => GeometryElement::Arc(Arc {
                id,
                layer_id,
                center: self.read_point()?,
                radius: self.read_f64()?,
                start_angle: self.read_f64()?,
                end_angle: self.read_f64()?,
            }),
            ElementKind::Text => {
                let position = self.read_point()?;
                let height = self.read_f64()?;
                let rotation = self.read_f64()?;
                let length = self.cursor.read_u16::<LittleEndian>()? as usize;
                let raw = self.read_bytes(length)?;
                let context = format!("图元 {id} 的文本");
                let text = decode_text(&raw, self.encoding, &context, &mut self.collector);
                GeometryElement::Text(Text {
                    id,
                    layer_id,
                    position,
                    text,
                    height,
                    rotation,
                })
            }
            ElementKind::Point => GeometryElement::Point(PointElement {
                id,
                layer_id,
                position: self.read_point()?,
            }),
            ElementKind::Polyline => {
                let count = self.cursor.read_u32::<LittleEndian>()? as u64;
                let remaining = self.len().saturating_sub(self.cursor.position());
                if count.saturating_mul(24) > remaining {
                    return Err(Truncated);
                }
                let points = (0..count)
                    .map(|_| self.read_point())
                    .collect::<Result<Vec<_>, _>>()?;
                let closed = self.cursor.read_u8()? != 0;
                GeometryElement::Polyline(Polyline {
                    id,
                    layer_id,
                    points,
                    closed,
                })
            }
        };

        self.finish_record(start, body_start, declared)?;
        Ok(element)
    }

    /// 按长度跳过未知记录。`prefix` 为长度之后、不计入长度的字节数。
    fn skip_record(&mut self, start: usize, tag: u8, prefix: usize) -> Result<(), Truncated> {
        let declared = self.cursor.read_u32::<LittleEndian>()?;
        let end = self.cursor.position() + prefix as u64 + u64::from(declared);
        if end > self.len() {
            return Err(Truncated);
        }
        self.cursor.set_position(end);
        self.collector
            .warning(CodecIssue::UnknownRecord { offset: start, tag });
        Ok(())
    }

    /// 声明长度大于已读字节时跳到声明的结尾；小于时记录警告并停在已读位置。
    fn finish_record(
        &mut self,
        start: usize,
        body_start: usize,
        declared: u32,
    ) -> Result<(), Truncated> {
        let consumed = self.offset() - body_start;
        let declared_len = declared as usize;
        if declared_len > consumed {
            let end = (body_start + declared_len) as u64;
            if end > self.len() {
                return Err(Truncated);
            }
            self.cursor.set_position(end);
        } else if declared_len < consumed {
            self.collector.warning(CodecIssue::LengthMismatch {
                offset: start,
                declared,
                consumed,
            });
        }
        Ok(())
    }

    fn read_fixed(&mut self, width: usize, context: &str) -> Result<String, Truncated> {
        let raw = self.read_bytes(width)?;
        Ok(decode_text(&raw, self.encoding, context, &mut self.collector))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Truncated> {
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_f64(&mut self) -> Result<f64, Truncated> {
        Ok(self.cursor.read_f64::<LittleEndian>()?)
    }

    /// 坐标按 `1 / unit_scale` 换算。
    fn read_point(&mut self) -> Result<Point3, Truncated> {
        let x = self.read_f64()?;
        let y = self.read_f64()?;
        let z = self.read_f64()?;
        Ok(Point3::new(x, y, z).scaled(1.0 / self.scale))
    }
}

fn header_field<'a>(bytes: &'a [u8], offset: &mut usize, width: usize) -> &'a [u8] {
    let field = &bytes[*offset..*offset + width];
    *offset += width;
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sxf::{SIGNATURE, TAG_LINE, TAG_POINT};
    use byteorder::WriteBytesExt;

    fn header() -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        buf[32..35].copy_from_slice(b"3.1");
        buf[84..86].copy_from_slice(b"mm");
        buf[92..97].copy_from_slice(b"utf-8");
        buf
    }

    fn point_record(buf: &mut Vec<u8>, id: &str, extra: &[u8]) {
        buf.push(TAG_POINT);
        buf.write_u32::<LittleEndian>(24 + extra.len() as u32).unwrap();
        let mut fixed = [0u8; 32];
        fixed[..id.len()].copy_from_slice(id.as_bytes());
        fixed[16] = b'0';
        buf.extend_from_slice(&fixed);
        for value in [1.0f64, 2.0, 3.0] {
            buf.write_f64::<LittleEndian>(value).unwrap();
        }
        buf.extend_from_slice(extra);
    }

    #[test]
    fn header_fields_are_decoded() {
        let outcome = decode_sxf(&header(), &ImportOptions::default());
        let model = outcome.model.expect("model");
        assert!(outcome.diagnostics.is_success());
        assert_eq!(model.header.version, "3.1");
        assert_eq!(model.header.units, "mm");
        assert_eq!(model.header.encoding, "utf-8");
        assert_eq!(model.header.timestamp, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn extension_bytes_are_skipped_by_length() {
        let mut buf = header();
        point_record(&mut buf, "p1", &[0xAA; 5]);
        point_record(&mut buf, "p2", &[]);
        let outcome = decode_sxf(&buf, &ImportOptions::default());
        let model = outcome.model.expect("model");
        let ids: Vec<&str> = model.elements.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert!(outcome.diagnostics.errors.is_empty());
    }

    #[test]
    fn unknown_geometry_tag_is_skipped() {
        let mut buf = header();
        buf.push(0x2A);
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.extend_from_slice(&[0u8; 32 + 3]);
        point_record(&mut buf, "p1", &[]);
        let outcome = decode_sxf(&buf, &ImportOptions::default());
        assert_eq!(outcome.model.expect("model").elements.len(), 1);
        assert!(outcome.diagnostics.warnings.iter().any(|w| matches!(
            w,
            CodecIssue::UnknownRecord { tag: 0x2A, offset } if *offset == HEADER_LEN
        )));
    }

    #[test]
    fn short_declared_length_is_reported() {
        let mut buf = header();
        buf.push(TAG_LINE);
        buf.write_u32::<LittleEndian>(8).unwrap();
        buf.extend_from_slice(&[0u8; 32]);
        for _ in 0..6 {
            buf.write_f64::<LittleEndian>(1.0).unwrap();
        }
        let outcome = decode_sxf(&buf, &ImportOptions::default());
        assert_eq!(outcome.model.expect("model").elements.len(), 1);
        assert!(outcome.diagnostics.warnings.iter().any(|w| matches!(
            w,
            CodecIssue::LengthMismatch { declared: 8, consumed: 48, .. }
        )));
    }

    #[test]
    fn oversized_polyline_count_is_truncation() {
        let mut buf = header();
        buf.push(crate::sxf::TAG_POLYLINE);
        buf.write_u32::<LittleEndian>(5).unwrap();
        buf.extend_from_slice(&[0u8; 32]);
        buf.write_u32::<LittleEndian>(u32::MAX).unwrap();
        let outcome = decode_sxf(&buf, &ImportOptions::default());
        assert!(outcome.model.expect("model").elements.is_empty());
        assert_eq!(
            outcome.diagnostics.errors,
            vec![CodecIssue::TruncatedRecord {
                offset: HEADER_LEN,
                tag: crate::sxf::TAG_POLYLINE
            }]
        );
    }
}

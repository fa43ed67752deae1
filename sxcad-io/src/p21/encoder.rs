use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::Utc;
use sxcad_core::document::{DrawingModel, GeometryElement, Layer};
use sxcad_core::geometry::Point3;
use tracing::{debug, warn};

use super::params::escape_string;
use super::{
    CARTESIAN_POINT, DEFAULT_SCHEMA, SXF_CIRCLE, SXF_LAYER, SXF_LINE, SXF_POINT, SXF_POLYLINE,
    SXF_TEXT,
};
use crate::codec::EncodeOutcome;
use crate::diagnostics::{CodecIssue, Collector, DiagnosticPolicy};
use crate::options::ExportOptions;

/// 按精度格式化数值：去掉末尾的 0 与小数点，`-0` 写作 `0`。非有限值返回 `None`。
pub fn format_number(value: f64, precision: usize) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let mut text = format!("{value:.precision$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    Some(text)
}

/// 将模型写为 P21 文本。单个元素失败只记录错误，不影响其余输出。
pub fn encode_p21(model: &DrawingModel, options: &ExportOptions) -> EncodeOutcome {
    let mut writer = P21Writer {
        out: String::with_capacity(256 + 96 * (model.layers.len() + model.elements.len())),
        precision: options.precision,
        next_id: 1,
        layer_refs: HashMap::new(),
        collector: Collector::new(DiagnosticPolicy::default()),
    };

    writer.out.push_str("ISO-10303-21;\nHEADER;\n");
    writer.write_header(options);
    writer.out.push_str("ENDSEC;\nDATA;\n");
    for layer in &model.layers {
        writer.write_layer(layer);
    }
    for element in &model.elements {
        writer.write_element(element);
    }
    writer.out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");

    debug!(
        entities = writer.next_id - 1,
        errors = writer.collector.error_count(),
        warnings = writer.collector.warning_count(),
        "P21 编码完成"
    );
    EncodeOutcome::with_output(writer.out.into_bytes(), writer.collector.finish())
}

struct P21Writer {
    out: String,
    precision: usize,
    next_id: u32,
    layer_refs: HashMap<String, u32>,
    collector: Collector,
}

impl P21Writer {
    fn write_header(&mut self, options: &ExportOptions) {
        let mut description = vec![
            "'SXF drawing exchange'".to_string(),
            format!("'version:{}'", self.quote_header(&options.version)),
            format!("'units:{}'", self.quote_header(&options.units)),
        ];
        if let Some(cs) = options.coordinate_system.as_ref() {
            description.push(format!("'coordinate_system:{}'", self.quote_header(cs)));
        }
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let file_name = self.quote_header(&options.file_name);
        let author = self.quote_header(&options.author);
        let organization = self.quote_header(&options.organization);

        let _ = writeln!(self.out, "FILE_DESCRIPTION(({}),'2;1');", description.join(","));
        let _ = writeln!(
            self.out,
            "FILE_NAME('{file_name}','{timestamp}',('{author}'),('{organization}'),'sxcad {}','sxcad-io','');",
            env!("CARGO_PKG_VERSION")
        );
        let _ = writeln!(self.out, "FILE_SCHEMA(('{DEFAULT_SCHEMA}'));");
    }

    fn write_layer(&mut self, layer: &Layer) {
        let Some(width) = format_number(layer.line_width, self.precision) else {
            self.collector.error(CodecIssue::NonFiniteValue {
                element: layer.id.clone(),
            });
            return;
        };
        let id = self.quote(&layer.id, &layer.id);
        let name = self.quote(&layer.name, &layer.id);
        let line_type = self.quote(&layer.line_type, &layer.id);
        let body = format!(
            "'{id}','{name}',({}, {}, {}),'{line_type}',{width},{},{}",
            layer.color.r,
            layer.color.g,
            layer.color.b,
            logical(layer.visible),
            logical(layer.locked),
        );
        let entity = self.push_entity(SXF_LAYER, &body);
        if self.layer_refs.contains_key(&layer.id) {
            self.collector
                .warning(CodecIssue::DuplicateLayer(layer.id.clone()));
        } else {
            self.layer_refs.insert(layer.id.clone(), entity);
        }
    }

    fn write_element(&mut self, element: &GeometryElement) {
        match self.element_params(element) {
            Ok((type_name, body)) => {
                self.push_entity(type_name, &body);
            }
            Err(issue) => {
                warn!(element = element.id(), %issue, "跳过无法写出的元素");
                self.collector.error(issue);
            }
        }
    }

    fn element_params(
        &mut self,
        element: &GeometryElement,
    ) -> Result<(&'static str, String), CodecIssue> {
        let id = element.id();
        let layer = self.layer_param(element);
        let params = match element {
            GeometryElement::Line(line) => (
                SXF_LINE,
                format!(
                    "{layer}, {}, {}",
                    self.point(line.start, id)?,
                    self.point(line.end, id)?
                ),
            ),
            GeometryElement::Circle(circle) => (
                SXF_CIRCLE,
                format!(
                    "{layer}, {}, {}",
                    self.point(circle.center, id)?,
                    self.number(circle.radius, id)?
                ),
            ),
            GeometryElement::Arc(arc) => (
                SXF_CIRCLE,
                format!(
                    "{layer}, {}, {}, {}, {}",
                    self.point(arc.center, id)?,
                    self.number(arc.radius, id)?,
                    self.number(arc.start_angle, id)?,
                    self.number(arc.end_angle, id)?
                ),
            ),
            GeometryElement::Polyline(polyline) => {
                let points = polyline
                    .points
                    .iter()
                    .map(|point| self.point(*point, id))
                    .collect::<Result<Vec<_>, _>>()?;
                (
                    SXF_POLYLINE,
                    format!(
                        "{layer}, ({}), {}",
                        points.join(", "),
                        logical(polyline.closed)
                    ),
                )
            }
            GeometryElement::Text(text) => {
                let position = self.point(text.position, id)?;
                let height = self.number(text.height, id)?;
                let rotation = self.number(text.rotation, id)?;
                let content = self.quote(&text.text, id);
                (
                    SXF_TEXT,
                    format!("{layer}, {position}, '{content}', {height}, {rotation}"),
                )
            }
            GeometryElement::Point(point) => (
                SXF_POINT,
                format!("{layer}, {}", self.point(point.position, id)?),
            ),
        };
        Ok(params)
    }

    /// 已知图层写引用，未知图层写字符串 ID。
    fn layer_param(&mut self, element: &GeometryElement) -> String {
        let layer_id = element.layer_id();
        match self.layer_refs.get(layer_id) {
            Some(entity) => format!("#{entity}"),
            None => {
                self.collector.warning(CodecIssue::UnknownLayer {
                    element: element.id().to_string(),
                    layer: layer_id.to_string(),
                });
                format!("'{}'", self.quote(layer_id, element.id()))
            }
        }
    }

    fn point(&self, point: Point3, element: &str) -> Result<String, CodecIssue> {
        Ok(format!(
            "{CARTESIAN_POINT}('', ({}, {}, {}))",
            self.number(point.x(), element)?,
            self.number(point.y(), element)?,
            self.number(point.z(), element)?
        ))
    }

    fn number(&self, value: f64, element: &str) -> Result<String, CodecIssue> {
        format_number(value, self.precision).ok_or_else(|| CodecIssue::NonFiniteValue {
            element: element.to_string(),
        })
    }

    /// 字符串字面量内容。换行替换为空格，末尾反斜杠会转义结束引号，因此丢弃。
    fn quote(&mut self, value: &str, element: &str) -> String {
        let mut text = value.to_string();
        if text.contains(['\n', '\r']) {
            text = text.replace("\r\n", " ").replace(['\n', '\r'], " ");
            self.collector.warning(CodecIssue::UnrepresentableText {
                element: element.to_string(),
                detail: "换行已替换为空格".to_string(),
            });
        }
        if text.ends_with('\\') {
            text.truncate(text.trim_end_matches('\\').len());
            self.collector.warning(CodecIssue::UnrepresentableText {
                element: element.to_string(),
                detail: "末尾的反斜杠已删除".to_string(),
            });
        }
        escape_string(&text)
    }

    fn quote_header(&mut self, value: &str) -> String {
        self.quote(value, "HEADER")
    }

    fn push_entity(&mut self, type_name: &str, body: &str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let _ = writeln!(self.out, "#{id} = {type_name}({body});");
        id
    }
}

fn logical(value: bool) -> &'static str {
    if value { ".T." } else { ".F." }
}

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sxcad_core::document::{
    Arc, Circle, DrawingModel, FileFormat, FormatHeader, GeometryElement, Layer, Line,
    PointElement, Polyline, Text,
};
use sxcad_core::geometry::{Point3, Rgb};
use tracing::debug;

use super::params::{ParamError, Value, parse_params};
use super::{
    CARTESIAN_POINT, DEFAULT_SCHEMA, SXF_CIRCLE, SXF_LAYER, SXF_LINE, SXF_POINT, SXF_POLYLINE,
    SXF_TEXT,
};
use crate::codec::{DecodeOutcome, report_layer_issues};
use crate::diagnostics::{CodecIssue, Collector, DiagnosticPolicy};
use crate::options::ImportOptions;

/// 引用链的最大深度，源格式本身不限制循环引用。
const MAX_REFERENCE_DEPTH: usize = 16;

const PREAMBLE: &str = "ISO-10303-21;";
const HEADER_MARKER: &str = "HEADER;";
const DATA_MARKER: &str = "DATA;";
const ENDSEC_MARKER: &str = "ENDSEC;";
const TRAILER: &str = "END-ISO-10303-21;";

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^#(\d+)\s*=\s*([A-Z_][A-Z0-9_]*)\s*\((.*)\)$").expect("entity pattern")
});
static HEADER_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([A-Z_][A-Z0-9_]*)\s*\((.*)\)$").expect("header entry pattern")
});
static ENTITY_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\d+\s*=").expect("entity start pattern"));

/// DATA 段中的一条实体记录，仅在解码期间存在。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct P21Entity {
    pub id: u32,
    pub type_name: String,
    pub params: Vec<Value>,
}

struct Sections<'a> {
    header: &'a str,
    data: &'a str,
}

/// 解码 P21 文本。缺少段标记时只返回错误，不返回模型。
pub fn decode_p21(text: &str, options: &ImportOptions) -> DecodeOutcome {
    decode_with_collector(text, options, Collector::new(DiagnosticPolicy::from_import(options)))
}

pub(crate) fn decode_with_collector(
    text: &str,
    options: &ImportOptions,
    mut collector: Collector,
) -> DecodeOutcome {
    let sections = match split_sections(text) {
        Ok(sections) => sections,
        Err(issue) => {
            collector.error(issue);
            return DecodeOutcome::without_model(collector.finish());
        }
    };

    let scale = options.effective_unit_scale();
    let mut model = DrawingModel::new(FileFormat::P21);
    model.header = parse_header(sections.header);
    if let Some(cs) = options.coordinate_system.as_ref() {
        model.header.coordinate_system = cs.clone();
    }

    let entities = collect_entities(sections.data, &mut collector);
    EntityResolver {
        entities: &entities,
        collector: &mut collector,
        scale,
    }
    .build(&mut model);

    model.set_metadata("format", FileFormat::P21.as_str());
    model.set_metadata("entityCount", entities.len());
    model.set_metadata("unitScale", scale);
    if let Some(cs) = options.coordinate_system.as_ref() {
        model.set_metadata("coordinateSystem", cs.as_str());
    }

    debug!(
        layers = model.layers.len(),
        elements = model.elements.len(),
        errors = collector.error_count(),
        warnings = collector.warning_count(),
        "P21 解码完成"
    );
    DecodeOutcome::with_model(model, collector.finish())
}

/// 依次定位各段标记。`END-ISO-10303-21;` 中包含的前导标记不算数。
fn split_sections(text: &str) -> Result<Sections<'_>, CodecIssue> {
    let missing = |marker: &'static str| CodecIssue::MissingSection { marker };

    let mut search_from = 0;
    let preamble = loop {
        let pos = text[search_from..]
            .find(PREAMBLE)
            .map(|offset| search_from + offset)
            .ok_or(missing(PREAMBLE))?;
        if text[..pos].ends_with("END-") {
            search_from = pos + PREAMBLE.len();
            continue;
        }
        break pos;
    };

    let after_preamble = preamble + PREAMBLE.len();
    let header_start = find_from(text, after_preamble, HEADER_MARKER).ok_or(missing(HEADER_MARKER))?
        + HEADER_MARKER.len();
    let header_end = find_from(text, header_start, ENDSEC_MARKER).ok_or(missing(ENDSEC_MARKER))?;
    let data_start = find_from(text, header_end + ENDSEC_MARKER.len(), DATA_MARKER)
        .ok_or(missing(DATA_MARKER))?
        + DATA_MARKER.len();
    let trailer = text
        .rfind(TRAILER)
        .filter(|&pos| pos >= data_start)
        .ok_or(missing(TRAILER))?;
    let data_end = text[data_start..trailer]
        .rfind(ENDSEC_MARKER)
        .map(|offset| data_start + offset)
        .ok_or(missing(ENDSEC_MARKER))?;

    Ok(Sections {
        header: &text[header_start..header_end],
        data: &text[data_start..data_end],
    })
}

fn find_from(text: &str, from: usize, marker: &str) -> Option<usize> {
    text.get(from..)?.find(marker).map(|offset| from + offset)
}

/// 头部字段宽松提取，匹配失败的字段保留默认值。
fn parse_header(header: &str) -> FormatHeader {
    let mut parsed = FormatHeader::new(FileFormat::P21);
    parsed.schema = DEFAULT_SCHEMA.to_string();

    for statement in split_statements(header) {
        let Some(caps) = HEADER_ENTRY.captures(&statement) else {
            continue;
        };
        let values: Vec<Value> = parse_params(&caps[2])
            .into_iter()
            .map(|value| value.unwrap_or(Value::Null))
            .collect();
        match &caps[1] {
            "FILE_DESCRIPTION" => apply_description(&mut parsed, &values),
            "FILE_NAME" => apply_file_name(&mut parsed, &values),
            "FILE_SCHEMA" => apply_schema(&mut parsed, &values),
            _ => {}
        }
    }
    parsed
}

fn apply_description(parsed: &mut FormatHeader, values: &[Value]) {
    let mut plain = Vec::new();
    if let Some(Value::List(items)) = values.first() {
        for item in items {
            let Value::Str(entry) = item else { continue };
            match entry.split_once(':') {
                Some(("version", v)) => parsed.version = v.trim().to_string(),
                Some(("units", v)) => parsed.units = v.trim().to_string(),
                Some(("coordinate_system", v)) => parsed.coordinate_system = v.trim().to_string(),
                _ => plain.push(entry.clone()),
            }
        }
    }
    parsed.description = plain.join("; ");
}

fn apply_file_name(parsed: &mut FormatHeader, values: &[Value]) {
    let text_at = |idx: usize| match values.get(idx) {
        Some(Value::Str(s)) => Some(s.clone()),
        Some(Value::List(items)) => items.iter().find_map(|item| match item {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }),
        _ => None,
    };
    parsed.file_name = text_at(0).unwrap_or_default();
    parsed.timestamp = text_at(1).unwrap_or_default();
    parsed.author = text_at(2).unwrap_or_default();
    parsed.organization = text_at(3).unwrap_or_default();
}

fn apply_schema(parsed: &mut FormatHeader, values: &[Value]) {
    let schema = match values.first() {
        Some(Value::List(items)) => items.iter().find_map(|item| match item {
            Value::Str(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }),
        Some(Value::Str(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };
    if let Some(schema) = schema {
        parsed.schema = schema;
    }
}

/// 按分号切分语句；引号内的分号不切分，注释被移除，字符串不跨行。
/// 换行处结束的未闭合字符串之后若紧跟 `#n =`，当前语句在此截断。
fn split_statements(data: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut broken_string = false;
    let mut chars = data.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if in_string {
            current.push(ch);
            match ch {
                '\\' => {
                    if let Some(&(_, '\'')) = chars.peek() {
                        current.push('\'');
                        chars.next();
                    }
                }
                '\'' => in_string = false,
                '\n' => {
                    in_string = false;
                    broken_string = true;
                }
                _ => {}
            }
            continue;
        }
        if broken_string && !ch.is_whitespace() {
            broken_string = false;
            if ENTITY_START.is_match(&data[idx..]) {
                push_statement(&mut statements, &mut current);
            }
        }
        match ch {
            '\'' => {
                in_string = true;
                current.push(ch);
            }
            '/' if matches!(chars.peek(), Some(&(_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                for (_, next) in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' => push_statement(&mut statements, &mut current),
            _ => current.push(ch),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

/// 被未闭合字符串吞掉的结尾分号一并去掉。
fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim().trim_end_matches(';').trim_end();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// 收集 DATA 段中的实体。重复编号保留首次出现的位置、采用最后一次的定义。
fn collect_entities(data: &str, collector: &mut Collector) -> IndexMap<u32, P21Entity> {
    let mut entities = IndexMap::new();
    for statement in split_statements(data) {
        let Some(caps) = ENTITY.captures(&statement) else {
            collector.error(CodecIssue::MalformedEntity {
                statement: abbreviate(&statement),
            });
            continue;
        };
        let Ok(id) = caps[1].parse::<u32>() else {
            collector.error(CodecIssue::MalformedEntity {
                statement: abbreviate(&statement),
            });
            continue;
        };
        let type_name = caps[2].to_string();
        let params = caps.get(3).map_or("", |m| m.as_str());

        let mut values = Vec::new();
        for (index, parsed) in parse_params(params).into_iter().enumerate() {
            match parsed {
                Ok(value) => values.push(value),
                Err(ParamError::Unterminated) => {
                    collector.error(CodecIssue::UnterminatedString { entity: id, index });
                    values.push(Value::Null);
                }
                Err(ParamError::Invalid(message)) => {
                    collector.error(CodecIssue::InvalidParameter {
                        entity: id,
                        index,
                        message,
                    });
                    values.push(Value::Null);
                }
            }
        }

        let entity = P21Entity {
            id,
            type_name,
            params: values,
        };
        if entities.insert(id, entity).is_some() {
            collector.warning(CodecIssue::DuplicateEntity(id));
        }
    }
    entities
}

struct EntityResolver<'a> {
    entities: &'a IndexMap<u32, P21Entity>,
    collector: &'a mut Collector,
    scale: f64,
}

impl EntityResolver<'_> {
    fn build(&mut self, model: &mut DrawingModel) {
        let mut layers = Vec::new();
        let mut elements = Vec::new();
        let entities = self.entities;

        for entity in entities.values() {
            let built = match entity.type_name.as_str() {
                SXF_LAYER => {
                    layers.push(self.build_layer(entity));
                    continue;
                }
                CARTESIAN_POINT => continue,
                SXF_LINE => self.build_line(entity),
                SXF_CIRCLE => self.build_circle(entity),
                SXF_TEXT => self.build_text(entity),
                SXF_POINT => self.build_point(entity),
                SXF_POLYLINE => self.build_polyline(entity),
                other => {
                    debug!(entity = entity.id, type_name = other, "跳过不支持的实体");
                    self.collector.warning(CodecIssue::UnsupportedEntity {
                        entity: entity.id,
                        type_name: other.to_string(),
                    });
                    continue;
                }
            };
            match built {
                Ok(element) => elements.push(element),
                Err(issue) => self.collector.error(issue),
            }
        }

        report_layer_issues(&layers, &elements, self.collector);

        model.layers = layers;
        model.elements = elements;
    }

    fn build_layer(&mut self, entity: &P21Entity) -> Layer {
        let mut layer = Layer::new(layer_id_of(entity), "");
        if let Some(Value::Str(name)) = entity.params.get(1) {
            layer.name = name.clone();
        }
        match entity.params.get(2) {
            Some(Value::List(channels)) => match color_from(channels) {
                Some(color) => layer.color = color,
                None => self.collector.warning(CodecIssue::InvalidParameter {
                    entity: entity.id,
                    index: 2,
                    message: "颜色需要 3 个 0-255 的数值，使用黑色".to_string(),
                }),
            },
            Some(Value::Null) | None => {}
            Some(other) => self.collector.warning(CodecIssue::InvalidParameter {
                entity: entity.id,
                index: 2,
                message: format!("颜色应为列表，实际为 {}", other.kind_name()),
            }),
        }
        if let Some(Value::Str(line_type)) = entity.params.get(3) {
            layer.line_type = line_type.clone();
        }
        if let Some(Value::Number(width)) = entity.params.get(4) {
            layer.line_width = *width;
        }
        if let Some(Value::Bool(visible)) = entity.params.get(5) {
            layer.visible = *visible;
        }
        if let Some(Value::Bool(locked)) = entity.params.get(6) {
            layer.locked = *locked;
        }
        layer
    }

    fn build_line(&mut self, entity: &P21Entity) -> Result<GeometryElement, CodecIssue> {
        let layer_id = self.resolve_layer(entity, 0);
        let start = self.point_param(entity, 1)?;
        let end = self.point_param(entity, 2)?;
        Ok(GeometryElement::Line(Line {
            id: entity.id.to_string(),
            layer_id,
            start,
            end,
        }))
    }

    /// 三个参数为整圆；带起止角时为圆弧。
    fn build_circle(&mut self, entity: &P21Entity) -> Result<GeometryElement, CodecIssue> {
        let layer_id = self.resolve_layer(entity, 0);
        let center = self.point_param(entity, 1)?;
        let radius = required_number(entity, 2)?;
        let start_angle = optional_number(entity, 3)?;
        let end_angle = optional_number(entity, 4)?;
        let id = entity.id.to_string();

        match (start_angle, end_angle) {
            (Some(start_angle), Some(end_angle)) => Ok(GeometryElement::Arc(Arc {
                id,
                layer_id,
                center,
                radius,
                start_angle,
                end_angle,
            })),
            (None, None) => Ok(GeometryElement::Circle(Circle {
                id,
                layer_id,
                center,
                radius,
            })),
            _ => Err(CodecIssue::InvalidParameter {
                entity: entity.id,
                index: 3,
                message: "圆弧需要同时给出起始角与终止角".to_string(),
            }),
        }
    }

    fn build_text(&mut self, entity: &P21Entity) -> Result<GeometryElement, CodecIssue> {
        let layer_id = self.resolve_layer(entity, 0);
        let position = self.point_param(entity, 1)?;
        let text = match entity.params.get(2) {
            Some(Value::Str(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => {
                return Err(CodecIssue::InvalidParameter {
                    entity: entity.id,
                    index: 2,
                    message: format!("文本应为字符串，实际为 {}", other.kind_name()),
                });
            }
        };
        let height = required_number(entity, 3)?;
        let rotation = optional_number(entity, 4)?.unwrap_or(0.0);
        Ok(GeometryElement::Text(Text {
            id: entity.id.to_string(),
            layer_id,
            position,
            text,
            height,
            rotation,
        }))
    }

    fn build_point(&mut self, entity: &P21Entity) -> Result<GeometryElement, CodecIssue> {
        let layer_id = self.resolve_layer(entity, 0);
        let position = self.point_param(entity, 1)?;
        Ok(GeometryElement::Point(PointElement {
            id: entity.id.to_string(),
            layer_id,
            position,
        }))
    }

    fn build_polyline(&mut self, entity: &P21Entity) -> Result<GeometryElement, CodecIssue> {
        let layer_id = self.resolve_layer(entity, 0);
        let items = match entity.params.get(1) {
            Some(Value::List(items)) => items,
            Some(other) => {
                return Err(CodecIssue::InvalidParameter {
                    entity: entity.id,
                    index: 1,
                    message: format!("顶点应为列表，实际为 {}", other.kind_name()),
                });
            }
            None => return Err(missing_param(entity, 1)),
        };
        let points = items
            .iter()
            .map(|item| self.resolve_point(entity.id, item))
            .collect();
        let closed = matches!(entity.params.get(2), Some(Value::Bool(true)));
        Ok(GeometryElement::Polyline(Polyline {
            id: entity.id.to_string(),
            layer_id,
            points,
            closed,
        }))
    }

    /// 图层参数可以是字符串 ID，也可以是指向 `SXF_LAYER` 的引用。
    fn resolve_layer(&mut self, entity: &P21Entity, index: usize) -> String {
        const FALLBACK: &str = "0";
        match entity.params.get(index) {
            Some(Value::Str(id)) => id.clone(),
            Some(Value::Reference(target)) => match self.entities.get(target) {
                Some(layer) if layer.type_name == SXF_LAYER => layer_id_of(layer),
                Some(other) => {
                    self.collector.warning(CodecIssue::TypeMismatch {
                        entity: entity.id,
                        expected: SXF_LAYER,
                        actual: other.type_name.clone(),
                    });
                    FALLBACK.to_string()
                }
                None => {
                    self.collector.warning(CodecIssue::UnresolvedReference {
                        entity: entity.id,
                        target: *target,
                    });
                    FALLBACK.to_string()
                }
            },
            Some(
                value @ (Value::Null
                | Value::Number(_)
                | Value::Bool(_)
                | Value::Enum(_)
                | Value::List(_)
                | Value::Typed { .. }),
            ) => {
                self.collector.warning(CodecIssue::InvalidParameter {
                    entity: entity.id,
                    index,
                    message: format!("图层参数为 {}，归入图层 0", value.kind_name()),
                });
                FALLBACK.to_string()
            }
            None => {
                self.collector.warning(missing_param(entity, index));
                FALLBACK.to_string()
            }
        }
    }

    fn point_param(&mut self, entity: &P21Entity, index: usize) -> Result<Point3, CodecIssue> {
        let value = entity
            .params
            .get(index)
            .ok_or_else(|| missing_param(entity, index))?;
        Ok(self.resolve_point(entity.id, value))
    }

    /// 解析坐标点：内联列表、内联 `CARTESIAN_POINT` 或引用。
    /// 无法解析时记录警告并返回原点；单位换算只在此处进行一次。
    fn resolve_point(&mut self, owner: u32, value: &Value) -> Point3 {
        let mut visited = HashSet::new();
        match self.point_coords(owner, value, 0, &mut visited) {
            Ok(point) => point.scaled(self.scale),
            Err(issue) => {
                self.collector.warning(issue);
                Point3::origin()
            }
        }
    }

    fn point_coords(
        &self,
        owner: u32,
        value: &Value,
        depth: usize,
        visited: &mut HashSet<u32>,
    ) -> Result<Point3, CodecIssue> {
        match value {
            Value::List(items) => coords_from_list(owner, items),
            Value::Typed { name, params } if name == CARTESIAN_POINT => {
                let coords = params.get(1).ok_or_else(|| CodecIssue::InvalidParameter {
                    entity: owner,
                    index: 1,
                    message: "内联 CARTESIAN_POINT 缺少坐标".to_string(),
                })?;
                self.point_coords(owner, coords, depth + 1, visited)
            }
            Value::Typed { name, .. } => Err(CodecIssue::TypeMismatch {
                entity: owner,
                expected: CARTESIAN_POINT,
                actual: name.clone(),
            }),
            Value::Reference(target) => {
                if depth >= MAX_REFERENCE_DEPTH || !visited.insert(*target) {
                    return Err(CodecIssue::ReferenceCycle {
                        entity: owner,
                        target: *target,
                    });
                }
                let referenced =
                    self.entities
                        .get(target)
                        .ok_or(CodecIssue::UnresolvedReference {
                            entity: owner,
                            target: *target,
                        })?;
                if referenced.type_name != CARTESIAN_POINT {
                    return Err(CodecIssue::TypeMismatch {
                        entity: owner,
                        expected: CARTESIAN_POINT,
                        actual: referenced.type_name.clone(),
                    });
                }
                let coords =
                    referenced
                        .params
                        .get(1)
                        .ok_or_else(|| CodecIssue::InvalidParameter {
                            entity: referenced.id,
                            index: 1,
                            message: "CARTESIAN_POINT 缺少坐标".to_string(),
                        })?;
                self.point_coords(referenced.id, coords, depth + 1, visited)
            }
            Value::Null | Value::Str(_) | Value::Number(_) | Value::Bool(_) | Value::Enum(_) => {
                Err(CodecIssue::InvalidParameter {
                    entity: owner,
                    index: 0,
                    message: format!("期望坐标点，实际为 {}", value.kind_name()),
                })
            }
        }
    }
}

fn coords_from_list(owner: u32, items: &[Value]) -> Result<Point3, CodecIssue> {
    let mut coords = [0.0f64; 3];
    if !(2..=3).contains(&items.len()) {
        return Err(CodecIssue::InvalidParameter {
            entity: owner,
            index: 0,
            message: format!("坐标需要 2 或 3 个分量，实际为 {}", items.len()),
        });
    }
    for (slot, item) in coords.iter_mut().zip(items) {
        match item {
            Value::Number(n) => *slot = *n,
            other => {
                return Err(CodecIssue::InvalidParameter {
                    entity: owner,
                    index: 0,
                    message: format!("坐标分量应为数值，实际为 {}", other.kind_name()),
                });
            }
        }
    }
    Ok(Point3::from(coords))
}

fn color_from(channels: &[Value]) -> Option<Rgb> {
    let [r, g, b] = channels else { return None };
    let channel = |value: &Value| match value {
        Value::Number(n) if (0.0..=255.0).contains(n) => Some(n.round() as u8),
        _ => None,
    };
    Some(Rgb::new(channel(r)?, channel(g)?, channel(b)?))
}

/// 图层 ID 取第一个参数；为空时退回实体编号。
fn layer_id_of(entity: &P21Entity) -> String {
    match entity.params.first() {
        Some(Value::Str(id)) if !id.is_empty() => id.clone(),
        _ => entity.id.to_string(),
    }
}

fn required_number(entity: &P21Entity, index: usize) -> Result<f64, CodecIssue> {
    optional_number(entity, index)?.ok_or_else(|| missing_param(entity, index))
}

fn optional_number(entity: &P21Entity, index: usize) -> Result<Option<f64>, CodecIssue> {
    match entity.params.get(index) {
        Some(Value::Number(n)) => Ok(Some(*n)),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(CodecIssue::InvalidParameter {
            entity: entity.id,
            index,
            message: format!("期望数值，实际为 {}", other.kind_name()),
        }),
    }
}

fn missing_param(entity: &P21Entity, index: usize) -> CodecIssue {
    CodecIssue::InvalidParameter {
        entity: entity.id,
        index,
        message: format!("{} 缺少第 {index} 个参数", entity.type_name),
    }
}

fn abbreviate(statement: &str) -> String {
    const LIMIT: usize = 60;
    match statement.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &statement[..cut]),
        None => statement.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_ignore_semicolons_in_strings_and_comments() {
        let statements = split_statements(
            "#1 = SXF_TEXT('0', (0, 0), 'a;b', 1, 0);\n/* note; */\n#2 = SXF_POINT('0', (1, 1));",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("'a;b'"));
        assert!(statements[1].starts_with("#2"));
    }

    #[test]
    fn unclosed_quote_does_not_swallow_next_entity() {
        let statements = split_statements(
            "#2 = SXF_TEXT(#1,(0.,0.,0.),'abc,2.5,0.);\n#3 = SXF_POINT(#1,(1.,1.,1.));",
        );
        assert_eq!(
            statements,
            vec![
                "#2 = SXF_TEXT(#1,(0.,0.,0.),'abc,2.5,0.)".to_string(),
                "#3 = SXF_POINT(#1,(1.,1.,1.))".to_string(),
            ]
        );
    }

    #[test]
    fn unclosed_quote_continues_onto_parameter_line() {
        let statements = split_statements("#4 = SXF_TEXT(#1,(0.,0.,0.),'open\n,2.5,0.);\n#5 = X();");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with(",2.5,0.)"));
        assert_eq!(statements[1], "#5 = X()");
    }

    #[test]
    fn header_strings_may_contain_terminators() {
        let header = parse_header(
            "FILE_NAME('a);b', '2024-01-01T00:00:00', ('me'), ('org'), '', '', '');\nFILE_SCHEMA(('SXF_V3'));",
        );
        assert_eq!(header.file_name, "a);b");
        assert_eq!(header.timestamp, "2024-01-01T00:00:00");
        assert_eq!(header.author, "me");
        assert_eq!(header.organization, "org");
        assert_eq!(header.schema, "SXF_V3");
    }

    #[test]
    fn sections_require_markers_in_order() {
        let ok = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1 = X();\nENDSEC;\nEND-ISO-10303-21;\n";
        let sections = split_sections(ok).ok().expect("sections");
        assert!(sections.data.contains("#1 = X();"));

        let missing_data = "ISO-10303-21;\nHEADER;\nENDSEC;\nENDSEC;\nEND-ISO-10303-21;\n";
        assert_eq!(
            split_sections(missing_data).err(),
            Some(CodecIssue::MissingSection { marker: DATA_MARKER })
        );

        let trailer_only = "HEADER;\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n";
        assert_eq!(
            split_sections(trailer_only).err(),
            Some(CodecIssue::MissingSection { marker: PREAMBLE })
        );
    }

    #[test]
    fn header_fields_fall_back_to_defaults() {
        let header = parse_header("FILE_NAME('a.p21', '2024-01-01T00:00:00', ('me'), ('org'), '', '', '');");
        assert_eq!(header.file_name, "a.p21");
        assert_eq!(header.author, "me");
        assert_eq!(header.organization, "org");
        assert_eq!(header.schema, DEFAULT_SCHEMA);
        assert!(header.description.is_empty());
    }

    #[test]
    fn header_description_entries_fill_fields() {
        let header = parse_header(
            "FILE_DESCRIPTION(('SXF drawing exchange', 'version:3.1', 'units:m', 'coordinate_system:JGD2011 IX'), '2;1');\nFILE_SCHEMA(('SXF_V3'));",
        );
        assert_eq!(header.description, "SXF drawing exchange");
        assert_eq!(header.version, "3.1");
        assert_eq!(header.units, "m");
        assert_eq!(header.coordinate_system, "JGD2011 IX");
        assert_eq!(header.schema, "SXF_V3");
    }

    #[test]
    fn long_statements_are_abbreviated() {
        let long = "x".repeat(100);
        let short = abbreviate(&long);
        assert_eq!(short.chars().count(), 61);
    }
}

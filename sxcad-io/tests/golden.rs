use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use sxcad_core::document::{DrawingModel, GeometryElement, Layer};
use sxcad_core::geometry::Point3;
use sxcad_io::DecodeOutcome;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GoldenModel {
    header: GoldenHeader,
    layers: Vec<GoldenLayer>,
    elements: Vec<GoldenElement>,
    errors: usize,
    warnings: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GoldenHeader {
    version: String,
    units: String,
    author: String,
    #[serde(default)]
    schema: String,
    #[serde(default)]
    timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GoldenLayer {
    id: String,
    name: String,
    color: [u8; 3],
    line_type: String,
    line_width: f64,
    visible: bool,
    locked: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GoldenElement {
    id: String,
    kind: String,
    layer: String,
    points: Vec<[f64; 3]>,
    #[serde(default)]
    data: Value,
}

pub fn assert_golden(name: &str, outcome: &DecodeOutcome) {
    let model = outcome.model.as_ref().expect("解码未返回模型");
    let snapshot = GoldenModel::from_model(model, outcome);
    let base_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/golden");
    if let Err(err) = fs::create_dir_all(&base_dir) {
        panic!("无法创建黄金数据目录 {}: {err}", base_dir.display());
    }
    let golden_path = base_dir.join(format!("{name}.json"));
    let serialized = serde_json::to_string_pretty(&snapshot).expect("序列化黄金快照失败");

    if !golden_path.exists() {
        fs::write(&golden_path, &serialized)
            .unwrap_or_else(|err| panic!("写入黄金文件 {} 失败: {err}", golden_path.display()));
        panic!(
            "黄金文件 {} 不存在，已自动生成。请确认内容后重新运行测试。",
            golden_path.display()
        );
    }

    let expected_str = fs::read_to_string(&golden_path)
        .unwrap_or_else(|err| panic!("读取黄金文件 {} 失败: {err}", golden_path.display()));
    let expected: GoldenModel = serde_json::from_str(&expected_str)
        .unwrap_or_else(|err| panic!("解析黄金文件 {} 失败: {err}", golden_path.display()));

    if expected != snapshot {
        let diff_path = base_dir.join(format!("{name}.actual.json"));
        fs::write(&diff_path, &serialized).expect("写入差异文件失败");
        panic!(
            "黄金文件 {} 与当前解码结果不一致。已生成对照输出 {}。",
            golden_path.display(),
            diff_path.display()
        );
    }
}

impl GoldenModel {
    fn from_model(model: &DrawingModel, outcome: &DecodeOutcome) -> Self {
        Self {
            header: GoldenHeader {
                version: model.header.version.clone(),
                units: model.header.units.clone(),
                author: model.header.author.clone(),
                schema: model.header.schema.clone(),
                timestamp: model.header.timestamp.clone(),
            },
            layers: model.layers.iter().map(GoldenLayer::from_layer).collect(),
            elements: model.elements.iter().map(GoldenElement::from_element).collect(),
            errors: outcome.diagnostics.errors.len(),
            warnings: outcome.diagnostics.warnings.len(),
        }
    }
}

impl GoldenLayer {
    fn from_layer(layer: &Layer) -> Self {
        Self {
            id: layer.id.clone(),
            name: layer.name.clone(),
            color: [layer.color.r, layer.color.g, layer.color.b],
            line_type: layer.line_type.clone(),
            line_width: round(layer.line_width),
            visible: layer.visible,
            locked: layer.locked,
        }
    }
}

impl GoldenElement {
    fn from_element(element: &GeometryElement) -> Self {
        let data = match element {
            GeometryElement::Line(_) | GeometryElement::Point(_) => json!({}),
            GeometryElement::Circle(circle) => json!({ "radius": round(circle.radius) }),
            GeometryElement::Arc(arc) => json!({
                "radius": round(arc.radius),
                "start_angle": round(arc.start_angle),
                "end_angle": round(arc.end_angle),
            }),
            GeometryElement::Polyline(polyline) => json!({ "closed": polyline.closed }),
            GeometryElement::Text(text) => json!({
                "text": text.text,
                "height": round(text.height),
                "rotation": round(text.rotation),
            }),
        };
        Self {
            id: element.id().to_string(),
            kind: element.kind().as_str().to_string(),
            layer: element.layer_id().to_string(),
            points: element.points().into_iter().map(point).collect(),
            data,
        }
    }
}

fn point(p: Point3) -> [f64; 3] {
    [round(p.x()), round(p.y()), round(p.z())]
}

/// 快照统一保留 6 位小数，避免浮点尾差。
fn round(value: f64) -> f64 {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 { 0.0 } else { rounded }
}

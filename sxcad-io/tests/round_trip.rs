use once_cell::sync::Lazy;
use regex::Regex;
use sxcad_core::document::{
    Arc, Circle, DrawingModel, FileFormat, GeometryElement, Layer, Line, PointElement, Polyline,
    Text,
};
use sxcad_core::geometry::{Point3, Rgb};
use sxcad_io::{CodecIssue, DrawingCodec, ExportOptions, ImportOptions, P21Codec, SxfCodec};

static LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#(\d+) = ").expect("label pattern"));

fn sample_model() -> DrawingModel {
    let layers = vec![
        Layer::new("0", "L"),
        Layer {
            color: Rgb::new(12, 200, 34),
            line_type: "dotted".into(),
            line_width: 0.35,
            visible: false,
            ..Layer::new("survey", "測量 'main'")
        },
    ];
    let elements = vec![
        GeometryElement::Point(PointElement {
            id: "p".into(),
            layer_id: "survey".into(),
            position: Point3::new(12.3456789, -0.5, 3.0),
        }),
        GeometryElement::Line(Line {
            id: "l".into(),
            layer_id: "0".into(),
            start: Point3::origin(),
            end: Point3::new(100.0, 0.0, 0.0),
        }),
        GeometryElement::Circle(Circle {
            id: "c".into(),
            layer_id: "0".into(),
            center: Point3::new(5.0, 5.0, 0.0),
            radius: 2.0,
        }),
        GeometryElement::Arc(Arc {
            id: "a".into(),
            layer_id: "0".into(),
            center: Point3::new(-5.0, 5.0, 0.0),
            radius: 1.5,
            start_angle: 0.0,
            end_angle: std::f64::consts::FRAC_PI_2,
        }),
        GeometryElement::Polyline(Polyline {
            id: "pl".into(),
            layer_id: "survey".into(),
            points: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            closed: true,
        }),
        GeometryElement::Text(Text {
            id: "t".into(),
            layer_id: "survey".into(),
            position: Point3::new(2.0, 3.0, 0.0),
            text: "BM-1 it's \\ here".into(),
            height: 2.5,
            rotation: 0.785398,
        }),
    ];
    DrawingModel::with_layers_and_elements(FileFormat::P21, layers, elements)
}

fn close(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}

/// 逐元素比较，不比较 ID（解码后的 ID 为实体编号）。
fn assert_same_geometry(expected: &[GeometryElement], actual: &[GeometryElement], epsilon: f64) {
    assert_eq!(expected.len(), actual.len());
    for (want, got) in expected.iter().zip(actual) {
        assert_eq!(want.kind(), got.kind());
        assert_eq!(want.layer_id(), got.layer_id());
        let want_points = want.points();
        let got_points = got.points();
        assert_eq!(want_points.len(), got_points.len());
        for (a, b) in want_points.iter().zip(&got_points) {
            assert!(a.approx_eq(*b, epsilon), "{a:?} != {b:?}");
        }
        match (want, got) {
            (GeometryElement::Circle(a), GeometryElement::Circle(b)) => {
                assert!(close(a.radius, b.radius, epsilon));
            }
            (GeometryElement::Arc(a), GeometryElement::Arc(b)) => {
                assert!(close(a.radius, b.radius, epsilon));
                assert!(close(a.start_angle, b.start_angle, epsilon));
                assert!(close(a.end_angle, b.end_angle, epsilon));
            }
            (GeometryElement::Polyline(a), GeometryElement::Polyline(b)) => {
                assert_eq!(a.closed, b.closed);
            }
            (GeometryElement::Text(a), GeometryElement::Text(b)) => {
                assert_eq!(a.text, b.text);
                assert!(close(a.height, b.height, epsilon));
                assert!(close(a.rotation, b.rotation, epsilon));
            }
            (GeometryElement::Line(_), GeometryElement::Line(_))
            | (GeometryElement::Point(_), GeometryElement::Point(_)) => {}
            (want, got) => panic!("元素种类不一致: {want:?} / {got:?}"),
        }
    }
}

#[test]
fn p21_round_trip_preserves_layers_and_geometry() {
    let model = sample_model();
    let encoded = P21Codec::new().encode(&model, &ExportOptions::default());
    assert!(encoded.is_success(), "{:?}", encoded.diagnostics);
    assert!(encoded.diagnostics.is_empty(), "{:?}", encoded.diagnostics);

    let text = String::from_utf8(encoded.output.expect("编码输出缺失")).expect("P21 输出应为 UTF-8");
    let outcome = P21Codec::new().decode_str(&text, &ImportOptions::default());
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    let decoded = outcome.model.expect("模型缺失");

    assert_eq!(decoded.layers, model.layers);
    assert_same_geometry(&model.elements, &decoded.elements, 1e-6);
    assert_eq!(decoded.header.version, "3.1");
    assert_eq!(decoded.header.units, "mm");
    assert_eq!(decoded.header.file_name, "drawing");
}

#[test]
fn p21_entity_labels_increase_from_one() {
    let encoded = P21Codec::new().encode(&sample_model(), &ExportOptions::default());
    let text = String::from_utf8(encoded.output.expect("编码输出缺失")).expect("P21 输出应为 UTF-8");
    let labels: Vec<u32> = LABEL
        .captures_iter(&text)
        .map(|caps| caps[1].parse().expect("数字标签"))
        .collect();
    assert_eq!(labels, (1..=8).collect::<Vec<_>>());
}

#[test]
fn concrete_line_scenario_at_precision_three() {
    let model = DrawingModel::with_layers_and_elements(
        FileFormat::P21,
        vec![Layer::new("0", "L")],
        vec![GeometryElement::Line(Line {
            id: "1".into(),
            layer_id: "0".into(),
            start: Point3::new(0.0, 0.0, 0.0),
            end: Point3::new(100.0, 0.0, 0.0),
        })],
    );
    let options = ExportOptions::default().with_precision(3);
    let encoded = P21Codec::new().encode(&model, &options);
    let text = String::from_utf8(encoded.output.expect("编码输出缺失")).expect("P21 输出应为 UTF-8");

    let data = &text[text.find("DATA;").expect("DATA 段")..];
    assert!(data.contains(
        "#2 = SXF_LINE(#1, CARTESIAN_POINT('', (0, 0, 0)), CARTESIAN_POINT('', (100, 0, 0)));"
    ));

    let decoded = P21Codec::new()
        .decode_str(&text, &ImportOptions::default())
        .model
        .expect("模型缺失");
    assert_eq!(decoded.elements.len(), 1);
    let GeometryElement::Line(line) = &decoded.elements[0] else {
        panic!("期望直线");
    };
    assert_eq!(line.start, Point3::new(0.0, 0.0, 0.0));
    assert_eq!(line.end, Point3::new(100.0, 0.0, 0.0));

    let scaled = ImportOptions {
        unit_scale: 0.001,
        ..ImportOptions::default()
    };
    let decoded = P21Codec::new().decode_str(&text, &scaled).model.expect("模型缺失");
    let GeometryElement::Line(line) = &decoded.elements[0] else {
        panic!("期望直线");
    };
    assert!(line.start.approx_eq(Point3::origin(), 1e-12));
    assert!(line.end.approx_eq(Point3::new(0.1, 0.0, 0.0), 1e-12));
}

#[test]
fn non_finite_element_is_skipped_without_consuming_an_id() {
    let mut model = sample_model();
    model.elements.insert(
        1,
        GeometryElement::Point(PointElement {
            id: "bad".into(),
            layer_id: "0".into(),
            position: Point3::new(f64::NAN, 0.0, 0.0),
        }),
    );
    let encoded = P21Codec::new().encode(&model, &ExportOptions::default());
    assert_eq!(
        encoded.diagnostics.errors,
        vec![CodecIssue::NonFiniteValue { element: "bad".into() }]
    );
    let text = String::from_utf8(encoded.output.expect("部分输出仍应返回")).expect("P21 输出应为 UTF-8");
    let labels: Vec<u32> = LABEL
        .captures_iter(&text)
        .map(|caps| caps[1].parse().expect("数字标签"))
        .collect();
    assert_eq!(labels, (1..=8).collect::<Vec<_>>());

    let decoded = P21Codec::new()
        .decode_str(&text, &ImportOptions::default())
        .model
        .expect("模型缺失");
    assert_eq!(decoded.elements.len(), 6);
}

#[test]
fn p21_to_sxf_and_back_keeps_geometry() {
    let model = sample_model();
    let export = ExportOptions {
        encoding: "utf-8".into(),
        ..ExportOptions::default()
    };
    let sxf = SxfCodec::new().encode(&model, &export);
    assert!(sxf.is_success(), "{:?}", sxf.diagnostics);
    let from_sxf = SxfCodec::new()
        .decode(&sxf.output.expect("SXF 输出缺失"), &ImportOptions::default())
        .model
        .expect("SXF 模型缺失");

    let p21 = P21Codec::new().encode(&from_sxf, &ExportOptions::default());
    let back = P21Codec::new()
        .decode(&p21.output.expect("P21 输出缺失"), &ImportOptions::default())
        .model
        .expect("P21 模型缺失");

    assert_same_geometry(&model.elements, &back.elements, 1e-6);
    let names: Vec<&str> = back.layers.iter().map(|layer| layer.name.as_str()).collect();
    assert_eq!(names, vec!["L", "測量 'main'"]);
}

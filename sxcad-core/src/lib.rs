pub mod geometry {
    use glam::DVec3;
    use serde::{Deserialize, Serialize};

    /// 三维点，内部以 `glam::DVec3` 表示。二维来源的数据 z 取 0。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn origin() -> Self {
            Self(DVec3::ZERO)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        /// 各分量同乘 `factor`，用于导入时的单位换算。
        #[inline]
        pub fn scaled(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        /// 逐分量比较，允许 `epsilon` 以内的误差。
        pub fn approx_eq(self, other: Point3, epsilon: f64) -> bool {
            (self.0 - other.0).abs().max_element() <= epsilon
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    impl From<[f64; 3]> for Point3 {
        fn from(value: [f64; 3]) -> Self {
            Self(DVec3::from_array(value))
        }
    }

    /// 图层颜色，每通道 8 位。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Rgb {
        pub r: u8,
        pub g: u8,
        pub b: u8,
    }

    impl Rgb {
        #[inline]
        pub const fn new(r: u8, g: u8, b: u8) -> Self {
            Self { r, g, b }
        }

        pub const BLACK: Rgb = Rgb::new(0, 0, 0);
        pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    }
}

pub mod document {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::path::Path;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point3, Rgb};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Layer {
        pub id: String,
        pub name: String,
        pub color: Rgb,
        pub line_type: String,
        pub line_width: f64,
        pub visible: bool,
        pub locked: bool,
    }

    impl Layer {
        /// 以默认样式（黑色实线、可见、未锁定）创建图层。
        #[inline]
        pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                name: name.into(),
                color: Rgb::BLACK,
                line_type: "continuous".to_string(),
                line_width: 0.25,
                visible: true,
                locked: false,
            }
        }
    }

    /// 几何元素的种类标签。新增种类时两套编解码器都必须同步更新。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum ElementKind {
        Line,
        Circle,
        Arc,
        Polyline,
        Text,
        Point,
    }

    impl ElementKind {
        pub const ALL: [ElementKind; 6] = [
            ElementKind::Line,
            ElementKind::Circle,
            ElementKind::Arc,
            ElementKind::Polyline,
            ElementKind::Text,
            ElementKind::Point,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                ElementKind::Line => "line",
                ElementKind::Circle => "circle",
                ElementKind::Arc => "arc",
                ElementKind::Polyline => "polyline",
                ElementKind::Text => "text",
                ElementKind::Point => "point",
            }
        }
    }

    impl fmt::Display for ElementKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum GeometryElement {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Polyline(Polyline),
        Text(Text),
        Point(PointElement),
    }

    impl GeometryElement {
        #[inline]
        pub fn id(&self) -> &str {
            match self {
                GeometryElement::Line(line) => &line.id,
                GeometryElement::Circle(circle) => &circle.id,
                GeometryElement::Arc(arc) => &arc.id,
                GeometryElement::Polyline(polyline) => &polyline.id,
                GeometryElement::Text(text) => &text.id,
                GeometryElement::Point(point) => &point.id,
            }
        }

        #[inline]
        pub fn layer_id(&self) -> &str {
            match self {
                GeometryElement::Line(line) => &line.layer_id,
                GeometryElement::Circle(circle) => &circle.layer_id,
                GeometryElement::Arc(arc) => &arc.layer_id,
                GeometryElement::Polyline(polyline) => &polyline.layer_id,
                GeometryElement::Text(text) => &text.layer_id,
                GeometryElement::Point(point) => &point.layer_id,
            }
        }

        #[inline]
        pub fn kind(&self) -> ElementKind {
            match self {
                GeometryElement::Line(_) => ElementKind::Line,
                GeometryElement::Circle(_) => ElementKind::Circle,
                GeometryElement::Arc(_) => ElementKind::Arc,
                GeometryElement::Polyline(_) => ElementKind::Polyline,
                GeometryElement::Text(_) => ElementKind::Text,
                GeometryElement::Point(_) => ElementKind::Point,
            }
        }

        /// 依次访问元素携带的全部坐标点。
        pub fn points(&self) -> Vec<Point3> {
            match self {
                GeometryElement::Line(line) => vec![line.start, line.end],
                GeometryElement::Circle(circle) => vec![circle.center],
                GeometryElement::Arc(arc) => vec![arc.center],
                GeometryElement::Polyline(polyline) => polyline.points.clone(),
                GeometryElement::Text(text) => vec![text.position],
                GeometryElement::Point(point) => vec![point.position],
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub id: String,
        pub layer_id: String,
        pub start: Point3,
        pub end: Point3,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub id: String,
        pub layer_id: String,
        pub center: Point3,
        pub radius: f64,
    }

    /// 圆弧，角度单位为弧度。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub id: String,
        pub layer_id: String,
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub id: String,
        pub layer_id: String,
        pub points: Vec<Point3>,
        pub closed: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub id: String,
        pub layer_id: String,
        pub position: Point3,
        pub text: String,
        pub height: f64,
        pub rotation: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PointElement {
        pub id: String,
        pub layer_id: String,
        pub position: Point3,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum FileFormat {
        /// ISO-10303-21 风格的文本实体格式。
        P21,
        /// 带标签记录的二进制格式。
        Sxf,
    }

    impl FileFormat {
        /// 根据扩展名推断格式，大小写不敏感。
        pub fn from_path(path: &Path) -> Option<Self> {
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            match ext.as_str() {
                "p21" | "stp" | "step" => Some(FileFormat::P21),
                "sxf" | "sxb" => Some(FileFormat::Sxf),
                _ => None,
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                FileFormat::P21 => "p21",
                FileFormat::Sxf => "sxf",
            }
        }
    }

    impl fmt::Display for FileFormat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// 文件头信息。两种格式各自只填充自己能表达的字段，其余保持空串。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FormatHeader {
        pub format: FileFormat,
        pub version: String,
        pub description: String,
        pub file_name: String,
        pub timestamp: String,
        pub author: String,
        pub organization: String,
        pub schema: String,
        pub units: String,
        pub encoding: String,
        pub coordinate_system: String,
    }

    impl FormatHeader {
        pub fn new(format: FileFormat) -> Self {
            Self {
                format,
                version: String::new(),
                description: String::new(),
                file_name: String::new(),
                timestamp: String::new(),
                author: String::new(),
                organization: String::new(),
                schema: String::new(),
                units: String::new(),
                encoding: String::new(),
                coordinate_system: String::new(),
            }
        }
    }

    /// 两种编解码器共享的图面模型。每次解码产生新实例，编码时只读。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DrawingModel {
        pub header: FormatHeader,
        pub layers: Vec<Layer>,
        pub elements: Vec<GeometryElement>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        pub metadata: BTreeMap<String, serde_json::Value>,
    }

    impl DrawingModel {
        pub fn new(format: FileFormat) -> Self {
            Self {
                header: FormatHeader::new(format),
                layers: Vec::new(),
                elements: Vec::new(),
                metadata: BTreeMap::new(),
            }
        }

        pub fn with_layers_and_elements(
            format: FileFormat,
            layers: Vec<Layer>,
            elements: Vec<GeometryElement>,
        ) -> Self {
            let mut model = Self::new(format);
            model.layers = layers;
            model.elements = elements;
            model
        }

        #[inline]
        pub fn add_layer(&mut self, layer: Layer) {
            self.layers.push(layer);
        }

        #[inline]
        pub fn add_element(&mut self, element: GeometryElement) {
            self.elements.push(element);
        }

        pub fn layer(&self, id: &str) -> Option<&Layer> {
            self.layers.iter().find(|layer| layer.id == id)
        }

        /// 返回被元素引用、但不在图层列表中的图层 ID（去重，保持首次出现顺序）。
        pub fn unknown_layer_refs(&self) -> Vec<&str> {
            let mut missing: Vec<&str> = Vec::new();
            for element in &self.elements {
                let layer_id = element.layer_id();
                if self.layer(layer_id).is_none() && !missing.contains(&layer_id) {
                    missing.push(layer_id);
                }
            }
            missing
        }

        pub fn element_count_by_kind(&self) -> BTreeMap<ElementKind, usize> {
            let mut counts = BTreeMap::new();
            for element in &self.elements {
                *counts.entry(element.kind()).or_insert(0) += 1;
            }
            counts
        }

        pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
            self.metadata.insert(key.into(), value.into());
        }
    }
}

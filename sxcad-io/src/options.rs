use serde::Deserialize;

/// 文本字段的字符编码。Shift-JIS 仅支持 ASCII 子集，其余字节以 `?` 代替。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    ShiftJis,
    Utf8,
}

impl TextEncoding {
    /// 识别常见写法，无法识别时返回 `None`。
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().trim_end_matches('\0').to_ascii_lowercase();
        match normalized.as_str() {
            "shift_jis" | "shift-jis" | "sjis" | "cp932" => Some(TextEncoding::ShiftJis),
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextEncoding::ShiftJis => "shift_jis",
            TextEncoding::Utf8 => "utf-8",
        }
    }
}

/// 解码选项。未识别的字段被忽略，缺失字段取默认值。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub encoding: String,
    #[serde(alias = "strictMode")]
    pub strict_mode: bool,
    #[serde(alias = "ignoreErrors")]
    pub ignore_errors: bool,
    #[serde(alias = "coordinateSystem")]
    pub coordinate_system: Option<String>,
    #[serde(alias = "unitScale")]
    pub unit_scale: f64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::ShiftJis.as_str().to_string(),
            strict_mode: false,
            ignore_errors: false,
            coordinate_system: None,
            unit_scale: 1.0,
        }
    }
}

impl ImportOptions {
    /// 无法识别的编码名退回 Shift-JIS。
    pub fn text_encoding(&self) -> TextEncoding {
        TextEncoding::from_name(&self.encoding).unwrap_or(TextEncoding::ShiftJis)
    }

    /// 0、负数或非有限值都视为 1.0。
    pub fn effective_unit_scale(&self) -> f64 {
        if self.unit_scale.is_finite() && self.unit_scale > 0.0 {
            self.unit_scale
        } else {
            1.0
        }
    }
}

/// 编码选项。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub version: String,
    pub encoding: String,
    pub author: String,
    pub organization: String,
    #[serde(alias = "coordinateSystem")]
    pub coordinate_system: Option<String>,
    pub units: String,
    pub precision: usize,
    #[serde(alias = "fileName")]
    pub file_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            version: "3.1".to_string(),
            encoding: TextEncoding::ShiftJis.as_str().to_string(),
            author: String::new(),
            organization: String::new(),
            coordinate_system: None,
            units: "mm".to_string(),
            precision: 6,
            file_name: "drawing".to_string(),
        }
    }
}

impl ExportOptions {
    pub fn text_encoding(&self) -> TextEncoding {
        TextEncoding::from_name(&self.encoding).unwrap_or(TextEncoding::ShiftJis)
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }
}

use thiserror::Error;

use crate::options::ImportOptions;

/// 编解码过程中产生的单条诊断。是错误还是警告由所在列表决定。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecIssue {
    #[error("缺少段标记 `{marker}` 或其顺序错误")]
    MissingSection { marker: &'static str },
    #[error("不是有效的 SXF 文件（文件头魔数不匹配）")]
    InvalidMagic,
    #[error("SXF 文件头不完整：需要 {expected} 字节，实际只有 {actual} 字节")]
    TruncatedHeader { expected: usize, actual: usize },
    #[error("无法解析的实体语句：{statement}")]
    MalformedEntity { statement: String },
    #[error("实体 #{entity} 的第 {index} 个参数无效：{message}")]
    InvalidParameter {
        entity: u32,
        index: usize,
        message: String,
    },
    #[error("实体 #{entity} 的第 {index} 个参数存在未闭合的字符串")]
    UnterminatedString { entity: u32, index: usize },
    #[error("实体 #{0} 重复定义，以最后一次定义为准")]
    DuplicateEntity(u32),
    #[error("实体 #{entity} 的类型 {type_name} 暂不支持，已跳过")]
    UnsupportedEntity { entity: u32, type_name: String },
    #[error("实体 #{entity} 引用的 #{target} 不存在，坐标按原点处理")]
    UnresolvedReference { entity: u32, target: u32 },
    #[error("实体 #{entity} 解析 #{target} 时检测到循环或过深的引用")]
    ReferenceCycle { entity: u32, target: u32 },
    #[error("实体 #{entity} 期望 {expected}，实际为 {actual}")]
    TypeMismatch {
        entity: u32,
        expected: &'static str,
        actual: String,
    },
    #[error("元素 {element} 引用了未知图层 {layer}")]
    UnknownLayer { element: String, layer: String },
    #[error("图层 {0} 重复定义")]
    DuplicateLayer(String),
    #[error("偏移 {offset} 处的记录（标签 0x{tag:02X}）被截断，已丢弃")]
    TruncatedRecord { offset: usize, tag: u8 },
    #[error("偏移 {offset} 处的记录标签 0x{tag:02X} 未知，已按长度跳过")]
    UnknownRecord { offset: usize, tag: u8 },
    #[error("偏移 {offset} 处的记录声明长度 {declared}，实际读取 {consumed} 字节")]
    LengthMismatch {
        offset: usize,
        declared: u32,
        consumed: usize,
    },
    #[error("{context} 中有 {count} 个非 ASCII 字符被替换为 `?`")]
    CharacterReplaced { context: String, count: usize },
    #[error("{context} 超出 {width} 字节字段宽度，已截断")]
    FieldTruncated { context: String, width: usize },
    #[error("元素 {element} 含有非有限数值，已跳过")]
    NonFiniteValue { element: String },
    #[error("{context} 不是有效的 UTF-8，已按替换字符解码")]
    InvalidUtf8 { context: String },
    #[error("元素 {element} 的文本无法原样写出：{detail}")]
    UnrepresentableText { element: String, detail: String },
    #[error("写出元素 {element} 失败：{message}")]
    Write { element: String, message: String },
}

impl CodecIssue {
    /// 结构性失败：出现时不返回任何模型。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CodecIssue::MissingSection { .. }
                | CodecIssue::InvalidMagic
                | CodecIssue::TruncatedHeader { .. }
        )
    }
}

/// 一次调用收集到的全部诊断。`errors` 为空即视为成功。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub errors: Vec<CodecIssue>,
    pub warnings: Vec<CodecIssue>,
}

impl Diagnostics {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(CodecIssue::is_fatal)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// 严格模式把警告升级为错误；忽略错误模式把非致命错误降级为警告。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticPolicy {
    pub strict: bool,
    pub ignore_errors: bool,
}

impl DiagnosticPolicy {
    pub fn from_import(options: &ImportOptions) -> Self {
        Self {
            strict: options.strict_mode,
            ignore_errors: options.ignore_errors,
        }
    }
}

/// 单次调用内部使用的诊断收集器，随调用创建、随结果返回。
#[derive(Debug, Default)]
pub(crate) struct Collector {
    policy: DiagnosticPolicy,
    diagnostics: Diagnostics,
}

impl Collector {
    pub(crate) fn new(policy: DiagnosticPolicy) -> Self {
        Self {
            policy,
            diagnostics: Diagnostics::default(),
        }
    }

    pub(crate) fn error(&mut self, issue: CodecIssue) {
        if self.policy.ignore_errors && !issue.is_fatal() {
            self.diagnostics.warnings.push(issue);
        } else {
            self.diagnostics.errors.push(issue);
        }
    }

    pub(crate) fn warning(&mut self, issue: CodecIssue) {
        if self.policy.strict {
            self.diagnostics.errors.push(issue);
        } else {
            self.diagnostics.warnings.push(issue);
        }
    }

    pub(crate) fn error_count(&self) -> usize {
        self.diagnostics.errors.len()
    }

    pub(crate) fn warning_count(&self) -> usize {
        self.diagnostics.warnings.len()
    }

    pub(crate) fn finish(self) -> Diagnostics {
        self.diagnostics
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use sxcad_core::document::{DrawingModel, FileFormat};
use thiserror::Error;
use tracing::{debug, info, warn};

mod codec;
pub mod diagnostics;
pub mod options;
pub mod p21;
pub mod sxf;

pub use codec::{DecodeOutcome, DrawingCodec, EncodeOutcome};
pub use diagnostics::{CodecIssue, DiagnosticPolicy, Diagnostics};
pub use options::{ExportOptions, ImportOptions, TextEncoding};
pub use p21::P21Codec;
pub use sxf::SxfCodec;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported file format: {path:?}")]
    UnsupportedFormat { path: PathBuf },
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input file {path:?} is {size} bytes, limit is {limit}")]
    InputTooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("encoding {path:?} produced no output: {diagnostics:?}")]
    EncodeFailed {
        path: PathBuf,
        diagnostics: Diagnostics,
    },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path, options: &ImportOptions) -> Result<DecodeOutcome, IoError>;
}

pub trait DocumentSaver {
    fn save(
        &self,
        model: &DrawingModel,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<Diagnostics, IoError>;
}

/// 返回格式对应的编解码器。
pub fn codec_for(format: FileFormat) -> Box<dyn DrawingCodec> {
    match format {
        FileFormat::P21 => Box::new(P21Codec::new()),
        FileFormat::Sxf => Box::new(SxfCodec::new()),
    }
}

/// 按扩展名选择编解码器，负责编解码前后的文件读写。
#[derive(Debug, Default, Clone)]
pub struct DrawingFacade {
    max_input_bytes: Option<u64>,
}

impl DrawingFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// 限制读取的文件大小，超过时不进入解码。
    pub fn with_max_input_bytes(mut self, limit: u64) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }

    fn format_of(path: &Path) -> Result<FileFormat, IoError> {
        FileFormat::from_path(path).ok_or_else(|| IoError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}

impl DocumentLoader for DrawingFacade {
    fn load(&self, path: &Path, options: &ImportOptions) -> Result<DecodeOutcome, IoError> {
        let format = Self::format_of(path)?;
        let read_error = |source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        };
        if let Some(limit) = self.max_input_bytes {
            let size = fs::metadata(path).map_err(read_error)?.len();
            if size > limit {
                return Err(IoError::InputTooLarge {
                    path: path.to_path_buf(),
                    size,
                    limit,
                });
            }
        }
        let data = fs::read(path).map_err(read_error)?;
        debug!(path = %path.display(), format = format.as_str(), bytes = data.len(), "开始解码");

        let outcome = codec_for(format).decode(&data, options);
        if outcome.model.is_none() {
            warn!(path = %path.display(), errors = outcome.diagnostics.errors.len(), "解码失败");
        } else {
            info!(
                path = %path.display(),
                errors = outcome.diagnostics.errors.len(),
                warnings = outcome.diagnostics.warnings.len(),
                "已加载图面"
            );
        }
        Ok(outcome)
    }
}

impl DocumentSaver for DrawingFacade {
    fn save(
        &self,
        model: &DrawingModel,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<Diagnostics, IoError> {
        let format = Self::format_of(path)?;
        let outcome = codec_for(format).encode(model, options);
        let Some(output) = outcome.output else {
            return Err(IoError::EncodeFailed {
                path: path.to_path_buf(),
                diagnostics: outcome.diagnostics,
            });
        };
        fs::write(path, &output).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), bytes = output.len(), "已写出图面");
        Ok(outcome.diagnostics)
    }
}

/// 使用默认设置读取图面文件。致命的解码错误返回 `Ok`，此时模型为 `None`。
pub fn load_drawing(path: &Path, options: &ImportOptions) -> Result<DecodeOutcome, IoError> {
    DrawingFacade::new().load(path, options)
}

pub fn save_drawing(
    path: &Path,
    model: &DrawingModel,
    options: &ExportOptions,
) -> Result<Diagnostics, IoError> {
    DrawingFacade::new().save(model, path, options)
}

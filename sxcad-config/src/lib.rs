use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sxcad_io::{ExportOptions, ImportOptions, TextEncoding};
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "SXCAD_CONFIG";

/// 相对工作目录的默认配置文件位置。
const DEFAULT_RELATIVE_PATH: [&str; 2] = ["config", "default.toml"];

/// f64 可无损往返的最大小数位数。
const MAX_PRECISION: usize = 17;

/// `sxcad` 的全部配置。各段缺省时取内建默认值，未知键被忽略。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub import: ImportOptions,
    pub export: ExportOptions,
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// 读取并校验指定的 TOML 文件。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|(field, message)| ConfigError::Invalid {
            path: path.to_path_buf(),
            field,
            message,
        })?;
        Ok(config)
    }

    /// 依次尝试 `SXCAD_CONFIG` 与 `./config/default.toml`，都没有时返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }
        let cwd = env::current_dir().map_err(|source| ConfigError::Context {
            message: "获取当前工作目录失败".to_string(),
            source,
        })?;
        Self::discover_in(&cwd)
    }

    /// 只在给定目录下查找默认配置文件，不读取环境变量。
    pub fn discover_in(dir: &Path) -> Result<Self, ConfigError> {
        let candidate = DEFAULT_RELATIVE_PATH
            .iter()
            .fold(dir.to_path_buf(), |path, part| path.join(part));
        if candidate.is_file() {
            Self::from_file(candidate)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), (&'static str, String)> {
        for (field, name) in [
            ("import.encoding", &self.import.encoding),
            ("export.encoding", &self.export.encoding),
        ] {
            if TextEncoding::from_name(name).is_none() {
                return Err((field, format!("无法识别的编码 `{name}`")));
            }
        }
        let scale = self.import.unit_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(("import.unit_scale", format!("比例必须为正数，实际为 {scale}")));
        }
        if self.export.precision > MAX_PRECISION {
            return Err((
                "export.precision",
                format!("小数位数不能超过 {MAX_PRECISION}，实际为 {}", self.export.precision),
            ));
        }
        if self.limits.max_input_bytes == Some(0) {
            return Err(("limits.max_input_bytes", "上限不能为 0".to_string()));
        }
        Ok(())
    }
}

/// 日志等级，写法同 `RUST_LOG`。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// 读取前检查的文件大小上限，缺省不限制。
    pub max_input_bytes: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置文件 {path:?} 中 {field} 无效: {message}")]
    Invalid {
        path: PathBuf,
        field: &'static str,
        message: String,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn empty_directory_yields_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let cfg = AppConfig::discover_in(dir.path()).expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.import, ImportOptions::default());
        assert_eq!(cfg.export, ExportOptions::default());
        assert!(cfg.limits.max_input_bytes.is_none());
    }

    #[test]
    fn default_file_is_found_under_config_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir(dir.path().join("config")).expect("create config dir");
        fs::write(
            dir.path().join("config").join("default.toml"),
            "[export]\nauthor = \"Field Office\"\n",
        )
        .expect("write default config");

        let cfg = AppConfig::discover_in(dir.path()).expect("discover should succeed");
        assert_eq!(cfg.export.author, "Field Office");
        assert_eq!(cfg.export.precision, 6);
    }

    #[test]
    fn sections_map_onto_codec_options() {
        let file = write_config(
            r#"
            [logging]
            level = "sxcad_io=debug"

            [import]
            unitScale = 0.001
            strict_mode = true
            coordinate_system = "JGD2011 / Japan Plane Rectangular CS IX"

            [export]
            precision = 3
            author = "Survey Team"
            encoding = "utf-8"

            [limits]
            max_input_bytes = 1048576
            "#,
        );

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "sxcad_io=debug");
        assert_eq!(cfg.import.unit_scale, 0.001);
        assert!(cfg.import.strict_mode);
        assert!(!cfg.import.ignore_errors);
        assert_eq!(
            cfg.import.coordinate_system.as_deref(),
            Some("JGD2011 / Japan Plane Rectangular CS IX")
        );
        assert_eq!(cfg.export.text_encoding(), TextEncoding::Utf8);
        assert_eq!(cfg.export.precision, 3);
        assert_eq!(cfg.export.author, "Survey Team");
        assert_eq!(cfg.export.units, "mm");
        assert_eq!(cfg.limits.max_input_bytes, Some(1_048_576));
    }

    #[test]
    fn wrong_value_type_is_a_parse_error() {
        let file = write_config("[export]\nprecision = \"high\"\n");
        let err = AppConfig::from_file(file.path()).expect_err("type mismatch should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for (content, expected) in [
            ("[import]\nunit_scale = 0.0\n", "import.unit_scale"),
            ("[export]\nprecision = 40\n", "export.precision"),
            ("[import]\nencoding = \"latin1\"\n", "import.encoding"),
            ("[limits]\nmax_input_bytes = 0\n", "limits.max_input_bytes"),
        ] {
            let file = write_config(content);
            match AppConfig::from_file(file.path()) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

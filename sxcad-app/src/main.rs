use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use sxcad_config::{AppConfig, ConfigError};
use sxcad_core::document::DrawingModel;
use sxcad_io::{
    DecodeOutcome, Diagnostics, DocumentLoader, DocumentSaver, DrawingFacade, ImportOptions,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "sxcad", version, about = "SXF / P21 图面转换工具")]
struct Cli {
    /// 配置文件路径，缺省时读取 SXCAD_CONFIG 或 ./config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 警告一律视为错误
    #[arg(long, global = true, conflicts_with = "ignore_errors")]
    strict: bool,

    /// 非致命错误降级为警告
    #[arg(long, global = true)]
    ignore_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 读取图面并输出概要与诊断
    Inspect {
        /// 输入文件（.p21/.stp/.step/.sxf/.sxb）
        file: PathBuf,

        /// 以 JSON 输出完整模型
        #[arg(long)]
        json: bool,
    },

    /// 在 P21 与 SXF 之间转换，输出格式由扩展名决定
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// 覆盖配置中的小数位数
        #[arg(long)]
        precision: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone());
    init_logging(&config);
    info!("启动 sxcad");

    let mut import = config.import.clone();
    if cli.strict {
        import.strict_mode = true;
    }
    if cli.ignore_errors {
        import.ignore_errors = true;
    }
    let facade = match config.limits.max_input_bytes {
        Some(limit) => DrawingFacade::new().with_max_input_bytes(limit),
        None => DrawingFacade::new(),
    };

    match cli.command {
        Commands::Inspect { file, json } => {
            let outcome = facade.load(&file, &import)?;
            if json {
                print_json(&outcome)?;
            } else {
                print_summary(&file, &outcome);
            }
            if outcome.model.is_none() {
                bail!("无法解码 {}", file.display());
            }
        }
        Commands::Convert {
            input,
            output,
            precision,
        } => {
            let model = load_model(&facade, &input, &import)?;
            let mut export = config.export.clone();
            if let Some(precision) = precision {
                export = export.with_precision(precision);
            }
            let diagnostics = facade
                .save(&model, &output, &export)
                .with_context(|| format!("写出 {} 失败", output.display()))?;
            report("写出", &diagnostics);
            println!(
                "{} -> {}：{} 个图层，{} 个元素",
                input.display(),
                output.display(),
                model.layers.len(),
                model.elements.len()
            );
        }
    }

    Ok(())
}

fn load_model(facade: &DrawingFacade, path: &Path, options: &ImportOptions) -> Result<DrawingModel> {
    let outcome = facade.load(path, options)?;
    report("读取", &outcome.diagnostics);
    match outcome.model {
        Some(model) => Ok(model),
        None => bail!("无法解码 {}", path.display()),
    }
}

fn report(stage: &str, diagnostics: &Diagnostics) {
    for issue in &diagnostics.errors {
        eprintln!("{stage}错误: {issue}");
    }
    for issue in &diagnostics.warnings {
        eprintln!("{stage}警告: {issue}");
    }
}

fn print_summary(path: &Path, outcome: &DecodeOutcome) {
    println!("文件: {}", path.display());
    if let Some(model) = &outcome.model {
        println!("格式: {}", model.header.format.as_str());
        println!("版本: {}", model.header.version);
        println!("单位: {}", model.header.units);
        println!("图层: {}", model.layers.len());
        println!("元素: {}", model.elements.len());
        for (kind, count) in model.element_count_by_kind() {
            println!("  {kind}: {count}");
        }
    }
    println!("错误: {}", outcome.diagnostics.errors.len());
    for issue in &outcome.diagnostics.errors {
        println!("  {issue}");
    }
    println!("警告: {}", outcome.diagnostics.warnings.len());
    for issue in &outcome.diagnostics.warnings {
        println!("  {issue}");
    }
}

fn print_json(outcome: &DecodeOutcome) -> Result<()> {
    let messages = |issues: &[sxcad_io::CodecIssue]| -> Vec<String> {
        issues.iter().map(ToString::to_string).collect()
    };
    let value = json!({
        "model": outcome.model,
        "errors": messages(&outcome.diagnostics.errors),
        "warnings": messages(&outcome.diagnostics.warnings),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. }
                    | ConfigError::Parse { path, .. }
                    | ConfigError::Invalid { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

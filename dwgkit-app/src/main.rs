use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use dwgkit_config::{AppConfig, ConfigError};
use dwgkit_engine::{SessionCache, TypeSelection};
use dwgkit_source::MemorySource;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

mod report;

use report::DocumentReport;

#[derive(Parser)]
#[command(name = "dwgkit", version, about = "检查 DWG 记录转储重建出的实体图")]
struct Cli {
    /// 配置文件路径；缺省时依次查找 DWGKIT_CONFIG 与 config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 统计各类型实体数量，列出无所属成员与低置信度/未解析的 ACIS 引用
    Inspect(InspectArgs),
}

#[derive(Args)]
struct InspectArgs {
    /// JSON 记录转储，或包含转储文件的目录
    path: PathBuf,

    /// 逗号或空白分隔的类型名，支持 `*` 与通配符
    #[arg(long)]
    types: Option<String>,

    /// 以 JSON 输出报告
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_configuration(cli.config);
    init_logging(&config);

    let result = match cli.command {
        Command::Inspect(args) => inspect(&args, config),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            error!(error = %format!("{err:#}"), "检查失败");
            eprintln!("错误：{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// 返回所有文档是否都没有整类读取失败。
fn inspect(args: &InspectArgs, config: AppConfig) -> Result<bool> {
    let selection = match &args.types {
        Some(types) => TypeSelection::parse(types).context("无效的类型列表")?,
        None => TypeSelection::defaults(),
    };
    let dumps = collect_dumps(&args.path)?;
    if dumps.is_empty() {
        bail!("{} 下没有找到记录转储", args.path.display());
    }
    info!(count = dumps.len(), "开始检查记录转储");

    let mut cache = SessionCache::new(config);
    let mut reports: Vec<DocumentReport> = Vec::with_capacity(dumps.len());
    for dump in &dumps {
        let source = load_dump(dump)?;
        let session = cache.open(source);
        reports.push(report::inspect(dump, &session, &selection));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &reports).context("输出 JSON 报告失败")?;
        writeln!(out)?;
    } else {
        report::write_text(&mut out, &reports).context("输出报告失败")?;
    }
    Ok(reports.iter().all(DocumentReport::is_clean))
}

fn collect_dumps(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("路径不存在：{}", path.display());
    }

    let mut dumps = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("遍历目录 {} 失败", path.display()))?;
        let is_json = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            dumps.push(entry.into_path());
        }
    }
    Ok(dumps)
}

fn load_dump(path: &Path) -> Result<MemorySource> {
    let text =
        fs::read_to_string(path).with_context(|| format!("读取记录转储 {} 失败", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析记录转储 {} 失败", path.display()))
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
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
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
    let subscriber = fmt().with_env_filter(filter).with_writer(io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

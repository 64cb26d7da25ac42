use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub heuristics: HeuristicsConfig,
    #[serde(default)]
    pub acis: AcisConfig,
    #[serde(default)]
    pub curve: CurveConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `DWGKIT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("DWGKIT_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 针对特定生产软件导出缺陷的颜色补偿开关。
#[derive(Debug, Clone, Deserialize)]
pub struct HeuristicsConfig {
    #[serde(default = "HeuristicsConfig::default_enabled")]
    pub layer_color_override: bool,
    /// 允许图层颜色重映射的文件版本。
    #[serde(default = "HeuristicsConfig::default_override_versions")]
    pub override_versions: Vec<String>,
    #[serde(default = "HeuristicsConfig::default_enabled")]
    pub supplementary_colors: bool,
}

impl HeuristicsConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_override_versions() -> Vec<String> {
        vec![
            "AC1024".to_string(),
            "AC1027".to_string(),
            "AC1032".to_string(),
        ]
    }
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            layer_color_override: true,
            override_versions: Self::default_override_versions(),
            supplementary_colors: true,
        }
    }
}

/// ACIS 伴随记录的字节扫描参数。
#[derive(Debug, Clone, Deserialize)]
pub struct AcisConfig {
    #[serde(default = "AcisConfig::default_scan_window")]
    pub scan_window: usize,
    /// 小于该值的整数不视为句柄，避免计数器之类的误报。
    #[serde(default = "AcisConfig::default_min_handle")]
    pub min_handle: u64,
    #[serde(default = "AcisConfig::default_max_scanned_refs")]
    pub max_scanned_refs: usize,
    #[serde(default = "AcisConfig::default_preview_min_run")]
    pub preview_min_run: usize,
    #[serde(default = "AcisConfig::default_preview_max_len")]
    pub preview_max_len: usize,
}

impl AcisConfig {
    fn default_scan_window() -> usize {
        512
    }

    fn default_min_handle() -> u64 {
        64
    }

    fn default_max_scanned_refs() -> usize {
        8
    }

    fn default_preview_min_run() -> usize {
        6
    }

    fn default_preview_max_len() -> usize {
        96
    }
}

impl Default for AcisConfig {
    fn default() -> Self {
        Self {
            scan_window: Self::default_scan_window(),
            min_handle: Self::default_min_handle(),
            max_scanned_refs: Self::default_max_scanned_refs(),
            preview_min_run: Self::default_preview_min_run(),
            preview_max_len: Self::default_preview_max_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurveConfig {
    /// 向记录源请求插值采样时每段的细分数。
    #[serde(default = "CurveConfig::default_segments")]
    pub interpolation_segments: usize,
}

impl CurveConfig {
    fn default_segments() -> usize {
        8
    }
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            interpolation_segments: Self::default_segments(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 同时保留的文档会话数量上限。
    #[serde(default = "CacheConfig::default_capacity")]
    pub capacity: usize,
}

impl CacheConfig {
    fn default_capacity() -> usize {
        16
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
        }
    }
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

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.heuristics.layer_color_override);
        assert!(cfg.heuristics.supplementary_colors);
        assert_eq!(cfg.heuristics.override_versions, ["AC1024", "AC1027", "AC1032"]);
        assert_eq!(cfg.acis.scan_window, 512);
        assert_eq!(cfg.acis.min_handle, 64);
        assert_eq!(cfg.acis.max_scanned_refs, 8);
        assert_eq!(cfg.acis.preview_min_run, 6);
        assert_eq!(cfg.acis.preview_max_len, 96);
        assert_eq!(cfg.curve.interpolation_segments, 8);
        assert_eq!(cfg.cache.capacity, 16);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [heuristics]
            layer_color_override = false
            override_versions = ["AC1032"]

            [acis]
            scan_window = 256
            max_scanned_refs = 4

            [cache]
            capacity = 2
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert!(!cfg.heuristics.layer_color_override);
        assert!(cfg.heuristics.supplementary_colors);
        assert_eq!(cfg.heuristics.override_versions, ["AC1032"]);
        assert_eq!(cfg.acis.scan_window, 256);
        assert_eq!(cfg.acis.max_scanned_refs, 4);
        assert_eq!(cfg.acis.min_handle, 64);
        assert_eq!(cfg.curve.interpolation_segments, 8);
        assert_eq!(cfg.cache.capacity, 2);
    }

    #[test]
    fn parse_error_carries_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[acis]\nscan_window = \"wide\"").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

//! kit-config - 配置加载库
//!
//! 基于 figment 的分层配置：serde 字段默认值 < TOML 文件 < 环境变量 < 显式覆盖。
//! 覆盖项是 CLI flag 的绑定点，永远最后合并。

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::Value,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 配置加载器
///
/// 按应用名推导默认查找路径与环境变量前缀：
/// - 文件：`/etc/<name>/<name>.toml`、`$HOME/.config/<name>.toml`（可用 `with_file` 覆盖）
/// - 环境变量：`NAME_` 前缀，连字符会被去掉（"new-project" 对应 `NEWPROJECT_`）
///
/// 环境变量按已注册的 section 路径映射到字段：section 前缀后的下划线是
/// 路径分隔符，其余下划线原样保留。`KIT_SERVER_PORT` 对应 `server.port`，
/// `KIT_TELEMETRY_LOG_LEVEL` 对应 `telemetry.log_level`，顶层的
/// `KIT_APP_NAME` 对应 `app_name`。嵌套 section 必须先用 `with_section`
/// 注册，否则对应的环境变量不会生效。
///
/// # 示例
///
/// ```ignore
/// let config: AppConfig = Loader::new("kit")
///     .with_section("server")
///     .override_with("server.port", 9000)
///     .load()?;
/// ```
pub struct Loader {
    name: String,
    file: Option<PathBuf>,
    sections: Vec<String>,
    overrides: Vec<(String, Value)>,
}

impl Loader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            sections: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// 指定配置文件绝对路径，跳过默认查找
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// 注册一个嵌套 section 的字段路径（如 `"server"`、`"database.pool"`），
    /// 环境变量按这些路径切分，其余下划线保留在字段名里
    pub fn with_section(mut self, path: impl Into<String>) -> Self {
        self.sections.push(path.into());
        self
    }

    /// 追加一个最高优先级的覆盖项（用于绑定 CLI flag）
    ///
    /// 后写的覆盖同一 key 时以最后一次为准
    pub fn override_with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    fn env_prefix(&self) -> String {
        let mut prefix: String = self
            .name
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_uppercase();
        prefix.push('_');
        prefix
    }

    /// 合并所有配置源并反序列化
    pub fn load<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let mut figment = Figment::new();
        match &self.file {
            Some(file) => {
                figment = figment.merge(Toml::file(file));
            }
            None => {
                figment = figment.merge(Toml::file(format!(
                    "/etc/{name}/{name}.toml",
                    name = self.name
                )));
                if let Ok(home) = std::env::var("HOME") {
                    figment =
                        figment.merge(Toml::file(format!("{home}/.config/{}.toml", self.name)));
                }
            }
        }
        figment = figment.merge(self.env_provider());
        for (key, value) in &self.overrides {
            figment = figment.merge(Serialized::global(key, value.clone()));
        }
        Ok(figment.extract()?)
    }

    /// 环境变量 provider：变量名对着已注册的 section 路径还原成字段路径。
    /// 盲目按下划线切分会把 `APP_NAME` 拆成 `app.name`，带下划线的字段名
    /// 就永远绑不上，所以只在 section 边界处切分。
    fn env_provider(&self) -> Env {
        let mut sections: Vec<(String, String)> = self
            .sections
            .iter()
            .map(|path| (path.replace('.', "_"), path.clone()))
            .collect();
        // 长前缀优先，registered "database.pool" 不会被 "database" 抢走
        sections.sort_by_key(|(flat, _)| std::cmp::Reverse(flat.len()));
        Env::prefixed(&self.env_prefix())
            .map(move |key| {
                let key = key.as_str().to_lowercase();
                for (flat, path) in &sections {
                    if let Some(field) = key.strip_prefix(&format!("{flat}_")) {
                        return format!("{path}.{field}").into();
                    }
                }
                key.into()
            })
            .split(".")
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

fn default_app_name() -> String {
    "kit".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 用默认查找规则加载应用配置
    pub fn load(name: &str) -> Result<Self, ConfigError> {
        Self::loader(name).load()
    }

    /// 已注册好内置 section 的加载器，便于调用方继续叠加文件或覆盖项
    pub fn loader(name: &str) -> Loader {
        Loader::new(name)
            .with_section("server")
            .with_section("telemetry")
            .with_section("database")
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests;

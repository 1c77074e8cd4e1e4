//! brewops-config - 配置加载库

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// 启动时自动执行迁移
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    /// 启动时连接数据库的最多尝试次数
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// 首次重连前的等待（毫秒），之后逐次翻倍
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// 从连接池取连接的超时（秒）
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// 写事务等待罐行锁的上限（毫秒），0 表示不限
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

fn default_min_connections() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_backoff_ms() -> u64 {
    1000
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// 混合规则配置
///
/// 所有启用的规则同时满足才允许混合。
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BlendingRulesConfig {
    #[serde(default = "default_true")]
    pub require_recipe_match: bool,
    #[serde(default = "default_true")]
    pub require_yeast_match: bool,
    #[serde(default = "default_true")]
    pub require_phase_match: bool,
    #[serde(default)]
    pub require_style_match: bool,
    #[serde(default)]
    pub max_age_difference_days: Option<i64>,
}

impl Default for BlendingRulesConfig {
    fn default() -> Self {
        Self {
            require_recipe_match: true,
            require_yeast_match: true,
            require_phase_match: true,
            require_style_match: false,
            max_age_difference_days: None,
        }
    }
}

/// 排罐策略配置
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlanningConfig {
    /// 体积守恒容差（升）
    #[serde(default = "default_volume_tolerance")]
    pub volume_tolerance: f64,
    /// 未指定结束时间时的默认占用天数
    #[serde(default = "default_window_days")]
    pub default_window_days: i64,
    #[serde(default)]
    pub blending: BlendingRulesConfig,
}

fn default_volume_tolerance() -> f64 {
    0.5
}

fn default_window_days() -> i64 {
    14
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            volume_tolerance: default_volume_tolerance(),
            default_window_days: default_window_days(),
            blending: BlendingRulesConfig::default(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.planning.volume_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "planning.volume_tolerance must be a non-negative number, got {}",
                tolerance
            )));
        }
        if self.database.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "database.connect_attempts must be at least 1".to_string(),
            ));
        }
        if self.planning.default_window_days <= 0 {
            return Err(ConfigError::Invalid(
                "planning.default_window_days must be positive".to_string(),
            ));
        }
        if self
            .planning
            .blending
            .max_age_difference_days
            .is_some_and(|days| days < 0)
        {
            return Err(ConfigError::Invalid(
                "planning.blending.max_age_difference_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

//! 启动期重连
//!
//! 数据库往往比服务晚就绪，建池失败时按翻倍间隔重试。业务命令不在这里重试。

use std::future::Future;
use std::time::Duration;

use brewops_config::DatabaseConfig;
use tracing::{info, warn};

/// 两次尝试之间的最长等待
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 重连节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupBackoff {
    pub attempts: u32,
    pub first_delay: Duration,
}

impl StartupBackoff {
    pub fn from_database(config: &DatabaseConfig) -> Self {
        Self {
            attempts: config.connect_attempts.max(1),
            first_delay: Duration::from_millis(config.connect_backoff_ms),
        }
    }

    /// 第 `failed` 次失败后的等待时间
    fn delay_after(&self, failed: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed.saturating_sub(1));
        self.first_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// 反复执行 `connect` 直到成功或用完次数，返回最后一次的错误
pub async fn retry_startup<F, Fut, T, E>(
    backoff: StartupBackoff,
    dependency: &str,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = backoff.attempts.max(1);
    let mut failed = 0;

    loop {
        let error = match connect().await {
            Ok(value) => {
                if failed > 0 {
                    info!(dependency, attempt = failed + 1, "Dependency reachable");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        failed += 1;
        if failed >= attempts {
            warn!(dependency, attempts, error = %error, "Giving up on dependency");
            return Err(error);
        }

        let delay = backoff.delay_after(failed);
        warn!(
            dependency,
            attempt = failed,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Dependency not ready"
        );
        tokio::time::sleep(delay).await;
    }
}

//! 有界重试
//!
//! 登录和视频播放共用同一个重试原语：失败先分类，致命错误立即终止，
//! 瞬时错误在尝试预算内按退避函数延迟后重试。

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// 已分类的失败
#[derive(Debug)]
pub enum RetryError {
    /// 致命错误，立即终止，不消耗剩余尝试次数
    Fatal(anyhow::Error),
    /// 瞬时错误，在预算内重试
    Transient(anyhow::Error),
}

impl RetryError {
    pub fn into_inner(self) -> anyhow::Error {
        match self {
            RetryError::Fatal(e) | RetryError::Transient(e) => e,
        }
    }
}

/// 指数退避延迟函数: `base * 2^(attempt-1) + jitter(0..2s)`，attempt 从 1 开始
pub fn exponential_backoff(base: Duration) -> impl Fn(usize) -> Duration {
    move |attempt| {
        let factor = 1u32 << (attempt.saturating_sub(1).min(16) as u32);
        let jitter = rand::thread_rng().gen_range(0.0..2.0);
        base * factor + Duration::from_secs_f64(jitter)
    }
}

/// 执行 `op` 至多 `budget` 次，每次执行前按 `delay_for(attempt)` 等待
///
/// # 参数
/// - `budget`: 尝试预算（含第一次）
/// - `delay_for`: 由尝试序号（从 1 开始）计算本次执行前的延迟
/// - `op`: 单次尝试，失败时返回已分类的 [`RetryError`]
pub async fn retry_bounded<T, F, Fut>(
    budget: usize,
    delay_for: impl Fn(usize) -> Duration,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    debug_assert!(budget > 0);
    let mut last_err = None;

    for attempt in 1..=budget {
        let delay = delay_for(attempt);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(RetryError::Fatal(e)) => return Err(e),
            Err(RetryError::Transient(e)) => {
                if attempt < budget {
                    warn!("第 {}/{} 次尝试失败: {}", attempt, budget, e);
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("重试预算为 0"))
        .context(format!("达到最大尝试次数 ({})", budget)))
}

//! 随机延迟
//!
//! 所有账号间、内容间的等待都走这里，避免向平台发出整齐划一的请求节奏。

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// 睡眠 `min_s` 到 `min_s + spread_s` 秒之间的随机时长
pub async fn random_delay(min_s: f64, spread_s: f64) {
    let extra: f64 = rand::thread_rng().gen_range(0.0..=spread_s.max(f64::MIN_POSITIVE));
    sleep(Duration::from_secs_f64(min_s + extra)).await;
}

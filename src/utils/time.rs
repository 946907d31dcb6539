//! 播放器时间字符串处理
//!
//! 播放器控制条上的时间有 `秒`、`分:秒`、`时:分:秒` 三种形式，
//! 偶尔还会出现全角冒号。

use crate::error::AppError;
use anyhow::Result;

/// 将时间字符串转换为秒数
///
/// 支持 `XX`、`XX:XX`、`XX:XX:XX` 三种格式，超过三段视为格式错误。
pub fn time_str_to_seconds(time_str: &str) -> Result<u64> {
    let normalized = time_str.replace('：', ":");
    let normalized = normalized.trim();

    let parts: Vec<&str> = normalized.split(':').collect();

    let parse = |s: &str| -> Result<u64> {
        s.trim()
            .parse::<u64>()
            .map_err(|_| AppError::time_format(time_str).into())
    };

    match parts.as_slice() {
        [secs] => parse(secs),
        [mins, secs] => Ok(parse(mins)? * 60 + parse(secs)?),
        [hours, mins, secs] => Ok(parse(hours)? * 3600 + parse(mins)? * 60 + parse(secs)?),
        _ => Err(AppError::time_format(time_str).into()),
    }
}

/// 将秒数转换为时间字符串（`MM:SS` 或 `HH:MM:SS`）
pub fn seconds_to_time_str(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

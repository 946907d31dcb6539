//! 视频播放监控
//!
//! 视频播放器位于 `#mainCont` iframe 内嵌的 `#mainFrame` iframe 中。
//! 监控循环每 5 秒检查一次：完成信号或完成角标出现即结束；
//! 连续多次检查播放位置无前进判定为卡住，先点播放按钮恢复，
//! 无效再刷新页面重走"关弹层 → 点目录 → 点播放"。
//! 单条视频整体失败时外层有刷新重试预算，超出预算的错误由
//! 调用方记录后跳过该内容项。

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::infrastructure::{JsExecutor, VideoEndSignal};
use crate::models::NodePath;
use crate::services::traversal::{dismiss_help_overlay, CourseDom};
use crate::utils::{random_delay, retry_bounded, seconds_to_time_str, time_str_to_seconds, RetryError};

/// 启动播放的点击尝试上限
pub const ENSURE_MAX_TRY: usize = 4;
/// 卡住后点击播放按钮的恢复尝试上限
pub const RECOVER_MAX_TRY: usize = 3;
/// 单条视频的整体重试预算（含第一次）
pub const VIDEO_MAX_RETRY: usize = 3;
/// 播放状态检查间隔（秒）
pub const CHECK_FREQ_S: u64 = 5;
/// 进度日志间隔（秒）
pub const REPORT_FREQ_S: u64 = 600;
/// 连续多少次检查无进度判定为卡住
pub const MAX_STUCK_CHECKS: u32 = 3;

/// 定位到播放器文档的 JS 前置段
const VDOC_PRELUDE: &str = r#"
    const cont = document.querySelector('#mainCont');
    const cdoc = cont && cont.contentDocument;
    const frame = cdoc && cdoc.querySelector('#mainFrame');
    const vdoc = frame && frame.contentDocument;
"#;

/// 播放按钮存在性表达式（供轮询等待）
const PLAY_BUTTON_READY_EXPR: &str = "document.querySelector('#mainCont') \
    && document.querySelector('#mainCont').contentDocument \
    && document.querySelector('#mainCont').contentDocument.querySelector('#mainFrame') \
    && document.querySelector('#mainCont').contentDocument.querySelector('#mainFrame').contentDocument \
    && document.querySelector('#mainCont').contentDocument.querySelector('#mainFrame').contentDocument.querySelector('#container_display_button')";

const ELAPSED_SELECTOR: &str = "#container_controlbar_elapsed";
const DURATION_SELECTOR: &str = "#container_controlbar_duration";

/// 可能为 null 的 JS 返回值统一包一层对象，避免顶层 null 无法反序列化
#[derive(Debug, Deserialize)]
struct JsOpt {
    v: Option<String>,
}

/// 卡顿检测器
///
/// 每个检查周期喂一次播放位置，位置前进就清零计数；
/// 连续达到阈值次数无前进时报告卡住并复位，等待下一轮累计。
#[derive(Debug)]
pub struct StallDetector {
    max_stuck_checks: u32,
    last_position: Option<u64>,
    stuck_checks: u32,
}

impl StallDetector {
    pub fn new(max_stuck_checks: u32) -> Self {
        Self {
            max_stuck_checks,
            last_position: None,
            stuck_checks: 0,
        }
    }

    /// 观察一次播放位置，判定为卡住时返回 true
    ///
    /// 位置只要发生变化（包括回退）就清零计数，只有原地不动才累计。
    pub fn observe(&mut self, position: u64) -> bool {
        match self.last_position {
            Some(last) if position == last => self.stuck_checks += 1,
            _ => self.stuck_checks = 0,
        }
        self.last_position = Some(position);

        if self.stuck_checks >= self.max_stuck_checks {
            self.stuck_checks = 0;
            true
        } else {
            false
        }
    }
}

/// 视频播放器
pub struct VideoPlayer<'a> {
    js: &'a JsExecutor,
    signal: &'a VideoEndSignal,
    tag: &'a str,
}

impl<'a> VideoPlayer<'a> {
    pub fn new(js: &'a JsExecutor, signal: &'a VideoEndSignal, tag: &'a str) -> Self {
        Self { js, signal, tag }
    }

    /// 播放一条视频内容，带刷新重试预算
    pub async fn play_with_retry(&self, node: &NodePath) -> Result<()> {
        let node = *node;
        retry_bounded(VIDEO_MAX_RETRY, |_| Duration::ZERO, |attempt| async move {
            if attempt > 1 {
                info!(
                    "{} 刷新页面重新开始本条视频 ({}/{})",
                    self.tag, attempt, VIDEO_MAX_RETRY
                );
                self.reacquire(&node).await.map_err(RetryError::Transient)?;
            }
            self.play_once(&node).await.map_err(RetryError::Transient)
        })
        .await
    }

    /// 单次完整播放流程：静音、启动、读时长、监控到结束
    async fn play_once(&self, node: &NodePath) -> Result<()> {
        self.signal.reset();
        self.mute().await;
        random_delay(1.0, 2.0).await;

        self.ensure_playing().await?;

        let total_s = self.read_duration().await?;
        if total_s > 0 {
            info!("{} 视频时长 {}", self.tag, seconds_to_time_str(total_s));
        } else {
            warn!("{} 未读到视频时长，仅依赖完成信号判断结束", self.tag);
        }

        self.monitor(total_s, node).await
    }

    /// 确认视频进入播放状态
    ///
    /// 点击尝试用尽时不报错，交给监控循环的卡顿检测兜底。
    async fn ensure_playing(&self) -> Result<()> {
        let appeared = self
            .js
            .wait_for_truthy(PLAY_BUTTON_READY_EXPR, "播放按钮", Duration::from_secs(15))
            .await?;
        if !appeared {
            warn!("{} 未等到播放按钮，继续尝试启动", self.tag);
        }

        for attempt in 1..=ENSURE_MAX_TRY {
            if self.playing_count().await.unwrap_or(0) > 0 {
                info!("{} 视频已在播放", self.tag);
                return Ok(());
            }
            info!("{} 尝试启动视频播放 ({}/{})", self.tag, attempt, ENSURE_MAX_TRY);
            if let Err(e) = self.click_play().await {
                debug!("{} 点击播放按钮失败: {}", self.tag, e);
            }
            random_delay(1.0, 2.0).await;
        }
        warn!("{} 达到启动尝试上限，按已播放继续监控", self.tag);
        Ok(())
    }

    /// 监控循环，直到完成信号 / 完成角标出现
    async fn monitor(&self, total_s: u64, node: &NodePath) -> Result<()> {
        let dom = CourseDom::new(self.js);
        let mut detector = StallDetector::new(MAX_STUCK_CHECKS);
        let start = Instant::now();
        let mut last_report = Duration::ZERO;

        loop {
            if self.signal.is_set() {
                info!("{} 捕获完成信号，本条视频已学完", self.tag);
                return Ok(());
            }
            if dom.completion_badge_count(node).await.unwrap_or(0) > 0 {
                info!("{} 检测到完成角标，本条视频已学完", self.tag);
                return Ok(());
            }

            match self.control_text(ELAPSED_SELECTOR).await {
                Ok(Some(text)) if !text.is_empty() => {
                    let position = time_str_to_seconds(&text)?;
                    if detector.observe(position) {
                        warn!(
                            "{} 连续 {} 次检查无进度，进入恢复流程",
                            self.tag, MAX_STUCK_CHECKS
                        );
                        self.try_recover(node).await?;
                    }

                    let elapsed = start.elapsed();
                    if elapsed - last_report >= Duration::from_secs(REPORT_FREQ_S) {
                        let percent = if total_s > 0 { position * 100 / total_s } else { 0 };
                        info!(
                            "{} 播放进度 {} / {} ({}%)",
                            self.tag,
                            seconds_to_time_str(position),
                            seconds_to_time_str(total_s),
                            percent
                        );
                        last_report = elapsed;
                    }
                }
                Ok(_) => warn!("{} 未读到播放进度", self.tag),
                Err(e) => warn!("{} 读取播放进度失败: {}", self.tag, e),
            }

            sleep(Duration::from_secs(CHECK_FREQ_S)).await;
        }
    }

    /// 卡住恢复：先点播放按钮，无效再刷新页面重走进入流程
    async fn try_recover(&self, node: &NodePath) -> Result<()> {
        for attempt in 1..=RECOVER_MAX_TRY {
            info!("{} 点击播放按钮恢复 ({}/{})", self.tag, attempt, RECOVER_MAX_TRY);
            if let Err(e) = self.click_play().await {
                debug!("{} 点击播放按钮失败: {}", self.tag, e);
            }
            sleep(Duration::from_millis(500)).await;
            if self.playing_count().await.unwrap_or(0) > 0 {
                info!("{} 播放已恢复", self.tag);
                return Ok(());
            }
        }

        info!("{} 点击播放按钮无效，刷新页面恢复", self.tag);
        self.reacquire(node).await?;
        self.click_play().await?;
        random_delay(1.0, 2.0).await;
        if self.playing_count().await.unwrap_or(0) > 0 {
            info!("{} 刷新后播放已恢复", self.tag);
            Ok(())
        } else {
            Err(anyhow!("视频播放恢复失败"))
        }
    }

    /// 刷新课程页并重新进入当前内容项
    async fn reacquire(&self, node: &NodePath) -> Result<()> {
        self.js.page().reload().await?;
        sleep(Duration::from_secs(5)).await;
        dismiss_help_overlay(self.js).await?;
        let dom = CourseDom::new(self.js);
        dom.wait_ready(Duration::from_secs(30)).await?;
        dom.click(&node.indices()).await?;
        sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    /// 读取视频总时长，播放器初始化前可能为空，轮询数次
    async fn read_duration(&self) -> Result<u64> {
        for _ in 0..5 {
            if let Some(text) = self.control_text(DURATION_SELECTOR).await? {
                if !text.is_empty() {
                    if let Ok(secs) = time_str_to_seconds(&text) {
                        if secs > 0 {
                            return Ok(secs);
                        }
                    }
                }
            }
            sleep(Duration::from_secs(1)).await;
        }
        Ok(0)
    }

    /// 正在播放的播放器控件数量（大于 0 表示播放中）
    async fn playing_count(&self) -> Result<usize> {
        let count: i64 = self
            .js
            .eval_as(format!(
                "(() => {{ {VDOC_PRELUDE} try {{ \
                 return vdoc ? vdoc.querySelectorAll('.jwtoggle').length : 0; }} \
                 catch (e) {{ return 0; }} }})()"
            ))
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn click_play(&self) -> Result<()> {
        let clicked: bool = self
            .js
            .eval_as(format!(
                "(() => {{ {VDOC_PRELUDE} try {{ \
                 const btn = vdoc && vdoc.querySelector('#container_display_button'); \
                 if (!btn) return false; btn.click(); return true; }} \
                 catch (e) {{ return false; }} }})()"
            ))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(anyhow!("播放按钮不存在"))
        }
    }

    /// 静音（失败不影响播放流程）
    async fn mute(&self) {
        let result: Result<bool> = self
            .js
            .eval_as(format!(
                "(() => {{ {VDOC_PRELUDE} try {{ \
                 const btn = vdoc && vdoc.querySelector('span.jwmute'); \
                 if (!btn || btn.classList.contains('jwtoggle')) return false; \
                 btn.click(); return true; }} \
                 catch (e) {{ return false; }} }})()"
            ))
            .await;
        match result {
            Ok(true) => debug!("{} 已静音", self.tag),
            Ok(false) => debug!("{} 未找到静音按钮", self.tag),
            Err(e) => debug!("{} 静音失败: {}", self.tag, e),
        }
    }

    /// 读取播放器控制栏文本
    async fn control_text(&self, selector: &str) -> Result<Option<String>> {
        let result: JsOpt = self
            .js
            .eval_as(format!(
                "(() => {{ {VDOC_PRELUDE} try {{ \
                 const el = vdoc && vdoc.querySelector({selector:?}); \
                 return {{ v: el ? (el.textContent || '').trim() : null }}; }} \
                 catch (e) {{ return {{ v: null }}; }} }})()"
            ))
            .await?;
        Ok(result.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_detector_triggers_after_consecutive_stuck_checks() {
        let mut detector = StallDetector::new(3);
        assert!(!detector.observe(10)); // 第一次观察只建立基线
        assert!(!detector.observe(10));
        assert!(!detector.observe(10));
        assert!(detector.observe(10)); // 连续 3 次无前进
    }

    #[test]
    fn test_stall_detector_progress_resets_counter() {
        let mut detector = StallDetector::new(3);
        detector.observe(10);
        detector.observe(10);
        detector.observe(10);
        assert!(!detector.observe(11)); // 前进一次即清零
        assert!(!detector.observe(11));
        assert!(!detector.observe(11));
        assert!(detector.observe(11));
    }

    #[test]
    fn test_stall_detector_any_change_resets() {
        let mut detector = StallDetector::new(2);
        detector.observe(30);
        detector.observe(30);
        assert!(!detector.observe(20)); // 回退也视为变化，清零计数
        assert!(!detector.observe(20));
        assert!(detector.observe(20));
    }

    #[test]
    fn test_stall_detector_resets_after_trigger() {
        let mut detector = StallDetector::new(2);
        detector.observe(5);
        detector.observe(5);
        assert!(detector.observe(5));
        // 触发后重新累计，不会每个周期都触发
        assert!(!detector.observe(5));
    }
}

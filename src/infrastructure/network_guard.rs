//! 请求拦截 - 基础设施层
//!
//! 每个账号页面都装一层拦截：图片、媒体、字体一律阻断以减小负载；
//! 命中完成信号 URL 模式的请求必须放行，同时置位共享信号，
//! 供播放监控判断视频是否已被平台记为完成。

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 视频完成信号
///
/// 由请求拦截任务置位，播放监控读取；每个内容项播放前重置一次。
#[derive(Clone, Debug, Default)]
pub struct VideoEndSignal(Arc<AtomicBool>);

impl VideoEndSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 默认的完成信号 URL 模式
pub fn default_end_patterns() -> Vec<Regex> {
    vec![Regex::new(r"learningTime_endVideoLearning\.action").expect("内置正则必定合法")]
}

/// 页面级请求拦截
pub struct NetworkGuard {
    signal: VideoEndSignal,
}

impl NetworkGuard {
    /// 在页面上启用拦截并启动处理任务
    ///
    /// 处理任务随页面关闭（事件流结束）自然退出。
    pub async fn install(page: &Page, end_patterns: Vec<Regex>) -> Result<Self> {
        page.execute(EnableParams::default()).await?;
        let mut events = page.event_listener::<EventRequestPaused>().await?;

        let signal = VideoEndSignal::new();
        let flag = signal.clone();
        let page = page.clone();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let url = event.request.url.clone();
                let request_id = event.request_id.clone();

                let is_end_signal = end_patterns.iter().any(|p| p.is_match(&url));
                if is_end_signal {
                    debug!("捕获视频完成信号: {}", url);
                    flag.set();
                }

                // 完成信号必须放行，哪怕它属于被屏蔽的资源类型
                let block = !is_end_signal
                    && matches!(
                        event.resource_type,
                        ResourceType::Image | ResourceType::Media | ResourceType::Font
                    );

                if block {
                    match FailRequestParams::builder()
                        .request_id(request_id)
                        .error_reason(ErrorReason::BlockedByClient)
                        .build()
                    {
                        Ok(params) => {
                            if let Err(e) = page.execute(params).await {
                                debug!("阻断请求失败: {}", e);
                            }
                        }
                        Err(e) => debug!("构造阻断参数失败: {}", e),
                    }
                } else {
                    match ContinueRequestParams::builder().request_id(request_id).build() {
                        Ok(params) => {
                            if let Err(e) = page.execute(params).await {
                                debug!("放行请求失败: {}", e);
                            }
                        }
                        Err(e) => debug!("构造放行参数失败: {}", e),
                    }
                }
            }
        });

        Ok(Self { signal })
    }

    pub fn signal(&self) -> VideoEndSignal {
        self.signal.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_end_signal_set_reset() {
        let signal = VideoEndSignal::new();
        assert!(!signal.is_set());
        signal.set();
        assert!(signal.is_set());
        // clone 共享同一个底层标志
        let other = signal.clone();
        other.reset();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_default_end_patterns_match() {
        let patterns = default_end_patterns();
        let url = "https://youxun.webtrn.cn/learnspace/learning/learningTime_endVideoLearning.action?id=1";
        assert!(patterns.iter().any(|p| p.is_match(url)));
        assert!(!patterns.iter().any(|p| p.is_match("https://cdn.example.com/video.mp4")));
    }
}

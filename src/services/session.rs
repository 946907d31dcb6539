//! 已认证会话
//!
//! 一个账号对应一个会话：独立的浏览器上下文、一个停留在平台首页的
//! 主页面（承载页内接口调用）、以及学习过程中查到的项目班级 ID。
//! 会话按值关闭（`close` 消费 self），同一会话不可能被关闭两次。

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::{Browser, Page};
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser::dispose_context;
use crate::infrastructure::JsExecutor;

/// 一个账号的已认证会话
pub struct Session {
    username: String,
    user_name: String,
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    api: JsExecutor,
    class_id: String,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        user_name: impl Into<String>,
        browser: Arc<Browser>,
        context_id: BrowserContextId,
        api: JsExecutor,
    ) -> Self {
        Self {
            username: username.into(),
            user_name: user_name.into(),
            browser,
            context_id,
            api,
            class_id: String::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// 主页面上的接口执行器（页内 fetch 自动携带登录 Cookie）
    pub fn api(&self) -> &JsExecutor {
        &self.api
    }

    /// 主页面引用
    pub fn page(&self) -> &Page {
        self.api.page()
    }

    pub fn browser(&self) -> &Arc<Browser> {
        &self.browser
    }

    pub fn context_id(&self) -> &BrowserContextId {
        &self.context_id
    }

    /// 项目班级 ID，登录后由学习流程查询填入
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn set_class_id(&mut self, class_id: impl Into<String>) {
        self.class_id = class_id.into();
    }

    /// 关闭会话：销毁浏览器上下文，连带关闭其中所有页面
    ///
    /// 关闭失败只记录日志，不影响其他账号。
    pub async fn close(self) -> Result<()> {
        if let Err(e) = dispose_context(&self.browser, self.context_id).await {
            warn!("[用户 {}] 销毁浏览器上下文失败: {}", self.username, e);
        } else {
            info!("[用户 {}] 会话已关闭", self.username);
        }
        Ok(())
    }
}

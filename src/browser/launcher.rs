//! 浏览器启动与上下文管理
//!
//! 整个进程只启动一个浏览器，账号之间通过独立的浏览器上下文隔离
//! Cookie 与存储；每个账号的页面都注入反自动化脚本和中文请求头。

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::BrowserLaunchConfig;

/// 隐藏 webdriver 标识
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });
"#;

/// 启动浏览器并在后台消费事件流
pub async fn launch_browser(config: &BrowserLaunchConfig) -> Result<Browser> {
    info!("🚀 启动浏览器...");

    let mut builder = BrowserConfig::builder().args(vec![
        "--disable-gpu",           // 无头模式下禁用 GPU
        "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
        "--disable-dev-shm-usage", // 防止共享内存不足
        "--mute-audio",
    ]);

    if config.headless {
        builder = builder.new_headless_mode();
    } else {
        builder = builder.with_head();
    }

    if let Some(executable) = &config.executable {
        builder = builder.chrome_executable(Path::new(executable));
    }

    let browser_config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        anyhow!("启动浏览器失败: {}", e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    Ok(browser)
}

/// 为一个账号创建独立的浏览器上下文
pub async fn create_account_context(browser: &Browser) -> Result<BrowserContextId> {
    let response = browser
        .execute(CreateBrowserContextParams::default())
        .await
        .map_err(|e| anyhow!("创建浏览器上下文失败: {}", e))?;
    Ok(response.result.browser_context_id)
}

/// 在指定上下文中创建页面
pub async fn create_page_in_context(
    browser: &Browser,
    context_id: &BrowserContextId,
    url: &str,
) -> Result<Page> {
    let params = CreateTargetParams::builder()
        .url(url)
        .browser_context_id(context_id.clone())
        .build()
        .map_err(|e| anyhow!("构造页面参数失败: {}", e))?;

    let page = browser
        .new_page(params)
        .await
        .map_err(|e| anyhow!("创建页面失败: {}", e))?;
    Ok(page)
}

/// 页面通用准备：注入反自动化脚本、设置中文请求头
pub async fn prepare_page(page: &Page) -> Result<()> {
    let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(STEALTH_SCRIPT)
        .build()
        .map_err(|e| anyhow!("构造注入脚本参数失败: {}", e))?;
    page.execute(stealth).await?;

    let headers = SetExtraHttpHeadersParams::builder()
        .headers(Headers::new(json!({ "Accept-Language": "zh-CN" })))
        .build()
        .map_err(|e| anyhow!("构造请求头参数失败: {}", e))?;
    page.execute(headers).await?;

    Ok(())
}

/// 销毁账号上下文，连带关闭其中所有页面
pub async fn dispose_context(browser: &Browser, context_id: BrowserContextId) -> Result<()> {
    let params = DisposeBrowserContextParams::builder()
        .browser_context_id(context_id)
        .build()
        .map_err(|e| anyhow!("构造销毁上下文参数失败: {}", e))?;
    browser.execute(params).await?;
    Ok(())
}

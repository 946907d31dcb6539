use cme_auto_study::browser::{
    create_account_context, create_page_in_context, dispose_context, launch_browser, prepare_page,
};
use cme_auto_study::config::AppConfig;
use cme_auto_study::models::load_accounts;
use cme_auto_study::services::AuthEngine;
use cme_auto_study::utils::logging;
use std::sync::Arc;

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_browser_launch_and_context_isolation() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = AppConfig::load().expect("加载配置失败");

    // 启动浏览器
    let browser = launch_browser(&config.browser).await.expect("启动浏览器失败");

    // 两个上下文应该互相隔离
    let ctx_a = create_account_context(&browser).await.expect("创建上下文失败");
    let ctx_b = create_account_context(&browser).await.expect("创建上下文失败");
    assert_ne!(
        format!("{:?}", ctx_a),
        format!("{:?}", ctx_b),
        "两个账号上下文不应相同"
    );

    let page = create_page_in_context(&browser, &ctx_a, "about:blank")
        .await
        .expect("创建页面失败");
    prepare_page(&page).await.expect("页面准备失败");

    dispose_context(&browser, ctx_a).await.expect("销毁上下文失败");
    dispose_context(&browser, ctx_b).await.expect("销毁上下文失败");
}

#[tokio::test]
#[ignore]
async fn test_authenticate_first_account() {
    // 初始化日志
    logging::init();

    // 加载配置和账号
    let config = AppConfig::load().expect("加载配置失败");
    let accounts = load_accounts(&config.account.file_path).expect("加载账号失败");
    let account = accounts.first().expect("账号文件为空");

    // 启动浏览器并登录第一个账号
    let browser = Arc::new(launch_browser(&config.browser).await.expect("启动浏览器失败"));
    let engine = AuthEngine::new(config, browser);

    let session = engine.authenticate(account).await.expect("登录失败");
    assert_eq!(session.username(), account.username);

    session.close().await.expect("关闭会话失败");
}

#[tokio::test]
#[ignore]
async fn test_load_accounts_file() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = AppConfig::load().expect("加载配置失败");

    // 账号文件应该能解析出至少一个账号
    let accounts = load_accounts(&config.account.file_path).expect("加载账号失败");
    println!("找到 {} 个账号", accounts.len());
    assert!(!accounts.is_empty(), "账号文件不应为空");
}

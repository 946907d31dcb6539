//! 批次调度
//!
//! 账号按配置的批次大小分组依次处理。同一批内登录必须串行
//! （验证码识别服务和登录接口都经不起并发），登录成功的账号
//! 再并发执行学习任务，全部任务收尾后才进入下一批。
//! 登录失败只损失该账号，不影响同批其他账号。
//! 会话在各自的学习任务内关闭，任务 panic 也只计为该账号失败。

use anyhow::Result;
use chromiumoxide::Browser;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::browser::launch_browser;
use crate::config::AppConfig;
use crate::error::{AppError, ConfigError};
use crate::models::{load_accounts, Account};
use crate::services::AuthEngine;
use crate::utils::random_delay;
use crate::workflow::{StudyFlow, UserCtx};

/// 批次间冷却时间（秒）
const BATCH_COOLDOWN_S: u64 = 5;

/// 应用程序
pub struct App {
    config: AppConfig,
    accounts: Vec<Account>,
    browser: Arc<Browser>,
}

impl App {
    /// 初始化：加载账号、启动浏览器
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        info!("========== 自动学习任务启动 ==========");

        let accounts = load_accounts(&config.account.file_path)?;
        if accounts.is_empty() {
            return Err(AppError::Config(ConfigError::NoAccounts {
                path: config.account.file_path.clone(),
            })
            .into());
        }
        info!("📋 加载 {} 个账号", accounts.len());

        let browser = Arc::new(launch_browser(&config.browser).await?);
        Ok(Self {
            config,
            accounts,
            browser,
        })
    }

    /// 按批次跑完全部账号
    pub async fn run(self) -> Result<()> {
        let batch_size = self.config.project.user_batch_size.max(1);
        let total_batches = batch_sizes(self.accounts.len(), batch_size).len();
        info!(
            "共 {} 个账号，分 {} 批处理（每批最多 {} 个）",
            self.accounts.len(),
            total_batches,
            batch_size
        );

        let engine = AuthEngine::new(self.config.clone(), self.browser.clone());
        let config = &self.config;

        let (succeeded, failed) = run_batches(
            &self.accounts,
            batch_size,
            Duration::from_secs(BATCH_COOLDOWN_S),
            |account| {
                let engine = &engine;
                Box::pin(async move {
                    // 批内登录串行，账号之间随机错峰
                    random_delay(1.0, 3.0).await;
                    engine.authenticate(&account).await
                })
            },
            |account, mut session| {
                let config = config.clone();
                Box::pin(async move {
                    // 启动时刻随机错峰
                    random_delay(0.0, 5.0).await;
                    let ctx = UserCtx::new(&account);
                    let flow = StudyFlow::new(config, ctx.clone());
                    let result = flow.run(&account, &mut session).await;
                    if let Err(e) = &result {
                        error!("❌ {} 学习任务失败: {}", ctx, e);
                    }
                    // 会话只在这里关闭一次
                    session.close().await.ok();
                    result.is_ok()
                })
            },
        )
        .await;

        info!(
            "========== 全部账号处理完成: 成功 {}，失败 {} ==========",
            succeeded, failed
        );
        Ok(())
    }
}

/// 批次执行骨架，登录与学习两步可注入
///
/// 每批先串行执行登录步骤，登录成功的账号再并发执行学习任务，
/// 全部任务 join 完成后才开始下一批。返回 (成功数, 失败数)。
async fn run_batches<'e, S>(
    accounts: &[Account],
    batch_size: usize,
    cooldown: Duration,
    login: impl Fn(Account) -> BoxFuture<'e, Result<S>>,
    study: impl Fn(Account, S) -> BoxFuture<'static, bool>,
) -> (usize, usize)
where
    S: Send + 'static,
{
    let total_batches = batch_sizes(accounts.len(), batch_size.max(1)).len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for (batch_index, batch) in accounts.chunks(batch_size.max(1)).enumerate() {
        info!(
            "========== 批次 {}/{} ({} 个账号) ==========",
            batch_index + 1,
            total_batches,
            batch.len()
        );

        let mut sessions: Vec<(Account, S)> = Vec::new();
        for account in batch {
            match login(account.clone()).await {
                Ok(session) => sessions.push((account.clone(), session)),
                Err(e) => {
                    error!("❌ [用户 {}] 登录失败: {}", account.username, e);
                    failed += 1;
                }
            }
        }

        let mut handles = Vec::new();
        for (account, session) in sessions {
            handles.push(tokio::spawn(study(account, session)));
        }
        for handle in handles {
            match handle.await {
                Ok(true) => succeeded += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!("❌ 学习任务异常退出: {}", e);
                    failed += 1;
                }
            }
        }

        if batch_index + 1 < total_batches {
            info!("批次间冷却 {} 秒", cooldown.as_secs());
            sleep(cooldown).await;
        }
    }

    (succeeded, failed)
}

/// 账号总数按批次大小切分后每批的数量
fn batch_sizes(total: usize, batch_size: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let take = remaining.min(batch_size);
        sizes.push(take);
        remaining -= take;
    }
    sizes
}

//! # CME Auto Study
//!
//! 一个用于批量驱动继续教育平台学习任务的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 页面内 JS 执行能力（DOM 查询、页内 fetch）
//! - `NetworkGuard` - 请求拦截：屏蔽媒体资源、捕获视频完成信号
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个账号/课程/视频
//! - `AuthEngine` - 登录能力（缓存会话复用 + 验证码登录 + 分类重试）
//! - `CatalogService` - 学分选课能力（必修优先 + 贪心补足）
//! - `CourseDom` / 目录解析 - 课程结构遍历能力
//! - `VideoPlayer` - 视频播放监控能力（卡顿检测 + 有界恢复）
//! - `CaptchaSolver` - 验证码识别能力（外部服务）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个账号"的完整学习流程
//! - `UserCtx` - 上下文封装（姓名 + 登录账号）
//! - `StudyFlow` - 流程编排（认证检查 → 选课 → 遍历 → 播放）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_runner` - 批量账号处理器，管理资源和并发
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::AppConfig;
pub use error::{AppError, AuthError};
pub use infrastructure::{JsExecutor, NetworkGuard, VideoEndSignal};
pub use models::{Account, Chapter, ContentItem, ContentKind, CourseRecord, CourseSelection};
pub use orchestrator::App;
pub use services::{AuthEngine, CaptchaSolver, Session, VideoPlayer};
pub use workflow::{StudyFlow, UserCtx};

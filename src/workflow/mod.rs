//! 工作流层（Workflow Layer）
//!
//! 把业务能力串成单个账号的完整学习剧本：
//! 设置检查 → 项目班级查询 → 选课 → 逐门课程逐条内容学习。

pub mod study_flow;
pub mod user_ctx;

pub use study_flow::StudyFlow;
pub use user_ctx::UserCtx;

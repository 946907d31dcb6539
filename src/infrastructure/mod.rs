//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（Page），只暴露能力，不认识账号 / 课程 / 视频。
//!
//! - `JsExecutor` - 页面内 JS 执行能力（DOM 查询、页内 fetch）
//! - `NetworkGuard` - 请求拦截能力（资源屏蔽 + 完成信号捕获）

pub mod js_executor;
pub mod network_guard;

pub use js_executor::{ApiResponse, JsExecutor};
pub use network_guard::{default_end_patterns, NetworkGuard, VideoEndSignal};

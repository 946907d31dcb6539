//! 编排层（Orchestrator Layer）
//!
//! 账号批次调度：同批账号串行登录、并发学习，批次之间冷却。

pub mod batch_runner;

pub use batch_runner::App;

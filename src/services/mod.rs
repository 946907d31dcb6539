//! 业务能力层（Services Layer）
//!
//! 描述"我能做什么"，每个能力只处理单个账号 / 课程 / 内容项：
//!
//! - `auth` - 登录能力（缓存会话复用 + 验证码登录 + 分类重试）
//! - `session` - 已认证会话（页面、上下文与 Cookie 的所有权）
//! - `session_store` - 会话缓存文件的读写
//! - `captcha` - 验证码识别（外部服务，失败降级为空串）
//! - `catalog` - 学分选课（必修优先 + 贪心补足）
//! - `traversal` - 课程目录解析（交替标记/容器的打平列表遍历）
//! - `video` - 视频播放监控（卡顿检测 + 有界恢复）

pub mod auth;
pub mod captcha;
pub mod catalog;
pub mod session;
pub mod session_store;
pub mod traversal;
pub mod video;

pub use auth::AuthEngine;
pub use captcha::CaptchaSolver;
pub use catalog::CatalogService;
pub use session::Session;
pub use session_store::{SessionStore, StoredCookie};
pub use traversal::{dismiss_help_overlay, parse_course_structure, reveal_hidden_sections, CourseDom};
pub use video::{StallDetector, VideoPlayer};

//! 程序配置
//!
//! 配置从 TOML 文件加载（默认 `config/config.toml`，可用环境变量
//! `CONFIG_PATH` 覆盖）。文件缺失时使用内置默认值，文件中缺失的字段
//! 逐项回退到默认值。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// 平台相关 URL 与站点参数
#[derive(Clone, Debug, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    #[serde(default = "default_login_page_url")]
    pub login_page_url: String,
    #[serde(default = "default_sso_login_url")]
    pub sso_login_url: String,
    /// 验证码图片地址
    #[serde(default = "default_captcha_image_url")]
    pub captcha_image_url: String,
    /// 登录状态查询接口
    #[serde(default = "default_check_login_status_url")]
    pub check_login_status_url: String,
    /// 账号认证状态检查接口
    #[serde(default = "default_check_is_need_setting")]
    pub check_is_need_setting: String,
    /// 课程目录查询接口
    #[serde(default = "default_course_status_url")]
    pub course_status_url: String,
    /// 选课保存接口
    #[serde(default = "default_select_elective_url")]
    pub select_elective_url: String,
    /// 项目班级查询接口
    #[serde(default = "default_project_class_id_url")]
    pub project_class_id_url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_site_code")]
    pub site_code: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            login_page_url: default_login_page_url(),
            sso_login_url: default_sso_login_url(),
            captcha_image_url: default_captcha_image_url(),
            check_login_status_url: default_check_login_status_url(),
            check_is_need_setting: default_check_is_need_setting(),
            course_status_url: default_course_status_url(),
            select_elective_url: default_select_elective_url(),
            project_class_id_url: default_project_class_id_url(),
            client_id: default_client_id(),
            site_code: default_site_code(),
            redirect_url: default_redirect_url(),
        }
    }
}

fn default_base_domain() -> String {
    "cmeonline.cma-cmc.com.cn".to_string()
}
fn default_login_page_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/cms/login.htm".to_string()
}
fn default_sso_login_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/sso/ssoLogin.json".to_string()
}
fn default_captcha_image_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/authCode.img".to_string()
}
fn default_check_login_status_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/trainingV1/queryMyInfo.json".to_string()
}
fn default_check_is_need_setting() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/trainingV1/checkNeedSetting.json".to_string()
}
fn default_course_status_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/trainingV1/queryMyCourse.json".to_string()
}
fn default_select_elective_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/trainingV1/saveElective.json".to_string()
}
fn default_project_class_id_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/trainingV1/queryMyProject.json".to_string()
}
fn default_client_id() -> String {
    "cmeonline".to_string()
}
fn default_site_code() -> String {
    "youxun".to_string()
}
fn default_redirect_url() -> String {
    "https://cmeonline.cma-cmc.com.cn/u/trainingV1/ssoHook.json?Referer=".to_string()
}

/// 批次调度配置
#[derive(Clone, Debug, Deserialize)]
pub struct ProjectConfig {
    /// 每批同时学习的账号数量
    #[serde(default = "default_user_batch_size")]
    pub user_batch_size: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            user_batch_size: default_user_batch_size(),
        }
    }
}

fn default_user_batch_size() -> usize {
    3
}

/// 验证码识别服务配置
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub token: String,
}

/// 课程查询与播放配置
#[derive(Clone, Debug, Deserialize)]
pub struct VideoPlayConfig {
    /// 默认班级 ID（项目查询失败时的回退值）
    #[serde(default)]
    pub class_id: String,
    /// 课程目录单页查询数量
    #[serde(default = "default_each_batch")]
    pub each_batch: usize,
}

impl Default for VideoPlayConfig {
    fn default() -> Self {
        Self {
            class_id: String::new(),
            each_batch: default_each_batch(),
        }
    }
}

fn default_each_batch() -> usize {
    100
}

/// 会话缓存配置
#[derive(Clone, Debug, Deserialize)]
pub struct CookieConfig {
    /// 缓存文件前缀，实际文件为 `{save_path}_{账号}.json`
    #[serde(default = "default_cookie_save_path")]
    pub save_path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            save_path: default_cookie_save_path(),
        }
    }
}

fn default_cookie_save_path() -> String {
    "save_data/cookies".to_string()
}

/// 账号数据源配置
#[derive(Clone, Debug, Deserialize)]
pub struct AccountSourceConfig {
    #[serde(default = "default_account_file_path")]
    pub file_path: String,
}

impl Default for AccountSourceConfig {
    fn default() -> Self {
        Self {
            file_path: default_account_file_path(),
        }
    }
}

fn default_account_file_path() -> String {
    "config/accounts.toml".to_string()
}

/// 浏览器配置
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BrowserLaunchConfig {
    /// 浏览器可执行文件路径，缺省时由 chromiumoxide 自行探测
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub headless: bool,
}

/// 程序配置
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub video_play: VideoPlayConfig,
    #[serde(default)]
    pub cookie: CookieConfig,
    #[serde(default)]
    pub account: AccountSourceConfig,
    #[serde(default)]
    pub browser: BrowserLaunchConfig,
}

impl AppConfig {
    /// 加载配置，路径可用 `CONFIG_PATH` 环境变量覆盖
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&path)
    }

    /// 从指定 TOML 文件加载配置，文件不存在时使用默认配置
    pub fn from_file(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!("未找到配置文件 {}，使用默认配置", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("无法解析配置文件: {}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.project.user_batch_size, 3);
        assert_eq!(config.video_play.each_batch, 100);
        assert!(config.web.login_page_url.starts_with("https://"));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [project]
            user_batch_size = 2

            [web]
            base_domain = "example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.project.user_batch_size, 2);
        assert_eq!(config.web.base_domain, "example.com");
        // 同一节内缺失的字段仍然回退到默认值
        assert_eq!(config.web.site_code, "youxun");
        assert_eq!(config.cookie.save_path, "save_data/cookies");
    }
}

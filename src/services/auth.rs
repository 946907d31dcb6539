//! 登录引擎
//!
//! 每个账号的认证分两条路径：
//!
//! 1. 快路径：存在会话缓存时直接注入 Cookie，验证通过即复用，
//!    全程不发起凭据请求；
//! 2. 凭据路径：HTTP 客户端走"登录页 → 验证码 → 提交 → 跟随重定向"，
//!    失败按消息分类（账号密码错误立即终止，验证码等瞬时错误在
//!    尝试预算内指数退避重试），成功后把收集到的 Cookie 注入浏览器。
//!
//! 无论哪条路径，最终都以平台接口实际返回当前账号的 loginId 为准。

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Browser;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::{create_account_context, create_page_in_context, dispose_context, prepare_page};
use crate::config::AppConfig;
use crate::error::{AppError, AuthError};
use crate::infrastructure::{default_end_patterns, JsExecutor, NetworkGuard};
use crate::models::Account;
use crate::services::captcha::CaptchaSolver;
use crate::services::session::Session;
use crate::services::session_store::{SessionStore, StoredCookie};
use crate::utils::{exponential_backoff, retry_bounded, RetryError};

/// 凭据登录的尝试预算（含第一次）
pub const MAX_LOGIN_ATTEMPTS: usize = 3;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// 登录引擎
pub struct AuthEngine {
    config: AppConfig,
    browser: Arc<Browser>,
    store: SessionStore,
    solver: CaptchaSolver,
}

impl AuthEngine {
    pub fn new(config: AppConfig, browser: Arc<Browser>) -> Self {
        let store = SessionStore::new(config.cookie.save_path.clone());
        let solver = CaptchaSolver::new(&config.captcha);
        Self {
            config,
            browser,
            store,
            solver,
        }
    }

    /// 认证一个账号，成功返回已验证的会话
    ///
    /// 失败时已创建的浏览器上下文会被销毁，不会泄漏页面。
    pub async fn authenticate(&self, account: &Account) -> Result<Session> {
        info!("🔐 [用户 {}_{}] 开始登录", account.user_name, account.username);

        let context_id = create_account_context(&self.browser).await?;
        match self.authenticate_in_context(account, &context_id).await {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(dispose_err) = dispose_context(&self.browser, context_id).await {
                    warn!(
                        "[用户 {}] 登录失败后清理上下文失败: {}",
                        account.username, dispose_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn authenticate_in_context(
        &self,
        account: &Account,
        context_id: &chromiumoxide::cdp::browser_protocol::browser::BrowserContextId,
    ) -> Result<Session> {
        let page = create_page_in_context(&self.browser, context_id, "about:blank").await?;
        prepare_page(&page).await?;
        // 主页面同样屏蔽图片等重资源
        let _guard = NetworkGuard::install(&page, default_end_patterns()).await?;
        let api = JsExecutor::new(page);

        if self.try_cached_login(account, &api).await {
            info!("✅ [用户 {}] 缓存会话复用成功", account.username);
        } else {
            self.credential_login(account, &api).await?;
            info!("✅ [用户 {}] 凭据登录成功", account.username);
        }

        Ok(Session::new(
            account.username.clone(),
            account.user_name.clone(),
            self.browser.clone(),
            context_id.clone(),
            api,
        ))
    }

    /// 快路径：注入缓存 Cookie 并验证，任何一步失败都静默回落到凭据登录
    async fn try_cached_login(&self, account: &Account, api: &JsExecutor) -> bool {
        let Some(cookies) = self.store.load(&account.username) else {
            info!("[用户 {}] 无会话缓存，走凭据登录", account.username);
            return false;
        };

        let params: Vec<CookieParam> = cookies.iter().filter_map(|c| c.to_param().ok()).collect();
        if params.is_empty() {
            return false;
        }
        if let Err(e) = api.page().set_cookies(params).await {
            warn!("[用户 {}] 注入缓存 Cookie 失败: {}", account.username, e);
            return false;
        }
        if let Err(e) = api.page().goto(&self.config.web.login_page_url).await {
            warn!("[用户 {}] 打开平台页面失败: {}", account.username, e);
            return false;
        }
        sleep(Duration::from_secs(2)).await;

        let valid = self.verify_login(api, &account.username).await;
        if !valid {
            info!("[用户 {}] 缓存会话已失效，走凭据登录", account.username);
        }
        valid
    }

    /// 凭据路径：HTTP 登录、Cookie 注入、验证、持久化
    async fn credential_login(&self, account: &Account, api: &JsExecutor) -> Result<()> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("构建登录 HTTP 客户端失败")?;

        let cookies = retry_bounded(
            MAX_LOGIN_ATTEMPTS,
            exponential_backoff(Duration::from_secs(1)),
            |attempt| {
                let client = client.clone();
                async move {
                    info!(
                        "[用户 {}] 第 {}/{} 次登录尝试",
                        account.username, attempt, MAX_LOGIN_ATTEMPTS
                    );
                    self.login_attempt(account, &client).await
                }
            },
        )
        .await
        .with_context(|| format!("账号 {} 凭据登录失败", account.username))?;

        let params: Vec<CookieParam> = cookies
            .iter()
            .map(|c| c.to_param())
            .collect::<Result<Vec<_>>>()?;
        api.page()
            .set_cookies(params)
            .await
            .context("注入登录 Cookie 失败")?;
        api.page()
            .goto(&self.config.web.login_page_url)
            .await
            .map_err(|e| AppError::navigation_failed(&self.config.web.login_page_url, e))?;
        sleep(Duration::from_secs(2)).await;

        if !self.verify_login(api, &account.username).await {
            return Err(AppError::Auth(AuthError::VerifyFailed).into());
        }

        // 验证通过后保存浏览器的完整 Cookie 快照，供下次运行复用
        match api.page().get_cookies().await {
            Ok(cdp_cookies) => {
                let snapshot: Vec<StoredCookie> =
                    cdp_cookies.iter().map(StoredCookie::from_cdp).collect();
                if let Err(e) = self.store.save(&account.username, &snapshot) {
                    warn!("[用户 {}] 保存会话缓存失败: {}", account.username, e);
                }
            }
            Err(e) => warn!("[用户 {}] 读取浏览器 Cookie 失败: {}", account.username, e),
        }
        Ok(())
    }

    /// 单次凭据登录尝试，失败时返回已分类的错误
    async fn login_attempt(
        &self,
        account: &Account,
        client: &reqwest::Client,
    ) -> Result<Vec<StoredCookie>, RetryError> {
        let web = &self.config.web;
        let mut cookies: Vec<StoredCookie> = Vec::new();

        // 1. 打开登录页，建立服务端会话
        let resp = client
            .get(&web.login_page_url)
            .send()
            .await
            .map_err(|e| RetryError::Transient(e.into()))?;
        if !resp.status().is_success() {
            return Err(RetryError::Transient(anyhow::anyhow!(
                "登录页返回状态码 {}",
                resp.status()
            )));
        }
        absorb_set_cookies(&mut cookies, &resp, &web.base_domain);
        crate::utils::random_delay(1.0, 2.0).await;

        // 2. 拉取验证码图片并识别
        let resp = client
            .get(&web.captcha_image_url)
            .send()
            .await
            .map_err(|e| RetryError::Transient(e.into()))?;
        if !resp.status().is_success() {
            return Err(RetryError::Transient(anyhow::anyhow!(
                "验证码图片返回状态码 {}",
                resp.status()
            )));
        }
        absorb_set_cookies(&mut cookies, &resp, &web.base_domain);
        let image = resp
            .bytes()
            .await
            .map_err(|e| RetryError::Transient(e.into()))?;
        let auth_code = self.solver.solve(&image).await;
        info!("[用户 {}] 验证码识别结果: {}", account.username, auth_code);

        // 3. 提交登录表单（参数 JSON 序列化后 base64 编码）
        let redirect_uri = format!("{}{}", web.redirect_url, web.login_page_url);
        let request_param = build_login_request_param(
            &account.username,
            &account.userpwd,
            &auth_code,
            &web.client_id,
            &redirect_uri,
        );
        let envelope = STANDARD.encode(
            serde_json::to_string(&request_param)
                .map_err(|e| RetryError::Transient(e.into()))?,
        );
        let resp = client
            .post(&web.sso_login_url)
            .form(&[("data", envelope.as_str()), ("ContentType", "json")])
            .send()
            .await
            .map_err(|e| RetryError::Transient(e.into()))?;
        if !resp.status().is_success() {
            return Err(RetryError::Transient(anyhow::anyhow!(
                "登录接口返回状态码 {}",
                resp.status()
            )));
        }
        absorb_set_cookies(&mut cookies, &resp, &web.base_domain);

        let result: Value = resp
            .json()
            .await
            .map_err(|e| RetryError::Transient(e.into()))?;

        if !is_truthy(result.get("success")) {
            let message = result
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("未知错误")
                .to_string();
            error!("[用户 {}] 登录失败: {}", account.username, message);
            return Err(match classify_login_message(&message) {
                LoginFailureKind::InvalidCredential => {
                    RetryError::Fatal(AppError::Auth(AuthError::InvalidCredential).into())
                }
                LoginFailureKind::CaptchaMismatch => {
                    RetryError::Transient(AppError::Auth(AuthError::CaptchaMismatch { message }).into())
                }
                LoginFailureKind::Other => {
                    RetryError::Transient(anyhow::anyhow!("登录失败: {}", message))
                }
            });
        }

        // 4. 跟随重定向完成 SSO 回跳，补齐业务域 Cookie
        let redirect_url = result
            .get("redirectURL")
            .or_else(|| result.get("RedirectURL"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                RetryError::Transient(AppError::Auth(AuthError::MissingRedirect).into())
            })?;
        let resp = client
            .get(redirect_url)
            .send()
            .await
            .map_err(|e| RetryError::Transient(e.into()))?;
        if !resp.status().is_success() {
            return Err(RetryError::Transient(anyhow::anyhow!(
                "SSO 回跳返回状态码 {}",
                resp.status()
            )));
        }
        absorb_set_cookies(&mut cookies, &resp, &web.base_domain);

        Ok(cookies)
    }

    /// 查询平台确认登录状态，任何异常都按未登录处理，从不报错
    async fn verify_login(&self, api: &JsExecutor, username: &str) -> bool {
        let params = login_status_params();
        let resp = match api
            .api_get(&self.config.web.check_login_status_url, &params)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("[用户 {}] 登录状态查询失败: {}", username, e);
                return false;
            }
        };
        if !resp.ok {
            warn!("[用户 {}] 登录状态查询返回状态码 {}", username, resp.status);
            return false;
        }
        verify_payload_matches(&resp.data, username)
    }
}

/// 构造 SSO 登录请求参数
///
/// 平台要求 OAuth 风格的字段名（LoginID/Password/AuthCode/client_id/
/// redirect_uri 等），回跳地址是 redirect_url 与登录页 URL 的拼接。
fn build_login_request_param(
    username: &str,
    password: &str,
    auth_code: &str,
    client_id: &str,
    redirect_uri: &str,
) -> Value {
    json!({
        "LoginID": username,
        "Password": password,
        "AuthCode": auth_code,
        "ContentType": "json",
        "client_id": client_id,
        "response_type": "code",
        "scope": "user_info",
        "AppID": "11",
        "redirect_uri": redirect_uri,
    })
}

/// 登录状态查询的固定参数
fn login_status_params() -> Value {
    json!({
        "data": "info",
        "page.curPage": 1,
        "page.pageSize": 10,
        "page.searchItem.type": 0,
    })
}

/// 收集响应中的 Set-Cookie，同名 Cookie 以后出现的为准
fn absorb_set_cookies(
    cookies: &mut Vec<StoredCookie>,
    resp: &reqwest::Response,
    fallback_domain: &str,
) {
    for value in resp.headers().get_all(reqwest::header::SET_COOKIE) {
        if let Ok(raw) = value.to_str() {
            if let Some(cookie) = StoredCookie::parse_set_cookie(raw, fallback_domain) {
                cookies.retain(|c| c.name != cookie.name);
                cookies.push(cookie);
            }
        }
    }
}

/// 登录状态响应是否确认为当前账号
///
/// 要求业务码为 "0"、消息为"成功"，且返回的 loginId 与账号一致，
/// 防止把上下文里残留的其他账号会话误判为已登录。
fn verify_payload_matches(data: &Value, username: &str) -> bool {
    let code_ok = data.get("errorCode").and_then(|v| v.as_str()) == Some("0");
    let msg_ok = data.get("errorMessage").and_then(|v| v.as_str()) == Some("成功");
    let login_id = data
        .pointer("/page/items/0/info/loginId")
        .and_then(|v| v.as_str());
    code_ok && msg_ok && login_id == Some(username)
}

/// 登录失败消息的分类结果
#[derive(Debug, PartialEq, Eq)]
enum LoginFailureKind {
    /// 账号或密码错误，重试无意义
    InvalidCredential,
    /// 验证码错误，换一张重试即可
    CaptchaMismatch,
    /// 其他失败，按瞬时错误重试
    Other,
}

fn classify_login_message(message: &str) -> LoginFailureKind {
    let lower = message.to_lowercase();
    if message.contains("验证码") || lower.contains("authcode") {
        LoginFailureKind::CaptchaMismatch
    } else if message.contains("密码") || message.contains("账号") || lower.contains("password")
    {
        LoginFailureKind::InvalidCredential
    } else {
        LoginFailureKind::Other
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true" || s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_param_uses_platform_field_names() {
        let param = build_login_request_param(
            "user01",
            "pwd123",
            "abcd",
            "cmeonline",
            "https://cmeonline.cma-cmc.com.cn/u/trainingV1/ssoHook.json?Referer=\
             https://cmeonline.cma-cmc.com.cn/cms/login.htm",
        );
        assert_eq!(param["LoginID"], "user01");
        assert_eq!(param["Password"], "pwd123");
        assert_eq!(param["AuthCode"], "abcd");
        assert_eq!(param["ContentType"], "json");
        assert_eq!(param["client_id"], "cmeonline");
        assert_eq!(param["response_type"], "code");
        assert_eq!(param["scope"], "user_info");
        assert_eq!(param["AppID"], "11");
        // 回跳地址必须是 redirect_url + 登录页 URL 的拼接
        assert!(param["redirect_uri"]
            .as_str()
            .unwrap()
            .ends_with("login.htm"));
        // 不允许出现旧风格的小写字段名
        assert!(param.get("username").is_none());
        assert!(param.get("password").is_none());
    }

    #[test]
    fn test_login_status_params_carry_required_fields() {
        let params = login_status_params();
        assert_eq!(params["data"], "info");
        assert_eq!(params["page.curPage"], 1);
        assert_eq!(params["page.pageSize"], 10);
        assert_eq!(params["page.searchItem.type"], 0);
    }

    #[test]
    fn test_classify_captcha_messages_are_transient() {
        assert_eq!(
            classify_login_message("验证码错误"),
            LoginFailureKind::CaptchaMismatch
        );
        assert_eq!(
            classify_login_message("AuthCode invalid"),
            LoginFailureKind::CaptchaMismatch
        );
    }

    #[test]
    fn test_classify_credential_messages_are_fatal() {
        assert_eq!(
            classify_login_message("账号或密码错误"),
            LoginFailureKind::InvalidCredential
        );
        assert_eq!(
            classify_login_message("wrong password"),
            LoginFailureKind::InvalidCredential
        );
    }

    #[test]
    fn test_classify_unknown_messages_retry() {
        assert_eq!(
            classify_login_message("系统繁忙，请稍后再试"),
            LoginFailureKind::Other
        );
    }

    #[test]
    fn test_verify_requires_matching_login_id() {
        let data = json!({
            "errorCode": "0",
            "errorMessage": "成功",
            "page": {"items": [{"info": {"loginId": "user01"}}]}
        });
        assert!(verify_payload_matches(&data, "user01"));
        // 返回的是其他账号的会话，必须判为未登录
        assert!(!verify_payload_matches(&data, "user02"));
    }

    #[test]
    fn test_verify_rejects_error_payloads() {
        let data = json!({"errorCode": "403", "errorMessage": "未登录"});
        assert!(!verify_payload_matches(&data, "user01"));
        assert!(!verify_payload_matches(&json!(null), "user01"));
    }

    #[test]
    fn test_is_truthy_accepts_platform_variants() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("true"))));
        assert!(is_truthy(Some(&json!("1"))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!("0"))));
        assert!(!is_truthy(None));
    }
}

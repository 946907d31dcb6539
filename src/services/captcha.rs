//! 验证码识别
//!
//! 调用外部识别服务：验证码图片 base64 编码后 POST 上去，
//! 识别成功返回文本。任何一步失败（网络、状态码、响应结构）都
//! 降级为返回空串，由登录重试机制兜底，绝不让识别失败中断登录流程。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CaptchaConfig;

/// 识别服务的业务成功码
const API_SUCCESS_CODE: i64 = 10000;
/// 识别类型：通用字符验证码
const CAPTCHA_TYPE: i64 = 10115;

/// 验证码识别器
pub struct CaptchaSolver {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

impl CaptchaSolver {
    pub fn new(config: &CaptchaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            client,
        }
    }

    /// 识别一张验证码图片，失败时返回空串
    pub async fn solve(&self, image: &[u8]) -> String {
        if self.api_url.is_empty() {
            warn!("未配置验证码识别服务地址");
            return String::new();
        }

        let payload = json!({
            "token": self.token,
            "type": CAPTCHA_TYPE,
            "image": STANDARD.encode(image),
        });

        let response = match self.client.post(&self.api_url).json(&payload).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("验证码识别请求失败: {}", e);
                return String::new();
            }
        };

        if !response.status().is_success() {
            warn!("验证码识别服务返回状态码 {}", response.status());
            return String::new();
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("验证码识别响应解析失败: {}", e);
                return String::new();
            }
        };

        match extract_captcha_text(&body) {
            Some(text) => {
                debug!("验证码识别成功: {}", text);
                text
            }
            None => {
                warn!("验证码识别服务返回异常响应: {}", body);
                String::new()
            }
        }
    }
}

/// 从识别服务响应中取出验证码文本
///
/// 只有业务码为 10000 且 `data.data` 为非空字符串才算成功。
fn extract_captcha_text(body: &Value) -> Option<String> {
    let code = body.get("code").and_then(|v| v.as_i64())?;
    if code != API_SUCCESS_CODE {
        return None;
    }
    let text = body.pointer("/data/data")?.as_str()?;
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_success() {
        let body = json!({"code": 10000, "data": {"data": "Xk7p"}});
        assert_eq!(extract_captcha_text(&body), Some("Xk7p".to_string()));
    }

    #[test]
    fn test_extract_rejects_error_code() {
        let body = json!({"code": 10001, "data": {"data": "Xk7p"}});
        assert_eq!(extract_captcha_text(&body), None);
    }

    #[test]
    fn test_extract_rejects_missing_or_empty_text() {
        assert_eq!(extract_captcha_text(&json!({"code": 10000})), None);
        assert_eq!(
            extract_captcha_text(&json!({"code": 10000, "data": {"data": ""}})),
            None
        );
        assert_eq!(extract_captcha_text(&json!({"message": "无code字段"})), None);
    }
}

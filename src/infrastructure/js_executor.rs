//! JS 执行器 - 基础设施层
//!
//! 持有 page 资源，暴露三种能力：执行 JS、带超时等待页面条件、
//! 以页面身份调用平台接口（页内 fetch 自动携带登录 Cookie）。

use anyhow::Result;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// 页内 fetch 的结果
///
/// 页内脚本永远返回这个结构：请求失败时 `ok=false`、`status=0`、
/// `data=null`，字段缺失从不上抛异常。
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: i64,
    #[serde(default)]
    pub data: JsonValue,
}

impl ApiResponse {
    /// 按路径取出响应字段，任意一级缺失返回 None
    pub fn pointer(&self, pointer: &str) -> Option<&JsonValue> {
        self.data.pointer(pointer)
    }

    /// 取出 `page.items` 数组，缺失时返回空切片
    pub fn page_items(&self) -> &[JsonValue] {
        self.data
            .pointer("/page/items")
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// JS 执行器
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于导航、刷新等页面级操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 轮询等待页面条件成立
    ///
    /// `expr` 是一段返回布尔值的 JS 表达式，每 500ms 求值一次。
    /// 超时返回 `Ok(false)`，由调用方决定是记录继续还是报错。
    pub async fn wait_for_truthy(&self, expr: &str, what: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found: bool = self
                .eval_as(format!("(() => {{ try {{ return !!({}); }} catch (e) {{ return false; }} }})()", expr))
                .await
                .unwrap_or(false);
            if found {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("等待 {} 超时", what);
                return Ok(false);
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// 以页面身份 GET 平台接口
    ///
    /// `params` 是一个扁平 JSON 对象，编码为查询字符串。
    pub async fn api_get(&self, url: &str, params: &JsonValue) -> Result<ApiResponse> {
        let script = build_fetch_script(url, "GET", params)?;
        self.eval_as(script).await
    }

    /// 以页面身份 POST 平台接口（表单编码）
    pub async fn api_post(&self, url: &str, params: &JsonValue) -> Result<ApiResponse> {
        let script = build_fetch_script(url, "POST", params)?;
        self.eval_as(script).await
    }
}

fn build_fetch_script(url: &str, method: &str, params: &JsonValue) -> Result<String> {
    let params_json = serde_json::to_string(params)?;

    let (url_expr, body_expr) = if method == "GET" {
        ("qs ? url + \"?\" + qs : url", "undefined".to_string())
    } else {
        ("url", "qs".to_string())
    };

    Ok(format!(
        r#"
        (async () => {{
            try {{
                const url = {url:?};
                const params = {params_json};
                const qs = new URLSearchParams(params).toString();
                const res = await fetch({url_expr}, {{
                    method: {method:?},
                    headers: {{
                        "Accept": "application/json, text/javascript, */*; q=0.01",
                        "Content-Type": "application/x-www-form-urlencoded; charset=UTF-8"
                    }},
                    credentials: "include",
                    body: {body_expr}
                }});
                let data = null;
                try {{ data = await res.json(); }} catch (e) {{ data = null; }}
                return {{ ok: res.ok, status: res.status, data: data }};
            }} catch (err) {{
                return {{ ok: false, status: 0, data: null }};
            }}
        }})()
        "#,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_fetch_script_get() {
        let script = build_fetch_script(
            "https://example.com/list.json",
            "GET",
            &json!({"page.curPage": 1}),
        )
        .unwrap();
        assert!(script.contains("\"GET\""));
        assert!(script.contains("page.curPage"));
        assert!(script.contains("credentials: \"include\""));
        assert!(script.contains("body: undefined"));
    }

    #[test]
    fn test_build_fetch_script_post_has_body() {
        let script =
            build_fetch_script("https://example.com/save.json", "POST", &json!({})).unwrap();
        assert!(script.contains("\"POST\""));
        assert!(script.contains("body: qs"));
    }

    #[test]
    fn test_api_response_field_absence_degrades() {
        let resp: ApiResponse =
            serde_json::from_value(json!({"ok": false, "status": 0, "data": null})).unwrap();
        assert!(resp.page_items().is_empty());
        assert!(resp.pointer("/page/items/0/info").is_none());

        let resp: ApiResponse = serde_json::from_value(json!({
            "ok": true,
            "status": 200,
            "data": {"page": {"items": [{"info": {"loginId": "u1"}}]}}
        }))
        .unwrap();
        assert_eq!(resp.page_items().len(), 1);
        assert_eq!(
            resp.pointer("/page/items/0/info/loginId").and_then(|v| v.as_str()),
            Some("u1")
        );
    }
}

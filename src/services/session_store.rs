//! 会话缓存
//!
//! 每个账号一个缓存文件 `{save_path}_{账号}.json`，保存验证通过后的
//! 浏览器 Cookie 快照。下次运行先尝试注入缓存直接复用会话，
//! 失败再走凭据登录。

use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// 持久化的单条 Cookie
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// 从浏览器当前 Cookie 构建快照
    pub fn from_cdp(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }

    /// 解析一条 `Set-Cookie` 响应头
    ///
    /// 未携带 Domain 属性时落到 `fallback_domain`。格式不合法返回 None。
    pub fn parse_set_cookie(raw: &str, fallback_domain: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: fallback_domain.to_string(),
            path: default_cookie_path(),
            secure: false,
            http_only: false,
        };

        for attr in parts {
            let attr = attr.trim();
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr, ""),
            };
            if key.eq_ignore_ascii_case("domain") && !val.is_empty() {
                cookie.domain = val.trim_start_matches('.').to_string();
            } else if key.eq_ignore_ascii_case("path") && !val.is_empty() {
                cookie.path = val.to_string();
            } else if key.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if key.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            }
        }
        Some(cookie)
    }

    /// 转换为可注入浏览器的 Cookie 参数
    pub fn to_param(&self) -> Result<CookieParam> {
        CookieParam::builder()
            .name(&self.name)
            .value(&self.value)
            .domain(&self.domain)
            .path(&self.path)
            .secure(self.secure)
            .http_only(self.http_only)
            .build()
            .map_err(|e| anyhow!("构造 Cookie 参数失败: {}", e))
    }
}

/// 缓存文件内容：Cookie 快照加保存时间
#[derive(Debug, Deserialize, Serialize)]
struct SessionSnapshot {
    saved_at: String,
    cookies: Vec<StoredCookie>,
}

/// 会话缓存文件的读写
pub struct SessionStore {
    save_path: String,
}

impl SessionStore {
    pub fn new(save_path: impl Into<String>) -> Self {
        Self {
            save_path: save_path.into(),
        }
    }

    fn file_for(&self, username: &str) -> PathBuf {
        PathBuf::from(format!("{}_{}.json", self.save_path, username))
    }

    /// 读取账号的会话缓存，文件缺失或内容损坏返回 None
    pub fn load(&self, username: &str) -> Option<Vec<StoredCookie>> {
        let path = self.file_for(username);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<SessionSnapshot>(&content) {
            Ok(snapshot) if !snapshot.cookies.is_empty() => {
                debug!(
                    "加载会话缓存: {} ({} 条, 保存于 {})",
                    path.display(),
                    snapshot.cookies.len(),
                    snapshot.saved_at
                );
                Some(snapshot.cookies)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("会话缓存 {} 损坏，忽略: {}", path.display(), e);
                None
            }
        }
    }

    /// 写入账号的会话缓存，父目录不存在时自动创建
    pub fn save(&self, username: &str, cookies: &[StoredCookie]) -> Result<()> {
        let path = self.file_for(username);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建缓存目录失败: {}", parent.display()))?;
        }
        let snapshot = SessionSnapshot {
            saved_at: chrono::Local::now().to_rfc3339(),
            cookies: cookies.to_vec(),
        };
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&path, content)
            .with_context(|| format!("写入会话缓存失败: {}", path.display()))?;
        debug!("会话缓存已保存: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie_with_attributes() {
        let cookie = StoredCookie::parse_set_cookie(
            "JSESSIONID=abc123; Path=/u; Domain=.cma-cmc.com.cn; Secure; HttpOnly",
            "cmeonline.cma-cmc.com.cn",
        )
        .unwrap();
        assert_eq!(cookie.name, "JSESSIONID");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "cma-cmc.com.cn");
        assert_eq!(cookie.path, "/u");
        assert!(cookie.secure);
        assert!(cookie.http_only);
    }

    #[test]
    fn test_parse_set_cookie_falls_back_to_domain() {
        let cookie =
            StoredCookie::parse_set_cookie("token=x", "cmeonline.cma-cmc.com.cn").unwrap();
        assert_eq!(cookie.domain, "cmeonline.cma-cmc.com.cn");
        assert_eq!(cookie.path, "/");
        assert!(!cookie.secure);
    }

    #[test]
    fn test_parse_set_cookie_rejects_malformed() {
        assert!(StoredCookie::parse_set_cookie("no-equals-sign", "d").is_none());
        assert!(StoredCookie::parse_set_cookie("=value-only", "d").is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("cme_store_{}", std::process::id()));
        let store = SessionStore::new(dir.join("cookies").to_string_lossy().to_string());

        let cookies = vec![StoredCookie {
            name: "SID".to_string(),
            value: "v1".to_string(),
            domain: "example.com".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: false,
        }];
        store.save("user01", &cookies).unwrap();

        let loaded = store.load("user01").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "SID");
        assert_eq!(loaded[0].value, "v1");

        // 不存在的账号返回 None
        assert!(store.load("nobody").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}

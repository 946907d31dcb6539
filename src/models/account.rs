//! 账号数据
//!
//! 账号从 TOML 文件的 `[[accounts]]` 数组加载。缺少登录账号的条目
//! 跳过并告警，格式不正确的条目同样跳过，加载过程本身不会失败。

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// 单个学习账号，加载后不再变更
#[derive(Clone, Debug, Deserialize)]
pub struct Account {
    /// 登录账号
    pub username: String,
    /// 登录密码
    pub userpwd: String,
    /// 显示姓名
    #[serde(default)]
    pub user_name: String,
    /// 目标学分
    #[serde(default)]
    pub need_credit: i64,
    /// 必修课程名称列表，按给定顺序优先选择
    #[serde(default)]
    pub must_learn_course: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountFile {
    #[serde(default)]
    accounts: Vec<toml::Value>,
}

/// 从 TOML 文件加载账号列表
pub fn load_accounts(path: &str) -> Result<Vec<Account>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("无法读取账号文件: {}", path))?;
    let accounts = parse_accounts(&content);
    info!("✓ 从 {} 加载 {} 个账号", path, accounts.len());
    Ok(accounts)
}

fn parse_accounts(content: &str) -> Vec<Account> {
    let file: AccountFile = match toml::from_str(content) {
        Ok(file) => file,
        Err(e) => {
            warn!("账号文件解析失败: {}", e);
            return Vec::new();
        }
    };

    let mut accounts = Vec::new();
    for (index, value) in file.accounts.into_iter().enumerate() {
        match value.try_into::<Account>() {
            Ok(account) if account.username.trim().is_empty() => {
                warn!("第 {} 条账号缺少登录账号，跳过", index + 1);
            }
            Ok(account) => accounts.push(account),
            Err(e) => {
                warn!("第 {} 条账号格式不正确，跳过: {}", index + 1, e);
            }
        }
    }
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accounts() {
        let accounts = parse_accounts(
            r#"
            [[accounts]]
            username = "110101190001010011"
            userpwd = "pwd1"
            user_name = "张三"
            need_credit = 15
            must_learn_course = ["公共卫生概论"]

            [[accounts]]
            username = "110101190001010022"
            userpwd = "pwd2"
            user_name = "李四"
            need_credit = 10
            "#,
        );
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].user_name, "张三");
        assert_eq!(accounts[0].must_learn_course.len(), 1);
        assert!(accounts[1].must_learn_course.is_empty());
    }

    #[test]
    fn test_missing_username_is_skipped() {
        let accounts = parse_accounts(
            r#"
            [[accounts]]
            username = ""
            userpwd = "pwd"

            [[accounts]]
            user_name = "无账号"
            userpwd = "pwd"

            [[accounts]]
            username = "ok"
            userpwd = "pwd"
            "#,
        );
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "ok");
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let accounts = parse_accounts(
            r#"
            [[accounts]]
            username = "ok"
            userpwd = "pwd"

            [[accounts]]
            username = "bad"
            userpwd = "pwd"
            need_credit = "十五"
            "#,
        );
        assert_eq!(accounts.len(), 1);
    }
}

//! 日志用的账号标识

use std::fmt;

use crate::models::Account;

/// 账号标识，所有用户相关日志统一以它开头
#[derive(Clone, Debug)]
pub struct UserCtx {
    pub username: String,
    pub user_name: String,
}

impl UserCtx {
    pub fn new(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            user_name: account.user_name.clone(),
        }
    }
}

impl fmt::Display for UserCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[用户 {}_{}]", self.user_name, self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let ctx = UserCtx {
            username: "u001".to_string(),
            user_name: "张三".to_string(),
        };
        assert_eq!(ctx.to_string(), "[用户 张三_u001]");
    }
}

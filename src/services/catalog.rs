//! 课程目录与学分选课
//!
//! 选课顺序：先逐个查询账号配置的必修课程（完成的计学分、未完成的
//! 入待学习），必修学分已够目标就此打住；不够时拉取全目录，先统计
//! 已完成课程的学分，再按目录顺序贪心补足未完成课程，凑够即停。

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::models::{Account, CourseRecord, CourseSelection};
use crate::services::session::Session;
use crate::utils::random_delay;

/// 课程目录服务
pub struct CatalogService<'a> {
    config: &'a AppConfig,
}

impl<'a> CatalogService<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    fn class_id<'s>(&'s self, session: &'s Session) -> &'s str {
        if session.class_id().is_empty() {
            &self.config.video_play.class_id
        } else {
            session.class_id()
        }
    }

    /// 检查账号是否需要先完成信息设置（需要时无法继续学习）
    pub async fn check_need_settings(&self, session: &Session) -> Result<bool> {
        let resp = session
            .api()
            .api_post(&self.config.web.check_is_need_setting, &json!({}))
            .await?;
        if !resp.ok {
            warn!(
                "[用户 {}] 设置状态查询返回状态码 {}",
                session.username(),
                resp.status
            );
            return Ok(false);
        }
        Ok(flag_is_one(resp.pointer("/page/items/0/success")))
    }

    /// 查询账号的项目班级 ID，查不到返回 None
    pub async fn fetch_project_class_id(&self, session: &Session) -> Result<Option<String>> {
        let resp = session
            .api()
            .api_get(&self.config.web.project_class_id_url, &project_query_params())
            .await?;
        if !resp.ok {
            warn!(
                "[用户 {}] 项目查询返回状态码 {}",
                session.username(),
                resp.status
            );
            return Ok(None);
        }
        Ok(project_class_id_from(&resp.data))
    }

    /// 按关键字查询课程目录，空关键字返回全目录的第一页
    pub async fn query_courses(
        &self,
        session: &Session,
        search_key: &str,
    ) -> Result<Vec<CourseRecord>> {
        let params = json!({
            "data": "course,detail",
            "page.curPage": 1,
            "page.pageSize": self.config.video_play.each_batch,
            "page.searchItem.classId": self.class_id(session),
            "page.searchItem.status": 0,
            "page.searchItem.searchKey": search_key,
            "page.orderBy": 1,
        });
        let resp = session
            .api()
            .api_get(&self.config.web.course_status_url, &params)
            .await?;
        if !resp.ok {
            warn!(
                "[用户 {}] 课程目录查询返回状态码 {}",
                session.username(),
                resp.status
            );
            return Ok(Vec::new());
        }
        let records: Vec<CourseRecord> = resp
            .page_items()
            .iter()
            .filter_map(CourseRecord::from_value)
            .collect();
        random_delay(0.0, 2.0).await;
        Ok(records)
    }

    /// 为账号选出本次要学习的课程列表（必修在前，补充在后）
    pub async fn select_courses_to_study(
        &self,
        session: &Session,
        account: &Account,
    ) -> Result<Vec<CourseRecord>> {
        let tag = format!("[用户 {}_{}]", account.user_name, account.username);
        let mut selection = CourseSelection::new();

        for name in &account.must_learn_course {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            info!("{} 查询必修课程: {}", tag, name);
            random_delay(1.0, 2.0).await;

            let records = self.query_courses(session, name).await?;
            let Some(course) = records.into_iter().next() else {
                warn!("{} 未找到必修课程: {}", tag, name);
                continue;
            };
            if !course.is_usable() {
                warn!("{} 必修课程 {} 数据不完整，跳过", tag, course.name);
                continue;
            }
            if course.is_completed() {
                info!(
                    "{} 必修课程 {} 已完成，学分 {}",
                    tag,
                    course.name,
                    course.credit.unwrap_or(0)
                );
            } else {
                info!(
                    "{} 必修课程 {} 待学习，学分 {}",
                    tag,
                    course.name,
                    course.credit.unwrap_or(0)
                );
            }
            selection.absorb_mandatory(&course);
        }

        info!(
            "{} 必修课程统计: 已完成学分 {}，待学习学分 {}，目标学分 {}",
            tag, selection.accumulated_credit, selection.pending_credit, account.need_credit
        );
        if selection.satisfies(account.need_credit) {
            info!("{} 必修课程已满足目标学分", tag);
            return Ok(selection.into_pending());
        }

        info!("{} 学分不足，查询课程目录补充", tag);
        let catalog = self.query_courses(session, "").await?;
        selection.absorb_completed_supplemental(&catalog);
        selection.fill_pending_until(&catalog, account.need_credit);

        if !selection.satisfies(account.need_credit) {
            warn!(
                "{} 课程目录不足以凑够目标学分: 目标 {}，当前可得 {}",
                tag,
                account.need_credit,
                selection.accumulated_credit + selection.pending_credit
            );
        }
        info!(
            "{} 选课完成: 已完成学分 {}，待学习 {} 门课程（学分 {}）",
            tag,
            selection.accumulated_credit,
            selection.pending_courses().len(),
            selection.pending_credit
        );
        Ok(selection.into_pending())
    }

    /// 选课进入课程空间，返回平台是否确认成功
    pub async fn select_elective(&self, session: &Session, course: &CourseRecord) -> Result<bool> {
        let params = json!({
            "entity.openCourse": course.open_course_id,
            "entity.projectId": "",
        });
        let resp = session
            .api()
            .api_get(&self.config.web.select_elective_url, &params)
            .await?;
        if !resp.ok {
            warn!(
                "[用户 {}] 选课接口返回状态码 {}",
                session.username(),
                resp.status
            );
            return Ok(false);
        }
        Ok(flag_is_one(resp.pointer("/page/items/0/message/success")))
    }
}

/// 项目列表查询的固定参数（本年度学分排序、项目类型 4）
fn project_query_params() -> Value {
    json!({
        "data": "info",
        "page.curPage": 1,
        "page.pageSize": 100,
        "page.searchItem.type": 0,
        "page.searchItem.searchScoreTypeSort": "sort2025",
        "page.searchItem.typeId": 4,
    })
}

/// 从项目列表响应中取第一个项目的 id 作为班级 ID
fn project_class_id_from(data: &Value) -> Option<String> {
    let code_ok = data.get("errorCode").and_then(|v| v.as_str()) == Some("0");
    let msg_ok = data.get("errorMessage").and_then(|v| v.as_str()) == Some("成功");
    if !code_ok || !msg_ok {
        return None;
    }
    json_field_string(data.pointer("/page/items/0/id"))
}

/// 平台的布尔标志：字符串 "1" 或数字 1 视为真
fn flag_is_one(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// 字符串或数字字段统一取成字符串
fn json_field_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_one_variants() {
        assert!(flag_is_one(Some(&json!("1"))));
        assert!(flag_is_one(Some(&json!(1))));
        assert!(!flag_is_one(Some(&json!("0"))));
        assert!(!flag_is_one(Some(&json!(true))));
        assert!(!flag_is_one(None));
    }

    #[test]
    fn test_project_query_params_carry_required_fields() {
        let params = project_query_params();
        assert_eq!(params["data"], "info");
        assert_eq!(params["page.curPage"], 1);
        assert_eq!(params["page.pageSize"], 100);
        assert_eq!(params["page.searchItem.type"], 0);
        assert_eq!(params["page.searchItem.searchScoreTypeSort"], "sort2025");
        assert_eq!(params["page.searchItem.typeId"], 4);
    }

    #[test]
    fn test_project_class_id_reads_first_item_id() {
        let data = json!({
            "errorCode": "0",
            "errorMessage": "成功",
            "page": {"items": [{"id": "cls-2025", "info": {"classId": "wrong"}}]}
        });
        assert_eq!(project_class_id_from(&data), Some("cls-2025".to_string()));
    }

    #[test]
    fn test_project_class_id_requires_success_envelope() {
        let data = json!({
            "errorCode": "403",
            "errorMessage": "未登录",
            "page": {"items": [{"id": "cls-2025"}]}
        });
        assert_eq!(project_class_id_from(&data), None);
        assert_eq!(project_class_id_from(&json!({"errorCode": "0"})), None);
    }

    #[test]
    fn test_json_field_string_coerces_numbers() {
        assert_eq!(json_field_string(Some(&json!("c-9"))), Some("c-9".to_string()));
        assert_eq!(json_field_string(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(json_field_string(Some(&json!(""))), None);
        assert_eq!(json_field_string(None), None);
    }
}

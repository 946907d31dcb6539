//! 课程记录与选课工作集

use serde_json::Value;

/// 平台课程目录中的一条记录
///
/// 平台返回的 JSON 字段并不稳定，缺失的字段一律降级为 `None`，
/// 绝不因字段缺失而报错。没有 id 的记录视为不可用数据。
#[derive(Clone, Debug)]
pub struct CourseRecord {
    pub id: String,
    pub name: String,
    /// 完成百分比（0-100），缺失表示数据不可用
    pub percent: Option<i64>,
    /// 课程学分，缺失表示数据不可用
    pub credit: Option<i64>,
    pub open_course_id: String,
    pub learnspace_url: String,
}

impl CourseRecord {
    /// 从目录接口返回的一条 JSON 记录构建，无 id 时返回 None
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value_to_string(value.get("id"))?;
        Some(Self {
            id,
            name: value_to_string(value.get("name")).unwrap_or_default(),
            percent: value_to_i64(value.get("percent")),
            credit: value_to_i64(value.get("credit")),
            open_course_id: value_to_string(value.get("openCourseId")).unwrap_or_default(),
            learnspace_url: value_to_string(value.get("learnspaceUrl")).unwrap_or_default(),
        })
    }

    /// percent 与 credit 均存在时才可参与选课
    pub fn is_usable(&self) -> bool {
        self.percent.is_some() && self.credit.is_some()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.percent, Some(p) if p >= 100)
    }
}

/// 数字和字符串形式的数值都按数值处理
fn value_to_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 选课工作集
///
/// 同一课程 id 只会出现在已完成或待学习集合之一，学分不会重复累计。
/// 待学习列表保持插入顺序：必修课在前，补充课程在后。
#[derive(Debug, Default)]
pub struct CourseSelection {
    completed_ids: Vec<String>,
    pending: Vec<CourseRecord>,
    /// 已完成课程累计学分
    pub accumulated_credit: i64,
    /// 待学习课程预计学分
    pub pending_credit: i64,
}

impl CourseSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed_recorded(&self, id: &str) -> bool {
        self.completed_ids.iter().any(|c| c == id)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|c| c.id == id)
    }

    /// 记录一门已完成课程，重复 id 不再计分
    pub fn add_completed(&mut self, course: &CourseRecord) -> bool {
        if self.is_completed_recorded(&course.id) {
            return false;
        }
        self.completed_ids.push(course.id.clone());
        self.accumulated_credit += course.credit.unwrap_or(0);
        true
    }

    /// 加入一门待学习课程，重复 id 不再加入
    pub fn add_pending(&mut self, course: &CourseRecord) -> bool {
        if self.is_pending(&course.id) {
            return false;
        }
        self.pending_credit += course.credit.unwrap_or(0);
        self.pending.push(course.clone());
        true
    }

    /// 已完成 + 待学习学分是否达到目标学分
    pub fn satisfies(&self, need_credit: i64) -> bool {
        self.accumulated_credit + self.pending_credit >= need_credit
    }

    /// 归类一门必修课查询结果：完成计入已完成学分，未完成加入待学习
    ///
    /// percent 或 credit 缺失的记录整条跳过（视为不可用数据，不按 0 处理）。
    pub fn absorb_mandatory(&mut self, course: &CourseRecord) {
        if !course.is_usable() {
            return;
        }
        if course.is_completed() {
            self.add_completed(course);
        } else {
            self.add_pending(course);
        }
    }

    /// 第一遍补充：统计目录中已完成、尚未计分的课程学分
    pub fn absorb_completed_supplemental(&mut self, courses: &[CourseRecord]) {
        for course in courses {
            if !course.is_usable() || !course.is_completed() {
                continue;
            }
            self.add_completed(course);
        }
    }

    /// 第二遍补充：按目录顺序贪心加入未完成课程，凑足目标学分即停
    ///
    /// 不做最小学分溢出优化，按目录顺序先到先选。
    pub fn fill_pending_until(&mut self, courses: &[CourseRecord], need_credit: i64) {
        for course in courses {
            if self.satisfies(need_credit) {
                break;
            }
            if !course.is_usable() || course.is_completed() || self.is_pending(&course.id) {
                continue;
            }
            self.add_pending(course);
        }
    }

    pub fn pending_courses(&self) -> &[CourseRecord] {
        &self.pending
    }

    pub fn into_pending(self) -> Vec<CourseRecord> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course(id: &str, percent: i64, credit: i64) -> CourseRecord {
        CourseRecord {
            id: id.to_string(),
            name: format!("课程{}", id),
            percent: Some(percent),
            credit: Some(credit),
            open_course_id: String::new(),
            learnspace_url: String::new(),
        }
    }

    #[test]
    fn test_from_value_string_numbers() {
        let record = CourseRecord::from_value(&json!({
            "id": 1024,
            "name": "职业病防治",
            "percent": "35",
            "credit": 5,
            "openCourseId": "oc-1",
            "learnspaceUrl": "https://youxun.webtrn.cn"
        }))
        .unwrap();
        assert_eq!(record.id, "1024");
        assert_eq!(record.percent, Some(35));
        assert_eq!(record.credit, Some(5));
    }

    #[test]
    fn test_from_value_missing_fields_degrade() {
        let record = CourseRecord::from_value(&json!({"id": "c1"})).unwrap();
        assert!(record.percent.is_none());
        assert!(!record.is_usable());

        assert!(CourseRecord::from_value(&json!({"name": "无id"})).is_none());
    }

    #[test]
    fn test_mandatory_only_satisfies_quota() {
        // 必修课已完成 10 分 + 未完成 5 分，目标 15 分 → 只返回必修未完成课程
        let mut selection = CourseSelection::new();
        selection.absorb_mandatory(&course("a", 100, 10));
        selection.absorb_mandatory(&course("b", 40, 5));
        assert!(selection.satisfies(15));
        let pending = selection.into_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "b");
    }

    #[test]
    fn test_dedup_by_id_never_double_counts() {
        let mut selection = CourseSelection::new();
        selection.absorb_mandatory(&course("a", 100, 10));
        selection.absorb_mandatory(&course("a", 100, 10));
        selection.absorb_mandatory(&course("b", 0, 5));
        selection.absorb_mandatory(&course("b", 0, 5));
        assert_eq!(selection.accumulated_credit, 10);
        assert_eq!(selection.pending_credit, 5);
        assert_eq!(selection.pending_courses().len(), 1);
    }

    #[test]
    fn test_greedy_fill_stops_at_quota() {
        // 无必修课，目标 10 分：按目录顺序加入，凑足即停，不会越过
        let catalog = vec![
            course("c1", 0, 4),
            course("c2", 0, 6),
            course("c3", 0, 8),
        ];
        let mut selection = CourseSelection::new();
        selection.fill_pending_until(&catalog, 10);
        assert_eq!(selection.pending_credit, 10);
        let pending = selection.pending_courses();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "c1");
        assert_eq!(pending[1].id, "c2");
    }

    #[test]
    fn test_completed_supplemental_counts_toward_quota() {
        let catalog = vec![course("c1", 100, 8), course("c2", 0, 5)];
        let mut selection = CourseSelection::new();
        selection.absorb_completed_supplemental(&catalog);
        assert_eq!(selection.accumulated_credit, 8);
        // 已满足则第二遍不再加课
        selection.fill_pending_until(&catalog, 8);
        assert!(selection.pending_courses().is_empty());
    }

    #[test]
    fn test_unusable_records_are_skipped() {
        let broken = CourseRecord {
            id: "x".to_string(),
            name: "缺学分".to_string(),
            percent: Some(0),
            credit: None,
            open_course_id: String::new(),
            learnspace_url: String::new(),
        };
        let mut selection = CourseSelection::new();
        selection.absorb_mandatory(&broken);
        selection.fill_pending_until(std::slice::from_ref(&broken), 10);
        assert!(selection.pending_courses().is_empty());
        assert_eq!(selection.accumulated_credit, 0);
    }

    #[test]
    fn test_pending_keeps_insertion_order() {
        let mut selection = CourseSelection::new();
        selection.absorb_mandatory(&course("m1", 10, 2));
        selection.absorb_mandatory(&course("m2", 20, 2));
        selection.fill_pending_until(&[course("s1", 0, 2), course("s2", 0, 2)], 8);
        let ids: Vec<&str> = selection
            .pending_courses()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "s1", "s2"]);
    }
}

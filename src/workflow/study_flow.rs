//! 单账号学习流程
//!
//! 一个账号的完整剧本：设置检查 → 项目班级查询 → 学分选课 →
//! 逐门课程进入课程空间学习。课程之间、内容之间互不影响：
//! 单门课程或单条内容失败只记录日志并跳过，流程继续。
//! 课程页面在所有退出路径上都会被关闭。

use anyhow::Result;
use chromiumoxide::Page;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::{create_page_in_context, prepare_page};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::infrastructure::{default_end_patterns, JsExecutor, NetworkGuard, VideoEndSignal};
use crate::models::{count_contents, prune_unfinished, Account, ContentItem, ContentKind, CourseRecord};
use crate::services::traversal::{
    dismiss_help_overlay, parse_course_structure, reveal_hidden_sections, CourseDom,
};
use crate::services::{CatalogService, Session, VideoPlayer};
use crate::utils::logging::truncate_text;
use crate::utils::random_delay;
use crate::workflow::user_ctx::UserCtx;

/// 单账号学习流程
pub struct StudyFlow {
    config: AppConfig,
    ctx: UserCtx,
}

impl StudyFlow {
    pub fn new(config: AppConfig, ctx: UserCtx) -> Self {
        Self { config, ctx }
    }

    /// 跑完一个账号的全部学习任务
    pub async fn run(&self, account: &Account, session: &mut Session) -> Result<()> {
        let ctx = &self.ctx;
        random_delay(1.0, 1.0).await;
        info!("{} 开始学习流程", ctx);

        let catalog = CatalogService::new(&self.config);
        if catalog.check_need_settings(session).await? {
            warn!("{} 账号需要先完成信息设置，无法自动学习，跳过", ctx);
            return Ok(());
        }

        match catalog.fetch_project_class_id(session).await? {
            Some(class_id) => {
                info!("{} 项目班级 ID: {}", ctx, class_id);
                session.set_class_id(class_id);
            }
            None => {
                if self.config.video_play.class_id.is_empty() {
                    warn!("{} 未查询到项目班级 ID 且无配置回退值，跳过", ctx);
                    return Ok(());
                }
                info!("{} 未查询到项目班级 ID，使用配置回退值", ctx);
            }
        }

        let courses = catalog.select_courses_to_study(session, account).await?;
        if courses.is_empty() {
            info!("{} 没有待学习课程", ctx);
            return Ok(());
        }

        for (index, course) in courses.iter().enumerate() {
            info!(
                "{} 开始学习课程 ({}/{}): {}",
                ctx,
                index + 1,
                courses.len(),
                course.name
            );
            if let Err(e) = self.study_single_course(session, course).await {
                error!("{} 课程 {} 学习失败，跳过: {}", ctx, course.name, e);
            }
            random_delay(2.0, 2.0).await;
        }

        info!("✅ {} 学习流程结束", ctx);
        Ok(())
    }

    /// 学习单门课程：选课进入课程空间，开独立页面学习，最后关闭页面
    async fn study_single_course(&self, session: &Session, course: &CourseRecord) -> Result<()> {
        let ctx = &self.ctx;
        let catalog = CatalogService::new(&self.config);

        if !catalog.select_elective(session, course).await? {
            error!("{} 课程 {} 进入课程空间失败，跳过", ctx, course.name);
            return Ok(());
        }
        random_delay(1.0, 2.0).await;

        let page =
            create_page_in_context(session.browser(), session.context_id(), "about:blank").await?;
        prepare_page(&page).await?;
        let guard = NetworkGuard::install(&page, default_end_patterns()).await?;
        let signal = guard.signal();

        // 无论学习结果如何，课程页面都要关闭
        let outcome = self.open_and_study(&page, &signal, course).await;
        if let Err(e) = page.close().await {
            warn!("{} 关闭课程页面失败: {}", ctx, e);
        }
        outcome
    }

    async fn open_and_study(
        &self,
        page: &Page,
        signal: &VideoEndSignal,
        course: &CourseRecord,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let url = build_course_url(
            &course.learnspace_url,
            &course.id,
            &self.ctx.username,
            &self.config.web.site_code,
        );
        page.goto(&url)
            .await
            .map_err(|e| AppError::navigation_failed(&url, e))?;
        random_delay(2.0, 2.0).await;

        if let Ok(Some(title)) = page.get_title().await {
            if title == "课程未发布" {
                warn!("{} 课程 {} 未发布，跳过", ctx, course.name);
                return Ok(());
            }
        }

        let js = JsExecutor::new(page.clone());
        dismiss_help_overlay(&js).await?;
        info!("{} 已关闭学习助手弹层", ctx);

        let dom = CourseDom::new(&js);
        dom.wait_ready(Duration::from_secs(30)).await?;
        reveal_hidden_sections(&dom).await?;
        random_delay(1.0, 2.0).await;

        let tag = ctx.to_string();
        let tree = parse_course_structure(&dom, &tag).await?;
        let plan = prune_unfinished(tree);
        let total = count_contents(&plan);
        if total == 0 {
            info!("{} 课程 {} 没有待学习内容", ctx, course.name);
            return Ok(());
        }
        info!(
            "{} 课程 {} 共 {} 章，待学习内容 {} 条",
            ctx,
            course.name,
            plan.len(),
            total
        );

        let mut done = 0;
        for chapter in &plan {
            info!("{} ▶ 章节: {}", ctx, chapter.title);
            for section in &chapter.sections {
                info!("{} ▷ 小节: {}", ctx, section.title);
                for item in &section.contents {
                    done += 1;
                    info!(
                        "{} 学习内容 ({}/{}): {} [{}]",
                        ctx,
                        done,
                        total,
                        truncate_text(&item.title, 30),
                        item.kind
                    );
                    if let Err(e) = self.study_single_content(&js, &dom, signal, item).await {
                        error!(
                            "{} 内容 {} 学习失败，跳过: {}",
                            ctx,
                            truncate_text(&item.title, 30),
                            e
                        );
                    }
                    random_delay(1.0, 2.0).await;
                }
            }
        }

        info!("{} 课程 {} 学习完成", ctx, course.name);
        Ok(())
    }

    /// 学习单条内容：点击目录节点后按类型分派
    async fn study_single_content(
        &self,
        js: &JsExecutor,
        dom: &CourseDom<'_>,
        signal: &VideoEndSignal,
        item: &ContentItem,
    ) -> Result<()> {
        let ctx = &self.ctx;
        random_delay(1.0, 2.0).await;
        dom.click(&item.node.indices()).await?;
        sleep(Duration::from_secs(1)).await;

        match &item.kind {
            ContentKind::Video => {
                let tag = ctx.to_string();
                let player = VideoPlayer::new(js, signal, &tag);
                player.play_with_retry(&item.node).await?;
            }
            ContentKind::Document => {
                info!("{} 文档内容，停留阅读", ctx);
                random_delay(2.0, 2.0).await;
            }
            ContentKind::Test => {
                info!("{} 测验内容，暂不自动作答", ctx);
                random_delay(1.0, 2.0).await;
            }
            ContentKind::Other(kind) => {
                info!("{} 暂不支持的内容类型: {}", ctx, kind);
                random_delay(1.0, 2.0).await;
            }
        }
        Ok(())
    }
}

/// 拼接课程空间入口 URL（courseId 用课程记录的 id，不是 openCourseId）
fn build_course_url(
    learnspace_url: &str,
    course_id: &str,
    login_id: &str,
    site_code: &str,
) -> String {
    format!(
        "{}/learnspace/sign/signLearn.action\
         ?template=blue&courseId={}&loginType=true&loginId={}&sign=0&siteCode={}&domain=youxun.webtrn.cn",
        learnspace_url.trim_end_matches('/'),
        course_id,
        login_id,
        site_code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_course_url() {
        let url = build_course_url("https://youxun.webtrn.cn/", "c-77", "user01", "youxun");
        assert!(url.starts_with(
            "https://youxun.webtrn.cn/learnspace/sign/signLearn.action?"
        ));
        assert!(url.contains("courseId=c-77"));
        assert!(url.contains("loginId=user01"));
        assert!(url.contains("siteCode=youxun"));
        assert!(url.contains("sign=0"));
        // 末尾斜杠不会拼出双斜杠
        assert!(!url.contains(".cn//learnspace"));
    }
}

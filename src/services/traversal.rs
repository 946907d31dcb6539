//! 课程目录解析
//!
//! 课程主页把目录放在 `#mainCont` iframe 内的 `#learnMenu` 节点下，
//! 结构是打平的兄弟列表：`s_chapter` 标记节点后面紧跟章内容容器，
//! 容器内 `s_section` 标记节点后面紧跟小节容器，交替排布。
//! 解析前先把隐藏的容器全部展开，保证 children 下标稳定。
//!
//! chromiumoxide 没有跨 iframe 的元素句柄，所有 DOM 操作都通过
//! 页内 JS 以下标路径定位完成。

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AppError, BrowserError};
use crate::infrastructure::JsExecutor;
use crate::models::{Chapter, ContentItem, ContentKind, NodePath, Section};

/// 定位到目录根节点的 JS 前置段
const MENU_PRELUDE: &str = r#"
    const cont = document.querySelector('#mainCont');
    const doc = cont && cont.contentDocument;
    const menu = doc && doc.querySelector('#learnMenu');
"#;

/// 可能为 null 的 JS 返回值统一包一层对象，避免顶层 null 无法反序列化
#[derive(Debug, Deserialize)]
struct JsOpt {
    v: Option<String>,
}

/// 目录根节点存在性表达式（供轮询等待）
const MENU_READY_EXPR: &str = "document.querySelector('#mainCont') \
    && document.querySelector('#mainCont').contentDocument \
    && document.querySelector('#mainCont').contentDocument.querySelector('#learnMenu')";

/// 课程目录的 DOM 访问原语
///
/// 所有方法按 children 下标路径定位节点，路径越界按"节点不存在"
/// 降级处理，不上抛 JS 异常。
pub struct CourseDom<'a> {
    js: &'a JsExecutor,
}

impl<'a> CourseDom<'a> {
    pub fn new(js: &'a JsExecutor) -> Self {
        Self { js }
    }

    fn element_expr(path: &[usize]) -> String {
        let mut expr = String::from("menu");
        for idx in path {
            expr.push_str(&format!(".children[{}]", idx));
        }
        expr
    }

    /// 等待目录根节点出现
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        if self.js.wait_for_truthy(MENU_READY_EXPR, "课程目录", timeout).await? {
            Ok(())
        } else {
            Err(AppError::Browser(BrowserError::ElementWaitTimeout {
                what: "课程目录".to_string(),
            })
            .into())
        }
    }

    /// 路径处节点的子节点数量，节点不存在返回 0
    pub async fn child_count(&self, path: &[usize]) -> Result<usize> {
        let el = Self::element_expr(path);
        let count: i64 = self
            .js
            .eval_as(format!(
                "(() => {{ {MENU_PRELUDE} try {{ const el = {el}; \
                 return el ? el.children.length : 0; }} catch (e) {{ return 0; }} }})()"
            ))
            .await?;
        Ok(count.max(0) as usize)
    }

    /// 路径处节点的属性值
    pub async fn attr(&self, path: &[usize], name: &str) -> Result<Option<String>> {
        let el = Self::element_expr(path);
        let result: JsOpt = self
            .js
            .eval_as(format!(
                "(() => {{ {MENU_PRELUDE} try {{ const el = {el}; \
                 return {{ v: el ? el.getAttribute({name:?}) : null }}; }} \
                 catch (e) {{ return {{ v: null }}; }} }})()"
            ))
            .await?;
        Ok(result.v)
    }

    /// 滚动到路径处节点并点击，节点不存在时报错
    pub async fn click(&self, path: &[usize]) -> Result<()> {
        let el = Self::element_expr(path);
        let clicked: bool = self
            .js
            .eval_as(format!(
                "(() => {{ {MENU_PRELUDE} try {{ const el = {el}; if (!el) return false; \
                 el.scrollIntoView({{block: 'center'}}); el.click(); return true; }} \
                 catch (e) {{ return false; }} }})()"
            ))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(AppError::Browser(BrowserError::ElementWaitTimeout {
                what: format!("目录节点 {:?}", path),
            })
            .into())
        }
    }

    /// 路径处内容项的完成角标数量（学完后平台会插入 flagover 图标）
    pub async fn completion_badge_count(&self, node: &NodePath) -> Result<usize> {
        let el = Self::element_expr(&node.indices());
        let count: i64 = self
            .js
            .eval_as(format!(
                "(() => {{ {MENU_PRELUDE} try {{ const el = {el}; \
                 return el ? el.querySelectorAll('span.flagover-icon').length : 0; }} \
                 catch (e) {{ return 0; }} }})()"
            ))
            .await?;
        Ok(count.max(0) as usize)
    }
}

/// 展开目录里所有隐藏的容器节点，返回展开数量
///
/// 必须在解析前执行，否则隐藏小节的内容项数量会是 0。
pub async fn reveal_hidden_sections(dom: &CourseDom<'_>) -> Result<usize> {
    let shown: i64 = dom
        .js
        .eval_as(format!(
            "(() => {{ {MENU_PRELUDE} if (!menu) return 0; let shown = 0; \
             const reveal = (el) => {{ for (const child of el.children) {{ \
             if (child.style && child.style.display === 'none') {{ \
             child.style.display = 'block'; shown++; }} reveal(child); }} }}; \
             reveal(menu); return shown; }})()"
        ))
        .await?;
    debug!("展开 {} 个隐藏目录节点", shown);
    Ok(shown.max(0) as usize)
}

/// 目录解析所需的最小节点读取能力，便于单元测试驱动解析逻辑
pub(crate) trait MenuNodes {
    async fn node_count(&self, path: &[usize]) -> Result<usize>;
    async fn node_attr(&self, path: &[usize], name: &str) -> Result<Option<String>>;
}

impl MenuNodes for CourseDom<'_> {
    async fn node_count(&self, path: &[usize]) -> Result<usize> {
        self.child_count(path).await
    }

    async fn node_attr(&self, path: &[usize], name: &str) -> Result<Option<String>> {
        self.attr(path, name).await
    }
}

/// 解析课程目录为 章 → 节 → 内容项 的树
///
/// 标记节点与容器节点成对出现，按步长 2 推进；夹在中间的
/// 非标记节点（分隔线等）逐个跳过。
pub async fn parse_course_structure(dom: &CourseDom<'_>, tag: &str) -> Result<Vec<Chapter>> {
    dom.wait_ready(Duration::from_secs(30)).await?;
    let chapters = parse_menu(dom).await?;
    info!("{} 目录解析完成，共 {} 章", tag, chapters.len());
    Ok(chapters)
}

/// 各级标题一律取节点的 title 属性（textContent 会把子树文本串在一起）
async fn parse_menu<D: MenuNodes>(dom: &D) -> Result<Vec<Chapter>> {
    let top = dom.node_count(&[]).await?;
    let mut chapters = Vec::new();
    let mut i = 0;
    while i + 1 < top {
        let class = dom.node_attr(&[i], "class").await?.unwrap_or_default();
        if !class.contains("s_chapter") {
            i += 1;
            continue;
        }
        let chapter_title = dom.node_attr(&[i], "title").await?.unwrap_or_default();

        let section_nodes = dom.node_count(&[i + 1]).await?;
        let mut sections = Vec::new();
        let mut j = 0;
        while j + 1 < section_nodes {
            let sclass = dom.node_attr(&[i + 1, j], "class").await?.unwrap_or_default();
            if !sclass.contains("s_section") {
                j += 1;
                continue;
            }
            let section_title = dom.node_attr(&[i + 1, j], "title").await?.unwrap_or_default();

            let item_count = dom.node_count(&[i + 1, j + 1]).await?;
            let mut contents = Vec::new();
            for k in 0..item_count {
                let path = [i + 1, j + 1, k];
                let kind = ContentKind::parse(
                    &dom.node_attr(&path, "itemtype").await?.unwrap_or_default(),
                );
                let completed =
                    dom.node_attr(&path, "completestate").await?.as_deref() == Some("1");
                let title = dom.node_attr(&path, "title").await?.unwrap_or_default();
                contents.push(ContentItem {
                    title,
                    kind,
                    completed,
                    node: NodePath {
                        chapter: i,
                        section: j,
                        item: k,
                    },
                });
            }
            sections.push(Section {
                title: section_title,
                contents,
            });
            j += 2;
        }
        chapters.push(Chapter {
            title: chapter_title,
            sections,
        });
        i += 2;
    }

    Ok(chapters)
}

/// 等待并关闭课程主页的学习助手弹层
///
/// 弹层不关闭会挡住目录点击。弹层 iframe 超时未出现视为页面异常。
pub async fn dismiss_help_overlay(js: &JsExecutor) -> Result<()> {
    let appeared = js
        .wait_for_truthy(
            "document.querySelector('#learnHelperIframe')",
            "学习助手弹层",
            Duration::from_secs(30),
        )
        .await?;
    if !appeared {
        return Err(AppError::Browser(BrowserError::ElementWaitTimeout {
            what: "学习助手弹层".to_string(),
        })
        .into());
    }

    let closed: bool = js
        .eval_as(
            r#"(() => {
                try {
                    const frame = document.querySelector('#learnHelperIframe');
                    const doc = frame && frame.contentDocument;
                    const link = doc && doc.querySelector("a[onclick='closeLearnHelper()']");
                    if (link) { link.click(); return true; }
                    return false;
                } catch (e) { return false; }
            })()"#,
        )
        .await?;
    if closed {
        debug!("学习助手弹层已关闭");
        Ok(())
    } else {
        Err(AppError::Browser(BrowserError::ElementWaitTimeout {
            what: "学习助手关闭按钮".to_string(),
        })
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 内存中的目录节点树，按同样的下标路径规则取节点
    struct FakeNode {
        attrs: Vec<(&'static str, &'static str)>,
        children: Vec<FakeNode>,
    }

    impl FakeNode {
        fn new(attrs: &[(&'static str, &'static str)]) -> Self {
            Self {
                attrs: attrs.to_vec(),
                children: Vec::new(),
            }
        }

        fn with_children(mut self, children: Vec<FakeNode>) -> Self {
            self.children = children;
            self
        }
    }

    struct FakeMenu {
        roots: Vec<FakeNode>,
    }

    impl FakeMenu {
        fn node(&self, path: &[usize]) -> Option<&FakeNode> {
            let mut node = self.roots.get(*path.first()?)?;
            for idx in &path[1..] {
                node = node.children.get(*idx)?;
            }
            Some(node)
        }
    }

    impl MenuNodes for FakeMenu {
        async fn node_count(&self, path: &[usize]) -> Result<usize> {
            if path.is_empty() {
                return Ok(self.roots.len());
            }
            Ok(self.node(path).map_or(0, |n| n.children.len()))
        }

        async fn node_attr(&self, path: &[usize], name: &str) -> Result<Option<String>> {
            Ok(self.node(path).and_then(|n| {
                n.attrs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
            }))
        }
    }

    fn sample_menu() -> FakeMenu {
        FakeMenu {
            roots: vec![
                FakeNode::new(&[("class", "s_split")]),
                FakeNode::new(&[("class", "s_chapter"), ("title", "第一章 概论")]),
                FakeNode::new(&[]).with_children(vec![
                    FakeNode::new(&[("class", "s_section"), ("title", "1.1 绪论")]),
                    FakeNode::new(&[]).with_children(vec![
                        FakeNode::new(&[
                            ("title", "视频一"),
                            ("itemtype", "video"),
                            ("completestate", "0"),
                        ]),
                        FakeNode::new(&[
                            ("title", "文档一"),
                            ("itemtype", "doc"),
                            ("completestate", "1"),
                        ]),
                    ]),
                ]),
            ],
        }
    }

    // 章、节、内容项三级标题都来自节点的 title 属性，而不是节点文本
    #[tokio::test]
    async fn test_parse_menu_reads_titles_from_title_attribute() {
        let menu = sample_menu();
        let chapters = parse_menu(&menu).await.unwrap();

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "第一章 概论");
        assert_eq!(chapters[0].sections.len(), 1);
        assert_eq!(chapters[0].sections[0].title, "1.1 绪论");

        let contents = &chapters[0].sections[0].contents;
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].title, "视频一");
        assert_eq!(contents[0].kind, ContentKind::Video);
        assert!(!contents[0].completed);
        assert_eq!(contents[1].title, "文档一");
        assert!(contents[1].completed);
    }

    #[tokio::test]
    async fn test_parse_menu_skips_non_marker_nodes() {
        let menu = sample_menu();
        let chapters = parse_menu(&menu).await.unwrap();
        // 分隔线占了下标 0，章标记在 1，内容项路径按实际下标记录
        assert_eq!(chapters[0].sections[0].contents[0].node.indices(), [2, 1, 0]);
    }

    #[test]
    fn test_element_expr_builds_index_chain() {
        assert_eq!(CourseDom::element_expr(&[]), "menu");
        assert_eq!(
            CourseDom::element_expr(&[3, 5, 1]),
            "menu.children[3].children[5].children[1]"
        );
    }

    #[test]
    fn test_menu_ready_expr_reaches_into_iframe() {
        assert!(MENU_READY_EXPR.contains("#mainCont"));
        assert!(MENU_READY_EXPR.contains("contentDocument"));
        assert!(MENU_READY_EXPR.contains("#learnMenu"));
    }
}

//! 课程内容树
//!
//! 课程目录在页面上是一个打平的兄弟节点列表：章节标记节点后面紧跟
//! 它的内容容器节点，小节一层重复同样的交替模式。解析结果组织成
//! 章 → 节 → 内容项 的两级树，内容项持有定位节点用的下标路径。

use std::fmt;

/// 内容项在目录 DOM 中的位置
///
/// `chapter`/`section` 是标记节点在各自打平列表中的原始下标
/// （对应内容容器位于下标 +1 处），`item` 是内容项在容器内的下标。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodePath {
    pub chapter: usize,
    pub section: usize,
    pub item: usize,
}

impl NodePath {
    /// 从目录根节点到该内容项的 children 下标序列
    pub fn indices(&self) -> [usize; 3] {
        [self.chapter + 1, self.section + 1, self.item]
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.indices();
        write!(f, "{}.{}.{}", a, b, c)
    }
}

/// 内容项类型，由节点的 itemtype 属性解析而来
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Video,
    Document,
    Test,
    Other(String),
}

impl ContentKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "video" => ContentKind::Video,
            "doc" => ContentKind::Document,
            "test" => ContentKind::Test,
            other => ContentKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Video => write!(f, "video"),
            ContentKind::Document => write!(f, "doc"),
            ContentKind::Test => write!(f, "test"),
            ContentKind::Other(s) => write!(f, "{}", s),
        }
    }
}

/// 单个内容项
#[derive(Clone, Debug)]
pub struct ContentItem {
    pub title: String,
    pub kind: ContentKind,
    /// completestate 属性为 "1" 时表示已完成
    pub completed: bool,
    pub node: NodePath,
}

/// 小节
#[derive(Clone, Debug)]
pub struct Section {
    pub title: String,
    pub contents: Vec<ContentItem>,
}

/// 章节
#[derive(Clone, Debug)]
pub struct Chapter {
    pub title: String,
    pub sections: Vec<Section>,
}

/// 过滤出仍需学习的部分
///
/// 只保留含有未完成内容项的小节，只保留含有此类小节的章节；
/// 被整体剔除的章节/小节不算错误，只是不进入学习计划。
pub fn prune_unfinished(chapters: Vec<Chapter>) -> Vec<Chapter> {
    chapters
        .into_iter()
        .filter_map(|chapter| {
            let sections: Vec<Section> = chapter
                .sections
                .into_iter()
                .filter_map(|section| {
                    let contents: Vec<ContentItem> = section
                        .contents
                        .into_iter()
                        .filter(|item| !item.completed)
                        .collect();
                    if contents.is_empty() {
                        None
                    } else {
                        Some(Section {
                            title: section.title,
                            contents,
                        })
                    }
                })
                .collect();
            if sections.is_empty() {
                None
            } else {
                Some(Chapter {
                    title: chapter.title,
                    sections,
                })
            }
        })
        .collect()
}

/// 统计待学习内容项总数
pub fn count_contents(chapters: &[Chapter]) -> usize {
    chapters
        .iter()
        .map(|c| c.sections.iter().map(|s| s.contents.len()).sum::<usize>())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, completed: bool) -> ContentItem {
        ContentItem {
            title: title.to_string(),
            kind: ContentKind::Video,
            completed,
            node: NodePath {
                chapter: 0,
                section: 0,
                item: 0,
            },
        }
    }

    fn chapter(title: &str, sections: Vec<Section>) -> Chapter {
        Chapter {
            title: title.to_string(),
            sections,
        }
    }

    fn section(title: &str, contents: Vec<ContentItem>) -> Section {
        Section {
            title: title.to_string(),
            contents,
        }
    }

    #[test]
    fn test_fully_completed_chapter_is_pruned() {
        let tree = vec![chapter(
            "第一章",
            vec![section("1.1", vec![item("a", true), item("b", true)])],
        )];
        assert!(prune_unfinished(tree).is_empty());
    }

    #[test]
    fn test_single_unfinished_item_keeps_chapter() {
        let tree = vec![chapter(
            "第一章",
            vec![
                section("1.1", vec![item("a", true), item("b", false), item("c", true)]),
                section("1.2", vec![item("d", true)]),
            ],
        )];
        let pruned = prune_unfinished(tree);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].sections.len(), 1);
        assert_eq!(pruned[0].sections[0].contents.len(), 1);
        assert_eq!(pruned[0].sections[0].contents[0].title, "b");
    }

    #[test]
    fn test_count_contents() {
        let tree = vec![
            chapter("一", vec![section("1.1", vec![item("a", false)])]),
            chapter(
                "二",
                vec![section("2.1", vec![item("b", false), item("c", false)])],
            ),
        ];
        assert_eq!(count_contents(&tree), 3);
    }

    #[test]
    fn test_content_kind_parse() {
        assert_eq!(ContentKind::parse(" video "), ContentKind::Video);
        assert_eq!(ContentKind::parse("doc"), ContentKind::Document);
        assert_eq!(ContentKind::parse("test"), ContentKind::Test);
        assert_eq!(
            ContentKind::parse("scorm"),
            ContentKind::Other("scorm".to_string())
        );
    }

    #[test]
    fn test_node_path_indices() {
        // 章节标记在 2，小节标记在 4，内容项在 1 → 容器分别位于 3 和 5
        let path = NodePath {
            chapter: 2,
            section: 4,
            item: 1,
        };
        assert_eq!(path.indices(), [3, 5, 1]);
    }
}

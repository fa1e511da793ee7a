use std::collections::HashSet;

/// Tags that survive sanitization, always re-emitted without attributes.
const ALLOWED_TAGS: &[&str] = &[
    "p",
    "strong",
    "em",
    "i",
    "b",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
];

/// Allowed tags rendered as blank-line-delimited blocks.
const BLOCK_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote"];

/// Elements dropped together with everything inside them.
const REMOVED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "link", "meta", "base", "title", "head",
    "header", "footer", "nav", "a", "button", "form", "input", "select", "option",
    "textarea", "label", "img", "picture", "source", "track", "video", "audio", "iframe",
    "frame", "frameset", "embed", "object", "param", "applet", "canvas", "map", "svg",
    "math",
];

/// Containers whose tags are dropped but whose content is kept on its own lines.
const LINE_BREAK_CONTAINERS: &[&str] = &[
    "div", "section", "article", "aside", "main", "figure", "figcaption", "ul", "ol", "li",
    "dl", "dt", "dd", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "caption",
    "pre", "address", "details", "summary", "center", "body", "html",
];

/// Class-name fragments marking share widgets, navigation, related posts and comments.
const CLASS_KEYWORDS: &[&str] = &[
    "share",
    "sharing",
    "sharedaddy",
    "social",
    "navigation",
    "nav-links",
    "navbar",
    "breadcrumb",
    "pagination",
    "related",
    "jp-relatedposts",
    "comment",
    "respond",
];

/// WordPress blocks whose whole comment-delimited region is discarded.
const REMOVED_BLOCKS: &[&str] = &[
    "query",
    "query-loop",
    "query-title",
    "query-pagination",
    "post-template",
    "latest-posts",
    "latest-comments",
    "navigation",
    "navigation-link",
    "page-list",
    "social-links",
    "social-link",
    "comments",
    "comments-query-loop",
    "post-comments",
    "post-comments-form",
    "post-navigation-link",
    "buttons",
    "button",
    "embed",
    "search",
    "archives",
    "categories",
    "tag-cloud",
    "calendar",
    "rss",
    "loginout",
    "image",
    "gallery",
    "video",
    "audio",
    "file",
];

const REMOVED_BLOCK_PREFIXES: &[&str] = &["jetpack/", "core-embed/"];

/// The rule set driving [`super::Sanitizer`].
///
/// `Default` is the canonical set; deployments can only widen the class keyword
/// list through configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerRules {
    allowed_tags: HashSet<String>,
    block_tags: HashSet<String>,
    removed_tags: HashSet<String>,
    line_break_containers: HashSet<String>,
    class_keywords: Vec<String>,
    removed_blocks: HashSet<String>,
    removed_block_prefixes: Vec<String>,
}

impl Default for SanitizerRules {
    fn default() -> Self {
        Self {
            allowed_tags: to_set(ALLOWED_TAGS),
            block_tags: to_set(BLOCK_TAGS),
            removed_tags: to_set(REMOVED_TAGS),
            line_break_containers: to_set(LINE_BREAK_CONTAINERS),
            class_keywords: CLASS_KEYWORDS.iter().map(ToString::to_string).collect(),
            removed_blocks: to_set(REMOVED_BLOCKS),
            removed_block_prefixes: REMOVED_BLOCK_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl SanitizerRules {
    pub fn with_extra_class_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !self.class_keywords.contains(&keyword) {
                self.class_keywords.push(keyword);
            }
        }
        self
    }

    pub fn class_keywords(&self) -> &[String] {
        &self.class_keywords
    }

    pub fn is_allowed(&self, tag: &str) -> bool {
        self.allowed_tags.contains(tag)
    }

    pub fn is_block(&self, tag: &str) -> bool {
        self.block_tags.contains(tag)
    }

    pub fn is_removed_tag(&self, tag: &str) -> bool {
        self.removed_tags.contains(tag)
    }

    pub fn is_line_break_container(&self, tag: &str) -> bool {
        self.line_break_containers.contains(tag)
    }

    /// True when any class token contains one of the keywords (case-insensitive).
    pub fn matches_class<'a, I>(&self, classes: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        classes.into_iter().any(|class| {
            let class = class.to_lowercase();
            self.class_keywords
                .iter()
                .any(|keyword| class.contains(keyword.as_str()))
        })
    }

    pub fn removes_block(&self, block_name: &str) -> bool {
        let name = block_name.strip_prefix("core/").unwrap_or(block_name);
        self.removed_blocks.contains(name)
            || self
                .removed_block_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

fn to_set(values: &[&str]) -> HashSet<String> {
    values.iter().map(ToString::to_string).collect()
}

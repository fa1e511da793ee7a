//! HTML sanitization for imported WordPress content.
//!
//! The input is parsed into a tree and re-rendered through an allow-list, so
//! the output only ever contains bare `p`, `strong`, `em`, `i`, `b`, `h1`-`h6`
//! and `blockquote` tags. Top-level output is a sequence of blocks separated
//! by blank lines; loose text between blocks is wrapped in its own `<p>`.

pub mod rules;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node};

pub use rules::SanitizerRules;

/// Allowed tags nested deeper than this are unwrapped to their content.
const MAX_MARKUP_DEPTH: usize = 64;

static SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[/?[A-Za-z][\w-]*(?:\s[^\[\]]*)?/?\]").expect("shortcode pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockMarker {
    Open(String),
    Close(String),
    SelfClosing,
}

/// Flat event stream produced by walking the parsed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Open(String),
    Close(String),
    Break,
}

enum Step<N> {
    Visit(N),
    Emit(Token),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// Holds blocks: the fragment root and `blockquote`.
    Flow,
    /// `p` and headings.
    Block,
    Inline,
    /// A block tag met inside inline content, unwrapped to its text.
    Transparent,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    tag: String,
    run: String,
    blocks: Vec<String>,
}

impl Frame {
    fn new(kind: FrameKind, tag: String) -> Self {
        Self {
            kind,
            tag,
            run: String::new(),
            blocks: Vec::new(),
        }
    }

    /// Loose inline content in a flow becomes its own paragraph.
    fn flush_run(&mut self) {
        let text = collapse_whitespace(&self.run);
        let text = text.trim();
        if !text.is_empty() {
            self.blocks.push(format!("<p>{text}</p>"));
        }
        self.run.clear();
    }

    fn push_block(&mut self, block: String) {
        self.flush_run();
        self.blocks.push(block);
    }

    fn close_into(mut self, parent: &mut Frame) {
        let tag = std::mem::take(&mut self.tag);
        match self.kind {
            FrameKind::Flow => {
                self.flush_run();
                if self.blocks.is_empty() {
                    parent.run.push(' ');
                } else {
                    parent.push_block(format!("<{tag}>{}</{tag}>", self.blocks.join("\n\n")));
                }
            }
            FrameKind::Block => {
                let inner = collapse_whitespace(&self.run);
                let inner = inner.trim();
                if inner.is_empty() {
                    parent.run.push(' ');
                } else {
                    parent.push_block(format!("<{tag}>{inner}</{tag}>"));
                }
            }
            FrameKind::Inline => {
                let inner = collapse_whitespace(&self.run);
                if inner.trim().is_empty() {
                    parent.run.push_str(&inner);
                } else {
                    parent.run.push_str(&format!("<{tag}>{inner}</{tag}>"));
                }
            }
            FrameKind::Transparent => {
                parent.run.push(' ');
                parent.run.push_str(&self.run);
                parent.run.push(' ');
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    rules: SanitizerRules,
}

impl Sanitizer {
    pub fn new(rules: SanitizerRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SanitizerRules {
        &self.rules
    }

    /// Reduces an HTML fragment to the allow-listed subset.
    ///
    /// Malformed markup never fails: the parser repairs what it can and anything
    /// it cannot place is treated as text. Both passes keep their state on the
    /// heap, so nesting depth is bounded by memory only.
    pub fn sanitize(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }
        self.render(self.tokenize(html))
    }

    fn tokenize(&self, html: &str) -> Vec<Token> {
        let fragment = Html::parse_fragment(html);
        let mut tokens = Vec::new();
        let mut work = Vec::new();
        let top: Vec<_> = fragment
            .root_element()
            .children()
            .map(|child| (child, child.value()))
            .collect();
        self.push_visible(top, &mut work);

        while let Some(step) = work.pop() {
            let node = match step {
                Step::Emit(token) => {
                    tokens.push(token);
                    continue;
                }
                Step::Visit(node) => node,
            };
            match node.value() {
                Node::Text(text) => {
                    let cleaned = clean_text(&text.text);
                    if !cleaned.is_empty() {
                        tokens.push(Token::Text(cleaned));
                    }
                }
                Node::Element(element) => {
                    let name = element.name();
                    if self.rules.is_removed_tag(name) || self.rules.matches_class(element.classes())
                    {
                        continue;
                    }
                    if name == "br" || name == "hr" {
                        tokens.push(Token::Break);
                        continue;
                    }
                    if self.rules.is_allowed(name) {
                        tokens.push(Token::Open(name.to_string()));
                        work.push(Step::Emit(Token::Close(name.to_string())));
                    } else if self.rules.is_line_break_container(name) {
                        tokens.push(Token::Break);
                        work.push(Step::Emit(Token::Break));
                    }
                    let children: Vec<_> =
                        node.children().map(|child| (child, child.value())).collect();
                    self.push_visible(children, &mut work);
                }
                _ => {}
            }
        }
        tokens
    }

    /// Queues siblings in document order, skipping comments and removed block regions.
    fn push_visible<'a, N>(&self, children: Vec<(N, &'a Node)>, work: &mut Vec<Step<N>>) {
        let mut keep = vec![true; children.len()];
        let mut index = 0;
        while index < children.len() {
            if let Node::Comment(comment) = children[index].1 {
                keep[index] = false;
                if let Some(BlockMarker::Open(name)) = parse_block_marker(&comment.comment) {
                    if self.rules.removes_block(&name) {
                        let rest = children[index + 1..].iter().map(|(_, value)| *value);
                        if let Some(offset) = find_block_end(rest, &name) {
                            keep[index..=index + offset + 1].fill(false);
                            index += offset + 2;
                            continue;
                        }
                    }
                }
            }
            index += 1;
        }
        for (index, (node, _)) in children.into_iter().enumerate().rev() {
            if keep[index] {
                work.push(Step::Visit(node));
            }
        }
    }

    fn render(&self, tokens: Vec<Token>) -> String {
        let mut stack = vec![Frame::new(FrameKind::Flow, String::new())];
        let mut unwrapped = 0_usize;
        for token in tokens {
            match token {
                Token::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.run.push_str(&text);
                    }
                }
                Token::Break => {
                    if let Some(top) = stack.last_mut() {
                        if top.kind == FrameKind::Flow {
                            top.flush_run();
                        } else {
                            top.run.push(' ');
                        }
                    }
                }
                Token::Open(tag) => {
                    if stack.len() > MAX_MARKUP_DEPTH {
                        unwrapped += 1;
                        continue;
                    }
                    let in_flow = stack.last().is_some_and(|top| top.kind == FrameKind::Flow);
                    let kind = match (self.rules.is_block(&tag), in_flow) {
                        (false, _) => FrameKind::Inline,
                        (true, false) => FrameKind::Transparent,
                        (true, true) if tag == "blockquote" => FrameKind::Flow,
                        (true, true) => FrameKind::Block,
                    };
                    stack.push(Frame::new(kind, tag));
                }
                Token::Close(_) if unwrapped > 0 => unwrapped -= 1,
                Token::Close(_) => close_top(&mut stack),
            }
        }
        while stack.len() > 1 {
            close_top(&mut stack);
        }
        let Some(mut root) = stack.pop() else {
            return String::new();
        };
        root.flush_run();
        root.blocks.join("\n\n")
    }
}

fn close_top(stack: &mut Vec<Frame>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(frame) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            frame.close_into(parent);
        }
    }
}

/// Sanitizes with the default rule set.
pub fn sanitize(html: &str) -> String {
    Sanitizer::default().sanitize(html)
}

static DEFAULT_RULES: LazyLock<SanitizerRules> = LazyLock::new(SanitizerRules::default);

/// Visible text of an HTML fragment with whitespace collapsed to single spaces.
///
/// Text nodes are joined as they stand; only block, container and break
/// boundaries separate words.
pub fn plain_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    let top: Vec<_> = fragment.root_element().children().collect();
    let mut work: Vec<_> = top.into_iter().rev().map(Step::Visit).collect();

    while let Some(step) = work.pop() {
        let node = match step {
            Step::Emit(_) => {
                text.push(' ');
                continue;
            }
            Step::Visit(node) => node,
        };
        match node.value() {
            Node::Text(value) => text.push_str(&value.text),
            Node::Element(element) => {
                let name = element.name();
                if matches!(name, "script" | "style" | "noscript" | "template") {
                    continue;
                }
                if name == "br"
                    || name == "hr"
                    || DEFAULT_RULES.is_block(name)
                    || DEFAULT_RULES.is_line_break_container(name)
                {
                    text.push(' ');
                    work.push(Step::Emit(Token::Break));
                }
                let children: Vec<_> = node.children().collect();
                work.extend(children.into_iter().rev().map(Step::Visit));
            }
            _ => {}
        }
    }
    collapse_whitespace(&text).trim().to_string()
}

fn parse_block_marker(comment: &str) -> Option<BlockMarker> {
    let body = comment.trim();
    if let Some(rest) = body.strip_prefix("/wp:") {
        return block_name(rest).map(BlockMarker::Close);
    }
    let rest = body.strip_prefix("wp:")?;
    let name = block_name(rest)?;
    if body.ends_with('/') {
        Some(BlockMarker::SelfClosing)
    } else {
        Some(BlockMarker::Open(name))
    }
}

fn block_name(rest: &str) -> Option<String> {
    let name = rest
        .split(|c: char| c.is_whitespace() || c == '{')
        .next()?
        .trim_end_matches('/');
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

/// Offset of the marker closing `name` among the following siblings, honoring nesting.
fn find_block_end<'a>(siblings: impl Iterator<Item = &'a Node>, name: &str) -> Option<usize> {
    let mut depth = 0_usize;
    for (offset, node) in siblings.enumerate() {
        let Node::Comment(comment) = node else {
            continue;
        };
        match parse_block_marker(&comment.comment) {
            Some(BlockMarker::Open(inner)) if inner == name => depth += 1,
            Some(BlockMarker::Close(inner)) if inner == name => {
                if depth == 0 {
                    return Some(offset);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Drops shortcodes, collapses whitespace and escapes the text for re-emission.
fn clean_text(raw: &str) -> String {
    let text = SHORTCODE.replace_all(raw, "");
    let mut out = String::with_capacity(text.len());
    let mut previous_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !previous_was_space {
                out.push(' ');
            }
            previous_was_space = true;
            continue;
        }
        previous_was_space = false;
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Folds every whitespace run into one space, keeping leading and trailing ones.
fn collapse_whitespace(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut previous_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !previous_was_space {
                collapsed.push(' ');
            }
            previous_was_space = true;
        } else {
            collapsed.push(c);
            previous_was_space = false;
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_allowed_formatting_and_drops_attributes() {
        let html = r#"<p class="lead" onclick="alert(1)">The <strong>door</strong> was <em style="color:red">open</em>.</p>"#;
        assert_eq!(
            sanitize(html),
            "<p>The <strong>door</strong> was <em>open</em>.</p>"
        );
    }

    #[test]
    fn removes_scripts_iframes_and_handlers() {
        let html = r#"
            <p onmouseover="steal()">Before</p>
            <script>document.cookie</script>
            <iframe src="https://evil.example"></iframe>
            <img src="x" onerror="alert(1)">
            <p>After</p>
        "#;
        let output = sanitize(html);
        assert!(!output.contains("<script"));
        assert!(!output.contains("<iframe"));
        assert!(!output.contains("onerror"));
        assert!(!output.contains("onmouseover"));
        assert!(!output.contains("document.cookie"));
        assert_eq!(output, "<p>Before</p>\n\n<p>After</p>");
    }

    #[test]
    fn escaped_markup_in_text_cannot_become_a_tag() {
        let output = sanitize("<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>");
        assert!(!output.contains("<script>"));
        assert_eq!(output, "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>");
    }

    #[test]
    fn removes_wordpress_query_block_region() {
        let html = "<!-- wp:query --><div class=\"wp-block-query\"><h2>Recent Posts</h2><ul><li>Post 1</li></ul></div><!-- /wp:query --><p>Story text here.</p>";
        let output = sanitize(html);
        assert!(output.contains("Story text here"));
        assert!(!output.contains("Recent Posts"));
        assert!(!output.contains("Post 1"));
    }

    #[test]
    fn removes_query_block_with_loose_siblings() {
        let html = "<!-- wp:query -->intro<h2>Recent Posts</h2><li>Post 1</li>outro<!-- /wp:query --><p>Story text here.</p>";
        let output = sanitize(html);
        assert_eq!(output, "<p>Story text here.</p>");
    }

    #[test]
    fn nested_removed_blocks_are_balanced() {
        let html = "<!-- wp:group --><!-- wp:buttons -->a<!-- wp:buttons -->b<!-- /wp:buttons -->c<!-- /wp:buttons --><p>kept</p><!-- /wp:group -->";
        assert_eq!(sanitize(html), "<p>kept</p>");
    }

    #[test]
    fn content_blocks_keep_their_content() {
        let html = "<!-- wp:paragraph --><p>It began at midnight.</p><!-- /wp:paragraph -->\n<!-- wp:quote --><blockquote class=\"wp-block-quote\"><p>Don't look.</p></blockquote><!-- /wp:quote -->";
        assert_eq!(
            sanitize(html),
            "<p>It began at midnight.</p>\n\n<blockquote><p>Don't look.</p></blockquote>"
        );
    }

    #[test]
    fn unmatched_block_marker_only_drops_the_comment() {
        let html = "<!-- wp:query --><p>Orphaned but kept</p>";
        assert_eq!(sanitize(html), "<p>Orphaned but kept</p>");
    }

    #[test]
    fn removes_share_and_related_widgets_even_when_nested() {
        let html = r#"
            <article>
              <section>
                <p>The cellar smelled of rust.</p>
                <div class="sharedaddy sd-sharing-enabled"><h3>Share this:</h3><p>Facebook</p></div>
                <aside><div class="jp-relatedposts"><p>Related story</p></div></aside>
                <div class="post-navigation">Previous / Next</div>
                <div id="comments" class="comments-area"><p>Leave a reply</p></div>
              </section>
            </article>
        "#;
        let output = sanitize(html);
        assert_eq!(output, "<p>The cellar smelled of rust.</p>");
    }

    #[test]
    fn strips_media_anchors_buttons_and_chrome() {
        let html = r#"
            <header><h1>Site title</h1></header>
            <h2>Chapter One</h2>
            <figure><img src="a.jpg"><figcaption>Caption stays</figcaption></figure>
            <p>Read <a href="/more">more</a> later.</p>
            <button>Subscribe</button>
            <video src="v.mp4">fallback</video>
            <svg><text>vector</text></svg>
            <footer>Copyright</footer>
        "#;
        let output = sanitize(html);
        assert_eq!(
            output,
            "<h2>Chapter One</h2>\n\n<p>Caption stays</p>\n\n<p>Read later.</p>"
        );
    }

    #[test]
    fn unwraps_containers_and_converts_breaks() {
        let html = "<div><span>first line</span><br>second line<hr><div>third</div></div>";
        assert_eq!(
            sanitize(html),
            "<p>first line</p>\n\n<p>second line</p>\n\n<p>third</p>"
        );
    }

    #[test]
    fn strips_shortcodes_but_keeps_enclosed_text() {
        let html = "<p>[caption id=\"attachment_7\" align=\"alignnone\"]The well[/caption] at dusk [gallery ids=\"1,2\"/]</p>";
        assert_eq!(sanitize(html), "<p>The well at dusk</p>");
    }

    #[test]
    fn decodes_entities_and_normalizes_whitespace() {
        let html = "<p>&#8220;Hello&#8221;&nbsp;&nbsp;she&nbsp;said&hellip;</p>\n\n\n\n<p>  Tom &amp; Jerry   </p>";
        assert_eq!(
            sanitize(html),
            "<p>\u{201c}Hello\u{201d} she said\u{2026}</p>\n\n<p>Tom &amp; Jerry</p>"
        );
    }

    #[test]
    fn drops_empty_blocks() {
        assert_eq!(sanitize("<p> </p><h2></h2><p>x</p>"), "<p>x</p>");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn sanitize_is_idempotent_for_allow_listed_input() {
        let inputs = [
            "<p>The <strong>door</strong> creaked.</p><h3>Later</h3><p>Nothing <em>moved</em>.</p>",
            "<blockquote><p>Whispers</p><p>in <b>the</b> walls</p></blockquote>",
            "<h1>Title</h1>\n\n\n<p>  spaced   out  </p>",
            "<p>Tom &amp; Jerry &lt;3</p>",
            "plain text with <i>italics</i>",
            "a<p></p>b",
            "<blockquote>x<h2></h2>y</blockquote>",
            "<em>a</em><p> </p><em>b</em>",
            "<strong>bold <p>inside</p> tail</strong>",
            "<h2>a<br>b</h2><blockquote></blockquote>c",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input}");
        }
    }

    #[test]
    fn sanitize_is_idempotent_across_mixed_fragments() {
        let pieces = [
            "word",
            " ",
            "<p></p>",
            "<p>para</p>",
            "<h3> </h3>",
            "<h2>head</h2>",
            "<em>e</em>",
            "<b> </b>",
            "<blockquote>q</blockquote>",
            "<blockquote><p>inner</p></blockquote>",
            "<strong>s<em>t</em></strong>",
            "<br>",
        ];
        for first in pieces {
            for second in pieces {
                for third in pieces {
                    let input = format!("{first}{second}{third}");
                    let once = sanitize(&input);
                    assert_eq!(sanitize(&once), once, "input: {input}");
                }
            }
        }
    }

    #[test]
    fn empty_blocks_keep_neighbouring_words_apart() {
        assert_eq!(sanitize("a<p></p>b"), "<p>a b</p>");
        assert_eq!(
            sanitize("<blockquote>x<h2></h2>y</blockquote>"),
            "<blockquote><p>x y</p></blockquote>"
        );
        assert_eq!(
            sanitize("<em>a</em><p> </p><em>b</em>"),
            "<p><em>a</em> <em>b</em></p>"
        );
    }

    #[test]
    fn deeply_nested_markup_does_not_exhaust_the_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let spans = format!(
                    "{}<p>deep</p>{}",
                    "<span>".repeat(100_000),
                    "</span>".repeat(100_000)
                );
                let divs = format!(
                    "{}<p>deep</p>{}",
                    "<div>".repeat(10_000),
                    "</div>".repeat(10_000)
                );
                let bold = format!("{}deep{}", "<b>".repeat(10_000), "</b>".repeat(10_000));
                (
                    sanitize(&spans),
                    sanitize(&divs),
                    plain_text(&divs),
                    sanitize(&bold),
                )
            })
            .expect("spawn sanitizer thread");
        let (spans, divs, text, bold) = handle.join().expect("sanitizer thread must not die");
        assert_eq!(spans, "<p>deep</p>");
        assert_eq!(divs, "<p>deep</p>");
        assert_eq!(text, "deep");
        assert!(bold.contains("deep"));
        assert!(bold.matches("<b>").count() <= MAX_MARKUP_DEPTH);
        assert_eq!(sanitize(&bold), bold);
    }

    #[test]
    fn custom_keywords_extend_removal() {
        let sanitizer =
            Sanitizer::new(SanitizerRules::default().with_extra_class_keywords(["newsletter"]));
        let output = sanitizer.sanitize("<p>Story</p><div class=\"newsletter-signup\"><p>Join</p></div>");
        assert_eq!(output, "<p>Story</p>");
    }

    #[test]
    fn plain_text_collapses_markup() {
        assert_eq!(
            plain_text("<p>One <strong>two</strong></p>\n\n<p>three</p>"),
            "One two three"
        );
    }

    #[test]
    fn plain_text_does_not_split_words_at_inline_tags() {
        assert_eq!(
            plain_text("<p>The mill <strong>waited</strong>.</p>"),
            "The mill waited."
        );
        assert_eq!(plain_text("<em>Hollow</em>'s Edge"), "Hollow's Edge");
        assert_eq!(plain_text("<p>end</p><p>start</p>"), "end start");
        assert_eq!(plain_text("one<br>two"), "one two");
    }

    #[test]
    fn block_markers_parse() {
        assert_eq!(
            parse_block_marker(" wp:query {\"queryId\":1} "),
            Some(BlockMarker::Open("query".to_string()))
        );
        assert_eq!(
            parse_block_marker(" /wp:query "),
            Some(BlockMarker::Close("query".to_string()))
        );
        assert_eq!(
            parse_block_marker(" wp:spacer {\"height\":\"20px\"} /"),
            Some(BlockMarker::SelfClosing)
        );
        assert_eq!(parse_block_marker(" just a note "), None);
    }
}

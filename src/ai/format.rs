//! Model reply → sanitized structure.
//!
//! The reply is parsed into blocks and inline spans; markup is only produced by
//! [`FormattedReply::to_html`], which escapes every piece of reply text. Nothing
//! the model writes is ever passed through as markup.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s](?:[^*]*[^*\s])?)\*").unwrap());
static UNORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*- (.+)$").unwrap());
static ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\. (.+)$").unwrap());
// "**Careful:** - rest": a label ending in a colon, then the first list item on the same line.
static LEAD_THEN_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?:(?:\*\*)?)\s+- (.+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, content: Vec<Inline> },
    /// Lines of one paragraph; rendered with line breaks between them.
    Paragraph(Vec<Vec<Inline>>),
    List { ordered: bool, items: Vec<Vec<Inline>> },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormattedReply {
    pub blocks: Vec<Block>,
}

fn parse_italics(text: &str, out: &mut Vec<Inline>) {
    let mut last = 0;
    for caps in ITALIC.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            out.push(Inline::Text(text[last..whole.start()].to_string()));
        }
        out.push(Inline::Italic(inner.as_str().to_string()));
        last = whole.end();
    }
    if last < text.len() {
        out.push(Inline::Text(text[last..].to_string()));
    }
}

/// Bold first, then italics in whatever text is left.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in BOLD.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        parse_italics(&text[last..whole.start()], &mut out);
        out.push(Inline::Bold(inner.as_str().to_string()));
        last = whole.end();
    }
    parse_italics(&text[last..], &mut out);
    out
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    paragraph: Vec<Vec<Inline>>,
    list: Option<(bool, Vec<Vec<Inline>>)>,
}

impl Builder {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            self.blocks
                .push(Block::Paragraph(std::mem::take(&mut self.paragraph)));
        }
    }

    fn flush_list(&mut self) {
        if let Some((ordered, items)) = self.list.take() {
            self.blocks.push(Block::List { ordered, items });
        }
    }

    fn text_line(&mut self, line: &str) {
        self.flush_list();
        self.paragraph.push(parse_inline(line));
    }

    /// Consecutive items of the same kind share one list.
    fn list_item(&mut self, ordered: bool, text: &str) {
        self.flush_paragraph();
        if self.list.as_ref().is_some_and(|(kind, _)| *kind != ordered) {
            self.flush_list();
        }
        let item = parse_inline(text);
        match &mut self.list {
            Some((_, items)) => items.push(item),
            None => self.list = Some((ordered, vec![item])),
        }
    }

    fn heading(&mut self, level: u8, text: &str) {
        self.flush_paragraph();
        self.flush_list();
        self.blocks.push(Block::Heading {
            level,
            content: parse_inline(text),
        });
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_paragraph();
        self.flush_list();
        self.blocks
    }
}

pub fn format_reply(raw: &str) -> FormattedReply {
    let normalized = raw.replace("\r\n", "\n");
    let mut builder = Builder::default();

    for line in normalized.lines() {
        let line = line.trim_end();

        if line.trim().is_empty() {
            // Ends the paragraph. An open list survives so spaced-out items still coalesce.
            builder.flush_paragraph();
            continue;
        }

        if let Some(text) = line.strip_prefix("## ") {
            builder.heading(2, text.trim());
        } else if let Some(text) = line.strip_prefix("# ") {
            builder.heading(1, text.trim());
        } else if let Some(caps) = UNORDERED_ITEM.captures(line) {
            builder.list_item(false, caps[1].trim());
        } else if let Some(caps) = ORDERED_ITEM.captures(line) {
            builder.list_item(true, caps[1].trim());
        } else if let Some(caps) = LEAD_THEN_ITEM.captures(line) {
            builder.text_line(caps[1].trim());
            builder.flush_paragraph();
            builder.list_item(false, caps[2].trim());
        } else {
            builder.text_line(line.trim());
        }
    }

    FormattedReply {
        blocks: builder.finish(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn inline_html(spans: &[Inline], out: &mut String) {
    for span in spans {
        match span {
            Inline::Text(text) => out.push_str(&escape_html(text)),
            Inline::Bold(text) => {
                out.push_str("<strong>");
                out.push_str(&escape_html(text));
                out.push_str("</strong>");
            }
            Inline::Italic(text) => {
                out.push_str("<em>");
                out.push_str(&escape_html(text));
                out.push_str("</em>");
            }
        }
    }
}

fn inline_plain(spans: &[Inline]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Inline::Text(text) | Inline::Bold(text) | Inline::Italic(text) => text.as_str(),
        })
        .collect()
}

impl FormattedReply {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { level, content } => {
                    let (tag, class) = if *level == 1 {
                        ("h4", "response-header")
                    } else {
                        ("h5", "response-subheader")
                    };
                    out.push_str(&format!("<{} class=\"{}\">", tag, class));
                    inline_html(content, &mut out);
                    out.push_str(&format!("</{}>", tag));
                }
                Block::Paragraph(lines) => {
                    out.push_str("<p>");
                    for (i, line) in lines.iter().enumerate() {
                        if i > 0 {
                            out.push_str("<br>");
                        }
                        inline_html(line, &mut out);
                    }
                    out.push_str("</p>");
                }
                Block::List { ordered, items } => {
                    let tag = if *ordered { "ol" } else { "ul" };
                    out.push_str(&format!("<{} class=\"response-list\">", tag));
                    for item in items {
                        out.push_str("<li>");
                        inline_html(item, &mut out);
                        out.push_str("</li>");
                    }
                    out.push_str(&format!("</{}>", tag));
                }
            }
        }
        out
    }
}

/// Plain-text rendering for terminals.
impl fmt::Display for FormattedReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match block {
                Block::Heading { content, .. } => writeln!(f, "{}", inline_plain(content))?,
                Block::Paragraph(lines) => {
                    for line in lines {
                        writeln!(f, "{}", inline_plain(line))?;
                    }
                }
                Block::List { ordered, items } => {
                    for (n, item) in items.iter().enumerate() {
                        if *ordered {
                            writeln!(f, "  {}. {}", n + 1, inline_plain(item))?;
                        } else {
                            writeln!(f, "  • {}", inline_plain(item))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

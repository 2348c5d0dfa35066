//! Built-in help articles and the small markdown dialect they are written in.
//!
//! Supported: `#`/`##` headings, `- ` bullets, blank-line separated
//! paragraphs, `**bold**` and `` `code` ``. Everything is HTML-escaped first.

use crate::HelpLink;

pub struct HelpArticle {
    pub slug: &'static str,
    pub title: &'static str,
    pub source: &'static str,
}

pub const ARTICLES: &[HelpArticle] = &[
    HelpArticle {
        slug: "getting-started",
        title: "Getting started",
        source: include_str!("../help/getting-started.md"),
    },
    HelpArticle {
        slug: "main-page",
        title: "Scheduling the main page",
        source: include_str!("../help/main-page.md"),
    },
    HelpArticle {
        slug: "inquiries",
        title: "Handling inquiries",
        source: include_str!("../help/inquiries.md"),
    },
];

pub fn find_article(slug: &str) -> Option<&'static HelpArticle> {
    ARTICLES.iter().find(|article| article.slug == slug)
}

pub fn links() -> Vec<HelpLink> {
    ARTICLES
        .iter()
        .map(|article| HelpLink {
            slug: article.slug,
            title: article.title,
        })
        .collect()
}

#[derive(Default)]
struct Renderer {
    html: String,
    paragraph: Vec<String>,
    in_list: bool,
}

impl Renderer {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            self.html.push_str(&format!("<p>{}</p>\n", self.paragraph.join(" ")));
            self.paragraph.clear();
        }
    }

    fn close_list(&mut self) {
        if self.in_list {
            self.html.push_str("</ul>\n");
            self.in_list = false;
        }
    }

    fn close_blocks(&mut self) {
        self.flush_paragraph();
        self.close_list();
    }
}

/// Renders help markdown to an HTML fragment safe to embed unescaped.
pub fn render_markdown(raw: &str) -> String {
    let mut out = Renderer::default();

    for line in raw.lines() {
        let line = line.trim();

        if line.is_empty() {
            out.close_blocks();
        } else if let Some(text) = line.strip_prefix("## ") {
            out.close_blocks();
            out.html.push_str(&format!("<h3>{}</h3>\n", inline(text)));
        } else if let Some(text) = line.strip_prefix("# ") {
            out.close_blocks();
            out.html.push_str(&format!("<h2>{}</h2>\n", inline(text)));
        } else if let Some(text) = line.strip_prefix("- ") {
            out.flush_paragraph();
            if !out.in_list {
                out.html.push_str("<ul>\n");
                out.in_list = true;
            }
            out.html.push_str(&format!("<li>{}</li>\n", inline(text)));
        } else {
            out.close_list();
            out.paragraph.push(inline(line));
        }
    }

    out.close_blocks();
    out.html
}

/// Escapes, then applies code spans and bold outside of code.
fn inline(text: &str) -> String {
    let escaped = html_escape::encode_safe(text).to_string();
    let pieces = paired(&escaped, "`");

    pieces
        .into_iter()
        .map(|(segment, is_code)| {
            if is_code {
                format!("<code>{segment}</code>")
            } else {
                paired(&segment, "**")
                    .into_iter()
                    .map(|(part, is_bold)| {
                        if is_bold {
                            format!("<strong>{part}</strong>")
                        } else {
                            part
                        }
                    })
                    .collect()
            }
        })
        .collect()
}

/// Splits on `marker`, flagging the text between matched pairs.
/// An unmatched trailing marker is kept literally.
fn paired(text: &str, marker: &str) -> Vec<(String, bool)> {
    let parts: Vec<&str> = text.split(marker).collect();
    let markers = parts.len() - 1;
    let mut result = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        let inside = i % 2 == 1;
        if inside && i == markers && markers % 2 == 1 {
            // Opening marker without a partner
            result.push((format!("{marker}{part}"), false));
        } else {
            result.push((part.to_string(), inside));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks() {
        let html = render_markdown("# Title\nfirst line\nsecond line\n\n- one\n- two\n## Sub");
        assert_eq!(
            html,
            "<h2>Title</h2>\n<p>first line second line</p>\n<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n<h3>Sub</h3>\n"
        );
    }

    #[test]
    fn test_inline_formatting() {
        assert_eq!(inline("a **b** c"), "a <strong>b</strong> c");
        assert_eq!(inline("use `**raw**` here"), "use <code>**raw**</code> here");
        assert_eq!(inline("dangling **bold"), "dangling **bold");
    }

    #[test]
    fn test_html_is_escaped() {
        let html = render_markdown("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_every_article_renders() {
        for article in ARTICLES {
            let html = render_markdown(article.source);
            assert!(html.starts_with("<h2>"), "{} should open with a heading", article.slug);
        }
        assert!(find_article("main-page").is_some());
        assert!(find_article("../secrets").is_none());
    }
}

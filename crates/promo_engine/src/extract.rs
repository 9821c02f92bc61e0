use scraper::{ElementRef, Html, Selector};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub text: String,
    pub images: Vec<String>,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, base: &Url) -> ExtractedArticle;
}

/// Lightweight readability-style extractor:
/// - title from `og:title`, falling back to `<title>`
/// - body text from `<article>`, then `<main>`, then `<body>`
/// - image URLs from `<img src>` inside the chosen scope, absolutized
///   against the page URL and capped at `max_images`.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    max_images: usize,
}

impl ArticleExtractor {
    pub fn new(max_images: usize) -> Self {
        Self { max_images }
    }
}

impl Extractor for ArticleExtractor {
    fn extract(&self, html: &str, base: &Url) -> ExtractedArticle {
        let doc = Html::parse_document(html);

        let title = meta_content(&doc, r#"meta[property="og:title"]"#)
            .or_else(|| selected_text(&doc, "title"))
            .filter(|t| !t.is_empty());

        let scope = first_match(&doc, "article")
            .or_else(|| first_match(&doc, "main"))
            .or_else(|| first_match(&doc, "body"));

        let text = match scope {
            Some(node) => collapse_whitespace(&node.text().collect::<String>()),
            None => String::new(),
        };

        let images = match scope {
            Some(node) => collect_images(node, base, self.max_images),
            None => Vec::new(),
        };

        ExtractedArticle {
            title,
            text,
            images,
        }
    }
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    first_match(doc, selector)
        .and_then(|node| node.value().attr("content"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn selected_text(doc: &Html, selector: &str) -> Option<String> {
    first_match(doc, selector).map(|node| node.text().collect::<String>().trim().to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_images(scope: ElementRef<'_>, base: &Url, max_images: usize) -> Vec<String> {
    let Ok(sel) = Selector::parse("img") else {
        return Vec::new();
    };
    let mut images = Vec::new();
    for node in scope.select(&sel) {
        let Some(src) = node.value().attr("src") else {
            continue;
        };
        let Ok(absolute) = base.join(src.trim()) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }
        let absolute = absolute.to_string();
        if !images.contains(&absolute) {
            images.push(absolute);
        }
        if images.len() >= max_images {
            break;
        }
    }
    images
}

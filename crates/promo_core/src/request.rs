use serde::{Deserialize, Serialize};

/// Immutable configuration for one generation request.
///
/// Passed by value into the pipeline; the same request is shared by all
/// three variation sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerationRequest {
    /// Source article URL. Optional when `prescraped` content is supplied.
    pub url: Option<String>,
    #[serde(default)]
    pub style: PromoStyle,
    /// Reference text the generated variations should loosely follow.
    #[serde(default)]
    pub template: Option<String>,
    /// Pre-scraped article content; skips the scrape call when non-empty.
    #[serde(default)]
    pub prescraped: Option<ScrapedArticle>,
    /// Image URLs chosen by the caller, in selection order.
    #[serde(default)]
    pub selected_images: Vec<String>,
    /// Whether to attempt the best-effort web-enhancement lookup.
    #[serde(default)]
    pub enhance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Casual,
    Formal,
    Energetic,
}

/// Style and formatting options applied to every variation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PromoStyle {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub hashtags: bool,
}

/// Article content as produced by the scraper (or supplied by the caller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScrapedArticle {
    pub title: String,
    pub content: String,
    pub images: Vec<String>,
}

/// One finished variation of the aggregated result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVariation {
    pub content: String,
    pub markdown: String,
}

/// Best available title for fallback text before any `scraped_content`
/// event has been observed: pre-scraped title, then URL host, then a
/// generic label.
pub fn fallback_title_for(request: &GenerationRequest) -> String {
    if let Some(article) = &request.prescraped {
        if !article.title.trim().is_empty() {
            return article.title.clone();
        }
    }
    if let Some(raw) = &request.url {
        if let Ok(parsed) = url::Url::parse(raw) {
            if let Some(host) = parsed.host_str() {
                return host.to_string();
            }
        }
    }
    "ご紹介記事".to_string()
}

#[cfg(test)]
mod tests {
    use super::{fallback_title_for, GenerationRequest, ScrapedArticle};

    #[test]
    fn title_prefers_prescraped_article() {
        let request = GenerationRequest {
            url: Some("https://blog.example.com/post".to_string()),
            prescraped: Some(ScrapedArticle {
                title: "Example Post".to_string(),
                content: String::new(),
                images: Vec::new(),
            }),
            ..GenerationRequest::default()
        };
        assert_eq!(fallback_title_for(&request), "Example Post");
    }

    #[test]
    fn title_falls_back_to_url_host() {
        let request = GenerationRequest {
            url: Some("https://blog.example.com/post".to_string()),
            ..GenerationRequest::default()
        };
        assert_eq!(fallback_title_for(&request), "blog.example.com");
    }

    #[test]
    fn title_falls_back_to_generic_label() {
        assert_eq!(fallback_title_for(&GenerationRequest::default()), "ご紹介記事");
    }
}

use promo_core::{GenerationRequest, ScrapedArticle, Tone};

/// Article content is clipped to keep the prompt bounded.
const MAX_PROMPT_CONTENT_CHARS: usize = 3000;

/// Assemble the generation prompt for one variation index from the article,
/// the request options and the optional enhancement summary.
pub fn build_prompt(
    article: &ScrapedArticle,
    request: &GenerationRequest,
    enhancement: Option<&str>,
    index: usize,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("あなたはSNS向けの紹介文ライターです。以下の記事を読み、");
    prompt.push_str(tone_instruction(request.style.tone));
    prompt.push_str("短い紹介文を1つ書いてください。\n");
    if request.style.hashtags {
        prompt.push_str("文末に関連するハッシュタグを2〜3個付けてください。\n");
    }
    prompt.push_str(&format!(
        "これは案 {} です。他の案とは異なる切り口で書いてください。\n",
        index + 1
    ));

    if let Some(template) = request.template.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str("\n参考にする文体の例:\n");
        prompt.push_str(template.trim());
        prompt.push('\n');
    }

    if let Some(enhancement) = enhancement.filter(|e| !e.trim().is_empty()) {
        prompt.push_str("\n関連する最新情報:\n");
        prompt.push_str(enhancement.trim());
        prompt.push('\n');
    }

    prompt.push_str("\n記事タイトル: ");
    prompt.push_str(&article.title);
    prompt.push_str("\n記事本文:\n");
    prompt.push_str(&clip_chars(&article.content, MAX_PROMPT_CONTENT_CHARS));
    prompt.push('\n');

    prompt
}

fn tone_instruction(tone: Tone) -> &'static str {
    match tone {
        Tone::Casual => "親しみやすいカジュアルな口調で、",
        Tone::Formal => "丁寧でフォーマルな口調で、",
        Tone::Energetic => "勢いのある明るい口調で、",
    }
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push('…');
    clipped
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, clip_chars};
    use promo_core::{GenerationRequest, PromoStyle, ScrapedArticle, Tone};

    fn article() -> ScrapedArticle {
        ScrapedArticle {
            title: "Example Post".to_string(),
            content: "記事の本文です。".to_string(),
            images: Vec::new(),
        }
    }

    #[test]
    fn prompt_carries_article_and_variation_number() {
        let request = GenerationRequest::default();
        let prompt = build_prompt(&article(), &request, None, 1);
        assert!(prompt.contains("Example Post"));
        assert!(prompt.contains("記事の本文です。"));
        assert!(prompt.contains("案 2"));
    }

    #[test]
    fn hashtags_and_enhancement_are_optional_sections() {
        let request = GenerationRequest {
            style: PromoStyle {
                tone: Tone::Energetic,
                hashtags: true,
            },
            ..GenerationRequest::default()
        };
        let prompt = build_prompt(&article(), &request, Some("- 話題: 新発売"), 0);
        assert!(prompt.contains("ハッシュタグ"));
        assert!(prompt.contains("関連する最新情報"));
        assert!(prompt.contains("新発売"));

        let bare = build_prompt(&article(), &GenerationRequest::default(), None, 0);
        assert!(!bare.contains("ハッシュタグ"));
        assert!(!bare.contains("関連する最新情報"));
    }

    #[test]
    fn long_content_is_clipped_on_char_boundaries() {
        let long = "あ".repeat(10);
        let clipped = clip_chars(&long, 4);
        assert_eq!(clipped, "ああああ…");
    }
}

use crate::{GeneratedVariation, GenerationRequest, RequestState};

/// Deterministic placeholder text for a variation whose generation failed.
/// Contains the article title and the 1-based variation number.
pub fn fallback_content(title: &str, index: usize) -> String {
    format!(
        "バリエーション {} の生成に失敗しました。「{}」をぜひチェックしてみてください。",
        index + 1,
        title
    )
}

/// Markdown rendition of one variation: the content, each selected image in
/// selection order, then the source-article link when one was provided.
pub fn build_markdown(content: &str, images: &[String], source_url: Option<&str>) -> String {
    let mut markdown = content.to_string();
    for image in images {
        markdown.push_str("\n\n![](");
        markdown.push_str(image);
        markdown.push(')');
    }
    if let Some(url) = source_url {
        markdown.push_str("\n\n[元記事](");
        markdown.push_str(url);
        markdown.push(')');
    }
    markdown
}

/// Produce the ordered 3-element result once every session is terminal.
/// Failed sessions already carry their fallback text.
pub fn aggregate(state: &RequestState, request: &GenerationRequest) -> Vec<GeneratedVariation> {
    state
        .sessions()
        .iter()
        .map(|session| {
            let markdown = build_markdown(
                &session.text,
                &request.selected_images,
                request.url.as_deref(),
            );
            GeneratedVariation {
                content: session.text.clone(),
                markdown,
            }
        })
        .collect()
}

//! Styled multi-title generation for the keyword title tool.

use serde::Serialize;

use crate::clean::clean_title;
use crate::client::{GenerationSettings, TitleClient};
use crate::outcome::TitleSource;
use crate::prompt::{category_prompt, PromptInput, TitleCategory, CATEGORIES};

pub const MAX_TITLE_COUNT: usize = 20;
pub const DEFAULT_TITLE_COUNT: usize = 5;
const ATTEMPTS_PER_TITLE: usize = 3;
const KEYWORDS_PER_TITLE: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct TitleRequest {
    pub location: String,
    pub product_type: Option<String>,
    pub additional_keywords: Option<String>,
    pub title_count: usize,
    pub exclude_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedTitle {
    pub title: String,
    pub category: &'static str,
    pub keywords: Vec<String>,
    pub source: TitleSource,
}

/// Generates up to `request.title_count` distinct titles, cycling through the
/// style categories. Gives up after three attempts per requested title.
///
/// Provider failures become per-title fallbacks; this never fails.
pub async fn generate_batch(
    client: &TitleClient,
    settings: Option<&GenerationSettings>,
    request: &TitleRequest,
) -> Vec<GeneratedTitle> {
    let wanted = request.title_count.clamp(1, MAX_TITLE_COUNT);
    let max_attempts = wanted * ATTEMPTS_PER_TITLE;
    let input = PromptInput {
        location: &request.location,
        product_type: request.product_type.as_deref(),
        additional_keywords: request.additional_keywords.as_deref(),
        exclude_titles: &request.exclude_titles,
    };

    let mut titles: Vec<GeneratedTitle> = Vec::with_capacity(wanted);
    let mut attempts = 0;

    while titles.len() < wanted && attempts < max_attempts {
        attempts += 1;
        let index = titles.len();
        let category = &CATEGORIES[index % CATEGORIES.len()];

        let (title, source) = match settings {
            Some(settings) => {
                match client
                    .complete(settings, &category_prompt(category, &input))
                    .await
                {
                    Ok(text) => (clean_title(&text), TitleSource::Generated),
                    Err(e) => {
                        tracing::warn!(
                            category = category.name,
                            error = %e,
                            "title generation failed; using fallback"
                        );
                        (fallback_for(category, &input, index), TitleSource::Fallback)
                    }
                }
            }
            None => (fallback_for(category, &input, index), TitleSource::Fallback),
        };

        if title.is_empty() || is_duplicate(&title, &titles, &request.exclude_titles) {
            tracing::debug!(%title, "skipping empty or duplicate title");
            continue;
        }

        titles.push(GeneratedTitle {
            title,
            category: category.name,
            keywords: keywords_for(category, &input),
            source,
        });
    }

    tracing::info!(
        generated = titles.len(),
        attempts,
        location = %request.location,
        "title batch finished"
    );
    titles
}

fn is_duplicate(title: &str, accepted: &[GeneratedTitle], exclude: &[String]) -> bool {
    accepted.iter().any(|t| t.title == title) || exclude.iter().any(|t| t == title)
}

fn fallback_for(category: &TitleCategory, input: &PromptInput<'_>, index: usize) -> String {
    let product_type = input
        .product_type
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("여행");
    let round = index / CATEGORIES.len();
    let base = clean_title(&format!("{} {} {product_type}", input.location, category.tone));
    if round == 0 {
        base
    } else {
        format!("{base} {}", round + 1)
    }
}

fn keywords_for(category: &TitleCategory, input: &PromptInput<'_>) -> Vec<String> {
    let product_type = input
        .product_type
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("여행");
    let mut keywords = vec![
        format!("{} 여행", input.location),
        format!("{} 관광", input.location),
        product_type.to_string(),
    ];
    for keyword in category.seo_keywords {
        if keywords.len() >= KEYWORDS_PER_TITLE {
            break;
        }
        if !keywords.iter().any(|k| k == keyword) {
            keywords.push((*keyword).to_string());
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(count: usize) -> TitleRequest {
        TitleRequest {
            location: "오사카".to_string(),
            title_count: count,
            ..TitleRequest::default()
        }
    }

    fn client() -> TitleClient {
        TitleClient::with_base_urls(5, "http://127.0.0.1:9", "http://127.0.0.1:9")
            .expect("client construction should not fail")
    }

    #[tokio::test]
    async fn without_settings_every_title_is_a_distinct_fallback() {
        let titles = generate_batch(&client(), None, &request(9)).await;

        assert_eq!(titles.len(), 9);
        assert!(titles.iter().all(|t| t.source == TitleSource::Fallback));
        let mut unique: Vec<&str> = titles.iter().map(|t| t.title.as_str()).collect();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 9);
        assert_eq!(titles[0].category, "luxury");
        assert_eq!(titles[7].category, "luxury");
    }

    #[tokio::test]
    async fn excluded_titles_are_skipped_until_attempts_run_out() {
        let first = generate_batch(&client(), None, &request(1)).await;
        let mut req = request(1);
        req.exclude_titles = vec![first[0].title.clone()];

        let titles = generate_batch(&client(), None, &req).await;
        assert!(titles.is_empty());
    }

    #[test]
    fn keywords_are_capped_and_start_with_location() {
        let input = PromptInput {
            location: "Paris",
            product_type: None,
            additional_keywords: None,
            exclude_titles: &[],
        };
        let keywords = keywords_for(&CATEGORIES[0], &input);
        assert_eq!(keywords.len(), KEYWORDS_PER_TITLE);
        assert_eq!(keywords[0], "Paris 여행");
    }
}

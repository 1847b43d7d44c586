//! Prompt text sent to the providers.

/// A style the batch generator cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleCategory {
    pub name: &'static str,
    /// Adjective phrase woven into the prompt.
    pub tone: &'static str,
    pub seo_keywords: &'static [&'static str],
}

pub const CATEGORIES: [TitleCategory; 7] = [
    TitleCategory {
        name: "luxury",
        tone: "럭셔리하고 고급스러운",
        seo_keywords: &["프리미엄", "럭셔리", "고급", "VIP", "특별", "엘리트", "독점"],
    },
    TitleCategory {
        name: "value",
        tone: "합리적이고 가치 있는",
        seo_keywords: &["합리적", "가성비", "스마트", "효율적", "최적화", "선택"],
    },
    TitleCategory {
        name: "adventure",
        tone: "모험적이고 스릴있는",
        seo_keywords: &["모험", "스릴", "액티비티", "체험", "도전", "역동적"],
    },
    TitleCategory {
        name: "romantic",
        tone: "로맨틱하고 낭만적인",
        seo_keywords: &["로맨틱", "낭만", "커플", "신혼", "데이트", "특별한"],
    },
    TitleCategory {
        name: "family",
        tone: "가족 친화적이고 안전한",
        seo_keywords: &["가족", "안전", "편안한", "친화적", "포용적", "따뜻한"],
    },
    TitleCategory {
        name: "cultural",
        tone: "문화적이고 교육적인",
        seo_keywords: &["문화", "역사", "교육", "학습", "체험", "탐구"],
    },
    TitleCategory {
        name: "nature",
        tone: "자연 친화적이고 평화로운",
        seo_keywords: &["자연", "힐링", "평화", "휴양", "그린", "순수"],
    },
];

const DEFAULT_PRODUCT_TYPE: &str = "패키지 여행";

/// Single-title prompt used when regenerating a removed product.
#[must_use]
pub fn city_prompt(city: &str) -> String {
    format!(
        "도시: {city}\n\n\
         SEO에 최적화된 여행 상품 제목을 생성해주세요. 다음 조건을 만족해야 합니다:\n\
         1. 한국어로 작성\n\
         2. 30-50자 내외\n\
         3. 검색에 유리한 키워드 포함\n\
         4. 매력적이고 구체적인 표현 사용\n\
         5. 여행/관광 관련 용어 포함\n\n\
         제목만 생성하고 다른 설명은 포함하지 마세요."
    )
}

/// Inputs of a styled batch prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub location: &'a str,
    pub product_type: Option<&'a str>,
    pub additional_keywords: Option<&'a str>,
    pub exclude_titles: &'a [String],
}

#[must_use]
pub fn category_prompt(category: &TitleCategory, input: &PromptInput<'_>) -> String {
    let product_type = input
        .product_type
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_PRODUCT_TYPE);
    let additional = input
        .additional_keywords
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("없음");
    let exclude = if input.exclude_titles.is_empty() {
        String::new()
    } else {
        format!(
            "\n- 다음 제목들과 유사하거나 중복되지 않도록 주의하세요: {}",
            input.exclude_titles.join(", ")
        )
    };
    let tone = category.tone;

    format!(
        "다음 정보를 바탕으로 SEO에 최적화된 {tone} 여행 상품 제목을 생성해주세요.\n\n\
         나라/도시: {location}\n\
         상품 유형: {product_type}\n\
         추가 키워드: {additional}\n\
         SEO 키워드: {seo}{exclude}\n\n\
         요구사항:\n\
         - 35-50자 내외의 길이로 작성\n\
         - 최소 12개 이상의 키워드로 구성\n\
         - 한국어로 작성하고 영어 사용 금지\n\
         - {tone} 느낌을 강조\n\
         - 지역명, 여행기간, 계절/월, 도시명, 여행유형, 특별활동, 추가키워드를 모두 포함\n\
         - 명사 중심의 키워드 나열 방식, 불필요한 수식어 금지\n\
         - 이모지나 기호 사용 금지\n\
         - 금지 단어: 특가, 땡처리, 반값, 무료, 횡재, 인하, 폭탄, 저가, 저렴한\n\
         - 예시: \"홋카이도 일본 3박4일 오타루 10월 추석연휴 삿포로 노쇼핑투어 북해도 골프여행\"\n\n\
         제목만 반환하고 다른 설명은 포함하지 마세요.",
        location = input.location,
        seo = category.seo_keywords.join(" "),
    )
}

//! Building blocks for synthesizing replacement products from removed ones.

use std::collections::HashSet;

use chrono::NaiveDate;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use crate::city::{normalize_city_name, CityImage};

/// Number of `add_image_link` entries every replacement carries.
pub const ADDITIONAL_IMAGE_SLOTS: usize = 10;

const DEFAULT_PRODUCT_CODE: &str = "000";
const DEFAULT_CITY_TOKEN: &str = "seoul";

/// The code and city segments of a `{date}_{code}_{city}_{seq}` product code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCode {
    pub code: String,
    pub city: String,
}

impl SourceCode {
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut parts = source.split('_').skip(1);
        let code = parts
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PRODUCT_CODE);
        let city_token = parts
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CITY_TOKEN);
        Self {
            code: code.to_string(),
            city: normalize_city_name(city_token),
        }
    }

    /// City segment as written into identifiers (no whitespace).
    #[must_use]
    pub fn city_segment(&self) -> String {
        self.city.split_whitespace().collect()
    }
}

/// Formats `{YYYYMMDD}_{code}_{city}_{NNNN}`.
#[must_use]
pub fn compose_original_id(date: NaiveDate, source: &SourceCode, seq: u32) -> String {
    format!(
        "{}_{}_{}_{seq:04}",
        date.format("%Y%m%d"),
        source.code,
        source.city_segment()
    )
}

/// Picks the smallest sequence number whose identifier is not in `taken`,
/// and records it there.
pub fn allocate_original_id(date: NaiveDate, source: &SourceCode, taken: &mut HashSet<String>) -> String {
    let mut seq = 1u32;
    loop {
        let candidate = compose_original_id(date, source, seq);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        seq += 1;
    }
}

/// Main image plus the pipe-joined additional images of one replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSelection {
    pub image_link: String,
    pub add_image_links: Vec<String>,
    pub video_url: Option<String>,
}

impl ImageSelection {
    #[must_use]
    pub fn add_image_link(&self) -> String {
        self.add_image_links.join("|")
    }
}

/// Chooses imagery for one replacement from the city's images.
///
/// With main images, one is drawn at random and the remaining images fill
/// [`ADDITIONAL_IMAGE_SLOTS`] slots in shuffled order, cycling when short (the
/// main image repeats when it is the only image). Without a main image all
/// images fill the slots and `image_link` stays empty.
pub fn select_images<R: Rng + ?Sized>(images: &[&CityImage], rng: &mut R) -> ImageSelection {
    if images.is_empty() {
        return ImageSelection::default();
    }

    let video_url = images
        .iter()
        .find_map(|img| img.video_url.clone().filter(|v| !v.is_empty()));

    let mains: Vec<&&CityImage> = images.iter().filter(|img| img.is_main_image).collect();
    let (image_link, mut pool): (String, Vec<String>) = match mains.choose(rng) {
        Some(main) => {
            let main_link = main.image_link.clone();
            let others = images
                .iter()
                .filter(|img| img.image_link != main_link)
                .map(|img| img.image_link.clone())
                .collect();
            (main_link, others)
        }
        None => (
            String::new(),
            images.iter().map(|img| img.image_link.clone()).collect(),
        ),
    };

    pool.shuffle(rng);
    if pool.is_empty() {
        pool.push(image_link.clone());
    }

    let add_image_links = pool
        .iter()
        .cycle()
        .take(ADDITIONAL_IMAGE_SLOTS)
        .cloned()
        .collect();

    ImageSelection {
        image_link,
        add_image_links,
        video_url,
    }
}

/// Case-insensitive register of titles already in use.
#[derive(Debug, Default)]
pub struct TitleLedger {
    seen: HashSet<String>,
}

impl TitleLedger {
    pub fn new<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            seen: existing
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Returns `title`, or `title (ver.N)` with the first free `N`, and marks
    /// the result as used.
    pub fn claim(&mut self, title: &str) -> String {
        if self.seen.insert(title.to_lowercase()) {
            return title.to_string();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{title} (ver.{n})");
            if self.seen.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    #[must_use]
    pub fn contains(&self, title: &str) -> bool {
        self.seen.contains(&title.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()
    }

    fn image(link: &str, main: bool) -> CityImage {
        CityImage {
            city: "Osaka".to_string(),
            image_link: link.to_string(),
            is_main_image: main,
            video_url: None,
        }
    }

    #[test]
    fn source_code_splits_code_and_city() {
        let source = SourceCode::parse("20240101_1234_BANGK_0003");
        assert_eq!(source.code, "1234");
        assert_eq!(source.city, "Bangkok");
    }

    #[test]
    fn source_code_defaults_when_segments_missing() {
        let source = SourceCode::parse("legacy-id");
        assert_eq!(source.code, "000");
        assert_eq!(source.city, "Seoul");
    }

    #[test]
    fn original_id_has_zero_padded_sequence() {
        let source = SourceCode::parse("x_55_KUALA LUMPUR_1");
        assert_eq!(
            compose_original_id(date(), &source, 7),
            "20250309_55_KualaLumpur_0007"
        );
    }

    #[test]
    fn allocation_skips_taken_identifiers() {
        let source = SourceCode::parse("x_9_OSAKA_1");
        let mut taken: HashSet<String> = ["20250309_9_Osaka_0001", "20250309_9_Osaka_0002"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(allocate_original_id(date(), &source, &mut taken), "20250309_9_Osaka_0003");
        assert_eq!(allocate_original_id(date(), &source, &mut taken), "20250309_9_Osaka_0004");
    }

    #[test]
    fn selection_with_main_image_excludes_it_from_additional() {
        let images = [image("m.jpg", true), image("a.jpg", false), image("b.jpg", false)];
        let refs: Vec<&CityImage> = images.iter().collect();
        let mut rng = StdRng::seed_from_u64(7);
        let selection = select_images(&refs, &mut rng);
        assert_eq!(selection.image_link, "m.jpg");
        assert_eq!(selection.add_image_links.len(), ADDITIONAL_IMAGE_SLOTS);
        assert!(selection.add_image_links.iter().all(|l| l != "m.jpg"));
        assert_eq!(selection.add_image_link().matches('|').count(), ADDITIONAL_IMAGE_SLOTS - 1);
    }

    #[test]
    fn selection_repeats_lone_main_image() {
        let images = [image("only.jpg", true)];
        let refs: Vec<&CityImage> = images.iter().collect();
        let selection = select_images(&refs, &mut StdRng::seed_from_u64(1));
        assert_eq!(selection.add_image_links, vec!["only.jpg".to_string(); ADDITIONAL_IMAGE_SLOTS]);
    }

    #[test]
    fn selection_without_main_image_leaves_main_empty() {
        let images = [image("a.jpg", false), image("b.jpg", false)];
        let refs: Vec<&CityImage> = images.iter().collect();
        let selection = select_images(&refs, &mut StdRng::seed_from_u64(3));
        assert!(selection.image_link.is_empty());
        assert_eq!(selection.add_image_links.len(), ADDITIONAL_IMAGE_SLOTS);
    }

    #[test]
    fn selection_without_images_is_empty() {
        let selection = select_images(&[], &mut StdRng::seed_from_u64(3));
        assert_eq!(selection, ImageSelection::default());
        assert_eq!(selection.add_image_link(), "");
    }

    #[test]
    fn ledger_appends_version_suffix_case_insensitively() {
        let mut ledger = TitleLedger::new(["Osaka Escape"]);
        assert_eq!(ledger.claim("osaka escape"), "osaka escape (ver.1)");
        assert_eq!(ledger.claim("Osaka Escape"), "Osaka Escape (ver.2)");
        assert_eq!(ledger.claim("Kyoto Nights"), "Kyoto Nights");
        assert!(ledger.contains("KYOTO NIGHTS"));
    }
}

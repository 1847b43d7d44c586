//! City code normalization and city image matching.

use serde::{Deserialize, Serialize};

/// Short product-code city tokens and their display names.
const CITY_CODES: &[(&str, &str)] = &[
    ("GUAM", "Guam"),
    ("SYDNEY", "Sydney"),
    ("SYD", "Sydney"),
    ("SAIPAN", "Saipan"),
    ("OSAKA", "Osaka"),
    ("TOKYO", "Tokyo"),
    ("TOKY", "Tokyo"),
    ("BANGK", "Bangkok"),
    ("BANGKOK", "Bangkok"),
    ("PHUKET", "Phuket"),
    ("CEBU", "Cebu"),
    ("HANOI", "Hanoi"),
    ("DANA", "DaNang"),
    ("DANANG", "DaNang"),
    ("BEPP", "BeppuYufuin"),
    ("KOBE", "Kobe"),
    ("HONGKONG", "HongKong"),
    ("HONG_KONG", "HongKong"),
    ("OCL", "Auckland"),
    ("BALI", "Bali"),
    ("BORAC", "Boracay"),
    ("BORACAY", "Boracay"),
    ("BRISBANE", "Brisbane"),
    ("CG", "Calgary"),
    ("CHIAM", "ChiangMai"),
    ("CHIANGMAI", "ChiangMai"),
    ("CHIANG_MAI", "ChiangMai"),
    ("CLOC", "Clark"),
    ("ENGLAND", "UnitedKingdom"),
    ("FRANCE", "France"),
    ("FUKYO", "Fukuoka"),
    ("GC", "GrandCanyon"),
    ("GERMAN", "Germany"),
    ("GOLDCOST", "GoldCoast"),
    ("GONM", "Kunming"),
    ("GUILIN", "Guilin"),
    ("HACO", "Hakone"),
    ("HIN", "Hainan"),
    ("HL", "Honolulu"),
    ("ITALY", "Italy"),
    ("KOTAKI", "KotaKinabalu"),
    ("KYOT", "Kyoto"),
    ("LA", "LosAngeles"),
    ("LTL", "Rotorua"),
    ("LV", "LasVegas"),
    ("MANIL", "Manila"),
    ("MONGO", "Ulaanbaatar"),
    ("NG", "NiagaraFalls"),
    ("NHATR", "NhaTrang"),
    ("NORTHEUROPE", "Norway"),
    ("NY", "NewYork"),
    ("PATT", "Pattaya"),
    ("PHUQU", "PhuQuoc"),
    ("QB", "Quebec"),
    ("QZT", "Queenstown"),
    ("SF", "SanFrancisco"),
    ("SIEMR", "SiemReap"),
    ("SINGAP", "Singapore"),
    ("SINGAPORE", "Singapore"),
    ("SPAINPORTU", "Portugal"),
    ("SWISS", "Switzerland"),
    ("TR", "Toronto"),
    ("VANGV", "VangVieng"),
    ("VC", "Vancouver"),
    ("WT", "Washington"),
    ("ZHANG", "Zhangjiajie"),
    ("AFRICA", "SouthAfrica"),
    ("AUSTRIA", "Austria"),
    ("MAKAO", "Macau"),
    ("BMOUNTAIN", "BaekduMountain"),
    ("BF", "Banff"),
    ("BUSAN", "Busan"),
    ("DAEGU", "Daegu"),
    ("DAJEON", "Daejeon"),
    ("INCHEON", "Incheon"),
    ("JEJU", "Jeju"),
    ("KUALA_LUMPUR", "Kuala Lumpur"),
    ("KUALALUMPUR", "Kuala Lumpur"),
    ("SEOUL", "Seoul"),
    ("TAIPEI", "Taipei"),
    ("YANGON", "Yangon"),
];

/// A row of the `city_images` table, reduced to what image selection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityImage {
    pub city: String,
    pub image_link: String,
    pub is_main_image: bool,
    pub video_url: Option<String>,
}

/// Maps a city code or free-form city name to its display name.
///
/// Known codes (with or without a leading underscore) come from the code
/// table; anything else is reduced to its letters and Title-Cased word by word.
#[must_use]
pub fn normalize_city_name(input: &str) -> String {
    let raw = input.trim();
    if raw.is_empty() {
        return String::new();
    }

    let upper = raw.to_uppercase();
    let key = upper.strip_prefix('_').unwrap_or(&upper);
    if let Some((_, name)) = CITY_CODES.iter().find(|(code, _)| *code == key) {
        return (*name).to_string();
    }

    let letters_only: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
        .collect();
    let words: Vec<String> = letters_only.split_whitespace().map(title_case).collect();
    if words.is_empty() {
        return raw.to_string();
    }
    words.join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Finds the images belonging to `target_city`.
///
/// Tries, in order: exact normalized match, containment either way, then any
/// shared word longer than two letters. The first non-empty tier wins.
#[must_use]
pub fn match_city_images<'a>(images: &'a [CityImage], target_city: &str) -> Vec<&'a CityImage> {
    let target = normalize_city_name(target_city).to_lowercase();
    if target.is_empty() || images.is_empty() {
        return Vec::new();
    }

    let normalized: Vec<(String, &CityImage)> = images
        .iter()
        .map(|img| (normalize_city_name(&img.city).to_lowercase(), img))
        .collect();

    let exact: Vec<&CityImage> = normalized
        .iter()
        .filter(|(city, _)| *city == target)
        .map(|(_, img)| *img)
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let containing: Vec<&CityImage> = normalized
        .iter()
        .filter(|(city, _)| !city.is_empty() && (city.contains(&target) || target.contains(city.as_str())))
        .map(|(_, img)| *img)
        .collect();
    if !containing.is_empty() {
        return containing;
    }

    let target_words: Vec<&str> = target.split(' ').filter(|w| w.len() > 2).collect();
    if target_words.is_empty() {
        return Vec::new();
    }

    normalized
        .iter()
        .filter(|(city, _)| {
            city.split(' ').filter(|w| w.len() > 2).any(|word| {
                target_words
                    .iter()
                    .any(|t| word.contains(t) || t.contains(word))
            })
        })
        .map(|(_, img)| *img)
        .collect()
}

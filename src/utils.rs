use chrono::{DateTime, NaiveDate, NaiveDateTime};
use url::Url;

/// Trailing path tokens that wrap a product page rather than name it.
const WRAPPER_SEGMENTS: [&str; 4] = ["page", "about", "info", "rules"];

pub fn path_segments(url: &str) -> Vec<String> {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn slug_from_url(url: &str) -> String {
    let segments = path_segments(url);
    match segments.as_slice() {
        [.., parent, last] if WRAPPER_SEGMENTS.contains(&last.to_lowercase().as_str()) => {
            parent.clone()
        }
        [.., last] => last.clone(),
        [] => String::new(),
    }
}

/// `gold_horseshoe` -> `Gold Horseshoe`
pub fn slug_to_title(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best-effort calendar day for a raw draw date; the raw value is kept as-is elsewhere.
pub fn normalize_draw_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }

    for format in ["%Y-%m-%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    None
}

pub fn fallback_explanation(score: f64) -> String {
    format!("Рейтинг соответствия вашим предпочтениям: {:.1}/100", score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_url() {
        assert_eq!(slug_from_url("https://www.stoloto.ru/rusloto"), "rusloto");
        assert_eq!(slug_from_url("https://www.stoloto.ru/loto/6x45/"), "6x45");
        assert_eq!(slug_from_url("https://www.stoloto.ru/rapido/about"), "rapido");
        assert_eq!(slug_from_url("https://www.stoloto.ru/"), "");
    }

    #[test]
    fn test_slug_to_title() {
        assert_eq!(slug_to_title("gold_horseshoe"), "Gold Horseshoe");
        assert_eq!(slug_to_title("zhilishnaya-lotereya"), "Zhilishnaya Lotereya");
        assert_eq!(slug_to_title("4x20"), "4x20");
    }

    #[test]
    fn test_normalize_draw_day() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 12);
        assert_eq!(normalize_draw_day("2024-05-12T21:00:00+03:00"), expected);
        assert_eq!(normalize_draw_day("2024-05-12 21:00:00"), expected);
        assert_eq!(normalize_draw_day("12.05.2024"), expected);
        assert_eq!(normalize_draw_day("2024-05-12"), expected);
        assert_eq!(normalize_draw_day("вчера"), None);
    }

    #[test]
    fn test_fallback_explanation() {
        assert_eq!(
            fallback_explanation(76.4705),
            "Рейтинг соответствия вашим предпочтениям: 76.5/100"
        );
    }
}

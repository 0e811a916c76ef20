//! Page identifiers: normalized cache key, search topic and wiki locale.
//!
//! Dataset page names look like `2015_in_film_en`: an optional numeric prefix,
//! underscore-separated words and a trailing locale suffix. The same rule feeds
//! the cache key and the news topic so both stay consistent.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Wiki editions present in the historical dataset.
const LOCALES: &[&str] = &["en", "de", "fr", "es", "ja", "ru", "zh"];

pub const DEFAULT_LOCALE: &str = "en";

fn decorations() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        let pattern = format!(r"^\d+_|_(?:{})$", LOCALES.join("|"));
        Regex::new(&pattern).expect("static page decoration regex")
    })
}

/// A parsed page identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageId {
    pub raw: String,
    pub key: String,
    pub topic: String,
    pub locale: String,
}

impl PageId {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            raw: raw.to_string(),
            key: normalized_key(raw),
            topic: derive_topic(raw),
            locale: locale_of(raw).to_string(),
        }
    }
}

/// Strip the numeric prefix and the locale suffix in a single pass.
pub fn normalized_key(page: &str) -> String {
    decorations().replace_all(page.trim(), "").into_owned()
}

/// Human-readable topic used for news search.
pub fn derive_topic(page: &str) -> String {
    normalized_key(page).replace('_', " ").trim().to_string()
}

/// Locale suffix of the page, `en` when absent.
pub fn locale_of(page: &str) -> &str {
    let page = page.trim();
    LOCALES
        .iter()
        .find(|l| {
            page.len() > l.len() + 1
                && page.ends_with(*l)
                && page.as_bytes()[page.len() - l.len() - 1] == b'_'
        })
        .copied()
        .unwrap_or(DEFAULT_LOCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_numeric_prefix_and_locale_suffix() {
        assert_eq!(normalized_key("2015_in_film_en"), "in_film");
        assert_eq!(normalized_key("Star_Wars_de"), "Star_Wars");
        assert_eq!(normalized_key("Python"), "Python");
    }

    #[test]
    fn only_trailing_locale_is_stripped() {
        assert_eq!(normalized_key("en_passant"), "en_passant");
        assert_eq!(normalized_key("Frozen_en_fr"), "Frozen_en");
    }

    #[test]
    fn topic_replaces_underscores() {
        assert_eq!(derive_topic("2015_in_film_en"), "in film");
        assert_eq!(derive_topic("The_Beatles_en"), "The Beatles");
    }

    #[test]
    fn topic_derivation_is_idempotent() {
        for page in [
            "2015_in_film_en",
            "12_34_foo",
            "foo_en_en",
            "Game_of_Thrones_ru",
            "  padded_name_en ",
            "plain",
        ] {
            let once = derive_topic(page);
            assert_eq!(derive_topic(&once), once, "not idempotent for {page}");
        }
    }

    #[test]
    fn locale_defaults_to_en() {
        assert_eq!(locale_of("Berlin_de"), "de");
        assert_eq!(locale_of("Berlin"), "en");
        assert_eq!(locale_of("_de"), "en");
        let id = PageId::parse("2016_in_music_ja");
        assert_eq!(id.key, "in_music");
        assert_eq!(id.topic, "in music");
        assert_eq!(id.locale, "ja");
    }
}

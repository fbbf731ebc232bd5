/// Locales the public site is served in. The first one is the default.
pub const LOCALES: [&str; 12] = [
    "en", "zh", "zh-TW", "ko", "th", "es", "fr", "id", "ar", "de", "vi", "my",
];

/// Languages room descriptions are machine-translated into. English is the
/// source language.
pub const TRANSLATION_LANGUAGES: [&str; 11] = [
    "zh", "zh-TW", "ko", "th", "es", "fr", "id", "ar", "de", "vi", "my",
];

pub const SOURCE_LANGUAGE: &str = "en";

pub fn is_supported_locale(locale: &str) -> bool {
    LOCALES.contains(&locale)
}

/// Text direction for the `dir` attribute of rendered pages.
pub fn text_direction(locale: &str) -> &'static str {
    if locale == "ar" { "rtl" } else { "ltr" }
}

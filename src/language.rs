//! Language code helpers shared by the adapters and the workflow.

/// Language hint that asks an engine to detect the language itself.
pub const AUTO: &str = "auto";

pub fn is_auto(code: &str) -> bool {
    let code = code.trim();
    code.is_empty() || code.eq_ignore_ascii_case(AUTO)
}

/// Lower-cased primary subtag: `en-US` and `EN_gb` both become `en`.
pub fn normalize(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn same_language(a: &str, b: &str) -> bool {
    !is_auto(a) && !is_auto(b) && normalize(a) == normalize(b)
}

pub fn language_code_to_name(code: &str) -> String {
    let name = match normalize(code).as_str() {
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "it" => "Italian",
        "pt" => "Portuguese",
        "pl" => "Polish",
        "nl" => "Dutch",
        "tr" => "Turkish",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "sv" => "Swedish",
        "da" => "Danish",
        "no" => "Norwegian",
        "fi" => "Finnish",
        "he" => "Hebrew",
        "hu" => "Hungarian",
        "cs" => "Czech",
        "uk" => "Ukrainian",
        _ => return code.to_string(),
    };
    name.to_string()
}

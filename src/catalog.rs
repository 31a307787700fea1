// Static model and language catalogs served by /models and /languages

use lazy_static::lazy_static;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    /// Approximate parameter count
    pub parameters: &'static str,
    /// Only transcribes English
    #[serde(rename = "englishOnly")]
    pub english_only: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
}

const fn model(
    id: &'static str,
    name: &'static str,
    parameters: &'static str,
    english_only: bool,
) -> ModelInfo {
    ModelInfo {
        id,
        name,
        parameters,
        english_only,
    }
}

const fn language(code: &'static str, name: &'static str) -> LanguageInfo {
    LanguageInfo { code, name }
}

lazy_static! {
    pub static ref MODELS: Vec<ModelInfo> = vec![
        model("tiny", "Tiny", "39M", false),
        model("tiny.en", "Tiny (English)", "39M", true),
        model("base", "Base", "74M", false),
        model("base.en", "Base (English)", "74M", true),
        model("small", "Small", "244M", false),
        model("small.en", "Small (English)", "244M", true),
        model("medium", "Medium", "769M", false),
        model("medium.en", "Medium (English)", "769M", true),
        model("large", "Large", "1550M", false),
        model("large-v2", "Large v2", "1550M", false),
        model("large-v3", "Large v3", "1550M", false),
        model("turbo", "Turbo", "809M", false),
    ];

    pub static ref LANGUAGES: Vec<LanguageInfo> = vec![
        language("af", "Afrikaans"),
        language("ar", "Arabic"),
        language("bg", "Bulgarian"),
        language("ca", "Catalan"),
        language("cs", "Czech"),
        language("cy", "Welsh"),
        language("da", "Danish"),
        language("de", "German"),
        language("el", "Greek"),
        language("en", "English"),
        language("es", "Spanish"),
        language("et", "Estonian"),
        language("fa", "Persian"),
        language("fi", "Finnish"),
        language("fr", "French"),
        language("he", "Hebrew"),
        language("hi", "Hindi"),
        language("hr", "Croatian"),
        language("hu", "Hungarian"),
        language("id", "Indonesian"),
        language("is", "Icelandic"),
        language("it", "Italian"),
        language("ja", "Japanese"),
        language("ko", "Korean"),
        language("lt", "Lithuanian"),
        language("lv", "Latvian"),
        language("ms", "Malay"),
        language("nl", "Dutch"),
        language("no", "Norwegian"),
        language("pl", "Polish"),
        language("pt", "Portuguese"),
        language("ro", "Romanian"),
        language("ru", "Russian"),
        language("sk", "Slovak"),
        language("sl", "Slovenian"),
        language("sr", "Serbian"),
        language("sv", "Swedish"),
        language("sw", "Swahili"),
        language("ta", "Tamil"),
        language("th", "Thai"),
        language("tl", "Tagalog"),
        language("tr", "Turkish"),
        language("uk", "Ukrainian"),
        language("ur", "Urdu"),
        language("vi", "Vietnamese"),
        language("zh", "Chinese"),
    ];
}

/// Case-insensitive lookup of a language code
pub fn is_supported_language(code: &str) -> bool {
    LANGUAGES.iter().any(|l| l.code.eq_ignore_ascii_case(code))
}

pub fn is_known_model(id: &str) -> bool {
    MODELS.iter().any(|m| m.id == id)
}

use isolang::Language;
use whatlang::Lang;
use tracing::debug;

/// Display names for the languages the hotels mostly see, in the reporting locale.
const CURATED_NAMES: [(&str, &str); 12] = [
    ("ja", "日本語"),
    ("en", "英語"),
    ("ko", "韓国語"),
    ("zh", "中国語"),
    ("fr", "フランス語"),
    ("de", "ドイツ語"),
    ("es", "スペイン語"),
    ("it", "イタリア語"),
    ("ru", "ロシア語"),
    ("th", "タイ語"),
    ("vi", "ベトナム語"),
    ("unknown", "不明"),
];

/// Collapses region-qualified codes (`zh-TW`, `pt_BR`) to the lowercase base code.
pub fn base_language_code(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Detects the language of `text` as an ISO 639-1 code when one exists
/// (ISO 639-3 otherwise). Blank text or an unreliable guess is `None`.
pub fn detect_language(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        debug!(
            "Language guess {:?} below reliability threshold ({:.2})",
            info.lang(),
            info.confidence()
        );
        return None;
    }

    // whatlang reports Chinese as the macrolanguage member `cmn`, which has no 639-1 code.
    let code = match info.lang() {
        Lang::Cmn => "zh",
        lang => {
            let code3 = lang.code();
            Language::from_639_3(code3)
                .and_then(|iso| iso.to_639_1())
                .unwrap_or(code3)
        }
    };
    Some(base_language_code(code))
}

/// Human-readable label for a language code. Always renderable for a
/// non-empty code: curated table, then ISO names, then an "unknown" label.
pub fn language_name(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let base = base_language_code(code);

    if let Some((_, name)) = CURATED_NAMES.iter().find(|(c, _)| *c == base) {
        return Some((*name).to_string());
    }

    let iso = match base.len() {
        2 => Language::from_639_1(&base),
        3 => Language::from_639_3(&base),
        _ => None,
    };
    if let Some(lang) = iso {
        return Some(format!("{} ({})", lang.to_name(), base));
    }

    Some(format!("不明な言語 ({})", code))
}

//! Voice naming.
//!
//! Two families are accepted: the OpenAI preset names and Kokoro-style
//! `<lang><gender>_<name>` identifiers such as `af_heart` or `bm_george`.

/// OpenAI preset voices.
pub const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer", "verse",
];

/// OpenAI presets rendered with a female variant.
const FEMININE_PRESETS: &[&str] = &["alloy", "ballad", "coral", "nova", "sage", "shimmer"];

/// Single-character language codes and their BCP-47-ish espeak voice.
pub const LANGUAGES: &[(char, &str)] = &[
    ('a', "en-us"),
    ('b', "en-gb"),
    ('e', "es"),
    ('f', "fr"),
    ('h', "hi"),
    ('i', "it"),
    ('j', "ja"),
    ('p', "pt-br"),
    ('z', "cmn"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

/// Parsed voice identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Language code embedded in the voice, if any.
    pub lang: Option<char>,
    pub gender: Gender,
}

/// Language tag for a single-character language code.
pub fn language_tag(code: char) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, tag)| *tag)
}

/// Parse a voice name; `None` when it belongs to neither family.
pub fn parse(voice: &str) -> Option<VoiceInfo> {
    if OPENAI_VOICES.contains(&voice) {
        let gender = if FEMININE_PRESETS.contains(&voice) {
            Gender::Female
        } else {
            Gender::Male
        };
        return Some(VoiceInfo { lang: None, gender });
    }

    let (prefix, name) = voice.split_once('_')?;
    let mut chars = prefix.chars();
    let (lang, gender) = (chars.next()?, chars.next()?);
    if chars.next().is_some() || name.is_empty() || language_tag(lang).is_none() {
        return None;
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return None;
    }
    let gender = match gender {
        'f' => Gender::Female,
        'm' => Gender::Male,
        _ => return None,
    };
    Some(VoiceInfo {
        lang: Some(lang),
        gender,
    })
}

pub fn is_known_voice(voice: &str) -> bool {
    parse(voice).is_some()
}

//! Language detection for article triage.
//!
//! Detection is deliberately cheap: a curated source map first, then
//! script ratios, then stop-word scoring for the Latin-script languages.
//! `whatlang` only weighs in for long texts, and only to say "this is some
//! language we do not handle".

use std::collections::HashSet;
use std::sync::LazyLock;

use whatlang::{Lang, detect};

use crate::entities::Language;

const KANA_RATIO: f64 = 0.15;
const HANGUL_RATIO: f64 = 0.15;
const CJK_RATIO: f64 = 0.40;
const CYRILLIC_RATIO: f64 = 0.15;
const ARABIC_RATIO: f64 = 0.15;
const MIN_STOPWORD_HITS: usize = 4;
const SHORT_TEXT_WORDS: usize = 16;
const MIN_WHATLANG_CHARS: usize = 50;

/// Publication language of known sources, keyed by source name.
const SOURCE_LANGUAGES: &[(&str, Language)] = &[
    ("CNN", Language::En),
    ("BBC News", Language::En),
    ("Reuters", Language::En),
    ("TechCrunch", Language::En),
    ("Bloomberg", Language::En),
    ("The Guardian", Language::En),
    ("The New York Times", Language::En),
    ("NYTimes", Language::En),
    ("NPR News", Language::En),
    ("Ars Technica", Language::En),
    ("Wired", Language::En),
    ("VentureBeat AI", Language::En),
    ("Al Jazeera", Language::En),
    ("Foreign Policy", Language::En),
    ("NHK News", Language::Ja),
    ("朝日新闻", Language::Ja),
    ("朝日新聞", Language::Ja),
    ("读卖新闻", Language::Ja),
    ("日本经济新闻", Language::Ja),
    ("韩国中央日报", Language::Ko),
    ("韩国经济日报", Language::Ko),
    ("新浪新闻", Language::Zh),
    ("腾讯新闻", Language::Zh),
    ("网易新闻", Language::Zh),
    ("凤凰网", Language::Zh),
    ("澎湃新闻", Language::Zh),
    ("36氪", Language::Zh),
    ("虎嗅网", Language::Zh),
    ("钛媒体", Language::Zh),
    ("新加坡早报", Language::Zh),
    ("德国之声中文", Language::Zh),
    ("联合国新闻", Language::Zh),
    ("Le Monde", Language::Fr),
    ("France 24", Language::Fr),
    ("Deutsche Welle", Language::De),
    ("德国之声", Language::De),
    ("Corriere della Sera", Language::It),
    ("La Repubblica", Language::It),
    ("El País", Language::Es),
    ("El Mundo", Language::Es),
    ("RT News", Language::Ru),
    ("Sputnik", Language::Ru),
];

/// Kanji in their Japanese (shinjitai or traditional) form whose
/// simplified-Chinese counterpart is a different code point.
const JAPANESE_KANJI: &str = "聞気戦済経駅円広売読変図県関働込畑峠楽薬歳鉄転検険権総発団対沢浜辺曜時東語話間開銀観覧実険縄営単伝価値豊様際続報紙";

/// Simplified-Chinese forms that never appear in Japanese text.
const SIMPLIFIED_HANZI: &str = "这们说时国闻会发对经济东网门为来个与过还进现员问题长开关见区车马书业华报间气战铁农产习乡电视样应该让从";

static JAPANESE_KANJI_SET: LazyLock<HashSet<char>> =
    LazyLock::new(|| JAPANESE_KANJI.chars().collect());

static SIMPLIFIED_HANZI_SET: LazyLock<HashSet<char>> =
    LazyLock::new(|| SIMPLIFIED_HANZI.chars().collect());

/// Stop words per Latin-script language, ordered alphabetically by tag so that
/// ties resolve to the alphabetically first tag. Words that are also common in
/// English are left out.
const STOP_WORDS: &[(Language, &[&str])] = &[
    (
        Language::De,
        &[
            "der", "das", "und", "ist", "nicht", "mit", "den", "dem", "ein", "eine", "einen",
            "zu", "von", "für", "auf", "sich", "auch", "wird", "bei", "nach", "über", "dass",
            "werden", "sind", "wie", "noch",
        ],
    ),
    (
        Language::Es,
        &[
            "el", "los", "las", "del", "y", "por", "para", "con", "es", "está", "su", "sus",
            "al", "como", "pero", "según", "tras", "una", "fue", "más", "sobre", "entre",
        ],
    ),
    (
        Language::Fr,
        &[
            "le", "les", "des", "une", "est", "et", "du", "au", "aux", "pour", "dans", "sur",
            "avec", "qui", "pas", "ce", "cette", "sont", "ses", "leur", "nous", "vous", "selon",
            "après", "été",
        ],
    ),
    (
        Language::It,
        &[
            "il", "lo", "gli", "della", "delle", "dei", "che", "è", "per", "sono", "nel",
            "nella", "non", "anche", "più", "dal", "alla", "degli", "questo", "ha",
        ],
    ),
    (
        Language::Pt,
        &[
            "os", "da", "do", "das", "dos", "em", "um", "uma", "não", "ao", "pelo", "pela",
            "mais", "foi", "são", "está", "também", "como", "com", "seu", "sua",
        ],
    ),
];

const ENGLISH_STOP_WORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "is", "for", "on", "with", "that", "by", "at", "from",
    "as", "was", "are", "it", "an", "be", "has", "have", "after", "over", "says",
];

/// Classify a (title, body, source hint) triple into a language tag.
pub fn detect_language(title: &str, content: Option<&str>, source_hint: Option<&str>) -> Language {
    if let Some(lang) = source_hint.and_then(language_for_source) {
        return lang;
    }

    let text = match content {
        Some(body) if !body.is_empty() => format!("{title} {body}"),
        _ => title.to_string(),
    };

    if let Some(lang) = detect_by_script(&text) {
        return lang;
    }

    if let Some(lang) = detect_by_stop_words(&text) {
        return lang;
    }

    if is_unsupported_language(&text) {
        return Language::Other;
    }

    Language::En
}

/// Look up the curated source map. Matching ignores surrounding whitespace and
/// ASCII case.
pub fn language_for_source(name: &str) -> Option<Language> {
    let name = name.trim();
    SOURCE_LANGUAGES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, lang)| *lang)
}

#[derive(Default)]
struct ScriptCounts {
    letters: usize,
    kana: usize,
    hangul: usize,
    cjk: usize,
    cyrillic: usize,
    arabic: usize,
    japanese_forms: usize,
    simplified_forms: usize,
}

fn count_scripts(text: &str) -> ScriptCounts {
    let mut counts = ScriptCounts::default();
    for c in text.chars() {
        if !c.is_alphabetic() {
            continue;
        }
        counts.letters += 1;
        match c {
            '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' => {
                counts.kana += 1
            }
            '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}' => {
                counts.hangul += 1
            }
            '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => {
                counts.cjk += 1;
                if JAPANESE_KANJI_SET.contains(&c) {
                    counts.japanese_forms += 1;
                }
                if SIMPLIFIED_HANZI_SET.contains(&c) {
                    counts.simplified_forms += 1;
                }
            }
            '\u{0400}'..='\u{04FF}' => counts.cyrillic += 1,
            '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' => counts.arabic += 1,
            _ => {}
        }
    }
    counts
}

fn detect_by_script(text: &str) -> Option<Language> {
    let counts = count_scripts(text);
    if counts.letters == 0 {
        return None;
    }
    let ratio = |n: usize| n as f64 / counts.letters as f64;

    if ratio(counts.kana) >= KANA_RATIO {
        return Some(Language::Ja);
    }
    if ratio(counts.hangul) >= HANGUL_RATIO {
        return Some(Language::Ko);
    }
    if ratio(counts.cjk) >= CJK_RATIO {
        // Kana-less Japanese headlines are all kanji; their character forms
        // still give them away.
        if counts.japanese_forms > 0 && counts.simplified_forms == 0 {
            return Some(Language::Ja);
        }
        return Some(Language::Zh);
    }
    if ratio(counts.cyrillic) >= CYRILLIC_RATIO {
        return Some(Language::Ru);
    }
    if ratio(counts.arabic) >= ARABIC_RATIO {
        return Some(Language::Ar);
    }
    None
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn detect_by_stop_words(text: &str) -> Option<Language> {
    let words = words(text);
    if words.is_empty() {
        return None;
    }

    let required = if words.len() < SHORT_TEXT_WORDS {
        (words.len() / 4).clamp(1, MIN_STOPWORD_HITS)
    } else {
        MIN_STOPWORD_HITS
    };

    let hits = |list: &[&str]| words.iter().filter(|w| list.contains(&w.as_str())).count();
    let english_hits = hits(ENGLISH_STOP_WORDS);

    let mut best: Option<(Language, usize)> = None;
    for (lang, list) in STOP_WORDS {
        let score = hits(list);
        // Strictly greater keeps the alphabetically first tag on ties.
        if score >= required && best.is_none_or(|(_, top)| score > top) {
            best = Some((*lang, score));
        }
    }

    best.filter(|(_, score)| *score > english_hits)
        .map(|(lang, _)| lang)
}

fn is_unsupported_language(text: &str) -> bool {
    if text.chars().count() < MIN_WHATLANG_CHARS {
        return false;
    }
    match detect(text) {
        Some(info) if info.is_reliable() => map_whatlang(info.lang()).is_none(),
        _ => false,
    }
}

fn map_whatlang(lang: Lang) -> Option<Language> {
    match lang {
        Lang::Eng => Some(Language::En),
        Lang::Cmn => Some(Language::Zh),
        Lang::Jpn => Some(Language::Ja),
        Lang::Kor => Some(Language::Ko),
        Lang::Fra => Some(Language::Fr),
        Lang::Deu => Some(Language::De),
        Lang::Ita => Some(Language::It),
        Lang::Spa => Some(Language::Es),
        Lang::Por => Some(Language::Pt),
        Lang::Rus => Some(Language::Ru),
        Lang::Ara => Some(Language::Ar),
        _ => None,
    }
}

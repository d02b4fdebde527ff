//! Lightweight language detection.
//!
//! Counts stopword hits for a handful of European languages and falls back to
//! script ranges for Japanese and Chinese. Good enough to decide whether a
//! restaurant page needs translating; not a general detector.

/// How much of the text to look at.
pub const DETECTION_WINDOW: usize = 1000;

/// Fewer stopword hits than this means we don't know.
const MIN_HITS: usize = 3;

const STOPWORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "of", "to", "is", "with", "for", "our", "you", "we", "are", "on", "this", "that", "from"]),
    ("fr", &["le", "la", "les", "et", "des", "du", "un", "une", "est", "pour", "avec", "nous", "vous", "notre", "aux", "dans"]),
    ("de", &["der", "die", "das", "und", "ist", "mit", "für", "wir", "ein", "eine", "den", "dem", "unser", "nicht", "auf", "zu"]),
    ("es", &["el", "los", "las", "y", "del", "con", "para", "es", "nuestro", "nuestra", "una", "por", "que"]),
    ("it", &["il", "lo", "gli", "di", "della", "con", "per", "è", "nostro", "nostra", "che", "sono", "alla"]),
    ("pt", &["o", "os", "do", "da", "com", "para", "em", "é", "nosso", "nossa", "um", "uma", "não"]),
    ("nl", &["het", "een", "en", "van", "met", "voor", "wij", "onze", "ons", "op", "zijn", "niet", "bij"]),
    ("sv", &["och", "att", "det", "som", "ett", "för", "med", "är", "vi", "på", "av", "till", "vår", "inte"]),
    ("da", &["og", "at", "det", "som", "et", "for", "med", "er", "vi", "på", "af", "til", "vores", "ikke"]),
];

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30ff}')
}

fn is_han(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

/// Detect the language of `text` as an ISO 639-1 code.
pub fn detect_language(text: &str) -> Option<String> {
    let window: String = text.chars().take(DETECTION_WINDOW).collect();

    let (mut kana, mut han, mut letters) = (0usize, 0usize, 0usize);
    for c in window.chars() {
        if is_kana(c) {
            kana += 1;
        } else if is_han(c) {
            han += 1;
        } else if c.is_alphabetic() {
            letters += 1;
        }
    }
    let cjk = kana + han;
    if cjk > 0 && cjk * 2 >= letters {
        return Some(if kana > 0 { "ja" } else { "zh" }.to_string());
    }

    let lowered = window.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let mut scores: Vec<(&str, usize)> = STOPWORDS
        .iter()
        .map(|(lang, stops)| {
            let hits = words.iter().filter(|w| stops.contains(w)).count();
            (*lang, hits)
        })
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    match scores.as_slice() {
        [(lang, best), (_, second), ..] if *best >= MIN_HITS && best > second => {
            Some(lang.to_string())
        }
        _ => None,
    }
}

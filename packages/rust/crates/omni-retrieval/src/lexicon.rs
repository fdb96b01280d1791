//! German and English stopwords shared by intent detection and quality scoring.

pub(crate) const STOPWORDS_DE: &[&str] = &[
    "der", "die", "das", "den", "dem", "des", "ein", "eine", "einen", "einem", "einer", "eines",
    "und", "oder", "aber", "ist", "sind", "war", "waren", "wird", "werden", "wurde", "wurden",
    "hat", "haben", "hatte", "nicht", "kein", "keine", "mit", "von", "vom", "zu", "zum", "zur",
    "auf", "aus", "bei", "für", "über", "unter", "nach", "vor", "im", "in", "an", "am", "als",
    "auch", "wie", "was", "wer", "wo", "wann", "warum", "welche", "welcher", "welches", "es",
    "er", "sie", "wir", "ihr", "ich", "du", "sich", "dass", "wenn", "noch", "nur", "so", "sehr",
    "kann", "können", "muss", "müssen", "soll", "sollen", "gibt", "bitte", "mir", "mich",
];

pub(crate) const STOPWORDS_EN: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "has", "have", "had", "not", "no", "with", "of", "to", "for", "on", "at", "by", "from",
    "in", "into", "about", "as", "it", "its", "this", "that", "these", "those", "what", "who",
    "where", "when", "why", "how", "which", "do", "does", "did", "can", "could", "should",
    "would", "will", "there", "their", "they", "we", "you", "i", "me", "my", "our", "your",
    "please", "than", "then", "so", "very", "if",
];

pub(crate) fn is_stopword_de(word: &str) -> bool {
    STOPWORDS_DE.contains(&word)
}

pub(crate) fn is_stopword_en(word: &str) -> bool {
    STOPWORDS_EN.contains(&word)
}

/// Expects a lowercased word.
pub(crate) fn is_stopword(word: &str) -> bool {
    is_stopword_de(word) || is_stopword_en(word)
}

/// Lowercased alphanumeric tokens; umlauts and `ß` stay inside words.
pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

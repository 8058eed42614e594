use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    Language,
    LowerCaser,
    RawTokenizer,
    RemoveLongFilter,
    SimpleTokenizer,
    Stemmer,
    StopWordFilter,
    TextAnalyzer,
    TokenStream,
};

use crate::error::{Error, Result};

/// Tokens longer than this many UTF-8 bytes are dropped as noise. Cyrillic
/// letters take two bytes, so this still admits words of 120+ letters.
const MAX_TOKEN_BYTES: usize = 255;

/// Languages with both a stopword list and a Snowball stemmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizerLanguage {
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Russian,
    Spanish,
    Swedish,
}

impl NormalizerLanguage {
    fn tantivy(self) -> Language {
        match self {
            Self::Danish => Language::Danish,
            Self::Dutch => Language::Dutch,
            Self::English => Language::English,
            Self::Finnish => Language::Finnish,
            Self::French => Language::French,
            Self::German => Language::German,
            Self::Hungarian => Language::Hungarian,
            Self::Italian => Language::Italian,
            Self::Norwegian => Language::Norwegian,
            Self::Portuguese => Language::Portuguese,
            Self::Russian => Language::Russian,
            Self::Spanish => Language::Spanish,
            Self::Swedish => Language::Swedish,
        }
    }
}

/// Maps a surface token to its dictionary form.
#[derive(Clone)]
pub enum Lemmatizer {
    /// Keep the lowercased surface form.
    Identity,
    /// Reduce to the Snowball stem.
    Snowball(TextAnalyzer),
    /// Look the form up in a form → lemma table.
    Lexicon(HashMap<String, String>),
}

impl Lemmatizer {
    pub fn snowball(language: NormalizerLanguage) -> Self {
        let analyzer = TextAnalyzer::builder(RawTokenizer::default())
            .filter(Stemmer::new(language.tantivy()))
            .build();
        Self::Snowball(analyzer)
    }

    pub fn lexicon<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::Lexicon(
            entries
                .into_iter()
                .map(|(k, v)| {
                    (k.as_ref().to_lowercase(), v.as_ref().to_lowercase())
                })
                .collect(),
        )
    }

    /// Load a lexicon from a TSV file of `form<TAB>lemma` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn load_lexicon(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound {
                    kind: "lexicon",
                    name: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (form, lemma) = line.split_once('\t').ok_or_else(|| {
                Error::Config(format!(
                    "{}:{}: expected `form<TAB>lemma`",
                    path.display(),
                    line_no + 1
                ))
            })?;
            entries.push((form.trim().to_string(), lemma.trim().to_string()));
        }

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "loaded lemma lexicon"
        );
        Ok(Self::lexicon(entries))
    }

    fn lemma(&self, token: &str) -> String {
        match self {
            Self::Identity => token.to_string(),
            Self::Snowball(analyzer) => {
                let mut analyzer = analyzer.clone();
                let mut stream = analyzer.token_stream(token);
                if stream.advance() {
                    stream.token().text.clone()
                } else {
                    token.to_string()
                }
            }
            Self::Lexicon(forms) => forms
                .get(token)
                .cloned()
                .unwrap_or_else(|| token.to_string()),
        }
    }
}

impl std::fmt::Debug for Lemmatizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Snowball(_) => f.write_str("Snowball"),
            Self::Lexicon(forms) => {
                f.debug_struct("Lexicon").field("forms", &forms.len()).finish()
            }
        }
    }
}

/// Turns raw text into a sequence of lowercase lemmas.
///
/// Tokens that are stopwords for the configured language, punctuation, or
/// contain anything but alphabetic characters are discarded.
#[derive(Clone)]
pub struct TextNormalizer {
    analyzer: TextAnalyzer,
    lemmatizer: Lemmatizer,
}

impl TextNormalizer {
    pub fn new(
        language: NormalizerLanguage,
        lemmatizer: Lemmatizer,
        extra_stopwords: &[String],
    ) -> Self {
        let stopwords = StopWordFilter::new(language.tantivy())
            .unwrap_or_else(|| StopWordFilter::remove(Vec::<String>::new()));
        let extra = StopWordFilter::remove(
            extra_stopwords
                .iter()
                .map(|w| w.to_lowercase())
                .collect::<Vec<_>>(),
        );

        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
            .filter(LowerCaser)
            .filter(stopwords)
            .filter(extra)
            .build();

        Self {
            analyzer,
            lemmatizer,
        }
    }

    pub fn normalize(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();

        while stream.advance() {
            let token = &stream.token().text;
            if token.chars().all(char::is_alphabetic) {
                tokens.push(self.lemmatizer.lemma(token));
            }
        }

        tokens
    }

    /// Normalize and join the tokens with single spaces.
    pub fn normalize_joined(&self, text: &str) -> String {
        self.normalize(text).join(" ")
    }
}

impl std::fmt::Debug for TextNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextNormalizer")
            .field("lemmatizer", &self.lemmatizer)
            .finish_non_exhaustive()
    }
}

//! Text preparation for legal statements: HTML stripping and the Portuguese
//! analysis chain shared by the lexical index, the hash embedder and the
//! overlap reranker.
//!
//! Tokens go through tantivy's `SimpleTokenizer`, lowercasing, the Portuguese
//! stopword list, RSLP plural reduction, the Snowball Portuguese stemmer and
//! ASCII folding, in that order. Snowball alone keeps `sanção` and `sanções`
//! apart, so plurals are reduced to their singular first.

use once_cell::sync::Lazy;
use regex::Regex;
use tantivy::tokenizer::{
    AsciiFoldingFilter, Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer,
    StopWordFilter, TextAnalyzer, Token, TokenFilter, TokenStream, Tokenizer,
};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static ANALYZER: Lazy<TextAnalyzer> = Lazy::new(portuguese_analyzer);

/// RSLP plural step: suffix, replacement, minimum remaining length, exceptions.
/// Rules are tried in order; the first one whose conditions hold applies.
const PLURAL_RULES: &[(&str, &str, usize, &[&str])] = &[
    ("ns", "m", 1, &[]),
    ("ões", "ão", 3, &[]),
    ("ães", "ão", 1, &["mães"]),
    ("ais", "al", 1, &["cais", "mais"]),
    ("éis", "el", 2, &[]),
    ("eis", "el", 2, &[]),
    ("óis", "ol", 2, &[]),
    (
        "is",
        "il",
        2,
        &["lápis", "cais", "mais", "crúcis", "biquínis", "pois", "depois", "dois", "leis"],
    ),
    ("les", "l", 3, &[]),
    ("res", "r", 3, &["árvores"]),
    (
        "s",
        "",
        2,
        &[
            "aliás", "pires", "lápis", "cais", "mais", "mas", "menos", "férias", "fezes",
            "pêsames", "crúcis", "gás", "atrás", "moisés", "através", "convés", "ês", "país",
            "após", "ambas", "ambos", "messias", "depois",
        ],
    ),
];

/// Remove HTML tags and collapse whitespace
pub fn remove_html(input: &str) -> String {
    let stripped = HTML_TAG.replace_all(input, " ");
    condense_whitespace(&stripped)
}

pub fn condense_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Singular form of a lowercased Portuguese token, or `None` when no plural
/// rule applies.
pub fn singular(token: &str) -> Option<String> {
    if !token.ends_with('s') {
        return None;
    }
    let len = token.chars().count();
    PLURAL_RULES
        .iter()
        .find(|(suffix, _, min_stem, exceptions)| {
            token.ends_with(suffix)
                && len >= suffix.chars().count() + min_stem
                && !exceptions.contains(&token)
        })
        .map(|(suffix, replacement, _, _)| {
            let stem = &token[..token.len() - suffix.len()];
            format!("{stem}{replacement}")
        })
}

/// Full analysis chain used by the lexical index, the hash embedder and the
/// overlap reranker
pub fn analyze(input: &str) -> Vec<String> {
    let text = remove_html(input);
    let mut analyzer = ANALYZER.clone();
    let mut stream = analyzer.token_stream(&text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

fn portuguese_analyzer() -> TextAnalyzer {
    let stop_words = StopWordFilter::new(Language::Portuguese)
        .unwrap_or_else(|| StopWordFilter::remove(Vec::<String>::new()));
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(stop_words)
        .filter(PluralReducer)
        .filter(Stemmer::new(Language::Portuguese))
        .filter(AsciiFoldingFilter)
        .build()
}

/// Token filter applying [`singular`] to every token
#[derive(Clone)]
struct PluralReducer;

impl TokenFilter for PluralReducer {
    type Tokenizer<T: Tokenizer> = PluralReducerFilter<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> PluralReducerFilter<T> {
        PluralReducerFilter { inner: tokenizer }
    }
}

#[derive(Clone)]
struct PluralReducerFilter<T> {
    inner: T,
}

impl<T: Tokenizer> Tokenizer for PluralReducerFilter<T> {
    type TokenStream<'a> = PluralReducerStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        PluralReducerStream {
            tail: self.inner.token_stream(text),
        }
    }
}

struct PluralReducerStream<T> {
    tail: T,
}

impl<T: TokenStream> TokenStream for PluralReducerStream<T> {
    fn advance(&mut self) -> bool {
        if !self.tail.advance() {
            return false;
        }
        let token = self.tail.token_mut();
        if let Some(reduced) = singular(&token.text) {
            token.text = reduced;
        }
        true
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}

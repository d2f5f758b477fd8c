//! Human-typeable `adjective-adjective-noun` session names.
//!
//! Names are not checked for uniqueness. The word lists give 259,200
//! combinations; a collision puts two senders in one session.

use std::fmt;

use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "quick", "lazy", "sleepy", "noisy", "hungry", "brave", "calm", "eager", "fancy", "gentle",
    "happy", "jolly", "kind", "lively", "mighty", "nimble", "polite", "proud", "quiet", "rapid",
    "shiny", "silly", "sunny", "swift", "tidy", "witty", "zany", "bold", "clever", "cozy",
    "crisp", "dusty", "fuzzy", "giant", "golden", "humble", "icy", "lucky", "misty", "plucky",
    "rusty", "salty", "smooth", "snowy", "spicy", "stormy", "sturdy", "tiny", "velvet", "wild",
    "amber", "breezy", "cheery", "dapper", "fierce", "frosty", "grumpy", "hasty", "jumpy", "mellow",
];

const NOUNS: &[&str] = &[
    "fox", "dog", "lion", "cat", "bird", "otter", "panda", "tiger", "whale", "wolf",
    "badger", "beaver", "camel", "crane", "eagle", "falcon", "ferret", "gecko", "heron", "koala",
    "lemur", "llama", "moose", "newt", "owl", "parrot", "puffin", "rabbit", "raven", "seal",
    "shark", "sloth", "swan", "toad", "turtle", "walrus", "yak", "zebra", "bison", "hare",
    "mole", "mouse", "pony", "robin", "squid", "stork", "trout", "viper", "wasp", "wren",
    "apple", "anchor", "comet", "harbor", "kettle", "lantern", "meadow", "pebble", "river",
    "canyon", "cedar", "cloud", "ember", "forest", "glacier", "island", "maple", "orchid",
    "tulip", "valley", "willow", "summit",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("Invalid session id: must not be empty")]
    InvalidFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut pick = |words: &[&'static str]| *words.choose(&mut rng).unwrap_or(&"session");
        let first = pick(ADJECTIVES);
        let second = pick(ADJECTIVES);
        let noun = pick(NOUNS);
        Self(format!("{first}-{second}-{noun}"))
    }

    /// Accepts anything non-empty; whether the session exists is for the relay
    /// to decide.
    pub fn parse(input: &str) -> Result<Self, SessionIdError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SessionIdError::InvalidFormat);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The link a display opens to join this session.
    pub fn share_url(&self, base_url: &str) -> String {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!("{base_url}{separator}sessionId={}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_three_hyphen_joined_tokens() {
        for _ in 0..500 {
            let id = SessionId::generate();
            let tokens: Vec<&str> = id.as_str().split('-').collect();
            assert_eq!(tokens.len(), 3, "{id}");
            assert!(tokens.iter().all(|t| !t.is_empty()), "{id}");
            assert!(ADJECTIVES.contains(&tokens[0]));
            assert!(ADJECTIVES.contains(&tokens[1]));
            assert!(NOUNS.contains(&tokens[2]));
        }
    }

    #[test]
    fn word_lists_contain_no_separators() {
        assert!(ADJECTIVES.iter().chain(NOUNS).all(|w| !w.is_empty() && !w.contains('-')));
    }

    #[test]
    fn parse_is_loose_but_rejects_blank() {
        assert_eq!(SessionId::parse("  quick-lazy-fox\n").unwrap().as_str(), "quick-lazy-fox");
        assert_eq!(SessionId::parse("anything").unwrap().as_str(), "anything");
        assert_eq!(SessionId::parse("   "), Err(SessionIdError::InvalidFormat));
        assert_eq!("".parse::<SessionId>(), Err(SessionIdError::InvalidFormat));
    }

    #[test]
    fn share_url_appends_query() {
        let id = SessionId::parse("quick-lazy-fox").unwrap();
        assert_eq!(
            id.share_url("https://owd.example.net/"),
            "https://owd.example.net/?sessionId=quick-lazy-fox"
        );
        assert_eq!(id.share_url("http://h/s?x=1"), "http://h/s?x=1&sessionId=quick-lazy-fox");
    }
}

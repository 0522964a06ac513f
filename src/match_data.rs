use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One candidate parse of a query during entity-extraction search. The
/// sentence holds the still-unconsumed tokens, with extracted spans replaced
/// by their placeholder token; confidence is a running score until the owning
/// intent folds in its whole-sentence classifier.
#[derive(Debug, Clone)]
pub struct MatchData {
    pub name: String,
    pub sent: Vec<String>,
    pub matches: HashMap<String, Vec<String>>,
    pub conf: f32,
}

impl MatchData {
    pub fn new(name: &str, sent: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            sent,
            matches: HashMap::new(),
            conf: 0.0,
        }
    }

    /// Turns the hypothesis into user-facing strings: tokens rejoined with
    /// apostrophe handling, `{}` stripped from the extracted-entity keys.
    pub fn detokenize(&self) -> IntentMatch {
        IntentMatch {
            name: self.name.clone(),
            sent: handle_apostrophes(&self.sent),
            matches: self
                .matches
                .iter()
                .map(|(token, sent)| {
                    let key = token.replace('{', "").replace('}', "");
                    (key, handle_apostrophes(sent))
                })
                .collect(),
            conf: self.conf,
        }
    }
}

/// Final match result for one intent, ready for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub name: String,
    pub sent: String,
    pub matches: HashMap<String, String>,
    pub conf: f32,
}

impl IntentMatch {
    /// Neutral result returned for queries against an empty container.
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            sent: String::new(),
            matches: HashMap::new(),
            conf: 0.0,
        }
    }
}

/// Joins tokens with spaces, except that a one-character fragment following
/// an apostrophe (the `s` in `["it", "'", "s"]`) is reattached without one.
fn handle_apostrophes(tokens: &[String]) -> String {
    let mut sentence = String::new();
    let mut after_apostrophe = false;
    for word in tokens {
        if word.as_str() == "'" {
            after_apostrophe = true;
            sentence.push_str(word);
        } else if after_apostrophe {
            if word.chars().count() > 1 {
                sentence.push(' ');
                sentence.push_str(word);
            } else {
                sentence.push_str(word);
                after_apostrophe = false;
            }
        } else {
            if !sentence.is_empty() {
                sentence.push(' ');
            }
            sentence.push_str(word);
        }
    }
    sentence
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_apostrophe_fragments_rejoin_without_space() {
        assert_eq!("it's", handle_apostrophes(&tokens(&["it", "'", "s"])));
        assert_eq!("don't stop", handle_apostrophes(&tokens(&["don", "'", "t", "stop"])));
    }

    #[test]
    fn test_plain_tokens_join_with_spaces() {
        assert_eq!(
            "hello there world",
            handle_apostrophes(&tokens(&["hello", "there", "world"]))
        );
    }

    #[test]
    fn test_detokenize_strips_braces_from_entity_keys() {
        // Given
        let mut data = MatchData::new("weather", tokens(&["weather", "in", "{city}"]));
        data.matches = hashmap! {
            "{city}".to_string() => tokens(&["new", "york"]),
        };
        data.conf = 0.8;

        // When
        let result = data.detokenize();

        // Then
        assert_eq!("weather in {city}", result.sent);
        assert_eq!(hashmap! {"city".to_string() => "new york".to_string()}, result.matches);
    }
}

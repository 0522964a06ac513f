use std::collections::HashMap;

use log::warn;

use crate::bracket_expansion::expand_parentheses;
use crate::utils::{remove_comments, tokenize};

/// Holds the expanded training sentences of every registered intent and
/// entity. Populated while objects are queued for training, then shared
/// read-only across training workers.
#[derive(Debug, Clone, Default)]
pub struct TrainData {
    sent_lists: HashMap<String, Vec<Vec<String>>>,
}

impl TrainData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenizes and expands the template lines for one name, replacing any
    /// previously registered lines. A line that fails to expand is dropped
    /// with a warning; the remaining lines are still used.
    pub fn add_lines<S: AsRef<str>>(&mut self, name: &str, lines: &[S]) {
        let mut sents = Vec::new();
        for line in remove_comments(lines) {
            match expand_parentheses(&tokenize(&line)) {
                Ok(expanded) => sents.extend(expanded),
                Err(err) => warn!("Bad template line '{}' for {}: {}", line, name, err),
            }
        }
        sents.retain(|sent| !sent.is_empty());
        self.sent_lists.insert(name.to_string(), sents);
    }

    pub fn remove_lines(&mut self, name: &str) {
        self.sent_lists.remove(name);
    }

    /// Sentences belonging to the named object (positive examples).
    pub fn my_sents<'a>(&'a self, my_name: &str) -> impl Iterator<Item = &'a Vec<String>> {
        self.sent_lists
            .get(my_name)
            .into_iter()
            .flat_map(|sents| sents.iter())
    }

    /// Sentences belonging to every other object (negative examples).
    pub fn other_sents<'a>(&'a self, my_name: &'a str) -> impl Iterator<Item = &'a Vec<String>> {
        self.sent_lists
            .iter()
            .filter(move |(name, _)| name.as_str() != my_name)
            .flat_map(|(_, sents)| sents.iter())
    }

    pub fn all_sents<'a>(&'a self) -> impl Iterator<Item = &'a Vec<String>> {
        self.sent_lists.values().flat_map(|sents| sents.iter())
    }
}

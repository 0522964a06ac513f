use std::collections::HashMap;
use std::hash::Hasher;

use twox_hash::XxHash32;

/// Fingerprint of a set of template lines, used for cache invalidation only.
pub fn lines_hash<S: AsRef<str>>(lines: &[S]) -> u32 {
    let mut hasher = XxHash32::with_seed(0);
    for line in lines {
        hasher.write(line.as_ref().as_bytes());
    }
    hasher.finish() as u32
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Number,
    Separator,
    Punctuation,
}

fn char_class(c: char) -> CharClass {
    if c.is_alphabetic() || c == '-' || c == '{' || c == '}' {
        CharClass::Word
    } else if c.is_numeric() || c == '#' {
        CharClass::Number
    } else if c.is_whitespace() {
        CharClass::Separator
    } else {
        CharClass::Punctuation
    }
}

/// Splits a sentence into lowercase significant units.
///
/// Maximal runs of same-class characters form one token; every punctuation
/// character is a token of its own, except `.`, `!` and `?` which are dropped
/// entirely. Braces and hyphens count as word characters so `{city}` and
/// `ice-cream` stay whole.
pub fn tokenize(sentence: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut last_class = CharClass::Separator;

    let mut flush = |current: &mut String| {
        if !current.is_empty() {
            if current.as_str() != "." && current.as_str() != "!" && current.as_str() != "?" {
                tokens.push(current.to_lowercase());
            }
            current.clear();
        }
    };

    for c in sentence.chars() {
        let class = char_class(c);
        if class != last_class || class == CharClass::Punctuation {
            flush(&mut current);
        }
        if class != CharClass::Separator {
            current.push(c);
        }
        last_class = class;
    }
    flush(&mut current);
    tokens
}

pub fn remove_comments<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.as_ref().to_string())
        .filter(|line| !line.starts_with("//"))
        .collect()
}

/// Merges duplicate training rows: identical input vectors are collapsed to a
/// single row whose target is the element-wise max of the conflicting targets.
pub fn resolve_conflicts(
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let mut merged: HashMap<Vec<u32>, (Vec<f32>, Vec<f32>)> = HashMap::new();
    for (input, output) in inputs.into_iter().zip(outputs) {
        let key: Vec<u32> = input.iter().map(|v| v.to_bits()).collect();
        match merged.get_mut(&key) {
            Some((_, existing)) => {
                for (slot, value) in existing.iter_mut().zip(output) {
                    if value > *slot {
                        *slot = value;
                    }
                }
            }
            None => {
                merged.insert(key, (input, output));
            }
        }
    }
    merged.into_iter().map(|(_, pair)| pair).unzip()
}

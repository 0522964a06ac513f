use failure::bail;

use crate::errors::*;

/// One node of a parsed template line: a literal word, a concatenation of
/// fragments, or a set of `|`-separated alternatives.
enum Fragment {
    Word(String),
    Sentence(Vec<Fragment>),
    Options(Vec<Fragment>),
}

impl Fragment {
    fn expand(&self) -> Vec<Vec<String>> {
        match self {
            Fragment::Word(word) => vec![vec![word.clone()]],
            Fragment::Sentence(parts) => {
                let mut expanded: Vec<Vec<String>> = vec![vec![]];
                for part in parts {
                    let part_expanded = part.expand();
                    let mut combined = Vec::with_capacity(expanded.len() * part_expanded.len());
                    for sentence in expanded {
                        for suffix in &part_expanded {
                            let mut new_sentence = sentence.clone();
                            new_sentence.extend(suffix.iter().cloned());
                            combined.push(new_sentence);
                        }
                    }
                    expanded = combined;
                }
                expanded
            }
            Fragment::Options(options) => {
                options.iter().flat_map(|option| option.expand()).collect()
            }
        }
    }
}

struct SentenceTreeParser<'a> {
    tokens: &'a [String],
    position: usize,
}

impl<'a> SentenceTreeParser<'a> {
    fn new(tokens: &'a [String]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn parse(&mut self) -> Result<Fragment> {
        self.parse_expr(0)
    }

    /// Parses alternatives up to the matching `)` or the end of the line.
    fn parse_expr(&mut self, depth: usize) -> Result<Fragment> {
        let mut options = Vec::new();
        let mut current = Vec::new();
        let mut closed = false;

        while self.position < self.tokens.len() {
            let token = &self.tokens[self.position];
            self.position += 1;
            match token.as_str() {
                "(" => {
                    let sub_expr = self.parse_expr(depth + 1)?;
                    // A group with a single branch is not alternation syntax;
                    // its parentheses are kept as literal tokens
                    let single_branch = match &sub_expr {
                        Fragment::Options(branches) => branches.len() == 1,
                        _ => false,
                    };
                    if single_branch {
                        current.push(Fragment::Word("(".to_string()));
                        current.push(sub_expr);
                        current.push(Fragment::Word(")".to_string()));
                    } else {
                        current.push(sub_expr);
                    }
                }
                "|" => {
                    options.push(Fragment::Sentence(current));
                    current = Vec::new();
                }
                ")" => {
                    if depth == 0 {
                        bail!(IntentEngineError::UnbalancedParentheses);
                    }
                    closed = true;
                    break;
                }
                _ => current.push(Fragment::Word(token.clone())),
            }
        }

        if depth > 0 && !closed {
            bail!(IntentEngineError::UnbalancedParentheses);
        }
        options.push(Fragment::Sentence(current));
        Ok(Fragment::Options(options))
    }
}

/// Expands `(a|b)` style alternatives in a tokenized template line into every
/// concrete sentence, as the Cartesian product over all groups. An empty
/// alternative (`(a|)`) drops the group's tokens for that branch.
pub fn expand_parentheses(tokens: &[String]) -> Result<Vec<Vec<String>>> {
    let tree = SentenceTreeParser::new(tokens).parse()?;
    Ok(tree.expand())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tokenize;

    fn expand(line: &str) -> Vec<Vec<String>> {
        expand_parentheses(&tokenize(line)).unwrap()
    }

    #[test]
    fn test_expands_alternatives_as_cartesian_product() {
        // Given
        let line = "will it (rain|pour) (today|tomorrow)";

        // When
        let sentences = expand(line);

        // Then
        assert_eq!(4, sentences.len());
        assert!(sentences.contains(&tokenize("will it rain today")));
        assert!(sentences.contains(&tokenize("will it pour tomorrow")));
    }

    #[test]
    fn test_empty_alternative_drops_the_group() {
        // Given
        let line = "will it rain (today|)";

        // When
        let sentences = expand(line);

        // Then
        assert_eq!(2, sentences.len());
        assert!(sentences.contains(&tokenize("will it rain today")));
        assert!(sentences.contains(&tokenize("will it rain")));
    }

    #[test]
    fn test_expansion_count_is_product_of_alternative_counts() {
        // Given
        let line = "(a|b) (c|d|e) (f|)";

        // When
        let sentences = expand(line);

        // Then
        assert_eq!(2 * 3 * 2, sentences.len());
    }

    #[test]
    fn test_single_branch_group_keeps_literal_parentheses() {
        // Given
        let line = "hello (world)";

        // When
        let sentences = expand(line);

        // Then
        assert_eq!(vec![tokenize("hello ( world )")], sentences);
    }

    #[test]
    fn test_nested_groups_expand() {
        // Given
        let line = "(a|(b|c) d)";

        // When
        let sentences = expand(line);

        // Then
        assert_eq!(3, sentences.len());
        assert!(sentences.contains(&tokenize("a")));
        assert!(sentences.contains(&tokenize("b d")));
        assert!(sentences.contains(&tokenize("c d")));
    }

    #[test]
    fn test_unbalanced_parentheses_are_an_error() {
        assert!(expand_parentheses(&tokenize("hello (world")).is_err());
        assert!(expand_parentheses(&tokenize("hello world)")).is_err());
    }
}

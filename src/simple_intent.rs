use crate::errors::*;
use crate::id_manager::IdManager;
use crate::network::{Activation, FeedForwardNet, NetConfig, TrainingSet};
use crate::train_data::TrainData;
use crate::utils::resolve_conflicts;

const UNKNOWN_TOKENS_ID: &str = ":0";
const LENGTH_IDS: [&str; 4] = [":1", ":2", ":3", ":4"];
/// Label given to pollution samples with extra filler tokens, so unknown
/// words at the sentence edges degrade confidence gracefully.
const LENIENCE: f32 = 0.6;

fn net_config() -> NetConfig {
    NetConfig {
        hidden_size: 10,
        hidden_activation: Activation::SymmetricSigmoid,
        output_activation: Activation::SymmetricSigmoid,
        bit_fail_limit: 0.1,
        max_epochs: 1000,
        max_restarts: 10,
    }
}

fn reserved_ids() -> Vec<&'static str> {
    let mut ids = vec![UNKNOWN_TOKENS_ID];
    ids.extend_from_slice(&LENGTH_IDS);
    ids
}

/// Whole-sentence classifier estimating how well a tokenized sentence fits
/// one named intent.
pub struct SimpleIntent {
    name: String,
    ids: IdManager,
    net: FeedForwardNet,
}

impl SimpleIntent {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One slot per known vocabulary token, plus the unknown-token fraction
    /// and the sentence length at four scales.
    fn vectorize(ids: &IdManager, sent: &[String]) -> Vec<f32> {
        let mut vector = ids.vector();
        let mut unknown = 0usize;
        for token in sent {
            if ids.contains(token) {
                ids.assign(&mut vector, token, 1.0);
            } else {
                unknown += 1;
            }
        }
        if !sent.is_empty() {
            let len = sent.len() as f32;
            ids.assign(&mut vector, UNKNOWN_TOKENS_ID, unknown as f32 / len);
            for (scale, id) in LENGTH_IDS.iter().enumerate() {
                ids.assign(&mut vector, *id, len / (scale as f32 + 1.0));
            }
        }
        vector
    }

    pub fn match_sent(&self, sent: &[String]) -> f32 {
        let raw = self.net.run(&Self::vectorize(&self.ids, sent))[0];
        raw.max(0.0)
    }

    pub fn train(name: &str, train_data: &TrainData) -> Self {
        let mut ids = IdManager::new(&reserved_ids());
        for sent in train_data.my_sents(name) {
            ids.add_sent(sent);
        }

        let mut inputs: Vec<Vec<f32>> = Vec::new();
        let mut targets: Vec<Vec<f32>> = Vec::new();

        fn add(
            ids: &IdManager,
            inputs: &mut Vec<Vec<f32>>,
            targets: &mut Vec<Vec<f32>>,
            sent: &[String],
            label: f32,
        ) {
            inputs.push(SimpleIntent::vectorize(ids, sent));
            targets.push(vec![label]);
        }

        for sent in train_data.my_sents(name) {
            add(&ids, &mut inputs, &mut targets, sent, 1.0);

            // Single-word samples weighted by cubed word length, so longer,
            // more specific words carry more identifying weight
            let calc_weight = |word: &str| (word.len() as f32).powi(3);
            let total_weight: f32 = sent.iter().map(|word| calc_weight(word)).sum();
            for word in sent {
                let word_weight = if word.starts_with('{') {
                    0.0
                } else {
                    calc_weight(word)
                };
                add(
                    &ids,
                    &mut inputs,
                    &mut targets,
                    &[word.clone()],
                    word_weight / total_weight,
                );
            }

            // Pollution would fight any sentence that opts into unknown
            // tokens through a `:`-special token of its own
            let has_special = sent
                .iter()
                .any(|word| word.starts_with(':') && word.as_str() != ":");
            if !has_special {
                for &position in &[0, sent.len()] {
                    let mut polluted: Vec<String> = sent.to_vec();
                    for _ in 0..(sent.len() + 2) / 3 {
                        polluted.insert(position, ":null:".to_string());
                    }
                    add(&ids, &mut inputs, &mut targets, &polluted, LENIENCE);
                }
            }
        }

        for sent in train_data.other_sents(name) {
            add(&ids, &mut inputs, &mut targets, sent, 0.0);
        }
        add(&ids, &mut inputs, &mut targets, &[":null:".to_string()], 0.0);
        add(&ids, &mut inputs, &mut targets, &[], 0.0);

        // The same sentences with their placeholders blanked out must not
        // match, or the network would credit the entity text itself
        for sent in train_data.my_sents(name) {
            if sent.iter().any(|token| token.starts_with('{')) {
                let masked: Vec<String> = sent
                    .iter()
                    .map(|token| {
                        if token.starts_with('{') {
                            ":null:".to_string()
                        } else {
                            token.clone()
                        }
                    })
                    .collect();
                add(&ids, &mut inputs, &mut targets, &masked, 0.0);
            }
        }

        let (inputs, targets) = resolve_conflicts(inputs, targets);
        let net = FeedForwardNet::train(&net_config(), &TrainingSet { inputs, targets });

        Self {
            name: name.to_string(),
            ids,
            net,
        }
    }

    pub fn save(&self, prefix: &str) -> Result<()> {
        let prefix = format!("{}.intent", prefix);
        self.net.save(&prefix)?;
        self.ids.save(&prefix)?;
        Ok(())
    }

    pub fn from_file(name: &str, prefix: &str) -> Result<Self> {
        let prefix = format!("{}.intent", prefix);
        Ok(Self {
            name: name.to_string(),
            net: FeedForwardNet::load(&prefix)?,
            ids: IdManager::load(&prefix)?,
        })
    }

    /// Same layout as an intent's classifier but without the `.intent` path
    /// segment, used by standalone entities.
    pub fn save_bare(&self, prefix: &str) -> Result<()> {
        self.net.save(prefix)?;
        self.ids.save(prefix)?;
        Ok(())
    }

    pub fn from_file_bare(name: &str, prefix: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            net: FeedForwardNet::load(prefix)?,
            ids: IdManager::load(prefix)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tokenize;

    fn train_greet() -> (SimpleIntent, TrainData) {
        let mut data = TrainData::new();
        data.add_lines("greet", &["hello", "hi there", "good morning"]);
        data.add_lines("bye", &["goodbye", "see you later"]);
        (SimpleIntent::train("greet", &data), data)
    }

    #[test]
    fn test_matches_own_sentences_over_others() {
        // Given
        let (intent, _) = train_greet();

        // When
        let own = intent.match_sent(&tokenize("hello"));
        let other = intent.match_sent(&tokenize("goodbye"));

        // Then
        assert!(own > 0.8, "own sentence scored {}", own);
        assert!(other < 0.2, "other sentence scored {}", other);
    }

    #[test]
    fn test_score_is_clamped_at_zero() {
        // Given
        let (intent, _) = train_greet();

        // When
        let score = intent.match_sent(&tokenize("completely unrelated gibberish"));

        // Then
        assert!(score >= 0.0);
    }

    #[test]
    fn test_save_load_round_trips_scores() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("greet").to_str().unwrap().to_string();
        let (intent, _) = train_greet();

        // When
        intent.save(&prefix).unwrap();
        let loaded = SimpleIntent::from_file("greet", &prefix).unwrap();

        // Then
        for probe in &["hello", "hi there", "goodbye", "what is this"] {
            crate::testutils::assert_epsilon_eq(
                intent.match_sent(&tokenize(probe)),
                loaded.match_sent(&tokenize(probe)),
                1e-6,
            );
        }
    }
}

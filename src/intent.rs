use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use failure::ResultExt;

use crate::entity_manager::EntityManager;
use crate::errors::*;
use crate::match_data::MatchData;
use crate::pos_intent::PosIntent;
use crate::simple_intent::SimpleIntent;
use crate::train_data::TrainData;
use crate::training_manager::{load_hash, save_hash, Trainable};

/// Full trainable unit for one intent: the whole-sentence classifier plus one
/// span extractor per distinct placeholder in its templates.
pub struct Intent {
    name: String,
    hash: u32,
    simple: SimpleIntent,
    pos_intents: Vec<PosIntent>,
}

impl Intent {
    /// Runs the entity-extraction search and folds the whole-sentence score
    /// into every surviving hypothesis, returning the best one.
    pub fn match_sent(&self, sent: &[String], entities: &EntityManager) -> MatchData {
        let mut possible_matches = vec![MatchData::new(&self.name, sent.to_vec())];
        for pos_intent in &self.pos_intents {
            let entity = entities.find(&self.name, pos_intent.token());
            let snapshot: Vec<MatchData> = possible_matches.clone();
            for hypothesis in &snapshot {
                possible_matches.extend(pos_intent.match_data(hypothesis, entity));
            }
        }

        possible_matches.retain(|m| m.conf >= 0.0);

        for hypothesis in &mut possible_matches {
            let accumulated = if hypothesis.matches.is_empty() {
                0.0
            } else {
                hypothesis.conf / hypothesis.matches.len() as f32
            };
            let simple_conf = self.simple.match_sent(&hypothesis.sent);
            hypothesis.conf = ((accumulated + 0.5) * simple_conf).sqrt();
        }

        possible_matches
            .into_iter()
            .max_by(|a, b| a.conf.partial_cmp(&b.conf).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or_else(|| MatchData::new(&self.name, sent.to_vec()))
    }
}

impl Trainable for Intent {
    fn train(name: &str, hash: u32, train_data: &TrainData) -> Self {
        // BTreeSet fixes the declaration order the search will explore in
        let anchors: BTreeSet<String> = train_data
            .my_sents(name)
            .flat_map(|sent| sent.iter())
            .filter(|token| token.starts_with('{'))
            .cloned()
            .collect();

        Self {
            name: name.to_string(),
            hash,
            simple: SimpleIntent::train(name, train_data),
            pos_intents: anchors
                .iter()
                .map(|token| PosIntent::train(token, name, train_data))
                .collect(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn save(&self, folder: &Path) -> Result<()> {
        let prefix = folder.join(&self.name);
        let prefix = prefix.to_string_lossy();
        save_hash(&prefix, self.hash)?;
        self.simple.save(&prefix)?;

        let pos_prefix = format!("{}.pos", prefix);
        let tokens: Vec<&str> = self.pos_intents.iter().map(|p| p.token()).collect();
        let file = File::create(&pos_prefix)
            .with_context(|_| format!("Could not create anchor list file '{}'", pos_prefix))?;
        serde_json::to_writer(file, &tokens)
            .with_context(|_| "Could not serialize anchor list")?;

        for pos_intent in &self.pos_intents {
            pos_intent.save(&pos_prefix)?;
        }
        Ok(())
    }

    fn from_file(name: &str, folder: &Path) -> Result<Self> {
        let prefix = folder.join(name);
        let prefix = prefix.to_string_lossy();
        let hash = load_hash(&prefix)?;
        let simple = SimpleIntent::from_file(name, &prefix)?;

        let pos_prefix = format!("{}.pos", prefix);
        if !Path::new(pos_prefix.as_str()).is_file() {
            failure::bail!(IntentEngineError::ModelLoad(pos_prefix));
        }
        let file = File::open(&pos_prefix)
            .with_context(|_| format!("Could not open anchor list file '{}'", pos_prefix))?;
        let tokens: Vec<String> = serde_json::from_reader(file)
            .with_context(|_| format!("Invalid anchor list file '{}'", pos_prefix))?;

        Ok(Self {
            name: name.to_string(),
            hash,
            simple,
            pos_intents: tokens
                .iter()
                .map(|token| PosIntent::from_file(&pos_prefix, token))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

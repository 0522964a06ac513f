use std::path::Path;

use crate::entity_manager::EntityManager;
use crate::intent::Intent;
use crate::match_data::IntentMatch;
use crate::training_manager::{TrainOptions, TrainingManager};
use crate::utils::tokenize;

/// Registration and matching over all known intents.
pub struct IntentManager {
    manager: TrainingManager<Intent>,
}

impl IntentManager {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            manager: TrainingManager::new(cache_dir),
        }
    }

    pub fn add<S: AsRef<str>>(
        &mut self,
        name: &str,
        lines: &[S],
        reload_cache: bool,
        must_train: bool,
    ) -> crate::errors::Result<()> {
        self.manager.add(name, lines, reload_cache, must_train)
    }

    pub fn load(
        &mut self,
        name: &str,
        file_name: &Path,
        reload_cache: bool,
    ) -> crate::errors::Result<()> {
        self.manager.load(name, file_name, reload_cache)
    }

    pub fn remove(&mut self, name: &str) {
        self.manager.remove(name)
    }

    pub fn train(&mut self, options: TrainOptions) {
        self.manager.train(options)
    }

    /// Matches the query against every trained intent, dropping hypotheses
    /// the search scored negatively.
    pub fn calc_intents(&self, query: &str, entities: &EntityManager) -> Vec<IntentMatch> {
        let sent = tokenize(query);
        self.manager
            .objects()
            .iter()
            .map(|intent| intent.match_sent(&sent, entities))
            .filter(|m| m.conf >= 0.0)
            .map(|m| m.detokenize())
            .collect()
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;

use failure::{bail, ResultExt};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::entity_manager::EntityManager;
use crate::errors::*;
use crate::exact::ExactMatcher;
use crate::intent_manager::IntentManager;
use crate::match_data::IntentMatch;
use crate::training_manager::TrainOptions;
use crate::utils::tokenize;

/// One recorded registration call, replayable to rebuild a container in
/// another process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RegistrationCall {
    AddIntent {
        name: String,
        lines: Vec<String>,
        reload_cache: bool,
        must_train: bool,
    },
    AddEntity {
        name: String,
        lines: Vec<String>,
        reload_cache: bool,
        must_train: bool,
    },
    LoadIntent {
        name: String,
        file_name: PathBuf,
        reload_cache: bool,
        must_train: bool,
    },
    LoadEntity {
        name: String,
        file_name: PathBuf,
        reload_cache: bool,
        must_train: bool,
    },
    RemoveIntent {
        name: String,
    },
    RemoveEntity {
        name: String,
    },
}

/// Top-level façade: registers intents and entities, coordinates training
/// and answers queries, optionally short-circuited by an exact-grammar
/// matcher.
pub struct IntentContainer {
    cache_dir: PathBuf,
    must_train: bool,
    intents: Arc<Mutex<IntentManager>>,
    entities: Arc<Mutex<EntityManager>>,
    exact_matcher: Option<Box<dyn ExactMatcher>>,
    train_handle: Option<thread::JoinHandle<()>>,
    serialized_args: Vec<RegistrationCall>,
}

impl IntentContainer {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)
            .with_context(|_| format!("Could not create cache directory {:?}", cache_dir))?;
        Ok(Self {
            intents: Arc::new(Mutex::new(IntentManager::new(&cache_dir))),
            entities: Arc::new(Mutex::new(EntityManager::new(&cache_dir))),
            exact_matcher: None,
            train_handle: None,
            serialized_args: Vec::new(),
            must_train: false,
            cache_dir,
        })
    }

    pub fn with_exact_matcher(mut self, matcher: Box<dyn ExactMatcher>) -> Self {
        self.exact_matcher = Some(matcher);
        self
    }

    /// Drops all registrations and models, keeping the cache directory.
    pub fn clear(&mut self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .with_context(|_| format!("Could not create cache directory {:?}", self.cache_dir))?;
        self.intents = Arc::new(Mutex::new(IntentManager::new(&self.cache_dir)));
        self.entities = Arc::new(Mutex::new(EntityManager::new(&self.cache_dir)));
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.clear();
        }
        self.train_handle = None;
        self.serialized_args.clear();
        self.must_train = false;
        Ok(())
    }

    /// Re-registers every object whose hash file survives in the cache
    /// directory, loading the persisted models without retraining.
    pub fn instantiate_from_disk(&mut self) -> Result<()> {
        for entry in fs::read_dir(&self.cache_dir)
            .with_context(|_| format!("Could not list cache directory {:?}", self.cache_dir))?
        {
            let file_name = entry?.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = file_name
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix("}.hash"))
            {
                self.add_entity(name, &[] as &[&str], false, false)?;
            } else if !file_name.starts_with('{') {
                if let Some(name) = file_name.strip_suffix(".hash") {
                    let name = name.to_string();
                    self.add_intent(&name, &[] as &[&str], false, false)?;
                }
            }
        }
        Ok(())
    }

    pub fn add_intent<S: AsRef<str>>(
        &mut self,
        name: &str,
        lines: &[S],
        reload_cache: bool,
        must_train: bool,
    ) -> Result<()> {
        let lines: Vec<String> = lines.iter().map(|l| l.as_ref().to_string()).collect();
        self.intents
            .lock()
            .unwrap()
            .add(name, &lines, reload_cache, must_train)?;
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.add_intent(name, &lines);
        }
        self.must_train = must_train;
        self.serialized_args.push(RegistrationCall::AddIntent {
            name: name.to_string(),
            lines,
            reload_cache,
            must_train,
        });
        Ok(())
    }

    pub fn add_entity<S: AsRef<str>>(
        &mut self,
        name: &str,
        lines: &[S],
        reload_cache: bool,
        must_train: bool,
    ) -> Result<()> {
        let lines: Vec<String> = lines.iter().map(|l| l.as_ref().to_string()).collect();
        Entity::verify_name(name)?;
        self.entities.lock().unwrap().add(
            &Entity::wrap_name(name),
            &lines,
            reload_cache,
            must_train,
        )?;
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.add_entity(name, &lines);
        }
        self.must_train = must_train;
        self.serialized_args.push(RegistrationCall::AddEntity {
            name: name.to_string(),
            lines,
            reload_cache,
            must_train,
        });
        Ok(())
    }

    pub fn load_intent<P: AsRef<Path>>(
        &mut self,
        name: &str,
        file_name: P,
        reload_cache: bool,
        must_train: bool,
    ) -> Result<()> {
        let file_name = file_name.as_ref();
        self.intents
            .lock()
            .unwrap()
            .load(name, file_name, reload_cache)?;
        if let Some(matcher) = self.exact_matcher.as_mut() {
            let lines = read_template_lines(file_name)?;
            matcher.add_intent(name, &lines);
        }
        self.must_train = must_train;
        self.serialized_args.push(RegistrationCall::LoadIntent {
            name: name.to_string(),
            file_name: file_name.to_path_buf(),
            reload_cache,
            must_train,
        });
        Ok(())
    }

    pub fn load_entity<P: AsRef<Path>>(
        &mut self,
        name: &str,
        file_name: P,
        reload_cache: bool,
        must_train: bool,
    ) -> Result<()> {
        let file_name = file_name.as_ref();
        Entity::verify_name(name)?;
        self.entities
            .lock()
            .unwrap()
            .load(&Entity::wrap_name(name), file_name, reload_cache)?;
        if let Some(matcher) = self.exact_matcher.as_mut() {
            let lines = read_template_lines(file_name)?;
            matcher.add_entity(name, &lines);
        }
        self.must_train = must_train;
        self.serialized_args.push(RegistrationCall::LoadEntity {
            name: name.to_string(),
            file_name: file_name.to_path_buf(),
            reload_cache,
            must_train,
        });
        Ok(())
    }

    /// Bulk-loads every `.intent` and `.entity` file in a directory. A file
    /// with an unknown extension is skipped with a warning; the rest of the
    /// directory is still processed.
    pub fn load_directory<P: AsRef<Path>>(&mut self, path: P, reload_cache: bool) -> Result<()> {
        for entry in fs::read_dir(path.as_ref())
            .with_context(|_| format!("Could not list template directory {:?}", path.as_ref()))?
        {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            let name = file_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
            match file_path.extension().and_then(|ext| ext.to_str()) {
                Some("intent") => self.load_intent(&name, &file_path, reload_cache, true)?,
                Some("entity") => self.load_entity(&name, &file_path, reload_cache, true)?,
                _ => warn!(
                    "{}",
                    IntentEngineError::UnknownFileExtension(
                        file_path.to_string_lossy().to_string()
                    )
                ),
            }
        }
        Ok(())
    }

    pub fn remove_intent(&mut self, name: &str) {
        self.intents.lock().unwrap().remove(name);
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.remove_intent(name);
        }
        self.must_train = true;
        self.serialized_args.push(RegistrationCall::RemoveIntent {
            name: name.to_string(),
        });
    }

    pub fn remove_entity(&mut self, name: &str) {
        self.entities
            .lock()
            .unwrap()
            .remove(&Entity::wrap_name(name));
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.remove_entity(name);
        }
        self.serialized_args.push(RegistrationCall::RemoveEntity {
            name: name.to_string(),
        });
    }

    /// Trains everything that needs it. The intent and entity pipelines are
    /// independent and run on two joined threads; the whole batch is
    /// supervised by a background thread that can be polled from the query
    /// path. Returns whether training completed within the timeout.
    pub fn train(&mut self, force: bool, options: TrainOptions) -> Result<bool> {
        if !self.must_train && !force {
            return Ok(true);
        }
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.compile()?;
        }

        let intents = Arc::clone(&self.intents);
        let entities = Arc::clone(&self.entities);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::spawn(move || {
            let intent_worker = {
                let intents = Arc::clone(&intents);
                thread::spawn(move || intents.lock().unwrap().train(options))
            };
            let entity_worker = {
                let entities = Arc::clone(&entities);
                thread::spawn(move || entities.lock().unwrap().train(options))
            };
            let _ = intent_worker.join();
            let _ = entity_worker.join();
            entities.lock().unwrap().calc_ent_dict();
            let _ = done_tx.send(());
        });

        let finished = done_rx.recv_timeout(options.timeout).is_ok();
        if finished {
            // The thread exits right after sending; join it so queries
            // issued from here on see training as finished
            let _ = handle.join();
            self.train_handle = None;
        } else {
            self.train_handle = Some(handle);
        }
        self.must_train = false;
        Ok(finished)
    }

    fn training_is_live(&self) -> bool {
        self.train_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Scores the query against every intent. Exact-grammar matches override
    /// probabilistic results of the same name with full confidence; while a
    /// training round is still live only exact matches are reported.
    pub fn calc_intents(&mut self, query: &str) -> Result<Vec<IntentMatch>> {
        if self.must_train {
            self.train(false, TrainOptions::default())?;
        }

        let mut results: HashMap<String, IntentMatch> = HashMap::new();
        if !self.training_is_live() {
            let intents = self.intents.lock().unwrap();
            let entities = self.entities.lock().unwrap();
            for m in intents.calc_intents(query, &entities) {
                results.insert(m.name.clone(), m);
            }
        }

        if let Some(matcher) = self.exact_matcher.as_ref() {
            let sent = tokenize(query).join(" ");
            for exact in matcher.calc_intents(query) {
                results.insert(
                    exact.name.clone(),
                    IntentMatch {
                        name: exact.name,
                        sent: sent.clone(),
                        matches: exact.entities,
                        conf: 1.0,
                    },
                );
            }
        }
        Ok(results.into_iter().map(|(_, m)| m).collect())
    }

    /// Best single match for the query, or a neutral empty match. Among
    /// equal confidences the match that consumed the least text as entity
    /// values wins, as the tighter grammatical fit.
    pub fn calc_intent(&mut self, query: &str) -> Result<IntentMatch> {
        let matches = self.calc_intents(query)?;
        let best_conf = matches
            .iter()
            .map(|m| m.conf)
            .fold(None, |best: Option<f32>, conf| {
                Some(best.map(|b| b.max(conf)).unwrap_or(conf))
            });
        let best_conf = match best_conf {
            Some(conf) => conf,
            None => return Ok(IntentMatch::empty()),
        };
        Ok(matches
            .into_iter()
            .filter(|m| m.conf == best_conf)
            .min_by_key(|m| {
                m.matches
                    .values()
                    .map(|value| value.len())
                    .sum::<usize>()
            })
            .unwrap_or_else(IntentMatch::empty))
    }

    pub fn get_training_args(&self) -> &[RegistrationCall] {
        &self.serialized_args
    }

    /// Replays a recorded registration log.
    pub fn apply_training_args(&mut self, calls: Vec<RegistrationCall>) -> Result<()> {
        for call in calls {
            match call {
                RegistrationCall::AddIntent {
                    name,
                    lines,
                    reload_cache,
                    must_train,
                } => self.add_intent(&name, &lines, reload_cache, must_train)?,
                RegistrationCall::AddEntity {
                    name,
                    lines,
                    reload_cache,
                    must_train,
                } => self.add_entity(&name, &lines, reload_cache, must_train)?,
                RegistrationCall::LoadIntent {
                    name,
                    file_name,
                    reload_cache,
                    must_train,
                } => self.load_intent(&name, &file_name, reload_cache, must_train)?,
                RegistrationCall::LoadEntity {
                    name,
                    file_name,
                    reload_cache,
                    must_train,
                } => self.load_entity(&name, &file_name, reload_cache, must_train)?,
                RegistrationCall::RemoveIntent { name } => self.remove_intent(&name),
                RegistrationCall::RemoveEntity { name } => self.remove_entity(&name),
            }
        }
        Ok(())
    }

    /// Runs training in a separate process via the training binary, which
    /// guarantees a hard shutdown on timeout. The cache the subprocess wrote
    /// is then reloaded by replaying the registration log in-process.
    pub fn train_subprocess<P: AsRef<Path>>(
        &mut self,
        program: P,
        force: bool,
        options: TrainOptions,
    ) -> Result<bool> {
        let args_json = serde_json::to_string(&self.serialized_args)
            .with_context(|_| "Could not serialize registration calls")?;
        let mut command = Command::new(program.as_ref());
        command
            .arg("train")
            .arg(&self.cache_dir)
            .arg("-d")
            .arg(args_json)
            .arg("--timeout")
            .arg(options.timeout.as_secs().to_string());
        if force {
            command.arg("--force");
        }
        if options.single_thread {
            command.arg("--single-thread");
        }
        let status = command
            .status()
            .with_context(|_| "Could not launch training subprocess")?;

        let code = status.code().unwrap_or(-1);
        if code == 2 {
            bail!(IntentEngineError::InvalidTrainingArgs);
        }

        let calls = self.serialized_args.clone();
        self.clear()?;
        self.apply_training_args(calls)?;
        if let Some(matcher) = self.exact_matcher.as_mut() {
            matcher.compile()?;
        }
        match code {
            0 => {
                self.must_train = false;
                Ok(true)
            }
            10 => Ok(false),
            other => bail!(IntentEngineError::SubprocessFailure(other)),
        }
    }
}

fn read_template_lines(file_name: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(file_name)
        .with_context(|_| format!("Could not read template file {:?}", file_name))?;
    Ok(content.split('\n').map(|line| line.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::ExactMatch;
    use maplit::hashmap;
    use std::time::Duration;

    fn test_options() -> TrainOptions {
        TrainOptions {
            debug: false,
            single_thread: true,
            timeout: Duration::from_secs(120),
        }
    }

    fn trained_container(dir: &Path) -> IntentContainer {
        let mut container = IntentContainer::new(dir).unwrap();
        container
            .add_intent("greet", &["hello", "hi there"], false, true)
            .unwrap();
        container
            .add_intent(
                "weather",
                &["what is the weather in {city}", "how hot is it in {city}"],
                false,
                true,
            )
            .unwrap();
        container
            .add_entity("city", &["boston", "paris", "london"], false, true)
            .unwrap();
        assert!(container.train(false, test_options()).unwrap());
        container
    }

    #[test]
    fn test_greet_scenario_matches_with_high_confidence() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = trained_container(dir.path());

        // When
        let best = container.calc_intent("hello").unwrap();

        // Then: without an exact matcher the score folds through
        // sqrt(0.5 * simple), so a perfect sentence lands near 0.7
        assert_eq!("greet", best.name);
        assert!(best.conf > 0.6, "confidence was {}", best.conf);
    }

    #[test]
    fn test_queries_immediately_after_training_use_the_trained_intents() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = IntentContainer::new(dir.path()).unwrap();
        container
            .add_intent("greet", &["hello", "hi there"], false, true)
            .unwrap();

        // When: no delay between train returning and the first query
        assert!(container.train(false, test_options()).unwrap());
        let best = container.calc_intent("hello").unwrap();

        // Then
        assert_eq!("greet", best.name);
    }

    #[test]
    fn test_weather_scenario_extracts_the_city() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = trained_container(dir.path());

        // When
        let best = container.calc_intent("what is the weather in boston").unwrap();

        // Then
        assert_eq!("weather", best.name);
        assert_eq!(Some(&"boston".to_string()), best.matches.get("city"));
    }

    #[test]
    fn test_overlapping_vocabulary_prefers_the_right_intent() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = IntentContainer::new(dir.path()).unwrap();
        container
            .add_intent("light_on", &["turn on the light"], false, true)
            .unwrap();
        container
            .add_intent("light_off", &["turn off the light"], false, true)
            .unwrap();
        container.train(false, test_options()).unwrap();

        // When
        let matches = container.calc_intents("turn on the light").unwrap();

        // Then
        let on_conf = matches.iter().find(|m| m.name == "light_on").unwrap().conf;
        let off_conf = matches.iter().find(|m| m.name == "light_off").unwrap().conf;
        assert!(on_conf > off_conf, "expected {} > {}", on_conf, off_conf);
    }

    #[test]
    fn test_empty_intent_trains_and_answers_neutrally() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = IntentContainer::new(dir.path()).unwrap();
        container
            .add_intent("silent", &[] as &[&str], false, true)
            .unwrap();
        container.train(false, test_options()).unwrap();

        // When
        let best = container.calc_intent("anything at all").unwrap();

        // Then
        assert!(best.conf < 0.75, "confidence was {}", best.conf);
    }

    #[test]
    fn test_empty_container_returns_neutral_match() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = IntentContainer::new(dir.path()).unwrap();

        // When
        let best = container.calc_intent("hello").unwrap();

        // Then
        assert_eq!(IntentMatch::empty(), best);
    }

    #[test]
    fn test_second_container_reuses_the_cache_without_retraining() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut first = trained_container(dir.path());
        let first_match = first.calc_intent("hello").unwrap();

        // When: identical registrations against the same cache directory
        let mut second = IntentContainer::new(dir.path()).unwrap();
        second
            .add_intent("greet", &["hello", "hi there"], false, true)
            .unwrap();
        second
            .add_intent(
                "weather",
                &["what is the weather in {city}", "how hot is it in {city}"],
                false,
                true,
            )
            .unwrap();
        second
            .add_entity("city", &["boston", "paris", "london"], false, true)
            .unwrap();
        second.train(false, test_options()).unwrap();

        // Then: the loaded models give the same scores
        let second_match = second.calc_intent("hello").unwrap();
        assert_eq!(first_match.name, second_match.name);
        crate::testutils::assert_epsilon_eq(first_match.conf, second_match.conf, 1e-6);
    }

    #[test]
    fn test_instantiate_from_disk_restores_trained_objects() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut first = trained_container(dir.path());
        let expected = first.calc_intent("what is the weather in paris").unwrap();

        // When
        let mut restored = IntentContainer::new(dir.path()).unwrap();
        restored.instantiate_from_disk().unwrap();

        // Then
        let actual = restored.calc_intent("what is the weather in paris").unwrap();
        assert_eq!(expected.name, actual.name);
        crate::testutils::assert_epsilon_eq(expected.conf, actual.conf, 1e-6);
    }

    struct FakeExactMatcher {
        compiled: bool,
        intents: HashMap<String, Vec<String>>,
    }

    impl FakeExactMatcher {
        fn new() -> Self {
            Self {
                compiled: false,
                intents: HashMap::new(),
            }
        }
    }

    impl ExactMatcher for FakeExactMatcher {
        fn add_intent(&mut self, name: &str, lines: &[String]) {
            self.intents.insert(name.to_string(), lines.to_vec());
        }
        fn add_entity(&mut self, _name: &str, _lines: &[String]) {}
        fn remove_intent(&mut self, name: &str) {
            self.intents.remove(name);
        }
        fn remove_entity(&mut self, _name: &str) {}
        fn clear(&mut self) {
            self.intents.clear();
            self.compiled = false;
        }
        fn compile(&mut self) -> Result<()> {
            self.compiled = true;
            Ok(())
        }
        fn calc_intents(&self, query: &str) -> Vec<ExactMatch> {
            self.intents
                .iter()
                .filter(|(_, lines)| lines.iter().any(|line| line == query))
                .map(|(name, _)| ExactMatch {
                    name: name.clone(),
                    entities: HashMap::new(),
                })
                .collect()
        }
    }

    #[test]
    fn test_exact_match_overrides_probabilistic_result() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = IntentContainer::new(dir.path())
            .unwrap()
            .with_exact_matcher(Box::new(FakeExactMatcher::new()));
        container
            .add_intent("greet", &["hello", "hi there"], false, true)
            .unwrap();
        container.train(false, test_options()).unwrap();

        // When
        let best = container.calc_intent("hello").unwrap();

        // Then: the grammar match replaces the probabilistic score, which
        // is how a literal training sentence reaches full confidence
        assert_eq!("greet", best.name);
        assert_eq!(1.0, best.conf);
        assert_eq!(hashmap! {}, best.matches);
    }

    #[test]
    fn test_grammar_matcher_lifts_literal_sentences_above_ninety_percent() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = IntentContainer::new(dir.path())
            .unwrap()
            .with_exact_matcher(Box::new(FakeExactMatcher::new()));
        container
            .add_intent("greet", &["hello", "hi there"], false, true)
            .unwrap();
        container
            .add_intent("bye", &["goodbye", "see you later"], false, true)
            .unwrap();
        container.train(false, test_options()).unwrap();

        // When
        let best = container.calc_intent("hi there").unwrap();

        // Then
        assert_eq!("greet", best.name);
        assert!(best.conf > 0.9, "confidence was {}", best.conf);
    }

    #[test]
    fn test_registration_log_replays_into_an_equivalent_container() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let mut container = trained_container(dir.path());
        let calls = container.get_training_args().to_vec();

        // When
        let json = serde_json::to_string(&calls).unwrap();
        let restored_calls: Vec<RegistrationCall> = serde_json::from_str(&json).unwrap();
        let mut replayed = IntentContainer::new(dir.path()).unwrap();
        replayed.apply_training_args(restored_calls).unwrap();
        replayed.train(false, test_options()).unwrap();

        // Then
        let expected = container.calc_intent("hi there").unwrap();
        let actual = replayed.calc_intent("hi there").unwrap();
        assert_eq!(expected.name, actual.name);
    }
}

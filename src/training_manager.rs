use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use failure::ResultExt;
use log::{debug, warn};

use crate::errors::*;
use crate::train_data::TrainData;
use crate::utils::lines_hash;

/// Closed set of trainable object kinds: intents and entities. Both train
/// from the shared data store and persist themselves under a cache folder.
pub trait Trainable: Send + Sized + 'static {
    fn train(name: &str, hash: u32, train_data: &TrainData) -> Self;
    fn name(&self) -> &str;
    fn save(&self, folder: &Path) -> Result<()>;
    fn from_file(name: &str, folder: &Path) -> Result<Self>;
}

pub fn save_hash(prefix: &str, hash: u32) -> Result<()> {
    let path = format!("{}.hash", prefix);
    fs::write(&path, hash.to_le_bytes())
        .with_context(|_| format!("Could not write hash file '{}'", path))?;
    Ok(())
}

pub fn load_hash(prefix: &str) -> Result<u32> {
    let path = format!("{}.hash", prefix);
    if !Path::new(&path).is_file() {
        failure::bail!(IntentEngineError::ModelLoad(path));
    }
    let bytes = fs::read(&path)
        .with_context(|_| format!("Could not read hash file '{}'", path))?;
    if bytes.len() != 4 {
        failure::bail!(IntentEngineError::ModelLoad(path));
    }
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_hash_file(cache: &Path, name: &str) -> Option<u32> {
    load_hash(&cache.join(name).to_string_lossy()).ok()
}

#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub debug: bool,
    pub single_thread: bool,
    pub timeout: Duration,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            debug: true,
            single_thread: false,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Coordinates training of intents or entities: decides per object whether
/// the cached model is still valid, queues the rest, and trains the queue
/// with a wall-clock timeout.
pub struct TrainingManager<T: Trainable> {
    cache: PathBuf,
    objects: Vec<T>,
    objects_to_train: Vec<(String, u32)>,
    train_data: TrainData,
}

impl<T: Trainable> TrainingManager<T> {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache: cache_dir.to_path_buf(),
            objects: Vec::new(),
            objects_to_train: Vec::new(),
            train_data: TrainData::new(),
        }
    }

    pub fn objects(&self) -> &[T] {
        &self.objects
    }

    #[cfg(test)]
    pub fn objects_mut(&mut self) -> &mut Vec<T> {
        &mut self.objects
    }

    /// Registers one named object. With `must_train` unset the persisted
    /// model is loaded as-is (no template lines are needed); otherwise the
    /// content hash decides between reloading the cache and queueing a
    /// retrain.
    pub fn add<S: AsRef<str>>(
        &mut self,
        name: &str,
        lines: &[S],
        reload_cache: bool,
        must_train: bool,
    ) -> Result<()> {
        if !must_train {
            self.objects.push(T::from_file(name, &self.cache)?);
            return Ok(());
        }

        let mut hash_inputs: Vec<String> = vec![crate::CACHE_VERSION.to_string()];
        hash_inputs.extend(lines.iter().map(|l| l.as_ref().to_string()));
        let new_hash = lines_hash(&hash_inputs);

        let old_hash = read_hash_file(&self.cache, name);
        if reload_cache || old_hash != Some(new_hash) {
            self.objects_to_train.push((name.to_string(), new_hash));
        } else {
            self.objects.push(T::from_file(name, &self.cache)?);
        }
        self.train_data.add_lines(name, lines);
        Ok(())
    }

    /// Registers an object from a template file, one line per template.
    pub fn load(&mut self, name: &str, file_name: &Path, reload_cache: bool) -> Result<()> {
        let content = fs::read_to_string(file_name)
            .with_context(|_| format!("Could not read template file {:?}", file_name))?;
        let lines: Vec<&str> = content.split('\n').collect();
        self.add(name, &lines, reload_cache, true)
    }

    pub fn remove(&mut self, name: &str) {
        self.objects.retain(|obj| obj.name() != name);
        self.objects_to_train.retain(|(n, _)| n != name);
        self.train_data.remove_lines(name);
    }

    /// Trains every queued object, then reloads each one from its saved
    /// files so the in-memory object is always the serialization round-trip
    /// of the on-disk artifact. A timeout is partial success: finished
    /// objects are kept, stragglers keep running detached and their output
    /// is picked up by the next cache load.
    pub fn train(&mut self, options: TrainOptions) {
        let queued: Vec<(String, u32)> = self.objects_to_train.drain(..).collect();
        if queued.is_empty() {
            return;
        }

        if options.single_thread {
            for (name, hash) in &queued {
                train_and_save::<T>(name, *hash, &self.train_data, &self.cache, options.debug);
            }
        } else {
            let train_data = Arc::new(self.train_data.clone());
            let (done_tx, done_rx) = bounded::<()>(queued.len());
            for (name, hash) in queued.clone() {
                let train_data = Arc::clone(&train_data);
                let cache = self.cache.clone();
                let done_tx = done_tx.clone();
                thread::spawn(move || {
                    train_and_save::<T>(&name, hash, &train_data, &cache, options.debug);
                    let _ = done_tx.send(());
                });
            }
            drop(done_tx);

            let deadline = Instant::now() + options.timeout;
            let mut finished = 0;
            while finished < queued.len() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match done_rx.recv_timeout(remaining) {
                    Ok(()) => finished += 1,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!("Some objects timed out while training");
                        break;
                    }
                    // A disconnect means a worker panicked; its object will
                    // simply fail to load below
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }

        for (name, _) in queued {
            match T::from_file(&name, &self.cache) {
                Ok(obj) => self.objects.push(obj),
                Err(err) => warn!("Took too long to train {}: {}", name, err),
            }
        }
    }
}

fn train_and_save<T: Trainable>(
    name: &str,
    hash: u32,
    train_data: &TrainData,
    cache: &Path,
    print_updates: bool,
) {
    let obj = T::train(name, hash, train_data);
    if print_updates {
        debug!("Regenerated {}", name);
    }
    if let Err(err) = obj.save(cache) {
        warn!("Could not save {}: {}", name, err);
    }
}

mod bracket_expansion;
mod container;
mod entity;
mod entity_edge;
mod entity_manager;
pub mod errors;
mod exact;
mod id_manager;
mod intent;
mod intent_manager;
mod match_data;
mod network;
mod pos_intent;
mod simple_intent;
#[cfg(test)]
mod testutils;
mod train_data;
mod training_manager;
mod utils;

/// Version tag folded into every content hash; bumping it invalidates all
/// cached models.
pub const CACHE_VERSION: &str = "0.1";

pub use crate::bracket_expansion::expand_parentheses;
pub use crate::container::{IntentContainer, RegistrationCall};
pub use crate::errors::*;
pub use crate::exact::{ExactMatch, ExactMatcher};
pub use crate::match_data::IntentMatch;
pub use crate::training_manager::TrainOptions;
pub use crate::utils::tokenize;

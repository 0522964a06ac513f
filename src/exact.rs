use std::collections::HashMap;

use crate::errors::*;

/// A perfect structural match reported by the companion exact-grammar
/// matcher; always carries full confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactMatch {
    pub name: String,
    pub entities: HashMap<String, String>,
}

/// Interface to the exact-grammar matcher consulted alongside the trained
/// classifiers. Implementations live outside this crate; registrations are
/// mirrored into it so both engines see the same templates.
pub trait ExactMatcher: Send {
    fn add_intent(&mut self, name: &str, lines: &[String]);
    fn add_entity(&mut self, name: &str, lines: &[String]);
    fn remove_intent(&mut self, name: &str);
    fn remove_entity(&mut self, name: &str);
    fn clear(&mut self);
    fn compile(&mut self) -> Result<()>;
    fn calc_intents(&self, query: &str) -> Vec<ExactMatch>;
}

//! Hybrid intent matching.
//!
//! The registered intent set is an immutable snapshot swapped atomically on
//! [`IntentMatcher::register_intents`]; a request that started matching
//! against the old set finishes against it.

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    regex::{Regex, RegexBuilder},
    switchyard_common::{Error, Result},
    tracing::{debug, info},
};

use crate::intent::{Intent, IntentMatch, MatchType};

pub const EXACT_CONFIDENCE: f32 = 1.0;
pub const REGEX_CONFIDENCE: f32 = 0.8;

/// Verdict of a semantic matcher for one intent's utterances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticMatch {
    pub matched: bool,
    pub confidence: f32,
    pub utterance: Option<String>,
}

/// Capability for the third matching stage, usually backed by embeddings or
/// a model call.
#[async_trait]
pub trait SemanticMatcher: Send + Sync {
    async fn matches(&self, message: &str, utterances: &[String]) -> anyhow::Result<SemanticMatch>;
}

/// One registration snapshot with its compiled patterns.
#[derive(Default)]
struct IntentSet {
    intents: Vec<Arc<Intent>>,
    /// `patterns[i][j]` is utterance `j` of intent `i`, or `None` if it does
    /// not compile.
    patterns: Vec<Vec<Option<Regex>>>,
}

impl IntentSet {
    fn build(intents: Vec<Intent>) -> Result<Self> {
        let mut seen = HashSet::new();
        for intent in &intents {
            if !seen.insert(intent.id.as_str()) {
                return Err(Error::duplicate("intent", intent.id.clone()));
            }
        }

        let patterns = intents
            .iter()
            .map(|intent| {
                intent
                    .utterances
                    .iter()
                    .map(|utterance| {
                        RegexBuilder::new(utterance)
                            .case_insensitive(true)
                            .build()
                            .inspect_err(|e| {
                                debug!(intent = %intent.id, utterance = %utterance, error = %e, "utterance is not a valid pattern");
                            })
                            .ok()
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            intents: intents.into_iter().map(Arc::new).collect(),
            patterns,
        })
    }

    fn exact(&self, message: &str) -> Option<IntentMatch> {
        let normalized = message.trim().to_lowercase();
        self.intents.iter().find_map(|intent| {
            intent
                .utterances
                .iter()
                .find(|u| u.trim().to_lowercase() == normalized)
                .map(|u| IntentMatch {
                    intent: Arc::clone(intent),
                    confidence: EXACT_CONFIDENCE,
                    utterance: Some(u.clone()),
                    match_type: MatchType::Exact,
                })
        })
    }

    fn regex(&self, message: &str) -> Option<IntentMatch> {
        self.intents
            .iter()
            .zip(&self.patterns)
            .find_map(|(intent, patterns)| {
                intent
                    .utterances
                    .iter()
                    .zip(patterns)
                    .find(|(_, pattern)| pattern.as_ref().is_some_and(|p| p.is_match(message)))
                    .map(|(u, _)| IntentMatch {
                        intent: Arc::clone(intent),
                        confidence: REGEX_CONFIDENCE,
                        utterance: Some(u.clone()),
                        match_type: MatchType::Regex,
                    })
            })
    }
}

/// Holds the registered intents and runs the exact → regex → semantic cascade.
#[derive(Default)]
pub struct IntentMatcher {
    snapshot: RwLock<Arc<IntentSet>>,
}

impl IntentMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered set. Registration order is match priority.
    pub fn register_intents(&self, intents: Vec<Intent>) -> Result<()> {
        let set = IntentSet::build(intents)?;
        info!(count = set.intents.len(), "intents registered");
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(set);
        Ok(())
    }

    /// Current intents in priority order.
    pub fn intents(&self) -> Vec<Arc<Intent>> {
        self.current().intents.clone()
    }

    pub fn clear(&self) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(IntentSet::default());
    }

    fn current(&self) -> Arc<IntentSet> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Run only the exact and regex stages.
    pub fn match_static(&self, message: &str) -> Option<IntentMatch> {
        let set = self.current();
        set.exact(message).or_else(|| set.regex(message))
    }

    /// Run the full cascade. The semantic stage only runs when a matcher is
    /// supplied; it asks about each intent in order and takes the first
    /// acceptance, not the highest confidence.
    pub async fn match_intent(
        &self,
        message: &str,
        semantic: Option<&dyn SemanticMatcher>,
    ) -> Result<Option<IntentMatch>> {
        let set = self.current();
        if let Some(found) = set.exact(message).or_else(|| set.regex(message)) {
            debug!(intent = %found.intent.id, match_type = %found.match_type, "intent matched");
            return Ok(Some(found));
        }

        let Some(semantic) = semantic else {
            return Ok(None);
        };
        for intent in &set.intents {
            let verdict = semantic
                .matches(message, &intent.utterances)
                .await
                .map_err(|e| {
                    Error::execution(format!("semantic matcher failed for intent {}", intent.id), e)
                })?;
            if verdict.matched {
                debug!(intent = %intent.id, confidence = verdict.confidence, "intent matched semantically");
                return Ok(Some(IntentMatch {
                    intent: Arc::clone(intent),
                    confidence: verdict.confidence,
                    utterance: verdict.utterance,
                    match_type: MatchType::Semantic,
                }));
            }
        }
        Ok(None)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::intent::Action,
        std::sync::Mutex,
        switchyard_common::ErrorKind,
    };

    fn intent(id: &str, utterances: &[&str]) -> Intent {
        Intent::new(
            id,
            utterances.iter().map(|u| (*u).to_string()).collect(),
            Action::new("agent", id).unwrap(),
        )
    }

    /// Accepts intents whose first utterance is listed in `accept` and records
    /// every query.
    struct ScriptedSemantic {
        accept: Vec<&'static str>,
        confidence: f32,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SemanticMatcher for ScriptedSemantic {
        async fn matches(&self, _message: &str, utterances: &[String]) -> anyhow::Result<SemanticMatch> {
            let first = utterances.first().cloned().unwrap_or_default();
            self.asked.lock().unwrap().push(first.clone());
            Ok(SemanticMatch {
                matched: self.accept.contains(&first.as_str()),
                confidence: self.confidence,
                utterance: Some(first),
            })
        }
    }

    struct BrokenSemantic;

    #[async_trait]
    impl SemanticMatcher for BrokenSemantic {
        async fn matches(&self, _message: &str, _utterances: &[String]) -> anyhow::Result<SemanticMatch> {
            anyhow::bail!("embedding service down")
        }
    }

    #[tokio::test]
    async fn exact_beats_regex_on_earlier_intent() {
        let matcher = IntentMatcher::new();
        matcher
            .register_intents(vec![intent("x", &["h.*"]), intent("y", &["hello"])])
            .unwrap();

        let found = matcher.match_intent("  HeLLo ", None).await.unwrap().unwrap();
        assert_eq!(found.intent.id, "y");
        assert_eq!(found.match_type, MatchType::Exact);
        assert_eq!(found.confidence, EXACT_CONFIDENCE);
    }

    #[tokio::test]
    async fn earlier_exact_intent_wins() {
        let matcher = IntentMatcher::new();
        matcher
            .register_intents(vec![intent("first", &["hi"]), intent("second", &["hi"])])
            .unwrap();
        let found = matcher.match_intent("hi", None).await.unwrap().unwrap();
        assert_eq!(found.intent.id, "first");
    }

    #[tokio::test]
    async fn regex_is_case_insensitive_against_raw_message() {
        let matcher = IntentMatcher::new();
        matcher
            .register_intents(vec![intent("order", &[r"order\s+#\d+"])])
            .unwrap();
        let found = matcher
            .match_intent("Where is ORDER #123?", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.match_type, MatchType::Regex);
        assert_eq!(found.confidence, REGEX_CONFIDENCE);
        assert_eq!(found.utterance.as_deref(), Some(r"order\s+#\d+"));
    }

    #[tokio::test]
    async fn malformed_pattern_is_skipped() {
        let matcher = IntentMatcher::new();
        matcher
            .register_intents(vec![intent("broken", &["(unclosed"]), intent("ok", &["refund"])])
            .unwrap();
        let found = matcher.match_intent("I want a refund", None).await.unwrap().unwrap();
        assert_eq!(found.intent.id, "ok");
        assert!(matcher.match_intent("nothing here", None).await.unwrap().is_none());
        // Still usable by the exact stage.
        let exact = matcher.match_intent("(unclosed", None).await.unwrap().unwrap();
        assert_eq!(exact.intent.id, "broken");
    }

    #[tokio::test]
    async fn semantic_stage_takes_first_acceptance() {
        let matcher = IntentMatcher::new();
        matcher
            .register_intents(vec![
                intent("a", &["alpha"]),
                intent("b", &["bravo"]),
                intent("c", &["charlie"]),
            ])
            .unwrap();
        let semantic = ScriptedSemantic {
            accept: vec!["bravo", "charlie"],
            confidence: 0.6,
            asked: Mutex::new(Vec::new()),
        };

        let found = matcher
            .match_intent("something else", Some(&semantic))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.intent.id, "b");
        assert_eq!(found.match_type, MatchType::Semantic);
        assert_eq!(found.confidence, 0.6);
        assert_eq!(*semantic.asked.lock().unwrap(), vec!["alpha", "bravo"]);
    }

    #[tokio::test]
    async fn semantic_failure_is_execution_error() {
        let matcher = IntentMatcher::new();
        matcher.register_intents(vec![intent("a", &["alpha"])]).unwrap();
        let err = matcher
            .match_intent("zzz", Some(&BrokenSemantic))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn duplicate_ids_are_rejected_and_keep_old_set() {
        let matcher = IntentMatcher::new();
        matcher.register_intents(vec![intent("a", &["alpha"])]).unwrap();
        let err = matcher
            .register_intents(vec![intent("b", &["x"]), intent("b", &["y"])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(matcher.intents()[0].id, "a");
    }

    #[test]
    fn clear_empties_the_set() {
        let matcher = IntentMatcher::new();
        matcher.register_intents(vec![intent("a", &["alpha"])]).unwrap();
        matcher.clear();
        assert!(matcher.intents().is_empty());
        assert!(matcher.match_static("alpha").is_none());
    }

    #[test]
    fn old_snapshot_survives_reregistration() {
        let matcher = IntentMatcher::new();
        matcher.register_intents(vec![intent("old", &["alpha"])]).unwrap();
        let before = matcher.current();
        matcher.register_intents(vec![intent("new", &["alpha"])]).unwrap();
        assert_eq!(before.exact("alpha").unwrap().intent.id, "old");
        assert_eq!(matcher.match_static("alpha").unwrap().intent.id, "new");
    }
}

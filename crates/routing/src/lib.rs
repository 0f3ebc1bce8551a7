//! Map inbound messages to intents and intents to handlers.
//!
//! Matching cascade (first stage that produces a match wins):
//! 1. Exact (trimmed, case-insensitive equality, confidence 1.0)
//! 2. Regex (utterance as case-insensitive pattern, confidence 0.8)
//! 3. Semantic (caller-supplied matcher, first intent it accepts)
//!
//! Routing dispatches on the matched intent's [`ActionKind`]; messages with no
//! match go to the default agent.

pub mod intent;
pub mod matcher;
pub mod router;

pub use {
    intent::{Action, ActionKind, Intent, IntentMatch, MatchType},
    matcher::{EXACT_CONFIDENCE, IntentMatcher, REGEX_CONFIDENCE, SemanticMatch, SemanticMatcher},
    router::{ActionHandler, ActionRequest, ActionRouter},
};

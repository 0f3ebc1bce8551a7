use std::{path::Path, sync::Arc};

use {
    anyhow::Result,
    switchyard_agents::AgentRegistry,
    switchyard_config::SwitchyardConfig,
    switchyard_routing::{ActionRouter, Intent, IntentMatch, IntentMatcher},
};

use crate::config_commands;

fn matcher_for(config: &SwitchyardConfig) -> Result<IntentMatcher> {
    let intents = config
        .intents
        .iter()
        .map(Intent::try_from)
        .collect::<switchyard_common::Result<Vec<_>>>()?;
    let matcher = IntentMatcher::new();
    matcher.register_intents(intents)?;
    Ok(matcher)
}

/// Router with no live handlers; only used to resolve targets.
fn router_for(config: &SwitchyardConfig) -> ActionRouter {
    let mut router = ActionRouter::new(Arc::new(AgentRegistry::new()));
    if let Some(id) = &config.pipeline.default_agent {
        router.set_default_agent(id.clone());
    }
    router
}

pub fn handle_intents(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let (_, config) = config_commands::load(explicit)?;
    let matcher = matcher_for(&config)?;
    let intents = matcher.intents();
    if intents.is_empty() {
        println!("No intents configured.");
        return Ok(());
    }
    for (i, intent) in intents.iter().enumerate() {
        println!("{}", describe_intent(i + 1, intent));
        if verbose {
            for utterance in &intent.utterances {
                println!("      {utterance}");
            }
        }
    }
    Ok(())
}

pub async fn handle_match(explicit: Option<&Path>, message: &str, json: bool) -> Result<()> {
    let (_, config) = config_commands::load(explicit)?;
    let matcher = matcher_for(&config)?;
    let router = router_for(&config);

    let found = matcher.match_intent(message, None).await?;
    if json {
        let summary = found.as_ref().map_or(serde_json::Value::Null, IntentMatch::summary);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", describe_match(&router, found.as_ref()));
    }
    Ok(())
}

fn describe_intent(position: usize, intent: &Intent) -> String {
    let count = intent.utterances.len();
    format!(
        "{position:>3}. {} -> {}:{} ({count} utterance{})",
        intent.id,
        intent.action.kind,
        intent.action.target,
        if count == 1 { "" } else { "s" }
    )
}

fn describe_match(router: &ActionRouter, found: Option<&IntentMatch>) -> String {
    match found {
        Some(found) => {
            let handler = router
                .resolve_target(found)
                .map_or_else(|| format!("{} action", found.intent.action.kind), str::to_string);
            format!(
                "intent:     {}\nmatch:      {} ({:.2})\nutterance:  {}\nhandler:    {handler}",
                found.intent.id,
                found.match_type,
                found.confidence,
                found.utterance.as_deref().unwrap_or("-"),
            )
        },
        None => match router.default_agent() {
            Some(id) => format!("no intent matched\nhandler:    {id} (default)"),
            None => "no intent matched and no default agent configured".to_string(),
        },
    }
}

//! Dispatch of matched intents to handlers.

use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    serde_json::{Map, Value},
    switchyard_common::{
        ChatMessage, Error, HandlerRegistry, HandlerResponse, RequestContext, Result,
    },
    tracing::{debug, info},
};

use crate::intent::{ActionKind, IntentMatch};

/// Everything an action handler gets for one routed message.
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub ctx: &'a RequestContext,
    pub message: &'a str,
    pub history: &'a [ChatMessage],
    pub intent: &'a IntentMatch,
    /// The intent action's configured payload.
    pub payload: &'a Map<String, Value>,
}

impl ActionRequest<'_> {
    pub fn target(&self) -> &str {
        &self.intent.intent.action.target
    }
}

/// Handler for `function` actions and for extension action types.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, request: ActionRequest<'_>) -> Result<HandlerResponse>;
}

/// Routes intent matches to handlers, falling back to a default agent.
pub struct ActionRouter {
    handlers: Arc<dyn HandlerRegistry>,
    function_handler: Option<Arc<dyn ActionHandler>>,
    extensions: HashMap<String, Arc<dyn ActionHandler>>,
    default_agent: Option<String>,
}

impl ActionRouter {
    pub fn new(handlers: Arc<dyn HandlerRegistry>) -> Self {
        Self {
            handlers,
            function_handler: None,
            extensions: HashMap::new(),
            default_agent: None,
        }
    }

    pub fn handlers(&self) -> &Arc<dyn HandlerRegistry> {
        &self.handlers
    }

    /// Install the handler for `function` actions. Without one, every
    /// function action fails with [`Error::FunctionNotImplemented`].
    pub fn set_function_handler(&mut self, handler: Arc<dyn ActionHandler>) {
        self.function_handler = Some(handler);
    }

    /// Register a handler for a custom action type.
    pub fn register_extension(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<()> {
        let kind = kind.into();
        if matches!(ActionKind::parse(&kind), ActionKind::Agent | ActionKind::Function) {
            return Err(Error::duplicate("action type", kind));
        }
        if self.extensions.contains_key(&kind) {
            return Err(Error::duplicate("action type", kind));
        }
        info!(kind = %kind, "action type registered");
        self.extensions.insert(kind, handler);
        Ok(())
    }

    pub fn extension_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.extensions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn set_default_agent(&mut self, id: impl Into<String>) {
        self.default_agent = Some(id.into());
    }

    pub fn default_agent(&self) -> Option<&str> {
        self.default_agent.as_deref()
    }

    /// The handler id a match would reach, for agent actions.
    pub fn resolve_target<'a>(&self, found: &'a IntentMatch) -> Option<&'a str> {
        match found.intent.action.kind {
            ActionKind::Agent => Some(found.intent.action.target.as_str()),
            _ => None,
        }
    }

    /// Dispatch a match on its action kind.
    pub async fn route_intent(
        &self,
        ctx: &RequestContext,
        found: &IntentMatch,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse> {
        let action = &found.intent.action;
        debug!(intent = %found.intent.id, kind = %action.kind, target = %action.target, "routing intent");

        let request = ActionRequest {
            ctx,
            message,
            history,
            intent: found,
            payload: &action.payload,
        };

        match &action.kind {
            ActionKind::Agent => self.route_to_handler(ctx, &action.target, message, history).await,
            ActionKind::Function => match &self.function_handler {
                Some(handler) => handler.handle(request).await,
                None => Err(Error::FunctionNotImplemented(action.target.clone())),
            },
            ActionKind::Extension(kind) => {
                let handler = self
                    .extensions
                    .get(kind)
                    .ok_or_else(|| Error::UnhandledActionType(kind.clone()))?;
                handler.handle(request).await
            },
        }
    }

    /// Invoke a handler by id.
    pub async fn route_to_handler(
        &self,
        ctx: &RequestContext,
        id: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse> {
        let handler = self
            .handlers
            .get_handler(id)
            .ok_or_else(|| Error::HandlerNotFound(id.to_string()))?;
        info!(handler = %id, "dispatching to handler");
        handler.process(ctx, message, history).await
    }

    /// Invoke the default agent for a message no intent matched.
    pub async fn route_to_default(
        &self,
        ctx: &RequestContext,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse> {
        let id = self.default_agent.as_deref().ok_or(Error::NoDefaultHandler)?;
        let handler = self
            .handlers
            .get_handler(id)
            .ok_or_else(|| Error::DefaultHandlerNotFound(id.to_string()))?;
        info!(handler = %id, "no intent matched, dispatching to default handler");
        handler.process(ctx, message, history).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::intent::{Action, Intent, MatchType},
        std::sync::Mutex,
        switchyard_common::{ErrorKind, MessageHandler},
    };

    /// Echoes its id and the message it received.
    struct Echo {
        id: String,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl Echo {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MessageHandler for Echo {
        fn id(&self) -> &str {
            &self.id
        }

        async fn process(
            &self,
            _ctx: &RequestContext,
            message: &str,
            history: &[ChatMessage],
        ) -> Result<HandlerResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((message.to_string(), history.len()));
            Ok(HandlerResponse::text(format!("{}: {message}", self.id)))
        }
    }

    #[derive(Default)]
    struct Handlers(HashMap<String, Arc<dyn MessageHandler>>);

    impl Handlers {
        fn with(mut self, handler: Arc<dyn MessageHandler>) -> Self {
            self.0.insert(handler.id().to_string(), handler);
            self
        }
    }

    impl HandlerRegistry for Handlers {
        fn get_handler(&self, id: &str) -> Option<Arc<dyn MessageHandler>> {
            self.0.get(id).cloned()
        }

        fn handler_ids(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }
    }

    struct PayloadEcho;

    #[async_trait]
    impl ActionHandler for PayloadEcho {
        async fn handle(&self, request: ActionRequest<'_>) -> Result<HandlerResponse> {
            Ok(HandlerResponse::text(format!(
                "{} {} {}",
                request.target(),
                request.message,
                request.payload.get("tier").and_then(Value::as_str).unwrap_or("-")
            )))
        }
    }

    fn matched(kind: &str, target: &str) -> IntentMatch {
        let mut payload = Map::new();
        payload.insert("tier".into(), Value::String("gold".into()));
        IntentMatch {
            intent: Arc::new(Intent::new(
                "test",
                vec!["x".into()],
                Action::new(kind, target).unwrap().with_payload(payload),
            )),
            confidence: 1.0,
            utterance: Some("x".into()),
            match_type: MatchType::Exact,
        }
    }

    #[tokio::test]
    async fn agent_action_forwards_message_and_history() {
        let support = Echo::new("support");
        let router = ActionRouter::new(Arc::new(Handlers::default().with(support.clone())));
        let ctx = RequestContext::default();
        let history = vec![ChatMessage::user("earlier")];

        let response = router
            .route_intent(&ctx, &matched("agent", "support"), "hello", &history)
            .await
            .unwrap();

        assert_eq!(response.content, "support: hello");
        assert_eq!(*support.seen.lock().unwrap(), vec![("hello".to_string(), 1)]);
    }

    #[tokio::test]
    async fn missing_agent_is_resolution_error() {
        let router = ActionRouter::new(Arc::new(Handlers::default()));
        let err = router
            .route_intent(&RequestContext::default(), &matched("agent", "ghost"), "hi", &[])
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::HandlerNotFound(id) if id == "ghost"));
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[tokio::test]
    async fn function_action_without_handler_fails() {
        let router = ActionRouter::new(Arc::new(Handlers::default()));
        let err = router
            .route_intent(&RequestContext::default(), &matched("function", "refund"), "hi", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FunctionNotImplemented(ref f) if f == "refund"));
    }

    #[tokio::test]
    async fn function_handler_receives_payload() {
        let mut router = ActionRouter::new(Arc::new(Handlers::default()));
        router.set_function_handler(Arc::new(PayloadEcho));
        let response = router
            .route_intent(&RequestContext::default(), &matched("function", "refund"), "now", &[])
            .await
            .unwrap();
        assert_eq!(response.content, "refund now gold");
    }

    #[tokio::test]
    async fn unknown_action_type_names_the_type() {
        let router = ActionRouter::new(Arc::new(Handlers::default()));
        let err = router
            .route_intent(&RequestContext::default(), &matched("webhook", "hook-1"), "hi", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.to_string().contains("webhook"));
    }

    #[tokio::test]
    async fn registered_extension_is_dispatched() {
        let mut router = ActionRouter::new(Arc::new(Handlers::default()));
        router.register_extension("webhook", Arc::new(PayloadEcho)).unwrap();
        let response = router
            .route_intent(&RequestContext::default(), &matched("webhook", "hook-1"), "ping", &[])
            .await
            .unwrap();
        assert_eq!(response.content, "hook-1 ping gold");
        assert_eq!(router.extension_kinds(), vec!["webhook"]);
    }

    #[test]
    fn duplicate_or_builtin_extension_is_rejected() {
        let mut router = ActionRouter::new(Arc::new(Handlers::default()));
        router.register_extension("webhook", Arc::new(PayloadEcho)).unwrap();
        let err = router
            .register_extension("webhook", Arc::new(PayloadEcho))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(router.register_extension("agent", Arc::new(PayloadEcho)).is_err());
    }

    #[tokio::test]
    async fn default_fallback_errors() {
        let mut router = ActionRouter::new(Arc::new(Handlers::default()));
        let ctx = RequestContext::default();

        let err = router.route_to_default(&ctx, "hi", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NoDefaultHandler));

        router.set_default_agent("gone");
        let err = router.route_to_default(&ctx, "hi", &[]).await.unwrap_err();
        assert!(matches!(err, Error::DefaultHandlerNotFound(ref id) if id == "gone"));
    }

    #[tokio::test]
    async fn default_agent_handles_unmatched() {
        let mut router = ActionRouter::new(Arc::new(Handlers::default().with(Echo::new("general"))));
        router.set_default_agent("general");
        let response = router
            .route_to_default(&RequestContext::default(), "anything", &[])
            .await
            .unwrap();
        assert_eq!(response.content, "general: anything");
        assert_eq!(router.default_agent(), Some("general"));
    }

    #[test]
    fn resolve_target_only_for_agent_actions() {
        let router = ActionRouter::new(Arc::new(Handlers::default()));
        assert_eq!(router.resolve_target(&matched("agent", "support")), Some("support"));
        assert_eq!(router.resolve_target(&matched("function", "refund")), None);
    }
}

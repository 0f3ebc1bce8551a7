use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use {
    switchyard_common::{Error, HandlerRegistry, MessageHandler, Result},
    tracing::info,
};

/// Live handlers by id.
///
/// Shared as `Arc<AgentRegistry>` between the router and the handoff tool.
/// Registration is meant to happen before traffic; lookups take a short read
/// lock and clone the handler `Arc` out.
#[derive(Default)]
pub struct AgentRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn MessageHandler>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let id = handler.id().to_string();
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.contains_key(&id) {
            return Err(Error::duplicate("handler", id));
        }
        info!(handler = %id, "handler registered");
        handlers.insert(id, handler);
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HandlerRegistry for AgentRegistry {
    fn get_handler(&self, id: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn handler_ids(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        switchyard_common::{ChatMessage, ErrorKind, HandlerResponse, RequestContext},
    };

    struct Stub(&'static str);

    #[async_trait]
    impl MessageHandler for Stub {
        fn id(&self) -> &str {
            self.0
        }

        async fn process(
            &self,
            _ctx: &RequestContext,
            message: &str,
            _history: &[ChatMessage],
        ) -> Result<HandlerResponse> {
            Ok(HandlerResponse::text(message))
        }
    }

    #[test]
    fn register_lookup_and_list() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(Stub("support"))).unwrap();
        registry.register(Arc::new(Stub("billing"))).unwrap();

        assert_eq!(registry.get_handler("support").unwrap().id(), "support");
        assert!(registry.get_handler("sales").is_none());
        assert_eq!(registry.handler_ids(), vec!["billing", "support"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_id_is_configuration_error() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(Stub("support"))).unwrap();
        let err = registry.register(Arc::new(Stub("support"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn unregister_removes_handler() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(Stub("support"))).unwrap();
        assert!(registry.unregister("support"));
        assert!(!registry.unregister("support"));
        assert!(registry.is_empty());
    }
}

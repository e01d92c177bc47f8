use std::{collections::HashMap, sync::Arc};

use crate::{
    event::ProviderKey,
    sender::{OutboundSender, SenderResolver},
};

/// Registry of the outbound senders deployed for this process.
#[derive(Default, Clone)]
pub struct SenderRegistry {
    senders: HashMap<ProviderKey, Arc<dyn OutboundSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: ProviderKey, sender: Arc<dyn OutboundSender>) {
        self.senders.insert(provider, sender);
    }

    #[must_use]
    pub fn with(mut self, provider: ProviderKey, sender: Arc<dyn OutboundSender>) -> Self {
        self.register(provider, sender);
        self
    }

    pub fn providers(&self) -> Vec<ProviderKey> {
        let mut keys: Vec<_> = self.senders.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl SenderResolver for SenderRegistry {
    fn resolve(&self, provider: ProviderKey) -> Option<Arc<dyn OutboundSender>> {
        self.senders.get(&provider).cloned()
    }
}

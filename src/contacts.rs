use std::collections::HashMap;

use crate::models::Address;

/// Contact lookup capability injected by the application
pub trait AddressResolver {
    fn resolve_display_name(&self, address: &Address) -> Option<String>;
}

/// Contact name if known, otherwise the address's own display name
pub fn display_name_for(resolver: &dyn AddressResolver, address: &Address) -> String {
    resolver
        .resolve_display_name(address)
        .unwrap_or_else(|| address.display_name())
}

/// Resolver that knows nobody
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContacts;

impl AddressResolver for NoContacts {
    fn resolve_display_name(&self, _address: &Address) -> Option<String> {
        None
    }
}

/// In-memory address book keyed by weak address identity
#[derive(Debug, Default, Clone)]
pub struct ContactBook {
    names: HashMap<String, String>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: &Address, full_name: impl Into<String>) {
        self.names.insert(address.weak_key(), full_name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl AddressResolver for ContactBook {
    fn resolve_display_name(&self, address: &Address) -> Option<String> {
        self.names.get(&address.weak_key()).cloned()
    }
}

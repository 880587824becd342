use std::collections::HashMap;
use std::sync::RwLock;

use fleetstock_core::{ItemId, SupplierId, WarehouseId};

/// Catalog lookups owned by other systems (warehouse, item and supplier
/// master data).
pub trait Directory: Send + Sync {
    fn warehouse_name(&self, id: WarehouseId) -> Option<String>;

    fn item_name(&self, id: ItemId) -> Option<String>;

    fn supplier_name(&self, id: SupplierId) -> Option<String>;
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    warehouses: RwLock<HashMap<WarehouseId, String>>,
    items: RwLock<HashMap<ItemId, String>>,
    suppliers: RwLock<HashMap<SupplierId, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_warehouse(&self, id: WarehouseId, name: impl Into<String>) {
        if let Ok(mut map) = self.warehouses.write() {
            map.insert(id, name.into());
        }
    }

    pub fn register_item(&self, id: ItemId, name: impl Into<String>) {
        if let Ok(mut map) = self.items.write() {
            map.insert(id, name.into());
        }
    }

    pub fn register_supplier(&self, id: SupplierId, name: impl Into<String>) {
        if let Ok(mut map) = self.suppliers.write() {
            map.insert(id, name.into());
        }
    }
}

fn lookup<K>(map: &RwLock<HashMap<K, String>>, key: &K) -> Option<String>
where
    K: Eq + core::hash::Hash,
{
    map.read().ok().and_then(|m| m.get(key).cloned())
}

impl Directory for InMemoryDirectory {
    fn warehouse_name(&self, id: WarehouseId) -> Option<String> {
        lookup(&self.warehouses, &id)
    }

    fn item_name(&self, id: ItemId) -> Option<String> {
        lookup(&self.items, &id)
    }

    fn supplier_name(&self, id: SupplierId) -> Option<String> {
        lookup(&self.suppliers, &id)
    }
}

use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, SupplierId};

use crate::store::PurchasingStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
}

impl Supplier {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }
        Ok(Self {
            id: SupplierId::new(),
            name,
        })
    }
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> SupplierId {
        self.id
    }
}

/// Supplier registration and lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct Suppliers;

impl Suppliers {
    pub fn add<S>(&self, store: &mut S, name: &str) -> DomainResult<Supplier>
    where
        S: PurchasingStore + ?Sized,
    {
        let supplier = Supplier::new(name)?;
        store.insert_supplier(&supplier)?;
        tracing::info!(supplier_id = %supplier.id, "supplier registered");
        Ok(supplier)
    }

    pub fn get<S>(&self, store: &mut S, id: SupplierId) -> DomainResult<Supplier>
    where
        S: PurchasingStore + ?Sized,
    {
        store
            .supplier(id)?
            .ok_or_else(|| DomainError::not_found("supplier", id))
    }
}

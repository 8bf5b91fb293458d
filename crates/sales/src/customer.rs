use serde::{Deserialize, Serialize};

use stockbook_core::{CustomerId, DomainError, DomainResult, Entity};

use crate::store::SalesStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        Ok(Self {
            id: CustomerId::new(),
            name,
        })
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Customers;

impl Customers {
    pub fn add<S>(&self, store: &mut S, name: &str) -> DomainResult<Customer>
    where
        S: SalesStore + ?Sized,
    {
        let customer = Customer::new(name)?;
        store.insert_customer(&customer)?;
        tracing::info!(customer_id = %customer.id, "customer registered");
        Ok(customer)
    }

    pub fn get<S>(&self, store: &mut S, id: CustomerId) -> DomainResult<Customer>
    where
        S: SalesStore + ?Sized,
    {
        store
            .customer(id)?
            .ok_or_else(|| DomainError::not_found("customer", id))
    }
}

pub mod config;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use gateway::Gateway;
use services::MongoInvoiceStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub service_name: String,
    /// Pinged by `/ready` when invoices live in MongoDB.
    pub database: Option<MongoInvoiceStore>,
}

impl AppState {
    pub fn new(gateway: Gateway, service_name: impl Into<String>) -> Self {
        Self {
            gateway,
            service_name: service_name.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: MongoInvoiceStore) -> Self {
        self.database = Some(database);
        self
    }
}

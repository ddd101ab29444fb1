pub mod alegra;
pub mod database;
pub mod identity;
pub mod introspection;
pub mod jwt;
pub mod memory;
pub mod metrics;

pub use alegra::{AlegraClient, AlegraError, MirroredInvoiceStore};
pub use database::MongoInvoiceStore;
pub use identity::{IdentityProvider, MockIdentityProvider, ProviderError};
pub use introspection::IntrospectionIdentityProvider;
pub use jwt::JwtIdentityProvider;
pub use memory::InMemoryInvoiceStore;
pub use metrics::{get_metrics, init_metrics};

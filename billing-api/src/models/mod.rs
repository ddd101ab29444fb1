pub mod identity;
pub mod invoice;

pub use identity::Identity;

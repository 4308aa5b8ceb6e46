pub mod identity_key;
pub mod identity_resolver;

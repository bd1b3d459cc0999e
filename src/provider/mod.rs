//! Storage provider configuration.
//!
//! Each user may configure any number of providers, at most one default per
//! backend type. Provider config is a JSON object whose secret fields are
//! sealed inside [`ProviderCredentials`].

mod credentials;
mod registry;

pub use credentials::{ProviderCredentials, REDACTED, SECRET_FIELDS};
pub use registry::{
    NewProvider, ProviderDetails, ProviderRegistry, ProviderSummary, ProviderUpdate,
    RefreshStatus, StorageProvider,
};

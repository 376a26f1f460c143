//! Credential encryption for platform connections.

pub mod vault;

pub use vault::CredentialVault;

// Google Cloud plumbing shared by the object store and the job service
//
// Credentials are an explicit value handed to each client; nothing here
// touches process-wide environment state.

pub mod auth;
pub mod credentials;

pub use auth::{token_source, AuthError, TokenSource};
pub use credentials::{configure, CredentialKind, Credentials};

//! Identity extraction, API-key/session/bearer validation, short-lived
//! token issuance, and permission checks.

pub mod apikey;
pub mod identity;
pub mod jwks;
pub mod jws;
pub mod model;
pub mod permissions;
pub mod pipeline;
pub mod session;

pub use apikey::{ApiKeyStore, InMemoryApiKeyStore};
pub use identity::{extract_credential, ExtractedCredential};
pub use jwks::{JwksClient, ReqwestJwksClient};
pub use model::{IssuedToken, Principal, PrincipalType, RouteAuthResult};
pub use pipeline::AuthPipeline;
pub use session::{InMemorySessionStore, Session, SessionStore};

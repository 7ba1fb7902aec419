//! Service registration CRUD, path-template matching, and route lookup.

pub mod matcher;
pub mod model;
pub mod service;
pub mod store;

pub use model::{
    EndpointConfig, NoMatchReason, RegistrationResult, RouteLookupResult, RouteMatch,
    ServiceRegistration, Visibility,
};
pub use service::ServiceRegistry;
pub use store::{InMemoryServiceStore, ServiceStore};

//! `shopfloor-auth`: actor identity, roles and capability checks.
//!
//! Decoupled from HTTP and storage. User records themselves are owned by an
//! external directory; this crate only defines the [`UserDirectory`] seam.

pub mod authorize;
pub mod directory;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, role_permissions, AuthzError};
pub use directory::{DirectoryError, DirectoryUser, InMemoryUserDirectory, UserDirectory};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;

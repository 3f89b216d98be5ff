//! Domain types shared by every devbox crate.
//!
//! A [`User`] is resolved by the identity layer and handed to the
//! reconciler, which derives a [`WorkloadRef`] and a private address from
//! its stable numeric id. Nothing in here performs I/O except loading a
//! [`UserDirectory`] from disk.

pub mod address;
pub mod error;
pub mod route;
pub mod user;
pub mod workload;

pub use address::AddressTemplate;
pub use error::{CoreError, Result};
pub use route::RouteSpec;
pub use user::{User, UserDirectory};
pub use workload::{Status, WorkloadInfo, WorkloadKind, WorkloadRef};

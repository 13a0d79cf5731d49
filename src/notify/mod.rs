//! Callback registration and change dispatch.
//!
//! Each scope has a [`CallbackRegistry`]; the [`ChangeRouter`] receives store
//! notifications, picks the registry by key prefix and fans the change out.

pub mod registry;
pub mod router;

pub use registry::{CallbackRegistry, ConfigCallback, RegistrySnapshot};
pub use router::{ChangeRouter, DispatchReport};

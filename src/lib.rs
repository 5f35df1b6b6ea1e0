//! Delivery module: a blocking, host-facing plugin API over the
//! callback-driven liblogosdelivery C library.
//!
//! Calls into the library are bridged by [`delivery_bridge`]; pushed
//! notifications are classified in [`events`] and handed to one listener.

pub mod api;
pub mod config;
pub mod events;
pub mod logger;
pub mod plugin;
pub mod session;

pub use delivery_bridge::CallResult;
pub use plugin::{DeliveryModule, DeliveryModuleInterface};

//! Workspace facade crate.
//!
//! Host applications can depend on `sheet-sync` alone and reach the service
//! facade, configuration and sync engine types through this re-export instead
//! of wiring each workspace crate individually.

pub use core_service::*;

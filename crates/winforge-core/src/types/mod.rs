//! Type definitions for the Winforge provisioning plan

mod catalog;
mod registry;

pub use catalog::*;
pub use registry::*;

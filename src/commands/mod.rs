// src/commands/mod.rs
//! Command handlers for the cms-setup CLI

pub mod progress;
mod properties;
mod script;
mod setup;
mod sites;

pub use properties::{cmd_properties_get, cmd_properties_list, cmd_properties_set};
pub use script::cmd_script;
pub use setup::{cmd_components, cmd_deps, cmd_order, cmd_setup, cmd_update};
pub use sites::{cmd_sites_add, cmd_sites_list, cmd_sites_remove, cmd_sites_show};

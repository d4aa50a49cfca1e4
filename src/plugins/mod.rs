//! Plugins extend the engine by registering handlers on its callback chains.
//! The built-in ones are enabled by name through the `load_plugins`
//! configuration key.

use crate::callback::{Registry, RegistryError};
use crate::request::Request;

pub mod genericwiki;
pub mod markdown;

/// An engine extension.
pub trait Plugin {
    /// The name `load_plugins` refers to the plugin by.
    fn name(&self) -> &str;

    /// Registers the plugin's handlers.
    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError>;

    /// Checks the plugin's configuration for the installation test.
    fn verify_installation(&self, _request: &Request) -> bool {
        true
    }
}

/// The names of the built-in plugins.
pub const BUILTIN: &[&str] = &[markdown::NAME, genericwiki::NAME];

/// The built-in plugin called `name`.
pub fn builtin(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        markdown::NAME => Some(Box::new(markdown::Markdown)),
        genericwiki::NAME => Some(Box::new(genericwiki::GenericWiki)),
        _ => None,
    }
}

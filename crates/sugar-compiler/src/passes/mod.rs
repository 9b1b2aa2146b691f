//! Compiler passes, in pipeline order.

mod compilation;
mod components;
mod context;
mod extraction;
mod inheritance;
mod pairing;

pub use compilation::DirectiveCompilation;
pub use components::{ComponentExpansion, DEFAULT_SLOT};
pub use context::{scan, ContextAnalysis, ScanState};
pub use extraction::DirectiveExtraction;
pub use inheritance::InheritanceResolver;
pub use pairing::DirectivePairing;
pub(crate) use components::php_string;

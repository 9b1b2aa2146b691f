//! Compiler from Sugar templates to PHP.
//!
//! The pipeline runs these passes over one arena tree:
//! - Template inheritance (`s:extends`, blocks, `s:include`)
//! - Directive extraction and pairing
//! - Context analysis for output escaping
//! - Component expansion with slots
//! - Directive compilation
//! - Code generation with a source map
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sugar_compiler::{Compiler, MemoryTemplateLoader};
//!
//! let loader = MemoryTemplateLoader::new()
//!     .with_template("pages/admin.sugar.php", r#"<div s:if="$isAdmin">Admin Panel</div>"#);
//! let compiler = Compiler::new(Arc::new(loader));
//!
//! let compiled = compiler.compile("pages/admin.sugar.php").unwrap();
//! assert!(compiled.code.contains("if ($isAdmin):"));
//! ```

mod blocks;
mod cache;
mod codegen;
mod compiler;
mod component_cache;
mod config;
pub mod directives;
mod error;
mod loader;
pub mod passes;
mod registry;
mod suggest;

pub use blocks::{BlockEntry, BlockManager, BlockMode, BlockTable, DuplicateBlock, RegistrationGuard};
pub use cache::{
    dependents, modified_millis, now_millis, CacheMetadata, CachedTemplate, FileCache,
    TemplateCache, INDEX_FILE,
};
pub use codegen::{escaper, generate, Generated, ESCAPER_IMPORT};
pub use compiler::{CompiledTemplate, Compiler};
pub use component_cache::ComponentCache;
pub use config::{CompilerConfig, DEFAULT_SUFFIX, MAX_COMPONENT_DEPTH};
pub use error::{CompileError, ErrorKind, Location};
pub use loader::{normalize, FileTemplateLoader, MemoryTemplateLoader, TemplateLoader};
pub use registry::{CompileContext, DirectiveCompiler, DirectiveKind, DirectiveRegistry};
pub use suggest::{did_you_mean, MAX_DISTANCE};

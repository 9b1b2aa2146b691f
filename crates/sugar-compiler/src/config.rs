//! Compiler configuration.

use smol_str::SmolStr;
use sugar_parser::ParseOptions;

/// Default template file suffix.
pub const DEFAULT_SUFFIX: &str = ".sugar.php";

/// Component expansion nesting limit.
pub const MAX_COMPONENT_DEPTH: usize = 32;

/// Syntax settings shared by every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Prefix of directive attributes (`s:`).
    pub directive_prefix: SmolStr,
    /// Tag of the non-rendering wrapper element (`s-template`).
    pub fragment_tag: SmolStr,
    /// Tag prefix of component invocations (`s-`).
    pub component_prefix: SmolStr,
    /// Template file suffix (`.sugar.php`).
    pub suffix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            directive_prefix: SmolStr::new_static("s:"),
            fragment_tag: SmolStr::new_static("s-template"),
            component_prefix: SmolStr::new_static("s-"),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl CompilerConfig {
    /// Returns the parser options for this configuration.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            fragment_tag: self.fragment_tag.clone(),
            component_prefix: self.component_prefix.clone(),
        }
    }

    /// Returns `name` with the directive prefix (`if` → `s:if`).
    pub fn directive_name(&self, name: &str) -> String {
        format!("{}{}", self.directive_prefix, name)
    }

    /// Strips the directive prefix from an attribute name.
    pub fn strip_directive<'a>(&self, attribute: &'a str) -> Option<&'a str> {
        attribute
            .strip_prefix(self.directive_prefix.as_str())
            .filter(|name| !name.is_empty())
    }
}

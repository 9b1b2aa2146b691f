//! Built-in directives.

mod attribute;
mod content;
mod control;
mod output;

pub use attribute::{ClassDirective, SpreadDirective, TagDirective};
pub use content::ContentDirective;
pub use control::{
    CaseDirective, Condition, ElseDirective, ElseIfDirective, EmptyDirective, ForelseDirective,
    IfContentDirective, IfDirective, LoopDirective, SwitchDirective,
};
pub use output::TrimDirective;

use crate::registry::DirectiveRegistry;

/// Names consumed by the inheritance resolver.
pub const INHERITANCE_DIRECTIVES: &[&str] =
    &["extends", "block", "append", "prepend", "parent", "include", "with"];

/// Names consumed by component expansion.
pub const COMPONENT_DIRECTIVES: &[&str] = &["bind", "slot"];

/// Registers every built-in directive.
pub fn register_builtins(registry: &mut DirectiveRegistry) {
    registry.register("if", IfDirective);
    registry.register("elseif", ElseIfDirective);
    registry.register("else", ElseDirective);
    registry.register("unless", Condition::new("if (!({})):", "endif;"));
    registry.register("isset", Condition::new("if (isset({})):", "endif;"));
    registry.register("empty", EmptyDirective);
    registry.register("foreach", LoopDirective::new("foreach", "endforeach;"));
    registry.register("forelse", ForelseDirective);
    registry.register("while", LoopDirective::new("while", "endwhile;"));
    registry.register("switch", SwitchDirective);
    registry.register("case", CaseDirective { default: false });
    registry.register("default", CaseDirective { default: true });
    registry.register("ifcontent", IfContentDirective);

    registry.register("text", ContentDirective { escape: true });
    registry.register("html", ContentDirective { escape: false });

    registry.register("class", ClassDirective);
    registry.register("spread", SpreadDirective);
    registry.register("tag", TagDirective);

    registry.register("trim", TrimDirective);
}

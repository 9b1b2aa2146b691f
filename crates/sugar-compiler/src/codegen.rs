//! PHP code generation.
//!
//! The final tree is printed as a PHP file returning a render closure. Literal
//! markup stays inline HTML, outputs become `Escaper` calls chosen by their
//! stamped context, and code nodes print verbatim. Every printed piece that
//! came from a template is recorded in a [`SourceMap`].

use crate::passes::php_string;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use source_map::{SourceMap, SourceMapBuilder};
use sugar_parser::expression::split_top_level;
use sugar_parser::{Ast, AttributePart, AttributeValue, NodeId, NodeKind, OutputContext, TagClose};

/// The escaper class every compiled template imports.
pub const ESCAPER_IMPORT: &str = "use Sugar\\Escape\\Escaper";

/// Generated source with its mapping back to the templates.
#[derive(Debug, Clone)]
pub struct Generated {
    /// The PHP source.
    pub code: String,
    /// Generated offset to template location.
    pub source_map: SourceMap,
}

/// Returns the `Escaper` method for `context`, or `None` for raw output.
pub fn escaper(context: OutputContext) -> Option<&'static str> {
    match context {
        OutputContext::Html => Some("html"),
        OutputContext::HtmlAttribute => Some("attr"),
        OutputContext::Javascript => Some("js"),
        OutputContext::Css => Some("css"),
        OutputContext::Url => Some("url"),
        OutputContext::Raw => None,
    }
}

/// Generates the compiled template for the tree at `root`.
pub fn generate(ast: &Ast, root: NodeId) -> Generated {
    let mut generator = CodeGenerator::new(ast);
    generator.hoist_imports(root);
    generator.collect_regions(root);
    generator.emit_document(root);
    Generated {
        code: generator.out,
        source_map: generator.map.build(),
    }
}

struct CodeGenerator<'a> {
    ast: &'a Ast,
    out: String,
    map: SourceMapBuilder,
    imports: IndexSet<String>,
    /// Code nodes with their import statements removed.
    code: FxHashMap<NodeId, String>,
    regions: IndexMap<SmolStr, NodeId>,
    /// True right after a `?>`, which swallows one following newline.
    after_close: bool,
    next_tag: u32,
}

impl<'a> CodeGenerator<'a> {
    fn new(ast: &'a Ast) -> Self {
        let mut imports = IndexSet::new();
        imports.insert(ESCAPER_IMPORT.to_string());
        Self {
            ast,
            out: String::new(),
            map: SourceMapBuilder::new(),
            imports,
            code: FxHashMap::default(),
            regions: IndexMap::new(),
            after_close: false,
            next_tag: 0,
        }
    }

    fn hoist_imports(&mut self, root: NodeId) {
        let ast = self.ast;
        for id in ast.descendants(root) {
            let NodeKind::RawCode(raw) = ast.kind(id) else {
                continue;
            };
            let mut rest = Vec::new();
            let mut hoisted = false;
            for statement in split_top_level(&raw.code, ";") {
                let statement = statement.trim();
                if is_import(statement) {
                    self.imports.insert(statement.to_string());
                    hoisted = true;
                } else if !statement.is_empty() {
                    rest.push(statement);
                }
            }
            if hoisted {
                let mut code = rest.join(";\n");
                if !code.is_empty() && raw.code.trim_end().ends_with(';') {
                    code.push(';');
                }
                self.code.insert(id, code);
            }
        }
        if self.imports.len() > 1 {
            tracing::debug!(count = self.imports.len() - 1, "hoisted imports");
        }
    }

    fn collect_regions(&mut self, root: NodeId) {
        let ast = self.ast;
        for id in ast.descendants(root) {
            if let NodeKind::Fragment(fragment) = ast.kind(id) {
                if let Some(name) = &fragment.region {
                    self.regions.entry(name.clone()).or_insert(id);
                }
            }
        }
    }

    fn emit_document(&mut self, root: NodeId) {
        self.push("<?php\ndeclare(strict_types=1);\n\n");
        let imports: Vec<String> = self.imports.iter().map(|i| format!("{i};\n")).collect();
        for import in imports {
            self.push(&import);
        }
        self.push(
            "\nreturn function (array $__data = [], ?array $__blocks = null): string {\n    \
             extract($__data, EXTR_SKIP);\n    ob_start();\n",
        );

        if !self.regions.is_empty() {
            self.push(
                "    if ($__blocks !== null):\n        foreach ($__blocks as $__block):\n            \
                 switch ($__block):\n",
            );
            let regions: Vec<(SmolStr, NodeId)> =
                self.regions.iter().map(|(k, v)| (k.clone(), *v)).collect();
            for (name, id) in regions {
                self.push(&format!("                case {}:", php_string(&name)));
                self.close_php();
                self.emit_children(id);
                self.push("<?php break;\n");
            }
            self.push(
                "            endswitch;\n        endforeach;\n        \
                 return (string) ob_get_clean();\n    endif;\n",
            );
        }

        self.close_php();
        self.emit_children(root);
        self.push("<?php\n    return (string) ob_get_clean();\n};\n");
    }

    fn emit_children(&mut self, id: NodeId) {
        let ast = self.ast;
        let children = ast.children(id);
        let mut idx = 0;
        while idx < children.len() {
            let child = children[idx];
            if matches!(ast.kind(child), NodeKind::RawCode(_)) {
                let run = children[idx..]
                    .iter()
                    .take_while(|&&c| matches!(ast.kind(c), NodeKind::RawCode(_)))
                    .count();
                self.emit_code_run(&children[idx..idx + run]);
                idx += run;
            } else {
                self.emit_node(child);
                idx += 1;
            }
        }
    }

    fn emit_node(&mut self, id: NodeId) {
        let ast = self.ast;
        let node = ast.node(id);
        match &node.kind {
            NodeKind::Text(text) => {
                if text.content.is_empty() {
                    return;
                }
                if self.after_close && text.content.starts_with('\n') {
                    self.push("\n");
                }
                self.map.add_mapped(&node.source, node.span, &text.content);
                self.out.push_str(&text.content);
                self.after_close = false;
            }
            NodeKind::Output(_) => self.emit_output(id),
            NodeKind::RawCode(_) => self.emit_code_run(&[id]),
            NodeKind::Element(_) => self.emit_element(id),
            NodeKind::Document(_)
            | NodeKind::Fragment(_)
            | NodeKind::Directive(_)
            | NodeKind::Component(_) => self.emit_children(id),
        }
    }

    fn emit_code_run(&mut self, run: &[NodeId]) {
        let ast = self.ast;
        let mut first = true;
        for &id in run {
            let node = ast.node(id);
            let code = match (self.code.get(&id), &node.kind) {
                (Some(code), _) => code.clone(),
                (None, NodeKind::RawCode(raw)) => raw.code.trim().to_string(),
                _ => continue,
            };
            if code.is_empty() {
                continue;
            }
            self.push(if first { "<?php " } else { "\n" });
            first = false;
            self.map.add_mapped(&node.source, node.span, &code);
            self.out.push_str(&code);
        }
        if !first {
            self.push(" ?>");
            self.after_close = true;
        }
    }

    fn emit_output(&mut self, id: NodeId) {
        let ast = self.ast;
        let node = ast.node(id);
        let NodeKind::Output(output) = &node.kind else {
            return;
        };
        let method = if output.escape {
            escaper(output.context)
        } else {
            None
        };
        let call = match method {
            Some(method) => format!("Escaper::{method}({})", output.expression),
            None => output.expression.clone(),
        };
        self.push("<?php echo ");
        self.map.add_mapped(&node.source, node.span, &call);
        self.out.push_str(&call);
        self.push("; ?>");
        self.after_close = true;
    }

    fn emit_element(&mut self, id: NodeId) {
        let ast = self.ast;
        let node = ast.node(id);
        let NodeKind::Element(element) = &node.kind else {
            return;
        };

        let tag_var = element.dynamic_tag.as_ref().map(|expression| {
            let var = format!("$__tag_{}", self.next_tag);
            self.next_tag += 1;
            (var, expression)
        });
        match &tag_var {
            Some((var, expression)) => {
                self.push("<");
                let code = format!("<?php echo {var} = {expression}; ?>");
                self.map.add_mapped(&node.source, node.span, &code);
                self.out.push_str(&code);
            }
            None => {
                let open = format!("<{}", element.name);
                self.map.add_mapped(&node.source, node.span, &open);
                self.out.push_str(&open);
            }
        }
        self.after_close = false;

        for attribute in &element.attributes {
            self.push(&attribute.leading_whitespace);
            if attribute.name.is_empty() {
                self.emit_value(&attribute.value);
                continue;
            }
            self.map.add_mapped(&node.source, attribute.span, &attribute.name);
            self.out.push_str(&attribute.name);
            if matches!(attribute.value, AttributeValue::Boolean) {
                continue;
            }
            self.push("=");
            self.push(attribute.quote.as_str());
            self.emit_value(&attribute.value);
            self.push(attribute.quote.as_str());
            self.after_close = false;
        }
        self.push(&element.trailing_whitespace);
        self.push(if element.close == TagClose::SelfClosing {
            "/>"
        } else {
            ">"
        });
        self.after_close = false;

        self.emit_children(id);

        if element.close == TagClose::Normal {
            match &tag_var {
                Some((var, _)) => self.push(&format!("</<?php echo {var}; ?>>")),
                None => self.push(&format!("</{}>", element.name)),
            }
            self.after_close = false;
        }
    }

    fn emit_value(&mut self, value: &AttributeValue) {
        match value {
            AttributeValue::Boolean => {}
            AttributeValue::Static(text) => self.push(text),
            AttributeValue::Output(output) => self.emit_output(*output),
            AttributeValue::Parts(parts) => {
                for part in parts {
                    match part {
                        AttributePart::Text(text) => self.push(text),
                        AttributePart::Output(output) => self.emit_output(*output),
                    }
                }
            }
        }
        // attribute text never starts a new line after `?>`
        self.after_close = false;
    }

    /// Leaves PHP mode after header or `case` code.
    fn close_php(&mut self) {
        self.push(" ?>");
        self.after_close = true;
    }

    fn push(&mut self, text: &str) {
        self.map.add_generated(text);
        self.out.push_str(text);
    }
}

/// Returns true for a namespace import (`use Foo\Bar`, `use function f`).
fn is_import(statement: &str) -> bool {
    let Some(rest) = statement.strip_prefix("use") else {
        return false;
    };
    rest.starts_with(char::is_whitespace)
        && rest
            .trim_start()
            .starts_with(|c: char| c.is_ascii_alphabetic() || c == '\\' || c == '_')
}

//! Template inheritance.
//!
//! Runs on the parsed tree before directive extraction and merges
//! `s:extends` chains, `s:block`/`s:append`/`s:prepend` overrides and
//! `s:include` partials into one document.
//!
//! An include at the top level of an extending template contributes its
//! blocks to the child's block table. Anywhere else an include renders the
//! partial in place and its blocks are placeholders. Blocks that survive
//! resolution become region fragments so codegen can render them on their
//! own.
//!
//! Component templates only get their includes inlined; they never extend a
//! layout and their blocks render in place without becoming regions.

use crate::blocks::{BlockEntry, BlockManager, BlockMode, BlockTable, DuplicateBlock};
use crate::config::CompilerConfig;
use crate::error::{CompileError, ErrorKind};
use crate::loader::TemplateLoader;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use smol_str::SmolStr;
use std::sync::Arc;
use sugar_parser::{parse_with_options, Ast, Fragment, NodeId, NodeKind};

/// The template inheritance resolver.
pub struct InheritanceResolver<'a> {
    config: &'a CompilerConfig,
    loader: &'a dyn TemplateLoader,
    blocks: &'a BlockManager,
    dependencies: IndexSet<Utf8PathBuf>,
}

impl<'a> InheritanceResolver<'a> {
    /// Creates the resolver.
    pub fn new(config: &'a CompilerConfig, loader: &'a dyn TemplateLoader, blocks: &'a BlockManager) -> Self {
        Self {
            config,
            loader,
            blocks,
            dependencies: IndexSet::new(),
        }
    }

    /// Layouts and partials read while resolving.
    pub fn dependencies(&self) -> &IndexSet<Utf8PathBuf> {
        &self.dependencies
    }

    /// Resolves `ast` into a self-contained document.
    pub fn resolve_document(&mut self, ast: Ast) -> Result<Ast, CompileError> {
        let mut chain = vec![ast.source().path().to_path_buf()];
        let mut resolved = self.resolve(ast, &mut chain)?;
        let root = resolved.root();
        self.finalize(&mut resolved, root, true)?;
        Ok(resolved)
    }

    /// Inlines the partials of a component body imported under `body`.
    ///
    /// `origin` is the component template the body was read from.
    pub fn resolve_component(&mut self, ast: &mut Ast, body: NodeId, origin: &Utf8Path) -> Result<(), CompileError> {
        ast.link_parents(body);
        self.validate_parents(ast, body)?;

        let extends = self.config.directive_name("extends");
        if let Some(node) = ast
            .descendants(body)
            .into_iter()
            .find(|&id| ast.attribute(id, &extends).is_some())
        {
            return Err(CompileError::syntax(format!("{extends} is not allowed in components")).at(ast.node(node)));
        }

        let mut chain = vec![origin.to_path_buf()];
        self.resolve_includes(ast, body, &mut chain)?;
        self.finalize(ast, body, false)
    }

    fn resolve(&mut self, mut ast: Ast, chain: &mut Vec<Utf8PathBuf>) -> Result<Ast, CompileError> {
        let root = ast.root();
        ast.link_parents(root);
        self.validate_parents(&ast, root)?;

        match self.find_extends(&ast)? {
            Some((node, reference)) => self.extend(ast, node, &reference, chain),
            None => {
                self.resolve_includes(&mut ast, root, chain)?;
                Ok(ast)
            }
        }
    }

    fn extend(
        &mut self,
        mut child: Ast,
        extends: NodeId,
        reference: &str,
        chain: &mut Vec<Utf8PathBuf>,
    ) -> Result<Ast, CompileError> {
        let layout_path = self.locate(&child, extends, reference, chain)?;
        tracing::debug!(template = %child.source().path(), layout = %layout_path, "extending");

        // the extends wrapper's children count as top level
        let mut top_level = Vec::new();
        for &node in child.children(child.root()) {
            if node == extends {
                top_level.extend_from_slice(child.children(extends));
            } else {
                top_level.push(node);
            }
        }

        let mut table = BlockTable::new();
        for node in top_level {
            if let Some(reference) = self.attribute(&child, node, "include")? {
                let blocks = self.blocks;
                let _registering = blocks.register();
                self.include(&mut child, node, &reference, chain)?;
            }
            let mut found = Vec::new();
            self.collect_blocks(&child, node, &mut found)?;
            for (name, mode, block) in found {
                self.resolve_includes(&mut child, block, chain)?;
                self.insert(&mut table, &child, name, mode, block)?;
            }
        }

        let mut layout = self.load(&layout_path)?;
        chain.push(layout_path);
        let resolved = self.resolve(layout, chain);
        chain.pop();
        layout = resolved?;

        let root = layout.root();
        self.apply_blocks(&mut layout, root, &child, &table)?;
        Ok(layout)
    }

    fn insert(
        &self,
        table: &mut BlockTable,
        ast: &Ast,
        name: SmolStr,
        mode: BlockMode,
        node: NodeId,
    ) -> Result<(), CompileError> {
        table
            .insert(name, BlockEntry { mode, node })
            .map_err(|DuplicateBlock(_)| {
                CompileError::syntax("Block is defined multiple times in the same child template")
                    .at(ast.node(node))
            })
    }

    /// Collects block wrappers below `id` without descending into blocks.
    fn collect_blocks(
        &self,
        ast: &Ast,
        id: NodeId,
        found: &mut Vec<(SmolStr, BlockMode, NodeId)>,
    ) -> Result<(), CompileError> {
        if let Some((mode, name)) = self.block_of(ast, id)? {
            found.push((name, mode, id));
            return Ok(());
        }
        for &child in ast.children(id) {
            self.collect_blocks(ast, child, found)?;
        }
        Ok(())
    }

    /// Replaces layout blocks that the child overrides.
    fn apply_blocks(&self, layout: &mut Ast, id: NodeId, child: &Ast, table: &BlockTable) -> Result<(), CompileError> {
        let children = layout.children(id).to_vec();
        let mut merged = Vec::with_capacity(children.len());
        for node in children {
            let target = match self.block_of(layout, node)? {
                Some((BlockMode::Define, name)) if table.contains(&name) => Some(name),
                _ => None,
            };
            match target {
                Some(name) => merged.push(self.merge_block(layout, node, &name, child, table)?),
                None => {
                    self.apply_blocks(layout, node, child, table)?;
                    merged.push(node);
                }
            }
        }
        layout.set_children(id, merged);
        Ok(())
    }

    fn merge_block(
        &self,
        layout: &mut Ast,
        target: NodeId,
        name: &str,
        child: &Ast,
        table: &BlockTable,
    ) -> Result<NodeId, CompileError> {
        // nested blocks of the layout content may be overridden as well
        self.apply_blocks(layout, target, child, table)?;
        let original = layout.children(target).to_vec();

        let mut wrapper = target;
        let mut content = original.clone();
        if let Some(define) = table.define(name) {
            let imported = layout.import(child, define.node);
            self.fill_parent(layout, imported, &original);
            content = layout.children(imported).to_vec();
            // an element replaces the layout's wrapper, a fragment only its content
            if matches!(layout.kind(imported), NodeKind::Element(_)) {
                wrapper = imported;
            }
        }

        let mut children = Vec::new();
        for entry in table.with_mode(name, BlockMode::Prepend) {
            children.extend(self.entry_content(layout, child, entry, &original));
        }
        children.extend(content);
        for entry in table.with_mode(name, BlockMode::Append) {
            children.extend(self.entry_content(layout, child, entry, &original));
        }
        layout.set_children(wrapper, children);
        Ok(wrapper)
    }

    fn entry_content(&self, layout: &mut Ast, child: &Ast, entry: BlockEntry, original: &[NodeId]) -> Vec<NodeId> {
        let imported = layout.import(child, entry.node);
        self.fill_parent(layout, imported, original);
        match layout.kind(imported) {
            NodeKind::Element(_) => {
                layout.take_attribute(imported, &self.config.directive_name(entry.mode.directive()));
                vec![imported]
            }
            _ => layout.children(imported).to_vec(),
        }
    }

    /// Replaces `s:parent` placeholders below `id` with copies of `original`.
    fn fill_parent(&self, ast: &mut Ast, id: NodeId, original: &[NodeId]) {
        let placeholder = self.config.directive_name("parent");
        let children = ast.children(id).to_vec();
        let mut filled = Vec::with_capacity(children.len());
        for node in children {
            if ast.attribute(node, &placeholder).is_some() {
                for &parent in original {
                    filled.push(ast.deep_clone(parent));
                }
            } else {
                self.fill_parent(ast, node, original);
                filled.push(node);
            }
        }
        ast.set_children(id, filled);
    }

    /// Inlines every `s:include` below `id`.
    fn resolve_includes(&mut self, ast: &mut Ast, id: NodeId, chain: &mut Vec<Utf8PathBuf>) -> Result<(), CompileError> {
        for node in ast.children(id).to_vec() {
            match self.attribute(ast, node, "include")? {
                Some(reference) => self.include(ast, node, &reference, chain)?,
                None => self.resolve_includes(ast, node, chain)?,
            }
        }
        Ok(())
    }

    fn include(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
        reference: &str,
        chain: &mut Vec<Utf8PathBuf>,
    ) -> Result<(), CompileError> {
        let path = self.locate(ast, node, reference, chain)?;
        let with = self.attribute(ast, node, "with")?;
        let registering = self.blocks.is_registering();
        tracing::debug!(
            partial = %path,
            isolated = with.is_some(),
            registering,
            depth = self.blocks.depth(),
            "including"
        );
        if registering && with.is_some() {
            return Err(CompileError::syntax(format!(
                "{} cannot be used on an include that only provides blocks",
                self.config.directive_name("with")
            ))
            .at(ast.node(node)));
        }

        let partial = self.load(&path)?;
        let resolved = {
            // includes inside the partial render in place
            let blocks = self.blocks;
            let _rendering = blocks.suspend();
            chain.push(path);
            let resolved = self.resolve(partial, chain);
            chain.pop();
            resolved
        };
        let partial = resolved?;

        let content: Vec<NodeId> = if registering {
            // the rest of the partial has nowhere to render
            let mut found = Vec::new();
            self.collect_blocks(&partial, partial.root(), &mut found)?;
            found
                .into_iter()
                .map(|(_, _, block)| ast.import(&partial, block))
                .collect()
        } else {
            let mut content: Vec<NodeId> = partial
                .children(partial.root())
                .iter()
                .map(|&child| ast.import(&partial, child))
                .collect();
            if let Some(with) = with {
                let open = ast.raw_at("(function (array $__vars): void { extract($__vars, EXTR_SKIP);", node);
                let close = ast.raw_at(format!("}})({with});"), node);
                content.insert(0, open);
                content.push(close);
            }
            content
        };

        ast.take_attribute(node, &self.config.directive_name("include"));
        ast.take_attribute(node, &self.config.directive_name("with"));
        ast.set_children(node, content);
        Ok(())
    }

    /// Strips block attributes below `id` and drops stray placeholders.
    /// With `regions`, surviving blocks become region fragments.
    fn finalize(&self, ast: &mut Ast, id: NodeId, regions: bool) -> Result<(), CompileError> {
        let placeholder = self.config.directive_name("parent");
        let children = ast.children(id).to_vec();
        let mut finalized = Vec::with_capacity(children.len());
        for node in children {
            if ast.attribute(node, &placeholder).is_some() {
                continue;
            }
            self.finalize(ast, node, regions)?;

            let mut region = None;
            for mode in BlockMode::ALL {
                let Some(name) = self.attribute(ast, node, mode.directive())? else {
                    continue;
                };
                ast.take_attribute(node, &self.config.directive_name(mode.directive()));
                region.get_or_insert_with(|| SmolStr::new(name));
            }

            let Some(name) = region.filter(|_| regions) else {
                finalized.push(node);
                continue;
            };
            if let NodeKind::Fragment(fragment) = ast.kind_mut(node) {
                fragment.region = Some(name);
                finalized.push(node);
                continue;
            }
            let wrapper = ast.alloc_at(
                NodeKind::Fragment(Fragment {
                    children: vec![node],
                    region: Some(name),
                    ..Fragment::default()
                }),
                node,
            );
            finalized.push(wrapper);
        }
        ast.set_children(id, finalized);
        Ok(())
    }

    fn validate_parents(&self, ast: &Ast, root: NodeId) -> Result<(), CompileError> {
        let placeholder = self.config.directive_name("parent");
        let block_names: Vec<String> = BlockMode::ALL
            .iter()
            .map(|mode| self.config.directive_name(mode.directive()))
            .collect();
        for id in ast.descendants(root) {
            if ast.attribute(id, &placeholder).is_none() {
                continue;
            }
            let inside_block = ast
                .ancestors(id)
                .any(|a| block_names.iter().any(|name| ast.attribute(a, name).is_some()));
            if !inside_block {
                return Err(CompileError::syntax(format!(
                    "{placeholder} is only allowed inside {}",
                    self.config.directive_name("block")
                ))
                .at(ast.node(id)));
            }
        }
        Ok(())
    }

    fn find_extends(&self, ast: &Ast) -> Result<Option<(NodeId, String)>, CompileError> {
        for &node in ast.children(ast.root()) {
            if let Some(reference) = self.attribute(ast, node, "extends")? {
                return Ok(Some((node, reference)));
            }
        }
        Ok(None)
    }

    fn block_of(&self, ast: &Ast, id: NodeId) -> Result<Option<(BlockMode, SmolStr)>, CompileError> {
        for mode in BlockMode::ALL {
            if let Some(name) = self.attribute(ast, id, mode.directive())? {
                if name.is_empty() {
                    return Err(CompileError::syntax(format!(
                        "{} requires a block name",
                        self.config.directive_name(mode.directive())
                    ))
                    .at(ast.node(id)));
                }
                return Ok(Some((mode, SmolStr::new(name))));
            }
        }
        Ok(None)
    }

    /// Returns the trimmed literal value of an inheritance attribute.
    fn attribute(&self, ast: &Ast, id: NodeId, directive: &str) -> Result<Option<String>, CompileError> {
        let name = self.config.directive_name(directive);
        let Some(attribute) = ast.attribute(id, &name) else {
            return Ok(None);
        };
        match attribute.static_value() {
            Some(value) => Ok(Some(value.trim().to_string())),
            None => Err(CompileError::syntax("Directive attributes cannot contain dynamic output expressions")
                .at(ast.node(id))),
        }
    }

    /// Resolves a reference and rejects re-entry into the active chain.
    fn locate(
        &mut self,
        ast: &Ast,
        node: NodeId,
        reference: &str,
        chain: &[Utf8PathBuf],
    ) -> Result<Utf8PathBuf, CompileError> {
        let from = ast.node(node).source.path().to_path_buf();
        let path = self
            .loader
            .resolve(reference, &from)
            .map_err(|e| e.at(ast.node(node)))?;
        if chain.contains(&path) {
            let chain = chain
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| p.to_string())
                .collect();
            return Err(CompileError::new(ErrorKind::CircularInheritance { chain }).at(ast.node(node)));
        }
        self.dependencies.insert(path.clone());
        Ok(path)
    }

    fn load(&self, path: &Utf8Path) -> Result<Ast, CompileError> {
        let file = self.loader.load(path)?;
        let parsed = parse_with_options(Arc::clone(&file), &self.config.parse_options());
        match parsed.errors.first() {
            Some(error) => Err(CompileError::from_parse(&file, error)),
            None => Ok(parsed.ast),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryTemplateLoader;
    use pretty_assertions::assert_eq;

    fn resolve(loader: &MemoryTemplateLoader, path: &str) -> Result<Ast, CompileError> {
        let config = CompilerConfig::default();
        let manager = BlockManager::new();
        let ast = {
            let mut resolver = InheritanceResolver::new(&config, loader, &manager);
            let ast = resolver.load(&Utf8PathBuf::from(path))?;
            resolver.resolve_document(ast)
        };
        assert_eq!(manager.depth(), 0);
        ast
    }

    /// Renders text and element structure, marking regions with `[name|…]`.
    fn render(ast: &Ast, id: NodeId, out: &mut String) {
        match ast.kind(id) {
            NodeKind::Text(t) => out.push_str(&t.content),
            NodeKind::Element(e) => {
                out.push_str(&format!("<{}>", e.name));
                for &c in &e.children {
                    render(ast, c, out);
                }
                out.push_str(&format!("</{}>", e.name));
            }
            NodeKind::Fragment(f) => {
                if let Some(region) = &f.region {
                    out.push_str(&format!("[{region}|"));
                }
                for &c in &f.children {
                    render(ast, c, out);
                }
                if f.region.is_some() {
                    out.push(']');
                }
            }
            NodeKind::RawCode(code) => out.push_str(&format!("{{{}}}", code.code)),
            _ => {
                for &c in ast.children(id) {
                    render(ast, c, out);
                }
            }
        }
    }

    fn rendered(loader: &MemoryTemplateLoader, path: &str) -> String {
        match resolve(loader, path) {
            Ok(ast) => {
                let mut out = String::new();
                render(&ast, ast.root(), &mut out);
                out
            }
            Err(e) => format!("error: {}", e.message()),
        }
    }

    #[test]
    fn test_child_overrides_block() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<main s:block=\"content\">Default</main>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"></s-template>ignored<s-template s:block=\"content\">Override</s-template>",
            );
        assert_eq!(rendered(&loader, "child.sugar.php"), "[content|<main>Override</main>]");
    }

    #[test]
    fn test_element_block_replaces_wrapper() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<main s:block=\"content\">Default</main>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/><section s:block=\"content\">New</section>",
            );
        assert_eq!(rendered(&loader, "child.sugar.php"), "[content|<section>New</section>]");
    }

    #[test]
    fn test_parent_append_prepend() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<head s:block=\"head\"><title>T</title></head>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/>\
                 <s-template s:block=\"head\">A<s-template s:parent/>B<s-template s:parent/></s-template>\
                 <s-template s:append=\"head\">Z</s-template>\
                 <s-template s:prepend=\"head\">P</s-template>",
            );
        assert_eq!(
            rendered(&loader, "child.sugar.php"),
            "[head|<head>PA<title>T</title>B<title>T</title>Z</head>]"
        );
    }

    #[test]
    fn test_multi_level_chain() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<body s:block=\"body\">base</body>")
            .with_template(
                "mid.sugar.php",
                "<s-template s:extends=\"base\"/><s-template s:block=\"body\">mid <s-template s:parent/></s-template>",
            )
            .with_template(
                "leaf.sugar.php",
                "<s-template s:extends=\"mid\"/><s-template s:append=\"body\"> leaf</s-template>",
            );
        assert_eq!(rendered(&loader, "leaf.sugar.php"), "[body|<body>mid base leaf</body>]");
    }

    #[test]
    fn test_duplicate_block_rejected() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<main s:block=\"content\"></main>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/><p s:block=\"content\">a</p><p s:block=\"content\">b</p>",
            );
        assert_eq!(
            rendered(&loader, "child.sugar.php"),
            "error: Block is defined multiple times in the same child template"
        );
    }

    #[test]
    fn test_parent_outside_block_rejected() {
        let loader =
            MemoryTemplateLoader::new().with_template("page.sugar.php", "<div><s-template s:parent/></div>");
        assert_eq!(
            rendered(&loader, "page.sugar.php"),
            "error: s:parent is only allowed inside s:block"
        );
    }

    #[test]
    fn test_circular_inheritance() {
        let loader = MemoryTemplateLoader::new()
            .with_template("a.sugar.php", "<s-template s:extends=\"b\"/>")
            .with_template("b.sugar.php", "<s-template s:extends=\"a\"/>");
        assert_eq!(
            rendered(&loader, "a.sugar.php"),
            "error: Circular inheritance detected: a.sugar.php -> b.sugar.php -> a.sugar.php"
        );
    }

    #[test]
    fn test_include_with_isolated_scope() {
        let loader = MemoryTemplateLoader::new()
            .with_template("partials/nav.sugar.php", "<nav>n</nav>")
            .with_template(
                "pages/home.sugar.php",
                "<header><s-template s:include=\"../partials/nav\" s:with=\"['a' => 1]\"/></header>",
            );
        assert_eq!(
            rendered(&loader, "pages/home.sugar.php"),
            "<header>{(function (array $__vars): void { extract($__vars, EXTR_SKIP);}<nav>n</nav>{})(['a' => 1]);}</header>"
        );
    }

    #[test]
    fn test_top_level_include_defines_blocks() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<title s:block=\"title\">Site</title>")
            .with_template("partials/title.sugar.php", "<s-template s:block=\"title\">From partial</s-template>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/><s-template s:include=\"partials/title\"/>",
            );
        assert_eq!(rendered(&loader, "child.sugar.php"), "[title|<title>From partial</title>]");
    }

    #[test]
    fn test_missing_partial_leaves_depth_at_zero() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<title s:block=\"title\">Site</title>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/><s-template s:include=\"partials/missing\"/>",
            );
        assert_eq!(
            rendered(&loader, "child.sugar.php"),
            "error: Template \"partials/missing\" not found"
        );
    }

    #[test]
    fn test_registered_partial_contributes_only_blocks() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<title s:block=\"title\">Site</title>")
            .with_template(
                "partials/title.sugar.php",
                "junk<s-template s:block=\"title\">T</s-template><s-template s:include=\"more\"/>",
            )
            .with_template("partials/more.sugar.php", "more junk<s-template s:append=\"title\">!</s-template>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/><s-template s:include=\"partials/title\"/>",
            );
        assert_eq!(rendered(&loader, "child.sugar.php"), "[title|<title>T!</title>]");
    }

    #[test]
    fn test_include_inside_block_renders_in_place() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<main s:block=\"content\">Default</main>")
            .with_template("partials/card.sugar.php", "<p>intro</p><p s:block=\"card\">Card</p>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/>\
                 <s-template s:block=\"content\"><s-template s:include=\"partials/card\"/></s-template>",
            );
        assert_eq!(
            rendered(&loader, "child.sugar.php"),
            "[content|<main><p>intro</p>[card|<p>Card</p>]</main>]"
        );
    }

    #[test]
    fn test_with_on_registered_include_rejected() {
        let loader = MemoryTemplateLoader::new()
            .with_template("base.sugar.php", "<title s:block=\"title\">Site</title>")
            .with_template("partials/title.sugar.php", "<s-template s:block=\"title\">T</s-template>")
            .with_template(
                "child.sugar.php",
                "<s-template s:extends=\"base\"/><s-template s:include=\"partials/title\" s:with=\"['a' => 1]\"/>",
            );
        assert_eq!(
            rendered(&loader, "child.sugar.php"),
            "error: s:with cannot be used on an include that only provides blocks"
        );
    }
}

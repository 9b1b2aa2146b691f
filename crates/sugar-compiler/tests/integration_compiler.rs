//! End-to-end tests: template source in, generated PHP out.
//!
//! Rendering happens in PHP, so these tests check the structure and ordering
//! of the generated code around the literal markup.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use sugar_compiler::{CompileError, Compiler, ErrorKind, MemoryTemplateLoader};

// ============================================================================
// TEST INFRASTRUCTURE
// ============================================================================

const BODY_START: &str = "ob_start();\n ?>";
const BODY_END: &str = "<?php\n    return (string) ob_get_clean();\n};\n";

fn compiler(loader: MemoryTemplateLoader) -> Compiler {
    Compiler::new(Arc::new(loader))
}

fn compile_page(loader: MemoryTemplateLoader, source: &str) -> Result<String, CompileError> {
    compiler(loader.with_template("pages/page.sugar.php", source))
        .compile("pages/page.sugar.php")
        .map(|compiled| compiled.code)
}

/// Returns the template body printed after the block-render branch.
fn body(code: &str) -> &str {
    let start = code.rfind(BODY_START).map_or(0, |i| i + BODY_START.len());
    let end = code.rfind(BODY_END).unwrap_or(code.len());
    &code[start..end]
}

fn compile_body(source: &str) -> String {
    match compile_page(MemoryTemplateLoader::new(), source) {
        Ok(code) => body(&code).to_string(),
        Err(error) => panic!("compile failed: {error}"),
    }
}

fn compile_error(source: &str) -> CompileError {
    match compile_page(MemoryTemplateLoader::new(), source) {
        Ok(code) => panic!("expected an error, got:\n{code}"),
        Err(error) => error,
    }
}

// ============================================================================
// DIRECTIVES
// ============================================================================

#[test]
fn if_wraps_the_element() {
    assert_eq!(
        compile_body(r#"<div s:if="$isAdmin">Admin Panel</div>"#),
        "<?php if ($isAdmin): ?><div>Admin Panel</div><?php endif; ?>"
    );
}

#[test]
fn forelse_renders_fallback_branch_only_when_empty() {
    assert_eq!(
        compile_body(r#"<li s:forelse="$items as $item"><?= $item ?></li><div s:empty>No items</div>"#),
        "<?php $__empty_0 = true; foreach ($items as $item): $__empty_0 = false; ?>\
         <li><?php echo Escaper::html($item); ?></li>\
         <?php endforeach;\nif ($__empty_0): ?><div>No items</div><?php endif; ?>"
    );
}

#[test]
fn control_then_element_then_content() {
    assert_eq!(
        compile_body(r#"<p s:foreach="$users as $user" s:text="$user->name">placeholder</p>"#),
        "<?php foreach ($users as $user): ?><p><?php echo Escaper::html($user->name); ?></p><?php endforeach; ?>"
    );
}

#[test]
fn nested_control_flow_on_different_elements_is_legal() {
    assert_eq!(
        compile_body(r#"<div s:if="$a"><div s:foreach="$b"></div></div>"#),
        "<?php if ($a): ?><div><?php foreach ($b): ?><div></div><?php endforeach; ?></div><?php endif; ?>"
    );
}

#[test]
fn two_control_flow_directives_on_one_element_rejected() {
    let error = compile_error(r#"<div s:if="$a" s:foreach="$b"></div>"#);
    assert!(matches!(error.kind, ErrorKind::Syntax { .. }));
    assert_eq!(
        error.to_string(),
        "Only one control flow directive allowed per element \
         (template: pages/page.sugar.php line:1 column:16)"
    );
}

#[test]
fn dynamic_directive_values_always_rejected() {
    for name in ["if", "foreach", "text", "class", "trim", "block", "extends", "include", "bogus"] {
        let error = compile_error(&format!(r#"<div s:{name}="<?= $x ?>">x</div>"#));
        assert!(
            matches!(error.kind, ErrorKind::Syntax { .. }),
            "s:{name} gave {error}"
        );
        assert_eq!(
            error.message(),
            "Directive attributes cannot contain dynamic output expressions",
            "s:{name}"
        );
    }
}

#[test]
fn unknown_directive_suggests_closest() {
    let error = compile_error(r#"<p s:iff="$a">x</p>"#);
    assert_eq!(
        error.message(),
        "Unknown directive \"s:iff\". Did you mean \"s:if\"?"
    );
}

#[test]
fn attribute_directives_leave_no_stray_space() {
    assert_eq!(
        compile_body(r#"<div class="card" s:class="['active' => $on]">x</div>"#),
        "<div class=\"card <?php echo Escaper::attr(\\Sugar\\Runtime\\HtmlAttributeHelper::classNames(['active' => $on])); ?>\">x</div>"
    );
    assert_eq!(
        compile_body(r#"<input s:spread="$attrs"><br s:if="$gap" />"#),
        "<input <?php echo \\Sugar\\Runtime\\HtmlAttributeHelper::spreadAttrs($attrs); ?>>\
         <?php if ($gap): ?><br /><?php endif; ?>"
    );
}

#[test]
fn dynamic_tag_closes_with_same_name() {
    assert_eq!(
        compile_body(r#"<h1 s:tag="$level">Title</h1>"#),
        "<<?php echo $__tag_0 = \\Sugar\\Runtime\\HtmlTagHelper::tagName($level, 'h1'); ?>>Title</<?php echo $__tag_0; ?>>"
    );
}

// ============================================================================
// ESCAPING
// ============================================================================

#[test]
fn outputs_escaped_for_their_context() {
    let body = compile_body(
        "<a href=\"/search?q=<?= $q ?>\" title=\"<?= $title ?>\"><?= $label ?></a>\
         <script>var config = <?= $config ?>;</script>\
         <style>.badge { color: <?= $color ?>; }</style>\
         <div s:html=\"$trusted\"></div>",
    );
    for expected in [
        "Escaper::url($q)",
        "Escaper::attr($title)",
        "Escaper::html($label)",
        "Escaper::js($config)",
        "Escaper::css($color)",
        "<div><?php echo $trusted; ?></div>",
    ] {
        assert!(body.contains(expected), "missing {expected} in:\n{body}");
    }
}

#[test]
fn pipes_and_raw_rewritten() {
    assert_eq!(
        compile_body("<p><?= $name |> trim(...) |> strtoupper(...) ?></p><p><?= r($html) ?></p>"),
        "<p><?php echo Escaper::html(strtoupper(trim($name))); ?></p><p><?php echo $html; ?></p>"
    );
}

#[test]
fn markup_without_directives_preserved() {
    let source = "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"></head>\n\
                  <body>\n  <!-- nav -->\n  <p class='x' hidden>Hello &amp; welcome</p>\n</body>\n</html>\n";
    assert_eq!(compile_body(source), source);
}

// ============================================================================
// INHERITANCE
// ============================================================================

fn layouts() -> MemoryTemplateLoader {
    MemoryTemplateLoader::new().with_template(
        "layouts/base.sugar.php",
        "<html><title s:block=\"title\">Site</title><main s:block=\"content\">Default</main></html>",
    )
}

#[test]
fn child_block_overrides_layout() {
    let code = compile_page(
        layouts(),
        "<s-template s:extends=\"../layouts/base\">\
         <s-template s:block=\"content\">Override</s-template></s-template>",
    )
    .expect("compile");
    assert!(code.contains("<main>Override</main>"));
    assert!(!code.contains("Default"));
    assert!(code.contains("<title>Site</title>"));
    assert!(code.contains("case 'content': ?><main>Override</main><?php break;"));
    assert!(code.contains("case 'title': ?><title>Site</title><?php break;"));
}

#[test]
fn circular_inheritance_reports_chain() {
    let loader = MemoryTemplateLoader::new()
        .with_template("a.sugar.php", "<s-template s:extends=\"b\"></s-template>")
        .with_template("b.sugar.php", "<s-template s:extends=\"a\"></s-template>");
    let error = compiler(loader).compile("a.sugar.php").err();
    let chain = error.map(|e| match e.kind {
        ErrorKind::CircularInheritance { chain } => chain,
        other => vec![other.to_string()],
    });
    assert_eq!(
        chain,
        Some(vec![
            "a.sugar.php".to_string(),
            "b.sugar.php".to_string(),
            "a.sugar.php".to_string(),
        ])
    );
}

#[test]
fn missing_layout_suggests_closest() {
    let error = compile_page(layouts(), "<s-template s:extends=\"/layouts/bse\"></s-template>").err();
    assert_eq!(
        error.map(|e| e.message()).as_deref(),
        Some("Template \"/layouts/bse\" not found. Did you mean \"layouts/base\"?")
    );
}

#[test]
fn block_registration_depth_restored_after_error() {
    let compiler = compiler(
        layouts()
            .with_template(
                "pages/broken.sugar.php",
                "<s-template s:extends=\"../layouts/base\"></s-template>\
                 <s-template s:include=\"../partials/missing\"></s-template>",
            )
            .with_template(
                "pages/ok.sugar.php",
                "<s-template s:extends=\"../layouts/base\"></s-template>",
            ),
    );
    assert!(compiler.compile("pages/broken.sugar.php").is_err());
    assert_eq!(compiler.block_manager().depth(), 0);
    assert!(!compiler.block_manager().is_registering());
    assert!(compiler.compile("pages/ok.sugar.php").is_ok());
}

#[test]
fn include_without_with_shares_scope() {
    let loader = MemoryTemplateLoader::new().with_template("partials/nav.sugar.php", "<nav><?= $user ?></nav>");
    let code = compile_page(loader, "<header><s-template s:include=\"../partials/nav\"/></header>").expect("compile");
    assert_eq!(body(&code), "<header><nav><?php echo Escaper::html($user); ?></nav></header>");
    assert!(!code.contains("extract($__vars"), "{code}");
}

#[test]
fn block_in_layout_partial_is_a_placeholder() {
    let loader = MemoryTemplateLoader::new()
        .with_template(
            "layouts/base.sugar.php",
            "<html><s-template s:include=\"../partials/head\"/><main s:block=\"content\">Default</main></html>",
        )
        .with_template("partials/head.sugar.php", "<title s:block=\"title\">Site</title>")
        .with_template(
            "pages/plain.sugar.php",
            "<s-template s:extends=\"../layouts/base\"><p s:block=\"content\">Plain</p></s-template>",
        )
        .with_template(
            "pages/titled.sugar.php",
            "<s-template s:extends=\"../layouts/base\"><title s:block=\"title\">Mine</title></s-template>",
        );
    let compiler = compiler(loader);

    let plain = compiler.compile("pages/plain.sugar.php").map(|c| c.code).expect("compile");
    assert!(plain.contains("case 'title': ?><title>Site</title><?php break;"), "{plain}");
    assert!(body(&plain).contains("<html><title>Site</title><p>Plain</p></html>"), "{plain}");

    let titled = compiler.compile("pages/titled.sugar.php").map(|c| c.code).expect("compile");
    assert!(body(&titled).contains("<html><title>Mine</title><main>Default</main></html>"), "{titled}");
    assert!(!titled.contains("Site"), "{titled}");
}

#[test]
fn block_in_partial_included_inside_block_renders_in_place() {
    let loader = layouts().with_template("partials/card.sugar.php", "<p s:block=\"card\">Card</p>");
    let code = compile_page(
        loader,
        "<s-template s:extends=\"../layouts/base\">\
         <main s:block=\"content\"><s-template s:include=\"../partials/card\"/></main></s-template>",
    )
    .expect("compile");
    assert!(body(&code).contains("<main><p>Card</p></main>"), "{code}");
    assert!(code.contains("case 'card': ?><p>Card</p><?php break;"), "{code}");
}

#[test]
fn misplaced_inheritance_directives_rejected() {
    let error = compile_page(
        layouts(),
        "<div><s-template s:extends=\"../layouts/base\"></s-template><p s:block=\"content\">Override</p></div>",
    )
    .err();
    assert_eq!(
        error.map(|e| e.to_string()).as_deref(),
        Some("s:extends must be on a top-level element (template: pages/page.sugar.php line:1 column:18)")
    );

    let error = compile_error(r#"<p s:with="['a' => 1]">x</p>"#);
    assert!(matches!(error.kind, ErrorKind::Syntax { .. }));
    assert_eq!(error.message(), "s:with requires s:include");
}

// ============================================================================
// COMPONENTS
// ============================================================================

fn components() -> MemoryTemplateLoader {
    MemoryTemplateLoader::new()
        .with_template(
            "components/alert.sugar.php",
            "<?php use App\\Icons; ?><div class=\"alert\"><?= Icons::get($type) ?><?= $slot ?></div>",
        )
        .with_template("components/badge.sugar.php", "<span><?= $slot ?></span>")
}

#[test]
fn component_parsed_once_and_expanded_per_use() {
    let compiler = compiler(components().with_template(
        "pages/page.sugar.php",
        "<s-badge>One</s-badge><s-badge>Two</s-badge>",
    ));
    let code = compiler.compile("pages/page.sugar.php").map(|c| c.code).expect("compile");
    let cache = compiler.component_cache();
    assert_eq!((cache.misses(), cache.hits()), (1, 1));
    assert!(code.contains("One<?php $__slot_0 = ob_get_clean();"));
    assert!(code.contains("Two<?php $__slot_1 = ob_get_clean();"));
    assert_eq!(code.matches("<span><?php echo $slot; ?></span>").count(), 2);
}

#[test]
fn imports_hoisted_once() {
    let code = compile_page(
        components(),
        "<?php use App\\Icons; ?><s-alert type=\"info\">A</s-alert><s-alert type=\"warn\">B</s-alert>",
    )
    .expect("compile");
    assert_eq!(code.matches("use App\\Icons;").count(), 1);
    let header_end = code.find("return function").unwrap_or_default();
    assert!(code[..header_end].contains("use App\\Icons;\n"));
}

#[test]
fn missing_component_suggests_closest() {
    let error = compile_page(components(), "<s-bdge>x</s-bdge>").err();
    assert_eq!(
        error.map(|e| e.message()).as_deref(),
        Some("Component \"bdge\" not found. Did you mean \"badge\"?")
    );
}

#[test]
fn component_cache_shared_between_compilers() {
    let shared = Arc::new(sugar_compiler::ComponentCache::new());
    let loader = Arc::new(components().with_template("pages/page.sugar.php", "<s-badge>x</s-badge>"));
    let first = Compiler::new(loader.clone()).with_component_cache(Arc::clone(&shared));
    let second = first.clone();
    assert!(first.compile("pages/page.sugar.php").is_ok());
    assert!(second.compile("pages/page.sugar.php").is_ok());
    assert_eq!((shared.misses(), shared.hits()), (1, 1));
}

#[test]
fn component_template_includes_partials() {
    let compiler = compiler(
        components()
            .with_template(
                "components/button.sugar.php",
                "<button><s-template s:include=\"../partials/icon\"/><?= $slot ?></button>",
            )
            .with_template("partials/icon.sugar.php", "<i>ICON</i>")
            .with_template("pages/page.sugar.php", "<s-button>Go</s-button>"),
    );
    let compiled = compiler.compile("pages/page.sugar.php").expect("compile");
    assert!(
        compiled.code.contains("<button><i>ICON</i><?php echo $slot; ?></button>"),
        "{}",
        compiled.code
    );
    assert_eq!(
        compiled.dependencies,
        vec![
            camino::Utf8PathBuf::from("components/button.sugar.php"),
            camino::Utf8PathBuf::from("partials/icon.sugar.php"),
        ]
    );
}

#[test]
fn component_template_cannot_extend() {
    let error = compile_page(
        layouts()
            .with_template(
                "components/panel.sugar.php",
                "<s-template s:extends=\"../layouts/base\"></s-template>",
            ),
        "<s-panel>x</s-panel>",
    )
    .err();
    assert_eq!(
        error.map(|e| e.message()).as_deref(),
        Some("s:extends is not allowed in components")
    );
}

#[test]
fn component_script_outputs_escaped_as_js() {
    let code = compile_page(
        components().with_template(
            "components/chart.sugar.php",
            "<div><script>var data = <?= $points ?>;</script><?= $slot ?></div>",
        ),
        "<s-chart points=\"[1, 2]\">Chart</s-chart>",
    )
    .expect("compile");
    assert!(
        code.contains("<script>var data = <?php echo Escaper::js($points); ?>;</script>"),
        "{code}"
    );
}


use std::fmt::Write;
use std::sync::Arc;
use sugar_parser::{parse, Ast, AttributePart, AttributeValue, NodeId, NodeKind, SourceFile, TagClose};

fn attr_value(ast: &Ast, value: &AttributeValue) -> String {
    let output = |id: &NodeId| match ast.kind(*id) {
        NodeKind::Output(o) => format!("<?= {} ?>", o.expression),
        other => format!("<{}>", other.name()),
    };
    match value {
        AttributeValue::Boolean => String::new(),
        AttributeValue::Static(s) => format!("=\"{s}\""),
        AttributeValue::Output(id) => format!("={}", output(id)),
        AttributeValue::Parts(parts) => {
            let joined: String = parts
                .iter()
                .map(|p| match p {
                    AttributePart::Text(t) => t.clone(),
                    AttributePart::Output(id) => output(id),
                })
                .collect();
            format!("=\"{joined}\"")
        }
    }
}

fn attrs(ast: &Ast, id: NodeId) -> String {
    let list = ast.attributes(id);
    if list.is_empty() {
        return String::new();
    }
    let items: Vec<String> = list
        .iter()
        .map(|a| format!("{}{}", a.name, attr_value(ast, &a.value)))
        .collect();
    format!(" [{}]", items.join(", "))
}

fn dump_node(ast: &Ast, id: NodeId, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let line = match ast.kind(id) {
        NodeKind::Document(_) => String::from("document"),
        NodeKind::Element(e) => {
            let close = match e.close {
                TagClose::Normal => "",
                TagClose::SelfClosing => " (self-closing)",
                TagClose::Void => " (void)",
            };
            format!("element {}{}{}", e.name, attrs(ast, id), close)
        }
        NodeKind::Fragment(_) => format!("fragment{}", attrs(ast, id)),
        NodeKind::Component(c) => format!("component {}{}", c.name, attrs(ast, id)),
        NodeKind::Text(t) => format!("text {:?}", t.content),
        NodeKind::Output(o) => format!(
            "output {} ({})",
            o.expression,
            if o.escape { "escape" } else { "raw" }
        ),
        NodeKind::RawCode(c) => format!("code {:?}", c.code),
        NodeKind::Directive(d) => format!("directive {}", d.name),
    };
    let _ = writeln!(out, "{indent}{line}");
    for &child in ast.children(id) {
        dump_node(ast, child, depth + 1, out);
    }
}

fn dump(source: &str) -> String {
    let result = parse(Arc::new(SourceFile::new("snapshot.sugar.php", source)));
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let mut out = String::new();
    for &child in result.ast.children(result.ast.root()) {
        dump_node(&result.ast, child, 0, &mut out);
    }
    out.trim_end().to_string()
}

#[test]
fn test_snapshot_loop_with_pipe() {
    let source = r#"<ul class="list">
  <li s:foreach="$items as $item"><?= $item |> strtoupper(...) ?></li>
</ul>"#;
    insta::assert_snapshot!(dump(source), @r#"
    element ul [class="list"]
      text "\n  "
      element li [s:foreach="$items as $item"]
        output strtoupper($item) (escape)
      text "\n"
    "#);
}

#[test]
fn test_snapshot_fragment_component_and_script() {
    let source = r#"<s-template s:if="$show">
<s-card title="Hi"><p s:slot="footer">Bye</p></s-card>
</s-template>
<script>let n = <?= $n ?>;</script>"#;
    insta::assert_snapshot!(dump(source), @r#"
    fragment [s:if="$show"]
      text "\n"
      component card [title="Hi"]
        element p [s:slot="footer"]
          text "Bye"
      text "\n"
    text "\n"
    element script
      text "let n = "
      output $n (escape)
      text ";"
    "#);
}

#[test]
fn test_snapshot_mixed_attributes() {
    let source = r#"<a href="/u/<?= $id ?>?tab=<?= raw($tab) ?>" hidden><img src=logo.png></a>"#;
    insta::assert_snapshot!(dump(source), @r#"
    element a [href="/u/<?= $id ?>?tab=<?= $tab ?>", hidden]
      element img [src="logo.png"] (void)
    "#);
}

//! Writes a compiled expression tree as indented XML, one element per
//! node, for diagnostics and tests.

use crate::arena::{ExprArena, ExprId};
use crate::error::{XPathError, XResult};
use crate::kind::{ExprKind, FilterFlags, VariableTarget};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quire_xdm::{AtomicValue, Item, Sequence};
use std::fmt;

fn xml_error(e: impl fmt::Display) -> XPathError {
    XPathError::config(format!("Cannot write expression tree: {}", e))
}

fn literal_text(seq: &Sequence) -> String {
    let items: Vec<String> = seq
        .iter()
        .map(|item| match item {
            Item::Atomic(AtomicValue::String(s)) => format!("\"{}\"", s),
            Item::Atomic(a) => a.to_string_value(),
            other => other.type_name(),
        })
        .collect();
    match items.as_slice() {
        [single] => single.clone(),
        _ => format!("({})", items.join(", ")),
    }
}

fn flag_text(flags: &FilterFlags) -> String {
    let mut s = String::new();
    if flags.positional {
        s.push('p');
    }
    if flags.singleton_boolean {
        s.push('b');
    }
    if flags.independent {
        s.push('i');
    }
    s
}

/// Element name and attributes for one node.
fn describe(arena: &ExprArena, id: ExprId) -> (&'static str, Vec<(&'static str, String)>) {
    let card = || arena.cardinality(id).to_string();
    match arena.kind(id) {
        ExprKind::Literal(seq) => ("literal", vec![("val", literal_text(seq))]),
        ExprKind::ContextItem { item_type } => ("dot", vec![("as", item_type.to_string())]),
        ExprKind::VarRef(r) => {
            let mut attrs = vec![("name", r.name.clone())];
            if let VariableTarget::Local(var) = r.target {
                attrs.push(("var", var.raw().to_string()));
            }
            ("varRef", attrs)
        }
        ExprKind::Let(b) => {
            let mut attrs = vec![("var", b.name.clone())];
            if let Some(required) = &b.required {
                attrs.push(("as", required.to_string()));
            }
            attrs.push(("eval", b.mode.to_string()));
            ("let", attrs)
        }
        ExprKind::For(b) => ("for", vec![("var", b.name.clone())]),
        ExprKind::FunctionCall(f) => ("fn", vec![("name", f.qualified_name())]),
        ExprKind::Arithmetic(op) => ("arith", vec![("op", op.symbol().to_string())]),
        ExprKind::Negate => ("negate", vec![]),
        ExprKind::ValueComparison {
            op,
            result_when_empty,
        } => {
            let mut attrs = vec![("op", op.value_symbol().to_string())];
            if let Some(b) = result_when_empty {
                attrs.push(("onEmpty", b.to_string()));
            }
            ("vc", attrs)
        }
        ExprKind::GeneralComparison { op, shape, .. } => (
            "gc",
            vec![("op", op.general_symbol().to_string()), ("card", shape.to_string())],
        ),
        ExprKind::And => ("and", vec![]),
        ExprKind::Or => ("or", vec![]),
        ExprKind::Filter(flags) => ("filter", vec![("flags", flag_text(flags))]),
        ExprKind::FirstItem => ("first", vec![]),
        ExprKind::LastItem => ("last", vec![]),
        ExprKind::Subscript => ("subscript", vec![]),
        ExprKind::Tail { start } => ("tail", vec![("start", start.to_string())]),
        ExprKind::IntegerRangeTest => ("intRangeTest", vec![]),
        ExprKind::Range => ("to", vec![]),
        ExprKind::Block => ("sequence", vec![("card", card())]),
        ExprKind::Conditional => ("choose", vec![]),
        ExprKind::TryCatch { .. } => ("try", vec![]),
        ExprKind::SimpleMap => ("slash", vec![("op", "!".to_string())]),
        ExprKind::Cast(spec) => {
            let suffix = if spec.allows_empty { "?" } else { "" };
            ("cast", vec![("as", format!("{}{}", spec.target, suffix))])
        }
        ExprKind::InstanceOf(st) => ("instance", vec![("of", st.to_string())]),
        ExprKind::ItemChecker { required, role } => (
            "treat",
            vec![("as", required.to_string()), ("role", role.message())],
        ),
        ExprKind::CardinalityChecker { required, role } => (
            "check",
            vec![("card", required.to_string()), ("role", role.message())],
        ),
        ExprKind::Atomizer => ("data", vec![]),
        ExprKind::UntypedConverter { target } => ("cvUntyped", vec![("to", target.to_string())]),
        ExprKind::AtomicConverter { target } => ("convert", vec![("to", target.to_string())]),
        ExprKind::FunctionCoercer { required, role } => (
            "fnCoercer",
            vec![("to", required.to_string()), ("role", role.message())],
        ),
    }
}

fn write_node(w: &mut Writer<Vec<u8>>, arena: &ExprArena, id: ExprId) -> XResult<()> {
    let (name, attrs) = describe(arena, id);
    let mut start = BytesStart::new(name);
    for (key, value) in &attrs {
        start.push_attribute((*key, value.as_str()));
    }
    let children = arena.children(id);
    if children.is_empty() {
        return w.write_event(Event::Empty(start)).map_err(xml_error);
    }
    w.write_event(Event::Start(start)).map_err(xml_error)?;
    match arena.kind(id) {
        ExprKind::TryCatch { catch_codes } => {
            write_node(w, arena, children[0])?;
            for (code, handler) in catch_codes.iter().zip(&children[1..]) {
                let mut catch = BytesStart::new("catch");
                catch.push_attribute(("errors", code.as_deref().unwrap_or("*")));
                w.write_event(Event::Start(catch)).map_err(xml_error)?;
                write_node(w, arena, *handler)?;
                w.write_event(Event::End(BytesEnd::new("catch")))
                    .map_err(xml_error)?;
            }
        }
        _ => {
            for child in children {
                write_node(w, arena, child)?;
            }
        }
    }
    w.write_event(Event::End(BytesEnd::new(name))).map_err(xml_error)
}

/// The expression tree under `root` as an XML document.
pub fn explain(arena: &ExprArena, root: ExprId) -> XResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_node(&mut writer, arena, root)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::visitor::compile_passes;
    use quire_types::SequenceType;
    use quire_xdm::ComparisonOperator;

    #[test]
    fn test_literal_and_function() {
        let mut arena = ExprArena::new();
        let seq = arena.strings(&["a", "b"]);
        let count = arena.call(crate::functions::SystemFunction::Count, vec![seq]);
        let xml = explain(&arena, count).unwrap();
        assert_eq!(
            xml,
            "<fn name=\"fn:count\">\n  <literal val=\"(&quot;a&quot;, &quot;b&quot;)\"/>\n</fn>"
        );
    }

    #[test]
    fn test_rewritten_filter_shows_tail() {
        let mut arena = ExprArena::new();
        let mut ctx = StaticContext::default();
        ctx.declare_variable("seq", "xs:integer*".parse().unwrap());
        let seq = arena.global_ref("seq", SequenceType::any());
        let pos = arena.call(crate::functions::SystemFunction::Position, vec![]);
        let two = arena.int(2);
        let test = arena.value_compare(pos, ComparisonOperator::Gt, two);
        let filter = arena.filter(seq, test);
        let root = compile_passes(&mut arena, filter, &ctx).unwrap();
        let xml = explain(&arena, root).unwrap();
        assert!(xml.starts_with("<tail start=\"3\">"), "{}", xml);
        assert!(xml.contains("<varRef name=\"seq\"/>"), "{}", xml);
    }

    #[test]
    fn test_operator_is_escaped() {
        let mut arena = ExprArena::new();
        let a = arena.ints(&[1, 2]);
        let b = arena.int(3);
        let gc = arena.general_compare(a, ComparisonOperator::Lt, b);
        let xml = explain(&arena, gc).unwrap();
        assert!(xml.contains("op=\"&lt;\""), "{}", xml);
        assert!(xml.contains("card=\"many-to-many\""), "{}", xml);
    }

    #[test]
    fn test_try_lists_its_handlers() {
        let mut arena = ExprArena::new();
        let body = arena.int(1);
        let fallback = arena.int(0);
        let any = arena.int(-1);
        let t = arena.try_catch(
            body,
            vec![(Some("FOAR0001".to_string()), fallback), (None, any)],
        );
        let xml = explain(&arena, t).unwrap();
        assert!(xml.contains("<catch errors=\"FOAR0001\">"), "{}", xml);
        assert!(xml.contains("<catch errors=\"*\">"), "{}", xml);
    }
}

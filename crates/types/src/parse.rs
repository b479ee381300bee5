//! Parser for the textual form of sequence types, e.g. `xs:integer*`,
//! `element(para)?`, `function(xs:string) as item()*`.

use crate::atomic::AtomicType;
use crate::cardinality::Cardinality;
use crate::error::TypeParseError;
use crate::item::{FunctionType, ItemType, NodeKind, NodeTest};
use crate::sequence::SequenceType;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_opt, opt, value},
    multi::separated_list0,
    sequence::{delimited, preceded},
};
use std::str::FromStr;

pub fn parse_sequence_type(input: &str) -> Result<SequenceType, TypeParseError> {
    check_atomic_names(input)?;
    match sequence_type(input.trim()) {
        Ok(("", st)) => Ok(st),
        Ok((rem, _)) => Err(TypeParseError::syntax(
            input,
            format!("unparsed input remaining: '{}'", rem),
        )),
        Err(e) => Err(TypeParseError::syntax(input, e.to_string())),
    }
}

impl FromStr for SequenceType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_sequence_type(s)
    }
}

fn check_atomic_names(input: &str) -> Result<(), TypeParseError> {
    for (idx, _) in input.match_indices("xs:") {
        let name: String = input[idx + 3..]
            .chars()
            .take_while(|c| is_name_char(*c))
            .collect();
        if name != "numeric" && AtomicType::from_local_name(&name).is_none() {
            return Err(TypeParseError::UnknownAtomicType(name));
        }
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn sequence_type(input: &str) -> IResult<&str, SequenceType> {
    alt((
        value(SequenceType::empty(), ws(tag("empty-sequence()"))),
        map((ws(item_type), opt(ws(occurrence))), |(item, occ)| {
            SequenceType::new(item, occ.unwrap_or(Cardinality::ExactlyOne))
        }),
    ))
    .parse(input)
}

fn occurrence(input: &str) -> IResult<&str, Cardinality> {
    alt((
        value(Cardinality::ZeroOrOne, char('?')),
        value(Cardinality::ZeroOrMore, char('*')),
        value(Cardinality::OneOrMore, char('+')),
    ))
    .parse(input)
}

fn item_type(input: &str) -> IResult<&str, ItemType> {
    alt((
        value(ItemType::AnyItem, tag("item()")),
        value(ItemType::any_node(), tag("node()")),
        named_kind_test("element", NodeKind::Element),
        named_kind_test("attribute", NodeKind::Attribute),
        value(ItemType::node(NodeKind::Text), tag("text()")),
        value(ItemType::node(NodeKind::Comment), tag("comment()")),
        value(ItemType::node(NodeKind::Document), tag("document-node()")),
        value(
            ItemType::node(NodeKind::ProcessingInstruction),
            tag("processing-instruction()"),
        ),
        value(ItemType::node(NodeKind::Namespace), tag("namespace-node()")),
        function_test,
        value(ItemType::Function(FunctionType::Map), tag("map(*)")),
        value(ItemType::Function(FunctionType::Array), tag("array(*)")),
        value(ItemType::numeric(), tag("xs:numeric")),
        atomic_type,
        delimited(ws(char('(')), item_type, ws(char(')'))),
    ))
    .parse(input)
}

fn named_kind_test<'a>(
    keyword: &'static str,
    kind: NodeKind,
) -> impl Parser<&'a str, Output = ItemType, Error = nom::error::Error<&'a str>> {
    map(
        preceded(
            tag(keyword),
            delimited(ws(char('(')), opt(take_while1(is_name_char_or_colon)), ws(char(')'))),
        ),
        move |name: Option<&str>| match name {
            Some(n) if n != "*" => ItemType::Node(NodeTest::named(kind, n)),
            _ => ItemType::node(kind),
        },
    )
}

fn is_name_char_or_colon(c: char) -> bool {
    is_name_char(c) || c == ':' || c == '*'
}

fn atomic_type(input: &str) -> IResult<&str, ItemType> {
    map_opt(preceded(tag("xs:"), take_while1(is_name_char)), |name| {
        AtomicType::from_local_name(name).map(ItemType::Atomic)
    })
    .parse(input)
}

fn function_test(input: &str) -> IResult<&str, ItemType> {
    alt((
        value(
            ItemType::Function(FunctionType::Any),
            (tag("function"), ws(char('(')), char('*'), ws(char(')'))),
        ),
        map(
            (
                preceded(tag("function"), ws(char('('))),
                separated_list0(ws(char(',')), sequence_type),
                ws(char(')')),
                preceded(ws(tag("as")), sequence_type),
            ),
            |(_, params, _, result)| {
                ItemType::Function(FunctionType::Signature {
                    params,
                    result: Box::new(result),
                })
            },
        ),
    ))
    .parse(input)
}

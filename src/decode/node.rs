//! The decoded tree.
//!
//! This is a private module. Its public content is being re-exported by the
//! parent module.

use std::fmt;
use std::borrow::Cow;
use std::ops::Range;
use bytes::Bytes;
use crate::ident::Tag;
use crate::int::Integer;
use crate::oid::Oid;
use crate::time::Time;
use super::error::{Annotation, DecodeError, ErrorKind, Severity};


//------------ NodeValue -----------------------------------------------------

/// The semantic value of a decoded node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeValue {
    /// The node only has children.
    Constructed,

    Boolean(bool),
    Integer(Integer),

    /// An unsigned number taken from a fixed-width field.
    Unsigned(u64),

    Null,
    Bytes(Bytes),

    /// A bit string with the number of unused bits in the last octet.
    BitString { unused: u8, bits: Bytes },

    Text(String),
    Oid(Oid),
    Time(Time),
}

impl NodeValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            NodeValue::Bytes(ref bytes) => Some(bytes.as_ref()),
            NodeValue::BitString { ref bits, .. } => Some(bits.as_ref()),
            _ => None
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            NodeValue::Integer(ref int) => int.to_i64(),
            NodeValue::Unsigned(value) => i64::try_from(value).ok(),
            _ => None
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match *self {
            NodeValue::Text(ref text) => Some(text.as_str()),
            _ => None
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match *self {
            NodeValue::Oid(ref oid) => Some(oid),
            _ => None
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NodeValue::Constructed => Ok(()),
            NodeValue::Boolean(value) => write!(f, "{value}"),
            NodeValue::Integer(Integer::Small(value)) => write!(f, "{value}"),
            NodeValue::Integer(Integer::Big(ref octets)) => {
                f.write_str("0x")?;
                octets.iter().try_for_each(|x| write!(f, "{x:02x}"))
            }
            NodeValue::Unsigned(value) => write!(f, "{value}"),
            NodeValue::Null => f.write_str("NULL"),
            NodeValue::Bytes(ref bytes) => {
                bytes.iter().try_for_each(|x| write!(f, "{x:02x}"))
            }
            NodeValue::BitString { unused, ref bits } => {
                bits.iter().try_for_each(|x| write!(f, "{x:02x}"))?;
                if unused > 0 {
                    write!(f, " ({unused} unused bits)")?;
                }
                Ok(())
            }
            NodeValue::Text(ref text) => write!(f, "{text:?}"),
            NodeValue::Oid(ref oid) => write!(f, "{oid}"),
            NodeValue::Time(ref time) => write!(f, "{time}"),
        }
    }
}


//------------ DecodedNode ---------------------------------------------------

/// One decoded field or constructed value.
///
/// The byte range of a node is absolute within the message it was decoded
/// from. It always contains the ranges of all its children, and the ranges
/// of siblings never overlap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedNode {
    name: Cow<'static, str>,
    tag: Option<Tag>,
    range: Range<usize>,
    value: NodeValue,
    children: Vec<DecodedNode>,
    annotations: Vec<Annotation>,
}

impl DecodedNode {
    pub fn new(name: impl Into<Cow<'static, str>>, range: Range<usize>) -> Self {
        DecodedNode {
            name: name.into(),
            tag: None,
            range,
            value: NodeValue::Constructed,
            children: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_value(mut self, value: NodeValue) -> Self {
        self.value = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<Cow<'static, str>>) {
        self.name = name.into()
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn set_range(&mut self, range: Range<usize>) {
        self.range = range
    }

    pub fn set_tag(&mut self, tag: Option<Tag>) {
        self.tag = tag
    }

    pub fn value(&self) -> &NodeValue {
        &self.value
    }

    pub fn set_value(&mut self, value: NodeValue) {
        self.value = value
    }

    pub fn children(&self) -> &[DecodedNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [DecodedNode] {
        &mut self.children
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn push_child(&mut self, child: DecodedNode) {
        self.children.push(child)
    }

    /// Attaches an error with the default severity of its kind.
    pub fn annotate(&mut self, err: DecodeError) {
        self.annotations.push(err.into())
    }

    pub fn annotate_with(&mut self, severity: Severity, err: DecodeError) {
        self.annotations.push(Annotation::new(severity, err))
    }

    /// Returns the first child with the given name.
    pub fn child(&self, name: &str) -> Option<&DecodedNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Follows a path of child names.
    pub fn path(&self, path: &[&str]) -> Option<&DecodedNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Returns the first node in the subtree with the given name.
    ///
    /// The search is depth-first and includes the node itself.
    pub fn find(&self, name: &str) -> Option<&DecodedNode> {
        self.iter().find(|node| node.name == name)
    }

    /// Returns an iterator over all nodes of the subtree, depth-first.
    pub fn iter(&self) -> Iter {
        Iter { stack: vec![self] }
    }

    /// Returns all annotations of the subtree.
    pub fn all_annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.iter().flat_map(|node| node.annotations.iter())
    }

    /// Returns whether the subtree contains an annotation of this kind.
    pub fn has_annotation(&self, kind: ErrorKind) -> bool {
        self.all_annotations().any(|item| item.kind() == kind)
    }

    /// Returns the number of annotations with error severity.
    pub fn error_count(&self) -> usize {
        self.all_annotations().filter(|item| {
            item.severity() == Severity::Error
        }).count()
    }

    /// Checks that the ranges of the subtree nest properly.
    pub fn ranges_nest(&self) -> bool {
        self.iter().all(|node| {
            let mut last_end = node.range.start;
            node.children.iter().all(|child| {
                let res = child.range.start >= last_end
                    && child.range.end <= node.range.end
                    && child.range.start <= child.range.end;
                last_end = child.range.end;
                res
            })
        })
    }

    /// Writes the subtree as indented text.
    pub fn write_tree(
        &self, indent: usize, target: &mut impl fmt::Write
    ) -> fmt::Result {
        write!(
            target, "{:indent$}{} [{}..{}]",
            "", self.name, self.range.start, self.range.end,
            indent = indent * 2
        )?;
        if self.value != NodeValue::Constructed {
            write!(target, ": {}", self.value)?;
        }
        writeln!(target)?;
        for item in &self.annotations {
            writeln!(target, "{:indent$}! {}", "", item, indent = indent * 2 + 2)?;
        }
        self.children.iter().try_for_each(|child| {
            child.write_tree(indent + 1, target)
        })
    }
}

impl fmt::Display for DecodedNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_tree(0, f)
    }
}


//------------ Iter ----------------------------------------------------------

/// A depth-first iterator over a subtree.
pub struct Iter<'a> {
    stack: Vec<&'a DecodedNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a DecodedNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}


//------------ SummaryField --------------------------------------------------

/// A flat key-value pair describing a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SummaryField {
    pub key: &'static str,
    pub value: SummaryValue,
}

/// The typed value of a summary field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SummaryValue {
    Integer(i64),
    Unsigned(u64),
    Bool(bool),
    Text(String),
}

impl From<i64> for SummaryValue {
    fn from(value: i64) -> Self {
        SummaryValue::Integer(value)
    }
}

impl From<u64> for SummaryValue {
    fn from(value: u64) -> Self {
        SummaryValue::Unsigned(value)
    }
}

impl From<u32> for SummaryValue {
    fn from(value: u32) -> Self {
        SummaryValue::Unsigned(value.into())
    }
}

impl From<bool> for SummaryValue {
    fn from(value: bool) -> Self {
        SummaryValue::Bool(value)
    }
}

impl From<String> for SummaryValue {
    fn from(value: String) -> Self {
        SummaryValue::Text(value)
    }
}

impl From<&str> for SummaryValue {
    fn from(value: &str) -> Self {
        SummaryValue::Text(value.into())
    }
}

impl fmt::Display for SummaryValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SummaryValue::Integer(value) => write!(f, "{value}"),
            SummaryValue::Unsigned(value) => write!(f, "{value}"),
            SummaryValue::Bool(value) => write!(f, "{value}"),
            SummaryValue::Text(ref value) => f.write_str(value),
        }
    }
}


//============ Tests =========================================================

//! Selector and xpath evaluation for the in-memory document.
//!
//! Supports the subset the locator emits: type selectors, `#id`, `.class`,
//! `[attr]`, `[attr="v"]`, `[attr*="v"]`, `:nth-of-type(n)`,
//! `:last-of-type` and a leading `:scope`, joined by child or descendant
//! combinators; and absolute
//! location paths made of `tag` / `tag[n]` steps with `//` descendant steps.

use super::{DocState, NodeHandle, NodeKind};
use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrTest {
    Present(String),
    Equals(String, String),
    Contains(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    nth_of_type: Option<usize>,
    last_of_type: bool,
    is_scope: bool,
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
            skipped = true;
        }
        skipped
    }

    /// Identifier with backslash escapes (`aria\:label`).
    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c == '\\' {
                self.chars.next();
                if let Some(escaped) = self.chars.next() {
                    out.push(escaped);
                }
            } else if c.is_alphanumeric() || c == '-' || c == '_' {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        out
    }

    fn quoted(&mut self) -> Option<String> {
        let quote = self.chars.next()?;
        let mut out = String::new();
        loop {
            match self.chars.next()? {
                '\\' => out.push(self.chars.next()?),
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    fn attribute(&mut self) -> Option<AttrTest> {
        self.skip_whitespace();
        let name = self.ident();
        if name.is_empty() {
            return None;
        }
        self.skip_whitespace();
        match self.chars.next()? {
            ']' => Some(AttrTest::Present(name)),
            op @ ('=' | '*') => {
                if op == '*' && self.chars.next()? != '=' {
                    return None;
                }
                self.skip_whitespace();
                let value = match self.chars.peek()? {
                    '"' | '\'' => self.quoted()?,
                    _ => self.ident(),
                };
                self.skip_whitespace();
                if self.chars.next()? != ']' {
                    return None;
                }
                Some(if op == '*' {
                    AttrTest::Contains(name, value)
                } else {
                    AttrTest::Equals(name, value)
                })
            }
            _ => None,
        }
    }

    fn pseudo(&mut self, compound: &mut Compound) -> Option<()> {
        let name = self.ident();
        match name.as_str() {
            "last-of-type" => compound.last_of_type = true,
            "scope" => compound.is_scope = true,
            "nth-of-type" => {
                if self.chars.next()? != '(' {
                    return None;
                }
                let mut digits = String::new();
                while let Some(c) = self.chars.next() {
                    if c == ')' {
                        break;
                    }
                    digits.push(c);
                }
                compound.nth_of_type = Some(digits.trim().parse().ok()?);
            }
            _ => return None,
        }
        Some(())
    }

    fn compound(&mut self) -> Option<Compound> {
        let mut compound = Compound::default();
        let universal = self.chars.next_if_eq(&'*').is_some();
        let tag = self.ident();
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
        loop {
            match self.chars.peek() {
                Some('#') => {
                    self.chars.next();
                    compound.id = Some(self.ident());
                }
                Some('.') => {
                    self.chars.next();
                    compound.classes.push(self.ident());
                }
                Some('[') => {
                    self.chars.next();
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.chars.next();
                    self.pseudo(&mut compound)?;
                }
                _ => break,
            }
        }
        if compound == Compound::default() && !universal {
            return None;
        }
        Some(compound)
    }

    /// Compounds with the combinator linking each to the previous one.
    fn selector(mut self) -> Option<Vec<(Combinator, Compound)>> {
        let mut chain = Vec::new();
        let mut combinator = Combinator::Descendant;
        self.skip_whitespace();
        loop {
            chain.push((combinator, self.compound()?));
            let spaced = self.skip_whitespace();
            match self.chars.peek() {
                None => return Some(chain),
                Some('>') => {
                    self.chars.next();
                    self.skip_whitespace();
                    combinator = Combinator::Child;
                }
                Some(_) if spaced => combinator = Combinator::Descendant,
                Some(_) => return None,
            }
        }
    }
}

impl DocState {
    /// `querySelector` within a document or shadow root.
    pub(super) fn select(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Option<NodeHandle>, HostError> {
        let chain = Parser::new(selector)
            .selector()
            .ok_or_else(|| HostError::Script(format!("invalid selector: {}", selector)))?;

        let mut elements = Vec::new();
        self.scoped_descendants(scope, &mut elements);
        Ok(elements
            .into_iter()
            .find(|el| self.matches_chain(scope, *el, &chain, chain.len() - 1)))
    }

    /// Descendant elements in tree order, not crossing shadow or frame boundaries.
    fn scoped_descendants(&self, root: NodeHandle, out: &mut Vec<NodeHandle>) {
        let Ok(node) = self.get(root) else {
            return;
        };
        for child in &node.children {
            if self.get(*child).is_ok_and(|c| c.is_element()) {
                out.push(*child);
                self.scoped_descendants(*child, out);
            }
        }
    }

    fn scoped_parent(&self, element: NodeHandle) -> Option<NodeHandle> {
        let parent = self.get(element).ok()?.parent?;
        self.get(parent)
            .ok()
            .filter(|p| p.is_element())
            .map(|_| parent)
    }

    fn matches_chain(
        &self,
        scope: NodeHandle,
        element: NodeHandle,
        chain: &[(Combinator, Compound)],
        position: usize,
    ) -> bool {
        let (combinator, compound) = &chain[position];
        if !self.matches_compound(element, compound) {
            return false;
        }
        if position == 0 {
            return true;
        }
        if chain[position - 1].1.is_scope {
            return match combinator {
                Combinator::Child => self.get(element).is_ok_and(|node| node.parent == Some(scope)),
                Combinator::Descendant => true,
            };
        }
        match combinator {
            Combinator::Child => self
                .scoped_parent(element)
                .is_some_and(|parent| self.matches_chain(scope, parent, chain, position - 1)),
            Combinator::Descendant => {
                let mut current = self.scoped_parent(element);
                while let Some(ancestor) = current {
                    if self.matches_chain(scope, ancestor, chain, position - 1) {
                        return true;
                    }
                    current = self.scoped_parent(ancestor);
                }
                false
            }
        }
    }

    fn matches_compound(&self, element: NodeHandle, compound: &Compound) -> bool {
        let Ok(node) = self.get(element) else {
            return false;
        };
        if compound.is_scope {
            return false;
        }
        if compound.tag.as_ref().is_some_and(|tag| *tag != node.tag) {
            return false;
        }
        if compound
            .id
            .as_ref()
            .is_some_and(|id| node.attributes.get("id") != Some(id))
        {
            return false;
        }
        let classes = node.attributes.get("class").map(String::as_str).unwrap_or("");
        if !compound
            .classes
            .iter()
            .all(|class| classes.split_whitespace().any(|c| c == class))
        {
            return false;
        }
        let attrs_match = compound.attrs.iter().all(|test| match test {
            AttrTest::Present(name) => node.attributes.contains_key(name),
            AttrTest::Equals(name, value) => node.attributes.get(name) == Some(value),
            AttrTest::Contains(name, value) => node
                .attributes
                .get(name)
                .is_some_and(|actual| actual.contains(value.as_str())),
        });
        if !attrs_match {
            return false;
        }
        if compound.nth_of_type.is_some() || compound.last_of_type {
            let (position, count) = self.type_position(element);
            if compound.nth_of_type.is_some_and(|n| n != position) {
                return false;
            }
            if compound.last_of_type && position != count {
                return false;
            }
        }
        true
    }

    /// 1-based position among same-tag element siblings, and their count.
    fn type_position(&self, element: NodeHandle) -> (usize, usize) {
        let Ok(node) = self.get(element) else {
            return (0, 0);
        };
        let Some(parent) = node.parent.and_then(|p| self.get(p).ok()) else {
            return (1, 1);
        };
        let same_tag: Vec<NodeHandle> = parent
            .children
            .iter()
            .copied()
            .filter(|h| self.get(*h).is_ok_and(|c| c.is_element() && c.tag == node.tag))
            .collect();
        let position = same_tag
            .iter()
            .position(|h| *h == element)
            .map(|p| p + 1)
            .unwrap_or(0);
        (position, same_tag.len())
    }

    /// First node matched by a location path evaluated against `scope`.
    pub(super) fn evaluate_xpath(
        &self,
        scope: NodeHandle,
        xpath: &str,
    ) -> Result<Option<NodeHandle>, HostError> {
        let invalid = || HostError::Script(format!("invalid xpath: {}", xpath));

        let mut context = vec![scope];
        let mut descendant = false;
        let trimmed = xpath.strip_prefix('/').unwrap_or(xpath);
        if trimmed.is_empty() {
            return Err(invalid());
        }
        for step in trimmed.split('/') {
            if step.is_empty() {
                descendant = true;
                continue;
            }
            let (tag, position) = match step.split_once('[') {
                Some((tag, rest)) => {
                    let n: usize = rest
                        .strip_suffix(']')
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(invalid)?;
                    (tag, Some(n))
                }
                None => (step, None),
            };
            let tag = tag.to_ascii_lowercase();

            let mut next = Vec::new();
            for node in &context {
                let mut candidates = Vec::new();
                if descendant {
                    self.scoped_descendants(*node, &mut candidates);
                } else if let Ok(n) = self.get(*node) {
                    candidates.extend(
                        n.children
                            .iter()
                            .copied()
                            .filter(|c| self.get(*c).is_ok_and(|c| c.kind == NodeKind::Element)),
                    );
                }
                for candidate in candidates {
                    let tag_matches =
                        tag == "*" || self.get(candidate).is_ok_and(|c| c.tag == tag);
                    let position_matches =
                        position.is_none_or(|n| self.type_position(candidate).0 == n);
                    if tag_matches && position_matches && !next.contains(&candidate) {
                        next.push(candidate);
                    }
                }
            }
            context = next;
            descendant = false;
            if context.is_empty() {
                return Ok(None);
            }
        }
        Ok(context.first().copied())
    }
}

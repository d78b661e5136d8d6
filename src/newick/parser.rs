use std::collections::HashSet;

use log::trace;

use crate::error::{Result, TreeError};
use crate::newick::LABEL_DELIMITERS;
use crate::tree::{IntermediateTree, NodeIndex};

/// Result of parsing one Newick tree: the scratch arena, its top-level nodes
/// and the number of leaves.
#[derive(Debug, Clone)]
pub struct ParsedNewick {
    pub tree: IntermediateTree,
    pub unroot: Vec<NodeIndex>,
    pub leaf_count: usize,
}

/// Parse a single `;`-terminated Newick tree.
pub fn parse_newick(text: &str) -> Result<ParsedNewick> {
    NewickParser::new(text).parse()
}

/// What the most recently finished subtree turned into.
enum Finished {
    Node(NodeIndex),
    /// Outermost group with three members: they become the unroot set.
    Ternary(Vec<NodeIndex>),
}

struct NewickParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    tree: IntermediateTree,
    leaf_labels: HashSet<String>,
}

impl<'a> NewickParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            tree: IntermediateTree::with_capacity(text.len() / 2),
            leaf_labels: HashSet::new(),
        }
    }

    fn error<S: Into<String>>(&self, message: S) -> TreeError {
        TreeError::NewickParse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Skip whitespace and `[...]` comments.
    fn skip_filler(&mut self) -> Result<()> {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'[' {
                let start = self.pos;
                match self.bytes[start..].iter().position(|&c| c == b']') {
                    Some(len) => self.pos = start + len + 1,
                    None => return Err(self.error("unterminated comment")),
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Iterative so that deep (caterpillar) trees do not grow the call stack.
    fn parse(mut self) -> Result<ParsedNewick> {
        // children collected so far for every open '('
        let mut groups: Vec<Vec<NodeIndex>> = Vec::new();
        let mut last: Option<Finished> = None;

        loop {
            self.skip_filler()?;
            let Some(b) = self.peek() else {
                return Err(self.error("missing terminating ';'"));
            };
            match b {
                b'(' => {
                    if last.is_some() {
                        return Err(self.error("unexpected '(' after a completed subtree"));
                    }
                    groups.push(Vec::new());
                    self.pos += 1;
                }
                b',' => {
                    let child = self.take_member(last.take())?;
                    match groups.last_mut() {
                        Some(group) => group.push(child),
                        None => return Err(self.error("',' outside of parentheses")),
                    }
                    self.pos += 1;
                }
                b')' => {
                    let child = self.take_member(last.take())?;
                    let mut group = match groups.pop() {
                        Some(group) => group,
                        None => return Err(self.error("unbalanced ')'")),
                    };
                    group.push(child);
                    self.pos += 1;
                    let outermost = groups.is_empty();
                    let finished = match (group.len(), outermost) {
                        (2, _) => Finished::Node(self.tree.join(group[0], group[1])),
                        (3, true) => Finished::Ternary(group),
                        (n, true) => {
                            return Err(TreeError::MalformedTree(format!(
                                "outermost group has {} members, expected 2 or 3",
                                n
                            )))
                        }
                        (n, false) => {
                            return Err(TreeError::MalformedTree(format!(
                                "group closing at byte {} has {} members, expected 2",
                                self.pos - 1,
                                n
                            )))
                        }
                    };
                    match finished {
                        Finished::Node(idx) => {
                            let (label, weight) = self.parse_suffix()?;
                            let node = self.tree.node_mut(idx);
                            node.label = label;
                            node.weight = weight;
                        }
                        // no node carries them, so nothing may follow but ';'
                        Finished::Ternary(_) => {
                            self.skip_filler()?;
                            if !matches!(self.peek(), Some(b';') | None) {
                                return Err(self.error(
                                    "label or branch length after an unrooted top-level group",
                                ));
                            }
                        }
                    }
                    last = Some(finished);
                }
                b';' => {
                    if !groups.is_empty() {
                        return Err(self.error("';' before all parentheses are closed"));
                    }
                    let unroot = match last.take() {
                        Some(Finished::Node(idx)) => vec![idx],
                        Some(Finished::Ternary(members)) => members,
                        None => return Err(self.error("empty tree")),
                    };
                    self.pos += 1;
                    self.skip_filler()?;
                    if self.pos != self.bytes.len() {
                        return Err(self.error("unexpected input after ';'"));
                    }
                    let leaf_count = self.leaf_labels.len();
                    trace!("parsed {} arena nodes, {} leaves", self.tree.len(), leaf_count);
                    return Ok(ParsedNewick {
                        tree: self.tree,
                        unroot,
                        leaf_count,
                    });
                }
                _ => {
                    if last.is_some() {
                        return Err(self.error("unexpected label after a completed subtree"));
                    }
                    let (label, weight) = self.parse_suffix()?;
                    if label.is_empty() {
                        return Err(self.error("empty leaf label"));
                    }
                    if !self.leaf_labels.insert(label.clone()) {
                        return Err(TreeError::MalformedTree(format!(
                            "leaf label '{}' occurs more than once",
                            label
                        )));
                    }
                    last = Some(Finished::Node(self.tree.add_leaf(label, weight)));
                }
            }
        }
    }

    /// A finished subtree about to become a group member.
    fn take_member(&self, last: Option<Finished>) -> Result<NodeIndex> {
        match last {
            Some(Finished::Node(idx)) => Ok(idx),
            Some(Finished::Ternary(_)) => Err(TreeError::MalformedTree(
                "a three-member group may only appear at the top".to_string(),
            )),
            None => Err(self.error("expected a subtree")),
        }
    }

    /// Optional label followed by an optional `:weight`.
    fn parse_suffix(&mut self) -> Result<(String, f64)> {
        self.skip_filler()?;
        let label = match self.peek() {
            Some(b'\'') => self.parse_quoted_label()?,
            _ => self.parse_bare_label()?,
        };
        self.skip_filler()?;
        let mut weight = 0.0;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_filler()?;
            weight = self.parse_number()?;
        }
        Ok((label, weight))
    }

    fn parse_bare_label(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || LABEL_DELIMITERS.contains(&b) || b == b'\'' {
                break;
            }
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .map(str::to_string)
            .map_err(|_| self.error("label is not valid UTF-8"))
    }

    fn parse_quoted_label(&mut self) -> Result<String> {
        let open = self.pos;
        self.pos += 1;
        let mut raw = Vec::new();
        loop {
            match self.peek() {
                Some(b'\'') if self.bytes.get(self.pos + 1) == Some(&b'\'') => {
                    raw.push(b'\'');
                    self.pos += 2;
                }
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(b) => {
                    raw.push(b);
                    self.pos += 1;
                }
                None => {
                    self.pos = open;
                    return Err(self.error("unterminated quoted label"));
                }
            }
        }
        String::from_utf8(raw).map_err(|_| self.error("label is not valid UTF-8"))
    }

    /// Any token `f64::from_str` accepts, so `NaN`, `inf` and `-inf` written
    /// by the writer read back.
    fn parse_number(&mut self) -> Result<f64> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || LABEL_DELIMITERS.contains(&b) || b == b'\'' {
                break;
            }
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        token.parse::<f64>().map_err(|_| TreeError::NewickParse {
            position: start,
            message: format!("invalid branch length '{}'", token),
        })
    }
}

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;

use crate::newick::LABEL_DELIMITERS;
use crate::tree::{NodeIndex, PackedTree};

enum Frame {
    Enter(NodeIndex),
    Separator,
    /// Closing parenthesis plus the node's own label and weight.
    Close(NodeIndex),
}

fn escape_label(s: &str) -> String {
    s.replace('\'', "''")
}

fn push_label(out: &mut String, label: &str) {
    let needs_quotes = label
        .bytes()
        .any(|b| b.is_ascii_whitespace() || b == b'\'' || LABEL_DELIMITERS.contains(&b));
    if needs_quotes {
        let _ = write!(out, "'{}'", escape_label(label));
    } else {
        out.push_str(label);
    }
}

fn push_node_suffix(out: &mut String, tree: &PackedTree, idx: NodeIndex, precision: usize) {
    let node = tree.node(idx);
    push_label(out, &node.label);
    if node.weight != 0.0 {
        let _ = write!(out, ":{:.prec$}", node.weight, prec = precision);
    }
}

/// Render `tree` as a Newick string, weights printed with `precision` decimals.
///
/// Zero weights are omitted. Unroot sets of two or three members are wrapped in
/// one outer group. An empty tree renders as an empty string.
pub fn to_newick(tree: &PackedTree, precision: usize) -> String {
    if tree.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(tree.len() * (precision + 6));
    let unroot = tree.unroot();
    let wrap = unroot.len() > 1;

    let mut stack: Vec<Frame> = Vec::with_capacity(tree.len());
    for (i, &u) in unroot.iter().enumerate().rev() {
        stack.push(Frame::Enter(u));
        if i > 0 {
            stack.push(Frame::Separator);
        }
    }

    if wrap {
        out.push('(');
    }
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(idx) => match tree.node(idx).children() {
                Some((l, r)) => {
                    out.push('(');
                    stack.push(Frame::Close(idx));
                    stack.push(Frame::Enter(r));
                    stack.push(Frame::Separator);
                    stack.push(Frame::Enter(l));
                }
                None => push_node_suffix(&mut out, tree, idx, precision),
            },
            Frame::Separator => out.push(','),
            Frame::Close(idx) => {
                out.push(')');
                push_node_suffix(&mut out, tree, idx, precision);
            }
        }
    }
    if wrap {
        out.push(')');
    }
    out.push(';');
    out
}

/// Write one tree per line to `path`.
pub fn write_newick_to_path<P: AsRef<Path>>(
    path: P,
    trees: &[&PackedTree],
    precision: usize,
) -> anyhow::Result<()> {
    let file = File::create(&path)
        .with_context(|| format!("failed to create Newick file at {}", path.as_ref().display()))?;
    let mut buf = BufWriter::new(file);
    for tree in trees {
        writeln!(buf, "{}", to_newick(tree, precision))
            .with_context(|| format!("failed while writing Newick to {}", path.as_ref().display()))?;
    }
    buf.flush()?;
    Ok(())
}

//! Newick text in and out.
//!
//! Grammar accepted by [`parse_newick`]:
//! * `tree ::= subtree ';'`
//! * `subtree ::= '(' subtree (',' subtree)* ')' [label] [':' number] | label [':' number]`
//!
//! Inner groups must have exactly two members; the outermost group may have two
//! (rooted tree) or three (unrooted tree). Whitespace and `[...]` comments may
//! appear between tokens. Labels are either bare or single-quoted with `''`
//! standing for a literal quote.

pub mod parser;
pub mod writer;

pub use parser::{parse_newick, ParsedNewick};
pub use writer::{to_newick, write_newick_to_path};

/// Bytes that end an unquoted label.
pub(crate) const LABEL_DELIMITERS: &[u8] = b"(),:;[]";

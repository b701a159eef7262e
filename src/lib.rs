//! A round-tripping YAML engine: parse a document (resolving `!include` /
//! `!includeraw`, merging trailing overrides, and substituting `$name`
//! variables), mutate the resulting tree, and pack it back out reproducing
//! the original layout — comments, blank lines, flow style, and include
//! structure included — wherever the mutation didn't touch it.
//!
//! See [`parser`] for the parse side and [`packer`] for the pack side;
//! [`ast`] and [`presentation`] describe the two halves of a parsed
//! document (the data, and everything about its surface form that isn't
//! data).

pub mod ast;
pub mod error;
pub mod include;
pub mod overrides;
pub mod packer;
pub mod parser;
pub mod presentation;
pub mod scalar;
pub mod scanner;
pub mod span;
pub mod variables;

pub use ast::{MapEntry, MapKey, Node, NodeKind, Tag};
pub use error::{print_error, ErrorKind, PackError, YamlError};
pub use packer::{pack, pack_tree, pack_tree_to_dir, PackFlags, SubfileWriter};
pub use parser::{ParseContext, ParseFlags, ParsedDocument};
pub use presentation::DocumentPresentation;
pub use scalar::Scalar;

//! The packer: turns a parsed (and possibly mutated) AST plus its
//! presentation envelope back into YAML text (C10) or a directory tree of
//! files (C11).

pub mod state;
pub mod subfile_writer;

pub use state::{pack, PackFlags};
pub use subfile_writer::{pack_tree, pack_tree_to_dir, SubfileWriter};

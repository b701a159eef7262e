//! Command-line front end for the YAML engine.
//!
//! Three subcommands: `parse` (dump a document's AST and presentation as
//! JSON), `pack` (print or write a parsed document back out, after
//! loopback through the parser), and `check` (parse only, reporting
//! diagnostics). This binary handles argument parsing, file I/O, and
//! terminal output; all actual parsing/packing logic lives in the library.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser as ClapParser, Subcommand};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use yamlpack::span::Span;
use yamlpack::{pack, pack_tree_to_dir, print_error, ErrorKind, PackFlags, ParseContext, ParseFlags, YamlError};

#[derive(ClapParser, Debug)]
#[command(name = "yamlpack", version, about = "Parse, pack, and check round-tripping YAML documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a document and print its AST and presentation envelope as JSON.
    Parse {
        path: PathBuf,
        /// Allow the document to contain $name variables that are never bound.
        #[arg(long)]
        allow_unbound_variables: bool,
    },
    /// Parse a document and immediately pack it back out, unchanged.
    Pack {
        path: PathBuf,
        #[arg(long)]
        allow_unbound_variables: bool,
    },
    /// Parse a document and report success or a diagnostic, nothing else.
    Check {
        path: PathBuf,
        #[arg(long)]
        allow_unbound_variables: bool,
    },
    /// Parse a document and repack it as a multi-file tree, reproducing
    /// each `!include` as its own file under the output directory.
    PackTree {
        path: PathBuf,
        /// Directory to write the top-level file and every subfile into.
        #[arg(long)]
        outdir: PathBuf,
        #[arg(long)]
        allow_unbound_variables: bool,
        /// Walk the include/override tree without writing any subfile to
        /// disk; only the top-level document is written.
        #[arg(long)]
        no_subfiles: bool,
        /// Unix permission bits (octal, e.g. 644) applied to every file
        /// written. Ignored on non-Unix targets.
        #[arg(long)]
        file_mode: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Parse { path, allow_unbound_variables } => run_parse(path, *allow_unbound_variables),
        Command::Pack { path, allow_unbound_variables } => run_pack(path, *allow_unbound_variables),
        Command::Check { path, allow_unbound_variables } => run_check(path, *allow_unbound_variables),
        Command::PackTree {
            path,
            outdir,
            allow_unbound_variables,
            no_subfiles,
            file_mode,
        } => run_pack_tree(path, outdir, *allow_unbound_variables, *no_subfiles, file_mode.as_deref()),
    };
    if let Err(code) = result {
        std::process::exit(code);
    }
}

fn split_path(path: &Path) -> (String, PathBuf) {
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    (filename, dir)
}

fn load(path: &Path, allow_unbound_variables: bool) -> Result<(yamlpack::ParsedDocument, String), (YamlError, Option<String>)> {
    let (filename, dir) = split_path(path);
    let mut flags = ParseFlags::new();
    flags.allow_unbound_variables = allow_unbound_variables;
    let mut ctx = ParseContext::new(flags);
    let source = std::fs::read_to_string(path).ok();
    if let Err(e) = ctx.attach_file(&filename, &dir) {
        return Err((
            YamlError::new(
                ErrorKind::MissingData(format!("cannot read {}: {e}", path.display())),
                Span::synthetic(),
            ),
            source,
        ));
    }
    match ctx.parse() {
        Ok(doc) => Ok((doc, source.unwrap_or_default())),
        Err(e) => Err((e, source)),
    }
}

fn run_parse(path: &Path, allow_unbound_variables: bool) -> Result<(), i32> {
    match load(path, allow_unbound_variables) {
        Ok((doc, _)) => {
            let out = serde_json::json!({
                "root": doc.root,
                "presentation": doc.presentation,
                "unbound_variables": doc.unbound_variables,
            });
            println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
            Ok(())
        }
        Err((e, source)) => {
            report(&e, path, source);
            Err(1)
        }
    }
}

fn run_pack(path: &Path, allow_unbound_variables: bool) -> Result<(), i32> {
    match load(path, allow_unbound_variables) {
        Ok((doc, _)) => {
            print!("{}", pack(&doc.root, &doc.presentation, PackFlags::default()));
            Ok(())
        }
        Err((e, source)) => {
            report(&e, path, source);
            Err(1)
        }
    }
}

fn run_pack_tree(
    path: &Path,
    outdir: &Path,
    allow_unbound_variables: bool,
    no_subfiles: bool,
    file_mode: Option<&str>,
) -> Result<(), i32> {
    let file_mode = match file_mode.map(|m| u32::from_str_radix(m, 8)) {
        Some(Ok(mode)) => Some(mode),
        Some(Err(_)) => {
            eprintln!("error: --file-mode expects an octal number, e.g. 644");
            return Err(2);
        }
        None => None,
    };
    let top_level_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.yml".to_string());
    match load(path, allow_unbound_variables) {
        Ok((doc, _)) => {
            let flags = PackFlags {
                no_subfiles,
                ..PackFlags::default()
            };
            match pack_tree_to_dir(&doc.root, &doc.presentation, &top_level_name, outdir, flags, file_mode) {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("error: {e}");
                    Err(1)
                }
            }
        }
        Err((e, source)) => {
            report(&e, path, source);
            Err(1)
        }
    }
}

fn run_check(path: &Path, allow_unbound_variables: bool) -> Result<(), i32> {
    match load(path, allow_unbound_variables) {
        Ok(_) => {
            println!("{}: ok", path.display());
            Ok(())
        }
        Err((e, source)) => {
            report(&e, path, source);
            Err(1)
        }
    }
}

fn report(err: &YamlError, path: &Path, source: Option<String>) {
    let rendered = print_error(err, |file| {
        if file == err.file.as_deref().unwrap_or("") {
            source.clone()
        } else {
            std::fs::read_to_string(file).ok()
        }
    });
    let use_color = atty::is(atty::Stream::Stderr) && terminal_size::terminal_size().is_some();
    let mut stderr = StandardStream::stderr(if use_color { ColorChoice::Always } else { ColorChoice::Never });
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": failed to parse {}", path.display());
    let _ = write!(stderr, "{rendered}");
    let _ = io::stderr().flush();
}

//! End-to-end parse/pack scenarios, covering the include resolver, the
//! override merge algebra, the variable engine, and the subfile writer's
//! dedup behavior against real files on disk.

use std::fs;

use tempfile::tempdir;
use yamlpack::span::Span;
use yamlpack::{pack, pack_tree_to_dir, ErrorKind, Node, PackFlags, ParseContext, ParseFlags, Scalar};

fn parse_stream(text: &str) -> yamlpack::ParsedDocument {
    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_stream(text);
    ctx.parse().expect("parse should succeed")
}

fn parse_file(dir: &std::path::Path, name: &str) -> yamlpack::ParsedDocument {
    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_file(name, dir).expect("file should be readable");
    ctx.parse().expect("parse should succeed")
}

#[test]
fn s1_scalar_canonicalizes_null() {
    let doc = parse_stream("NulL");
    assert!(doc.root.as_scalar().unwrap().is_null());
    let out = pack(&doc.root, &doc.presentation, PackFlags::default());
    assert_eq!(out, "~\n");
}

#[test]
fn s2_duplicate_key_is_bad_key() {
    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_stream("a: 1\na: 2");
    let err = ctx.parse().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadKey(_)));
}

#[test]
fn s3_compact_sequence_reindents_on_repack() {
    let doc = parse_stream("a:\n- 1\n- 2");
    let out = pack(&doc.root, &doc.presentation, PackFlags::default());
    assert_eq!(out, "a:\n  - 1\n  - 2\n");
}

#[test]
fn s4_include_with_override_merges_and_round_trips() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("inner.yml"), "x: 1\ny: 2").unwrap();
    fs::write(dir.path().join("root.yml"), "!include inner.yml\ny: 3\nz: 4").unwrap();

    let doc = parse_file(dir.path(), "root.yml");
    assert_eq!(doc.root.get("x").unwrap().as_scalar().unwrap().to_string(), "1");
    assert_eq!(doc.root.get("y").unwrap().as_scalar().unwrap().to_string(), "3");
    assert_eq!(doc.root.get("z").unwrap().as_scalar().unwrap().to_string(), "4");

    let outdir = tempdir().unwrap();
    pack_tree_to_dir(&doc.root, &doc.presentation, "root.yml", outdir.path(), PackFlags::default(), None).unwrap();
    let root_text = fs::read_to_string(outdir.path().join("root.yml")).unwrap();
    let inner_text = fs::read_to_string(outdir.path().join("inner.yml")).unwrap();
    assert_eq!(root_text, "!include inner.yml\ny: 3\nz: 4\n");
    assert_eq!(inner_text, "x: 1\ny: 2\n");
}

#[test]
fn s5_shared_include_dedups_to_one_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.yml"), "v: 1").unwrap();
    fs::write(
        dir.path().join("root.yml"),
        "- !include a.yml\n- !include a.yml\n- !include a.yml",
    )
    .unwrap();

    let doc = parse_file(dir.path(), "root.yml");
    let outdir = tempdir().unwrap();
    pack_tree_to_dir(&doc.root, &doc.presentation, "root.yml", outdir.path(), PackFlags::default(), None).unwrap();

    let mut names: Vec<_> = fs::read_dir(outdir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.yml".to_string(), "root.yml".to_string()]);
}

#[test]
fn s6_diverging_shared_include_gets_suffixed() {
    // Same as S5 (two identical `!include a.yml` sites, no override), but
    // the second site's merged-in AST is mutated in place after parsing —
    // not via an override, which `unapply_override` would revert back to
    // the shared original. The writer has no trace of a programmatic
    // mutation, so the two sites now pack to different content and the
    // second gets a `~1` suffix.
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.yml"), "v: 1").unwrap();
    fs::write(dir.path().join("root.yml"), "- !include a.yml\n- !include a.yml").unwrap();

    let mut doc = parse_file(dir.path(), "root.yml");
    let second = &mut doc.root.as_sequence_mut().unwrap()[1];
    second.as_mapping_mut().unwrap()[0].value = Node::scalar(Scalar::UInt(2), Span::synthetic());

    let outdir = tempdir().unwrap();
    pack_tree_to_dir(&doc.root, &doc.presentation, "root.yml", outdir.path(), PackFlags::default(), None).unwrap();

    let mut names: Vec<_> = fs::read_dir(outdir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.yml".to_string(), "a~1.yml".to_string(), "root.yml".to_string()]);

    // The suffixed file must actually be reachable: the second include
    // site has to name it, not repeat the first site's path.
    let root_text = fs::read_to_string(outdir.path().join("root.yml")).unwrap();
    assert_eq!(root_text, "- !include a.yml\n- !include a~1.yml\n");
    let a1_text = fs::read_to_string(outdir.path().join("a~1.yml")).unwrap();
    assert_eq!(a1_text, "v: 2\n");
}

#[test]
fn s7_variable_template_substitutes_and_round_trips() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("inner.yml"), "addr: \"$host:$port\"").unwrap();
    fs::write(dir.path().join("root.yml"), "!include inner.yml\n$host: h\n$port: 80").unwrap();

    let doc = parse_file(dir.path(), "root.yml");
    let addr = doc.root.get("addr").unwrap().as_scalar().unwrap();
    assert_eq!(addr.to_string(), "h:80");

    let outdir = tempdir().unwrap();
    pack_tree_to_dir(&doc.root, &doc.presentation, "root.yml", outdir.path(), PackFlags::default(), None).unwrap();
    let root_text = fs::read_to_string(outdir.path().join("root.yml")).unwrap();
    let inner_text = fs::read_to_string(outdir.path().join("inner.yml")).unwrap();
    assert_eq!(root_text, "!include inner.yml\n$host: h\n$port: 80\n");
    assert_eq!(inner_text, "addr: \"$host:$port\"\n");
}

#[test]
fn s8_include_cycle_is_rejected() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.yml"), "!include b.yml").unwrap();
    fs::write(dir.path().join("b.yml"), "!include a.yml").unwrap();

    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_file("a.yml", dir.path()).unwrap();
    let err = ctx.parse().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidInclude(ref m) if m.contains("loop")));
    assert!(!err.include_chain.is_empty());
}

#[test]
fn include_escaping_directory_is_rejected() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(dir.path().join("secret.yml"), "s: 1").unwrap();
    fs::write(sub.join("root.yml"), "!include ../secret.yml").unwrap();

    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_file("root.yml", &sub).unwrap();
    let err = ctx.parse().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidInclude(_)));
}

#[test]
fn unbound_variable_is_rejected_unless_allowed() {
    let mut ctx = ParseContext::new(ParseFlags::new());
    ctx.attach_stream("x: $missing");
    assert!(matches!(ctx.parse().unwrap_err().kind, ErrorKind::UnboundVariables(_)));

    let mut flags = ParseFlags::new();
    flags.allow_unbound_variables = true;
    let mut ctx = ParseContext::new(flags);
    ctx.attach_stream("x: $missing");
    let doc = ctx.parse().unwrap();
    assert_eq!(doc.unbound_variables, vec!["missing".to_string()]);
}

#[test]
fn comments_and_blank_lines_round_trip() {
    let src = "# leading\na: 1 # trailing\n\nb: 2\n";
    let doc = parse_stream(src);
    let out = pack(&doc.root, &doc.presentation, PackFlags::default());
    assert_eq!(out, src);
}

#[test]
fn flow_style_round_trips() {
    let src = "a: [1, 2, 3]\n";
    let doc = parse_stream(src);
    let out = pack(&doc.root, &doc.presentation, PackFlags::default());
    assert_eq!(out, src);
}

#[test]
fn no_subfiles_flag_writes_only_top_level() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("inner.yml"), "x: 1").unwrap();
    fs::write(dir.path().join("root.yml"), "!include inner.yml").unwrap();

    let doc = parse_file(dir.path(), "root.yml");
    let outdir = tempdir().unwrap();
    let flags = PackFlags {
        no_subfiles: true,
        ..PackFlags::default()
    };
    pack_tree_to_dir(&doc.root, &doc.presentation, "root.yml", outdir.path(), flags, None).unwrap();

    let names: Vec<_> = fs::read_dir(outdir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["root.yml".to_string()]);
}

use serde_json::json;

use recvc::compile::{compile_unit_to_func, CompileErrorKind, CompileOptions, CompilerError};
use recvc::diagnostics::Location;
use recvc::unit_json::parse_unit_json;


use unit_program::*;

fn compile_err(doc: &[u8]) -> CompilerError {
    compile_unit_to_func(doc, &CompileOptions::default()).expect_err("compile must fail")
}

fn with_loc(mut recv: serde_json::Value, line: u32, col: u32) -> serde_json::Value {
    recv["loc"] = json!({ "start": { "line": line, "col": col }, "file": "wallet.tact" });
    recv
}

#[test]
fn oversized_comment_cites_length_and_location() {
    let doc = unit(
        Vec::new(),
        vec![contract(
            "Wallet",
            &[],
            vec![with_loc(
                receiver(comment("internal", &"a".repeat(124)), json!([])),
                12,
                5,
            )],
        )],
    );
    let err = compile_err(&doc);
    assert_eq!(err.kind, CompileErrorKind::OversizedComment);
    assert!(err.message.contains("max length is 123"), "{}", err.message);
    assert!(err.message.contains("but given 124"), "{}", err.message);
    assert!(err.message.contains("wallet.tact:12:5"), "{}", err.message);
    let d = err.to_diagnostic();
    assert_eq!(d.code, "RECVC-OVERSIZED-COMMENT");
    assert!(matches!(d.loc, Some(Location::Text { .. })), "{:?}", d.loc);
}

#[test]
fn comment_at_byte_limit_compiles() {
    let doc = unit(
        Vec::new(),
        vec![contract(
            "Wallet",
            &[],
            vec![receiver(comment("external", &"a".repeat(123)), json!([]))],
        )],
    );
    let out = compile_unit_to_func(&doc, &CompileOptions::default()).expect("123 bytes fit");
    assert!(out.contains(
        "$Wallet$_external_text_75cb4feaface0b49fe7d0a53e65f959f2d595f555e1da1d5cb85a6fa99be243a"
    ));
}

#[test]
fn message_without_layout_is_a_missing_allocation() {
    let plain = json!({ "name": "Plain", "fields": [{ "name": "x", "ty": "uint8" }] });
    for (messages, name) in [(vec![], "Ghost"), (vec![plain], "Plain")] {
        let doc = unit(
            messages,
            vec![contract(
                "Wallet",
                &[],
                vec![
                    receiver(empty("internal"), json!([])),
                    receiver(bounce_binary(name, "msg", false), json!([])),
                ],
            )],
        );
        let err = parse_unit_json(&doc).expect_err("no allocation");
        assert_eq!(err.kind, CompileErrorKind::MissingAllocation, "{name}");
        assert!(
            err.message.starts_with(&format!("Invalid allocation: {name}")),
            "{}",
            err.message
        );
        assert_eq!(
            err.loc,
            Some(Location::Receiver {
                contract: "Wallet".to_string(),
                index: 1
            })
        );
    }
}

#[test]
fn selector_misuse_is_an_invalid_variant() {
    let unknown_kind = unit(
        Vec::new(),
        vec![contract(
            "Wallet",
            &[],
            vec![receiver(json!({ "kind": "external-bounce" }), json!([]))],
        )],
    );
    let twice = unit(
        vec![message("Add", "0x1", &[])],
        vec![contract(
            "Wallet",
            &[],
            vec![
                receiver(binary("internal", "Add", "a"), json!([])),
                receiver(binary("internal", "Add", "b"), json!([])),
            ],
        )],
    );
    let two_fallbacks = unit(
        Vec::new(),
        vec![contract(
            "Wallet",
            &[],
            vec![
                receiver(fallback("external", "a"), json!([])),
                receiver(fallback("external", "b"), json!([])),
            ],
        )],
    );
    for doc in [unknown_kind, twice, two_fallbacks] {
        let err = compile_err(&doc);
        assert_eq!(err.kind, CompileErrorKind::InvalidSelectorVariant, "{err}");
        assert_eq!(err.to_diagnostic().code, "RECVC-INVALID-SELECTOR");
    }
}

#[test]
fn same_singleton_in_each_direction_is_allowed() {
    let doc = unit(
        Vec::new(),
        vec![contract(
            "Wallet",
            &[],
            vec![
                receiver(fallback("internal", "a"), json!([])),
                receiver(fallback("external", "a"), json!([])),
                receiver(bounce_fallback("a"), json!([])),
            ],
        )],
    );
    compile_unit_to_func(&doc, &CompileOptions::default()).expect("compile");
}

fn typing_err(body: serde_json::Value) -> CompilerError {
    let doc = unit(
        vec![message(
            "Transfer",
            "0x5",
            &[("amount", "coins"), ("memo", "uint256")],
        )],
        vec![contract(
            "Wallet",
            &[("total", "uint64")],
            vec![
                receiver(empty("internal"), json!([])),
                receiver(bounce_binary("Transfer", "msg", true), body),
            ],
        )],
    );
    let err = compile_err(&doc);
    assert_eq!(err.kind, CompileErrorKind::Typing, "{err}");
    assert_eq!(
        err.loc,
        Some(Location::Receiver {
            contract: "Wallet".to_string(),
            index: 1
        })
    );
    err
}

#[test]
fn body_typing_errors_name_the_offender() {
    let err = typing_err(set_state("total", json!("msg.memo")));
    assert!(err.message.contains("\"memo\""), "{}", err.message);
    assert!(err.message.contains("bounced"), "{}", err.message);

    let err = typing_err(set_state("missing", json!(1)));
    assert!(err.message.contains("\"missing\""), "{}", err.message);

    let err = typing_err(json!([["set", "msg.amount", 0]]));
    assert!(err.message.contains("read-only"), "{}", err.message);

    let err = typing_err(set_state("total", json!("later")));
    assert!(err.message.contains("unknown name \"later\""), "{}", err.message);

    let err = typing_err(json!([["let", "msg", 1]]));
    assert!(err.message.contains("shadows"), "{}", err.message);
}

#[test]
fn locals_do_not_escape_their_block() {
    let err = typing_err(json!([
        ["if", true, [["let", "x", 1]]],
        ["set", "self.total", "x"]
    ]));
    assert!(err.message.contains("unknown name \"x\""), "{}", err.message);
}

#[test]
fn failing_contract_leaves_no_output() {
    let doc = unit(
        Vec::new(),
        vec![
            contract("Good", &[], vec![receiver(empty("internal"), json!([]))]),
            contract(
                "Bad",
                &[],
                vec![receiver(empty("internal"), set_state("nope", json!(1)))],
            ),
        ],
    );
    let err = compile_err(&doc);
    assert_eq!(err.kind, CompileErrorKind::Typing);
}

#[test]
fn malformed_unit_is_a_parse_error() {
    let err = compile_err(b"{ not json");
    assert_eq!(err.kind, CompileErrorKind::Parse);

    let mut doc: serde_json::Value =
        serde_json::from_slice(&unit(Vec::new(), Vec::new())).expect("json");
    doc["schema_version"] = json!("recvc.unit@9.9.9");
    let err = compile_err(&serde_json::to_vec(&doc).expect("encode"));
    assert_eq!(err.kind, CompileErrorKind::Parse);
    assert!(err.message.ends_with("at /schema_version"), "{}", err.message);
}

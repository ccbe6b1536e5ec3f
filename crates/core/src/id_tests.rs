// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_ids_carry_prefix() {
    let id = AgentId::new();
    assert!(id.as_str().starts_with("agt-"));
    assert_eq!(id.as_str().len(), 4 + 19);
}

#[test]
fn generated_ids_are_unique() {
    let a = ClientId::new();
    let b = ClientId::new();
    assert_ne!(a, b);
}

#[test]
fn id_from_str_round_trips() {
    let id = AgentId::from("agt-abc");
    assert_eq!(id, "agt-abc");
    assert_eq!(id.to_string(), "agt-abc");
}

#[test]
fn id_serde_is_transparent() {
    let id = ClientId::from("cli-x1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"cli-x1\"");
    let parsed: ClientId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[yare::parameterized(
    shorter = { "abc", 5, "abc" },
    exact   = { "abcde", 5, "abcde" },
    longer  = { "abcdefgh", 5, "abcde" },
    empty   = { "", 3, "" },
)]
fn short_truncates(input: &str, n: usize, expected: &str) {
    assert_eq!(short(input, n), expected);
}

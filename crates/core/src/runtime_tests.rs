// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_name_and_version() {
    let spec = RuntimeSpec::parse("python-3.11-ml@1.0.0").unwrap();
    assert_eq!(spec.name(), "python-3.11-ml");
    assert_eq!(spec.version(), "1.0.0");
    assert_eq!(spec.full_name(), "python-3.11-ml-1.0.0");
    assert_eq!(spec.to_string(), "python-3.11-ml@1.0.0");
}

#[test]
fn bare_name_defaults_to_latest() {
    let spec = RuntimeSpec::parse("python-3.11-ml").unwrap();
    assert_eq!(spec.version(), "latest");
    assert_eq!(spec.to_string(), "python-3.11-ml@latest");
}

#[test]
fn empty_version_defaults_to_latest() {
    let spec = RuntimeSpec::parse("node@").unwrap();
    assert_eq!(spec.version(), "latest");
}

#[yare::parameterized(
    prerelease   = { "go@1.2.3-rc.1" },
    build        = { "go@1.2.3+build5" },
    pre_and_build = { "go@1.2.3-beta.2+linux-amd64" },
    dotted_name  = { "python-3.11@latest" },
)]
fn accepts_valid_specs(input: &str) {
    assert!(RuntimeSpec::parse(input).is_ok(), "should parse: {input}");
}

#[yare::parameterized(
    leading_dash     = { "-python@1.0.0" },
    leading_v        = { "python-3.11-ml@v1.0.0" },
    two_components   = { "python-3.11-ml@1.0" },
    one_component    = { "python@1" },
    four_components  = { "python@1.0.0.0" },
    empty            = { "" },
    colon_form       = { "python:3.11-ml" },
    leading_digit    = { "3python@1.0.0" },
    empty_prerelease = { "python@1.0.0-" },
    empty_build      = { "python@1.0.0+" },
    non_numeric      = { "python@a.b.c" },
)]
fn rejects_invalid_specs(input: &str) {
    assert!(RuntimeSpec::parse(input).is_err(), "should reject: {input}");
}

#[test]
fn serde_uses_string_form() {
    let spec = RuntimeSpec::parse("node@18.2.0").unwrap();
    let json = serde_json::to_string(&spec).unwrap();
    assert_eq!(json, "\"node@18.2.0\"");
    let back: RuntimeSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, spec);
}

#[test]
fn serde_rejects_invalid_string() {
    let result: Result<RuntimeSpec, _> = serde_json::from_str("\"-bad@1.0.0\"");
    assert!(result.is_err());
}

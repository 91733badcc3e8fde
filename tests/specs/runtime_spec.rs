// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime spec grammar scenarios.

use jl_core::RuntimeSpec;

#[test]
fn hyphenated_name_with_version() {
    let spec = RuntimeSpec::parse("python-3.11-ml@1.0.0").unwrap();
    assert_eq!(spec.name(), "python-3.11-ml");
    assert_eq!(spec.version(), "1.0.0");
}

#[test]
fn bare_name_means_latest() {
    let spec = RuntimeSpec::parse("python-3.11-ml").unwrap();
    assert_eq!(spec.name(), "python-3.11-ml");
    assert_eq!(spec.version(), "latest");
}

#[test]
fn leading_dash_rejected() {
    assert!(RuntimeSpec::parse("-python@1.0.0").is_err());
}

#[test]
fn leading_v_rejected() {
    assert!(RuntimeSpec::parse("python-3.11-ml@v1.0.0").is_err());
}

#[test]
fn two_component_version_rejected() {
    assert!(RuntimeSpec::parse("python-3.11-ml@1.0").is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_derives_mount_path_from_name() {
    let volume = Volume::new("data", 512, VolumeKind::Filesystem);
    assert_eq!(volume.name, "data");
    assert_eq!(volume.size_mb, 512);
    assert_eq!(volume.mount_path, "/volumes/data");
    assert_eq!(volume.created_at_ms, 0);
}

#[test]
fn kind_defaults_to_filesystem() {
    assert_eq!(VolumeKind::default(), VolumeKind::Filesystem);
}

#[test]
fn kind_display() {
    assert_eq!(VolumeKind::Filesystem.to_string(), "filesystem");
    assert_eq!(VolumeKind::Memory.to_string(), "memory");
}

#[test]
fn serde_round_trips() {
    let volume = Volume::new("scratch", 64, VolumeKind::Memory);
    let json = serde_json::to_string(&volume).unwrap();
    assert!(json.contains("\"memory\""));
    let back: Volume = serde_json::from_str(&json).unwrap();
    assert_eq!(back, volume);
}

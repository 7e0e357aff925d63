//! Integration tests for Tracklift
//!
//! These tests drive the public API end to end: building torrents from real
//! files, resolving backends from JSON configuration, and dispatching uploads
//! through an in-memory HTTP sender.

#[path = "integration/torrent_building.rs"]
mod torrent_building;

#[path = "integration/registry_resolution.rs"]
mod registry_resolution;

#[path = "integration/upload_dispatch.rs"]
mod upload_dispatch;

#[path = "integration/support.rs"]
mod support;

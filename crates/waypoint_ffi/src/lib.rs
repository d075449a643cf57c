//! Flutter bridge crate exposing the tracking core to Dart.

pub mod api;

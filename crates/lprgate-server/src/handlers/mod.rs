//! HTTP handlers

pub mod records;
pub mod webhook;

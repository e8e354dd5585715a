// src/http/mod.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// HTTP module for pre-signed part uploads

pub mod client;

pub use client::HttpClientConfig;

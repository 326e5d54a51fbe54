#![doc = "index-sync-core: core pipeline for index-sync."]

//! Fetches documents from an HTTP source, transforms and batches them, and
//! uploads the batches to a search index with retry. No vendor SDKs live here;
//! the concrete sink binding is in the `index-sync` crate.
//!
//! # Usage
//! Build [`config::Settings`] once, construct a [`download::HttpSourceClient`]
//! and an [`contract::Uploader`], then drive a run with
//! [`synchronise::Synchroniser::sync`].

pub mod batch;
pub mod config;
pub mod contract;
pub mod document;
pub mod download;
pub mod error;
pub mod synchronise;
pub mod transform;

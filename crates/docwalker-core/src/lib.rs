//! # docwalker core
//!
//! Pure logic shared by the docwalker pipeline: package models, import
//! path rules, the documentation builder, the cross-reference index, the
//! source highlighter and artifact splitting.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Everything
//! here operates on in-memory buffers so it can be tested in isolation.

pub mod builder;
pub mod chunk;
pub mod comment;
pub mod extract;
pub mod gosrc;
pub mod highlight;
pub mod legacy;
pub mod models;
pub mod path;
pub mod xref;

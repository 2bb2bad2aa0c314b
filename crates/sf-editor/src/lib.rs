//! # sf-editor
//!
//! Media resources for the story editor.
//!
//! The CMS exposes images, media items (video and audio) and documents
//! through a paginated content API. This crate turns those listings into
//! the resource shape the editor consumes:
//!
//! - [`resource`] -- API wire types and the editor-facing
//!   [`MediaResource`] / [`ResourcePage`].
//! - [`client`] -- [`MediaApiClient`], a `reqwest` client for the listing
//!   and detail endpoints.

pub mod client;
pub mod resource;

pub use client::MediaApiClient;
pub use resource::{ApiItem, ApiPage, MediaResource, ResourceKind, ResourcePage};

//! Core of the docbind object-document mapper.
//!
//! docbind binds plain Rust structs to collections of an embedded document store and
//! exposes uniform create/read/update/delete/iterate operations on them. This crate
//! holds everything that does not depend on a concrete storage engine:
//!
//! - **Identifiers** ([`id`]) - Generation and parsing of document identifiers
//! - **Models** ([`model`]) - The persisted-field contract every bound type implements
//! - **Filters** ([`filter`]) - Field-to-constraint mappings and their right-biased merge
//! - **Store backend abstraction** ([`backend`]) - The narrow operation set an engine provides
//! - **Collection adapter** ([`collection`]) - Normalized single-shot results and cursors
//! - **Repositories** ([`repository`]) - Per-model find/get/save/remove/clear
//! - **Query results** ([`result`]) - Counted result sets with all/page/stream access
//! - **Sessions** ([`session`]) - One backend, many bound model types
//! - **Pagination** ([`page`]) - Page windows and page parameters
//! - **Error handling** ([`error`]) - Error taxonomy and result alias
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::{model::Model, session::Session};
//! use bson::{doc, oid::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! pub struct Profile {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub title: String,
//! }
//!
//! impl Model for Profile {
//!     fn fields() -> &'static [&'static str] { &["title"] }
//!     fn id(&self) -> Option<&ObjectId> { self.id.as_ref() }
//!     fn set_id(&mut self, id: ObjectId) { self.id = Some(id); }
//! }
//!
//! let profiles = session.bind::<Profile>()?;
//! let mut profile = Profile { title: "Alex".into(), ..Default::default() };
//! profiles.save(&mut profile).await?;
//! assert_eq!(profiles.find(doc! {}).await?.count(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_core;

pub mod backend;
pub mod collection;
pub mod error;
pub mod filter;
pub mod id;
pub mod model;
pub mod page;
pub mod repository;
pub mod result;
pub mod session;

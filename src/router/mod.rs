//! # Router Module
//!
//! File-tree routing: turns a directory of handler files (or an explicit
//! route list) into a routing index and resolves requests against it.
//!
//! ## Overview
//!
//! - [`pattern`] parses file patterns such as `src/api/**/*.{get,handler}.ts`
//!   and percent-decodes request segments
//! - [`tree`] compiles scanned files into a [`RouteTree`], rejecting
//!   ambiguous layouts while building
//! - [`strategy`] holds the three interchangeable resolution strategies
//! - [`cache`] is the bounded, mode-aware LRU in front of them
//! - [`resolver`] ties cache, strategy and path parameter extraction together
//! - [`loader`] is the capability that turns a discovered file into a
//!   [`HandlerModule`](crate::handler::HandlerModule)
//!
//! ## Matching
//!
//! Segments are walked left to right. At each level an exact directory beats
//! an exact file, which beats the level's single `{param}` entry; a directory
//! reached at the last segment serves its `index`. There is no backtracking,
//! so the first choice made at a level is final.
//!
//! ```text
//! handlers/
//!   index.js                 GET /
//!   users/
//!     index.js               GET /users
//!     me.js                  GET /users/me
//!     {id}/
//!       index.js             GET /users/42      -> { id: "42" }
//!       posts.js             GET /users/42/posts
//! ```
//!
//! ## Performance
//!
//! The tree is built once and swapped in atomically. Resolved routes are
//! cached per path, so a repeated request costs one LRU lookup plus
//! parameter extraction.

pub mod cache;
pub mod loader;
pub mod pattern;
pub mod resolver;
pub mod strategy;
pub mod tree;

pub use cache::{CacheEntry, ResolverCache};
pub use loader::{ModuleLoader, ModulePath, StaticRegistry};
pub use pattern::{FileConvention, FilePattern};
pub use resolver::{extract_params, ResolvedRoute, RouteResolver};
pub use strategy::{Resolution, Strategy};
pub use tree::{RouteTree, TreeBuilder, TreeMatch};

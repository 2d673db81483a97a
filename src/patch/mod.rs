//! Diff patch engine: localized line edits without whole-file rewrites.
//!
//! A [`PatchRequest`] carries an ordered list of [`Patch`]es for one file.
//! Each patch names its target with a locator (explicit lines, a per-line
//! search pattern, or a verbatim content block), optionally pins the
//! surrounding context, and supplies replacement text.
//!
//! # Guarantees
//!
//! - All patches resolve against the original text; splices are applied
//!   bottom-to-top so earlier edits never shift later ones
//! - Any locator failure, context mismatch or overlap aborts the whole call
//!   with the file untouched
//! - Commits are atomic (tempfile + fsync + rename) and refuse to overwrite
//!   a file that changed after it was read
//! - A byte-order mark on the original is preserved
//!
//! # Example
//!
//! ```no_run
//! use hostbridge::patch::{Patch, PatchEngine, PatchRequest};
//! use std::path::Path;
//!
//! let request = PatchRequest::new(
//!     "Assets/Player.cs",
//!     vec![Patch::search("Start()", "void Start() { Init(); }")],
//! );
//! let outcome = PatchEngine::default()
//!     .apply(Path::new("/project/Assets/Player.cs"), &request)
//!     .unwrap();
//! println!("{}", outcome.diff);
//! ```

pub mod context;
pub mod engine;
pub mod errors;
pub mod locator;
pub mod schema;

pub use engine::PatchEngine;
pub use errors::{ContextSide, LocatorError, NearMatch, PatchError};
pub use locator::{resolve, ResolvedRange};
pub use schema::{
    ContextStrictness, LocatorKind, MatchMode, Patch, PatchOutcome, PatchReport, PatchRequest,
};

//! Pipeline stages for invoice normalization.
//!
//! Each submodule implements one step. The three core stages are pure and
//! synchronous; only [`input`] touches the filesystem.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ (recognition service) ──▶ payload ──▶ canonicalize ──▶ validate ──▶ score
//! (gate)                              (cleanup)   (aliases,coerce)  (rules)     (routing)
//! ```
//!
//! 1. [`input`]: size/kind checks and the [`quality`] gate before extraction
//! 2. [`payload`]: strip fences, surface upstream errors, split off `_usage`
//! 3. [`canonicalize`]: resolve aliases and coerce values with [`coerce`]
//! 4. [`validate`]: business rules against an injected processing date
//! 5. [`score`]: per-field confidence, weighted aggregate, routing

pub mod canonicalize;
pub mod coerce;
pub mod input;
pub mod payload;
pub mod quality;
pub mod score;
pub mod validate;

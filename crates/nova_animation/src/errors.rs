//! Error Types
//!
//! This module defines the error types used by the animation subsystem.
//!
//! # Overview
//!
//! Frame-to-frame evaluation never fails: missing bones, unknown parameters,
//! unknown states and empty containers all degrade to neutral results. The
//! error type [`AnimationError`] therefore only covers the authoring
//! boundary:
//! - JSON import/export and file IO
//! - Building blend trees from descriptions that reference missing clips or masks
//! - Strictly typed parameter access
//!
//! # Usage
//!
//! ```rust,ignore
//! use nova_animation::errors::{AnimationError, Result};
//!
//! fn load_tree(json: &str) -> Result<BlendTree> {
//!     BlendTree::from_json_str(json, &library, &masks)
//! }
//! ```

use thiserror::Error;

/// The main error type for the animation subsystem.
#[derive(Error, Debug)]
pub enum AnimationError {
    // ========================================================================
    // Serialization & IO Errors
    // ========================================================================
    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// A blend tree or blend space referenced a clip that is not in the library.
    #[error("Animation clip not found: {0}")]
    ClipNotFound(String),

    /// A layer referenced a mask that is not in the mask library.
    #[error("Blend mask not found: {0}")]
    MaskNotFound(String),

    /// A state machine operation referenced an unknown state.
    #[error("Animation state not found: {0}")]
    StateNotFound(String),

    /// The blend tree description is structurally invalid.
    #[error("Invalid blend tree: {0}")]
    InvalidBlendTree(String),

    // ========================================================================
    // Parameter Errors
    // ========================================================================
    /// A parameter was read with a type other than the one it was declared with.
    #[error("Parameter '{name}' type mismatch: expected {expected}, found {found}")]
    ParameterTypeMismatch {
        /// Parameter name
        name: String,
        /// Requested type
        expected: &'static str,
        /// Declared type
        found: &'static str,
    },

    /// A parameter was read that was never declared.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// A condition expression failed to parse.
    #[error("Expression error in '{expression}': {message}")]
    Expression {
        /// The offending expression
        expression: String,
        /// What went wrong
        message: String,
    },
}

/// Alias for `Result<T, AnimationError>`.
pub type Result<T> = std::result::Result<T, AnimationError>;

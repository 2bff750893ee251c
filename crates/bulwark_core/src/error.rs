//! # Pool Error Types
//!
//! All errors that can occur in the pooling layer.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when creating or using pools.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot up to the ceiling is checked out.
    ///
    /// Non-fatal: the caller decides whether to skip, wait or substitute.
    #[error("pool '{pool}' exhausted: all {capacity} instances are active")]
    Exhausted {
        /// Name of the exhausted pool.
        pool: Arc<str>,
        /// The hard ceiling that was hit.
        capacity: usize,
    },

    /// No pool has been declared for the requested resource type.
    #[error("no pool registered for type {type_name}")]
    NotFound {
        /// Rust type name of the requested resource.
        type_name: &'static str,
    },

    /// Capacity settings rejected at construction time.
    #[error("invalid pool capacity: initial {initial}, max {max}")]
    InvalidCapacity {
        /// Requested pre-warm count.
        initial: usize,
        /// Requested ceiling.
        max: usize,
    },

    /// A pool was built without a factory.
    #[error("pool '{pool}' was built without a factory")]
    InvalidFactory {
        /// Name of the pool being constructed.
        pool: Arc<str>,
    },

    /// Another resource type already owns this pool name.
    ///
    /// Statistics are reported per name, so names must stay unique.
    #[error("pool name '{pool}' is already registered for {owner}")]
    DuplicateName {
        /// The contested name.
        pool: Arc<str>,
        /// Rust type name of the resource that registered it first.
        owner: &'static str,
    },

    /// The pool is currently borrowed elsewhere on this thread.
    #[error("pool '{pool}' is busy")]
    PoolBusy {
        /// Name of the busy pool.
        pool: Arc<str>,
    },
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for kernel operations.

use crate::keys::{EdgeKey, TopologyKey};

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A key crossing an API boundary does not address a live entity.
    #[error("{} not found: {0:?}", .0.kind())]
    NotFound(TopologyKey),

    /// The entity has no geometry where the operation needs one.
    #[error("{} has no geometry: {0:?}", .0.kind())]
    MissingGeometry(TopologyKey),

    /// The entity carries a surface/curve reference where a plane or line
    /// segment is required.
    #[error("{} geometry is not planar/linear: {0:?}", .0.kind())]
    UnsupportedGeometry(TopologyKey),

    /// An input precondition was not met. Nothing was modified.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The tolerance record failed validation.
    #[error("invalid tolerance: {0}")]
    InvalidTolerance(String),

    /// A loop could not be classified against the other operand, even with a
    /// relaxed tolerance.
    #[error("ambiguous classification of loop #{index}")]
    AmbiguousClassification { index: usize },

    /// The angle-ordered radial list around an edge is not monotone.
    #[error("radial edgeuse list around edge {edge:?} is not monotone")]
    NonMonotoneRadial { edge: EdgeKey },

    /// The ear clipper rejected a polygon.
    #[error("triangulation failed: {0}")]
    Triangulation(String),

    /// The consistency checker found corrupted topology.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Shorthand for a precondition failure.
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }
}

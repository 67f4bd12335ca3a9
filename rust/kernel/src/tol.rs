// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Explicit tolerance record.
//!
//! Every tolerance-sensitive operation takes a [`Tolerance`] argument; there
//! is no process-wide default.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance and angular tolerances.
///
/// `perp` is the cosine below which two directions count as perpendicular,
/// `para` the cosine above which they count as parallel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub dist: f64,
    pub dist_sq: f64,
    pub perp: f64,
    pub para: f64,
}

impl Tolerance {
    /// Builds a tolerance from a distance and a perpendicularity cosine,
    /// deriving `dist_sq` and `para`.
    pub fn new(dist: f64, perp: f64) -> Self {
        Self {
            dist,
            dist_sq: dist * dist,
            perp,
            para: 1.0 - perp,
        }
    }

    /// Checks the record is usable.
    pub fn validate(&self) -> Result<()> {
        let fields = [self.dist, self.dist_sq, self.perp, self.para];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidTolerance("non-finite field".into()));
        }
        if self.dist < 0.0 {
            return Err(Error::InvalidTolerance(format!(
                "negative distance {}",
                self.dist
            )));
        }
        let expected = self.dist * self.dist;
        if (self.dist_sq - expected).abs() > 1e-12_f64.max(expected * 1e-6) {
            return Err(Error::InvalidTolerance(format!(
                "dist_sq {} does not match dist {}",
                self.dist_sq, self.dist
            )));
        }
        if !(0.0..1.0).contains(&self.perp) {
            return Err(Error::InvalidTolerance(format!(
                "perp {} outside [0, 1)",
                self.perp
            )));
        }
        if self.para <= 0.0 || self.para > 1.0 {
            return Err(Error::InvalidTolerance(format!(
                "para {} outside (0, 1]",
                self.para
            )));
        }
        Ok(())
    }

    /// The same record with `dist` doubled.
    pub fn relaxed(&self) -> Self {
        let dist = self.dist * 2.0;
        Self {
            dist,
            dist_sq: dist * dist,
            ..*self
        }
    }
}

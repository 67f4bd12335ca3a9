// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial index for tolerance-based vertex lookup.
//!
//! A grid-based spatial hash gives O(1) average-case nearest-vertex
//! queries. Vertex fusing and polygon sewing both use it to find the
//! vertices within `tol.dist` of a point.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::keys::VertexKey;
use crate::model::Model;

/// A spatial hash grid of vertex positions.
///
/// Space is divided into cubic cells of side `cell_size`; a query checks the
/// 3x3x3 block of cells around the query point, so query tolerances must
/// not exceed the cell size.
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    grid: FxHashMap<(i64, i64, i64), Vec<(VertexKey, Point3<f64>)>>,
}

impl SpatialIndex {
    /// Creates an index for queries up to `tolerance`.
    pub fn new(tolerance: f64) -> Self {
        Self {
            cell_size: tolerance.max(1e-10),
            grid: FxHashMap::default(),
        }
    }

    /// Indexes every vertex of a model that has a position.
    pub fn from_model(m: &Model, tolerance: f64) -> Self {
        let mut index = Self::new(tolerance);
        for v in m.vertex_keys() {
            if let Ok(p) = m.vertex_point(v) {
                index.insert(v, p);
            }
        }
        index
    }

    pub fn insert(&mut self, key: VertexKey, p: Point3<f64>) {
        let cell = self.cell_coords(&p);
        self.grid.entry(cell).or_default().push((key, p));
    }

    /// Forgets a vertex indexed at `p`.
    pub fn remove(&mut self, key: VertexKey, p: &Point3<f64>) {
        let cell = self.cell_coords(p);
        if let Some(list) = self.grid.get_mut(&cell) {
            list.retain(|(k, _)| *k != key);
        }
    }

    /// Nearest indexed vertex within `tolerance` of `p`.
    pub fn find_near(&self, p: &Point3<f64>, tolerance: f64) -> Option<VertexKey> {
        let tol_sq = tolerance * tolerance;
        let mut best: Option<(f64, VertexKey)> = None;
        self.for_each_neighbour(p, |key, q| {
            let d = (q - p).norm_squared();
            if d <= tol_sq && best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, key));
            }
        });
        best.map(|(_, k)| k)
    }

    /// All indexed vertices within `tolerance` of `p`.
    pub fn find_all_near(&self, p: &Point3<f64>, tolerance: f64) -> Vec<VertexKey> {
        let tol_sq = tolerance * tolerance;
        let mut result = Vec::new();
        self.for_each_neighbour(p, |key, q| {
            if (q - p).norm_squared() <= tol_sq {
                result.push(key);
            }
        });
        result
    }

    fn for_each_neighbour(&self, p: &Point3<f64>, mut f: impl FnMut(VertexKey, &Point3<f64>)) {
        let (cx, cy, cz) = self.cell_coords(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(entries) = self.grid.get(&(cx + dx, cy + dy, cz + dz)) {
                        for (k, q) in entries {
                            f(*k, q);
                        }
                    }
                }
            }
        }
    }

    fn cell_coords(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }
}

impl Model {
    /// Returns an indexed vertex within `tolerance` of `p`, or creates one.
    ///
    /// A created vertex has no uses until the caller attaches one.
    pub fn find_or_add_vertex(
        &mut self,
        index: &mut SpatialIndex,
        p: Point3<f64>,
        tolerance: f64,
    ) -> Result<crate::keys::VertexKey> {
        if let Some(existing) = index.find_near(&p, tolerance) {
            if self.vertex(existing).is_ok() {
                return Ok(existing);
            }
            index.remove(existing, &p);
        }
        let key = self.alloc_vertex(Some(p));
        index.insert(key, p);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_within_tolerance() {
        let mut m = Model::new();
        let mut index = SpatialIndex::new(0.01);
        let a = m
            .find_or_add_vertex(&mut index, Point3::new(1.0, 2.0, 3.0), 0.01)
            .unwrap();
        let b = m
            .find_or_add_vertex(&mut index, Point3::new(1.005, 2.0, 3.0), 0.01)
            .unwrap();
        let c = m
            .find_or_add_vertex(&mut index, Point3::new(1.5, 2.0, 3.0), 0.01)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn query_across_cell_boundary() {
        let mut index = SpatialIndex::new(0.1);
        let mut m = Model::new();
        let v = m.alloc_vertex(Some(Point3::new(0.099, 0.0, 0.0)));
        index.insert(v, Point3::new(0.099, 0.0, 0.0));
        assert_eq!(index.find_near(&Point3::new(0.101, 0.0, 0.0), 0.01), Some(v));
        assert!(index.find_near(&Point3::new(0.3, 0.0, 0.0), 0.01).is_none());
    }

    #[test]
    fn zero_tolerance_is_exact() {
        let mut m = Model::new();
        let mut index = SpatialIndex::new(0.0);
        let p = Point3::new(0.1 + 0.2, 0.0, 0.0);
        let v = m.alloc_vertex(Some(p));
        index.insert(v, p);
        assert_eq!(index.find_all_near(&p, 0.0), vec![v]);
        assert!(index.find_near(&Point3::new(0.3, 0.0, 0.0), 0.0).is_none());
    }
}

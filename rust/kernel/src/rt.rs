// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ray/shell intersection and ray-based point classification.
//!
//! A ray is intersected with the plane of every outward faceuse; plane
//! hits are classified against the face area. A plane hit on a face
//! boundary is attributed to the edge or vertex there, and the hits of
//! all faces around that element merge into a single crossing or touch.
//! Rays running inside a face plane are grazes: the crossing count along
//! such a ray is unreliable and classification moves on to the next
//! direction. Each face, edge and vertex is visited at most once per
//! traversal, tracked in a [`HitMissTable`] keyed by entity index.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::classify::{dist_point_segment_3d, PointClass};
use crate::config::DebugFlags;
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::index::IndexTable;
use crate::keys::*;
use crate::model::Model;
use crate::tol::Tolerance;

/// Ray directions for point-in-shell tests, tried in order.
const CLASS_DIRS: [[f64; 3]; 10] = [
    [3.0, 2.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [-3.0, -2.0, -1.0],
    [-1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, -1.0],
    [-1.0, -1.0, -1.0],
];

/// A half-line `origin + t * dir` for `t` in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    /// Unit direction.
    pub dir: Vector3<f64>,
    pub min: f64,
    pub max: f64,
}

impl Ray {
    /// Unbounded ray starting at `origin`. The direction is normalized.
    pub fn new(origin: Point3<f64>, dir: Vector3<f64>) -> Result<Self> {
        let len = dir.norm();
        if !(len > 1e-15) || !len.is_finite() {
            return Err(Error::precondition("ray direction has no length"));
        }
        Ok(Self {
            origin,
            dir: dir / len,
            min: 0.0,
            max: f64::INFINITY,
        })
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.dir * t
    }

    /// Whether the ray passes within `tol` of a box (slab test).
    pub fn hits_box(&self, bb: &BoundingBox, tol: f64) -> bool {
        if bb.is_empty() {
            return false;
        }
        let (mut t0, mut t1) = (self.min, self.max);
        for i in 0..3 {
            let (lo, hi) = (bb.min[i] - tol, bb.max[i] + tol);
            if self.dir[i].abs() < 1e-15 {
                if self.origin[i] < lo || self.origin[i] > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / self.dir[i];
            let (mut a, mut b) = ((lo - self.origin[i]) * inv, (hi - self.origin[i]) * inv);
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
            t0 = t0.max(a);
            t1 = t1.min(b);
            if t0 > t1 {
                return false;
            }
        }
        true
    }
}

/// How a ray meets a face, edge or vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    /// Crossing into the material behind the face.
    Enter,
    /// Crossing out of the material.
    Leave,
    /// Meeting a boundary edge or vertex without crossing the surface.
    Touch,
    /// Running in a face plane, or meeting a boundary whose faces do not
    /// agree on a side.
    Graze,
}

/// One ray contact with a face interior, or with an edge or vertex on a
/// face boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub dist: f64,
    pub point: Point3<f64>,
    /// The face hit; for a boundary hit, one of the faces around it.
    pub fu: FaceUseKey,
    /// Index of the entity hit: the face, or the boundary edge or vertex.
    pub index: usize,
    /// Set when the hit lies on an edge or vertex of the face.
    pub on: Option<TopologyKey>,
    pub kind: HitKind,
}

/// Outcome recorded for an entity during one ray traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitMiss {
    Miss,
    Hit(HitKind),
}

/// Per-index record of the faces, edges and vertices a ray has been
/// tested against. Each entity is classified at most once per traversal.
#[derive(Debug, Clone)]
pub struct HitMissTable {
    table: IndexTable<Option<HitMiss>>,
}

impl HitMissTable {
    pub fn for_model(m: &Model) -> Self {
        Self {
            table: IndexTable::for_model(m),
        }
    }

    pub fn get(&self, index: usize) -> Option<HitMiss> {
        self.table.get(index).copied().flatten()
    }

    pub fn record(&mut self, index: usize, outcome: HitMiss) {
        self.table.set(index, Some(outcome));
    }

    pub fn hits(&self) -> usize {
        self.table
            .iter()
            .filter(|(_, r)| matches!(r, Some(HitMiss::Hit(_))))
            .count()
    }
}

/// A plane hit on one face, before boundary hits are merged.
enum Contact {
    Miss,
    Face(Hit),
    /// On the face boundary; `denom` is the plane normal dotted with the
    /// ray direction.
    Boundary { hit: Hit, denom: f64 },
}

/// Crossing kind of a boundary element from the sides of the faces
/// around it.
fn boundary_kind(denoms: &[f64], tol: &Tolerance) -> HitKind {
    let eps = tol.perp.max(1e-12);
    if denoms.iter().all(|&d| d < -eps) {
        HitKind::Enter
    } else if denoms.iter().all(|&d| d > eps) {
        HitKind::Leave
    } else if denoms.iter().any(|d| d.abs() <= eps) {
        HitKind::Graze
    } else {
        HitKind::Touch
    }
}

fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| a.dist.total_cmp(&b.dist).then(a.index.cmp(&b.index)));
}

impl Model {
    /// The vertex, else the edge, of a face boundary within tolerance of `p`.
    fn boundary_element(&self, fu: FaceUseKey, p: &Point3<f64>, tol: &Tolerance) -> Result<Option<(TopologyKey, usize)>> {
        let loops = &self.faceuse(fu)?.loops;
        for &lu in loops {
            for v in self.lu_vertices(lu)? {
                let vd = self.vertex(v)?;
                if vd.point.is_some_and(|q| (q - p).norm() <= tol.dist) {
                    return Ok(Some((v.into(), vd.index)));
                }
            }
        }
        for &lu in loops {
            for &eu in self.lu_edgeuses(lu)? {
                let (a, b) = self.eu_points(eu)?;
                if dist_point_segment_3d(p, &a, &b) <= tol.dist {
                    let e = self.edgeuse(eu)?.edge;
                    return Ok(Some((e.into(), self.edge(e)?.index)));
                }
            }
        }
        Ok(None)
    }

    fn isect_ray_face(&self, ray: &Ray, fu: FaceUseKey, tol: &Tolerance) -> Result<Contact> {
        let plane = match self.fu_plane(fu) {
            Err(Error::MissingGeometry(_)) => self.face_plane_from_loops(fu)?,
            other => other?,
        };
        let index = self.face(self.faceuse(fu)?.face)?.index;
        let denom = plane.normal.dot(&ray.dir);
        let d0 = plane.dist(&ray.origin);
        if denom.abs() <= tol.perp.max(1e-12) {
            if d0.abs() > tol.dist || !ray.hits_box(&self.fu_bbox(fu)?, tol.dist) {
                return Ok(Contact::Miss);
            }
            return Ok(Contact::Face(Hit {
                dist: 0.0,
                point: ray.origin,
                fu,
                index,
                on: None,
                kind: HitKind::Graze,
            }));
        }
        let t = -d0 / denom;
        if t < ray.min - tol.dist || t > ray.max {
            return Ok(Contact::Miss);
        }
        let point = ray.at(t);
        let kind = match self.class_pnt_f(&point, fu, tol)? {
            PointClass::Out => return Ok(Contact::Miss),
            PointClass::In if denom < 0.0 => HitKind::Enter,
            PointClass::In => HitKind::Leave,
            PointClass::On => {
                let Some((element, index)) = self.boundary_element(fu, &point, tol)? else {
                    return Ok(Contact::Face(Hit {
                        dist: t,
                        point,
                        fu,
                        index,
                        on: None,
                        kind: HitKind::Graze,
                    }));
                };
                return Ok(Contact::Boundary {
                    hit: Hit {
                        dist: t,
                        point,
                        fu,
                        index,
                        on: Some(element),
                        kind: HitKind::Graze,
                    },
                    denom,
                });
            }
            PointClass::Unknown => HitKind::Graze,
        };
        Ok(Contact::Face(Hit {
            dist: t,
            point,
            fu,
            index,
            on: None,
            kind,
        }))
    }

    /// Intersects a ray with the outward faces of a shell, skipping faces,
    /// edges and vertices already recorded in `seen`.
    ///
    /// Plane hits landing on a shared edge or vertex are merged into one
    /// hit on that element: a crossing when every face around it sees the
    /// ray from the same side, a touch otherwise. With `in_or_out_only`
    /// the caller already knows the origin is off the shell, and hits
    /// within tolerance of the origin are dropped. Hits come back sorted
    /// by distance, then index.
    pub fn isect_ray_shell(
        &self,
        ray: &Ray,
        s: ShellKey,
        in_or_out_only: bool,
        tol: &Tolerance,
        seen: &mut HitMissTable,
    ) -> Result<Vec<Hit>> {
        let mut hits = Vec::new();
        if !ray.hits_box(&self.shell_bbox(s)?, tol.dist) {
            return Ok(hits);
        }
        let mut boundary: BTreeMap<usize, (Hit, Vec<f64>)> = BTreeMap::new();
        for fu in self.shell_faces(s)? {
            let index = self.face(self.faceuse(fu)?.face)?.index;
            if seen.get(index).is_some() {
                continue;
            }
            match self.isect_ray_face(ray, fu, tol)? {
                Contact::Face(hit) => {
                    seen.record(index, HitMiss::Hit(hit.kind));
                    hits.push(hit);
                }
                Contact::Boundary { hit, denom } => {
                    // The face area itself is missed; the element carries the hit.
                    seen.record(index, HitMiss::Miss);
                    boundary.entry(hit.index).or_insert((hit, Vec::new())).1.push(denom);
                }
                Contact::Miss => seen.record(index, HitMiss::Miss),
            }
        }
        for (index, (mut hit, denoms)) in boundary {
            if seen.get(index).is_some() {
                continue;
            }
            hit.kind = boundary_kind(&denoms, tol);
            seen.record(index, HitMiss::Hit(hit.kind));
            hits.push(hit);
        }
        if in_or_out_only {
            hits.retain(|h| h.kind == HitKind::Graze || h.dist > tol.dist);
        }
        sort_hits(&mut hits);
        if self.config.debug.contains(DebugFlags::RT) {
            tracing::trace!(shell = ?s, hits = hits.len(), "ray vs shell");
        }
        Ok(hits)
    }

    /// Intersects a ray with every shell of the model.
    pub fn isect_ray_model(&self, ray: &Ray, tol: &Tolerance) -> Result<Vec<Hit>> {
        let mut seen = HitMissTable::for_model(self);
        let mut hits = Vec::new();
        for &r in self.regions() {
            for &s in &self.region(r)?.shells {
                hits.extend(self.isect_ray_shell(ray, s, false, tol, &mut seen)?);
            }
        }
        sort_hits(&mut hits);
        Ok(hits)
    }

    /// Classifies the ray origin against a shell by counting crossings.
    ///
    /// `On` when the origin lies on a face, unless `in_or_out_only` is set,
    /// in which case only `In`, `Out` or `Unknown` come back. `Unknown`
    /// when the ray grazes anything.
    pub fn class_ray_vs_shell(
        &self,
        ray: &Ray,
        s: ShellKey,
        in_or_out_only: bool,
        tol: &Tolerance,
    ) -> Result<PointClass> {
        let mut seen = HitMissTable::for_model(self);
        let hits = self.isect_ray_shell(ray, s, in_or_out_only, tol, &mut seen)?;
        if hits.iter().any(|h| h.kind == HitKind::Graze) {
            return Ok(PointClass::Unknown);
        }
        if hits.first().is_some_and(|h| h.dist <= tol.dist) {
            return Ok(PointClass::On);
        }
        let crossings: Vec<&Hit> = hits.iter().filter(|h| h.kind != HitKind::Touch).collect();
        // Separate faces crossed at one point cannot be told apart.
        for pair in crossings.windows(2) {
            if (pair[1].dist - pair[0].dist).abs() <= tol.dist {
                return Ok(PointClass::Unknown);
            }
        }
        Ok(if crossings.len() % 2 == 1 {
            PointClass::In
        } else {
            PointClass::Out
        })
    }

    /// Ray-parity classification over the fixed directions, for a point
    /// already known to be off the shell.
    pub(crate) fn class_pt_s_by_rays(&self, pt: &Point3<f64>, s: ShellKey, tol: &Tolerance) -> Result<PointClass> {
        for (attempt, dir) in CLASS_DIRS.iter().enumerate() {
            let ray = Ray::new(*pt, Vector3::from(*dir))?;
            let class = self.class_ray_vs_shell(&ray, s, true, tol)?;
            if class != PointClass::Unknown {
                if self.config.debug.contains(DebugFlags::CLASSIFY) {
                    tracing::trace!(attempt, ?class, "point vs shell");
                }
                return Ok(class);
            }
        }
        tracing::warn!(?pt, "every ray grazed the shell");
        Ok(PointClass::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::make_box;
    use approx::assert_relative_eq;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    #[test]
    fn zero_direction_is_rejected() {
        assert!(Ray::new(Point3::origin(), Vector3::zeros()).is_err());
    }

    #[test]
    fn ray_through_box_enters_and_leaves() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let ray = Ray::new(Point3::new(-1.0, 0.3, 0.6), Vector3::x()).unwrap();
        let mut seen = HitMissTable::for_model(&m);
        let hits = m.isect_ray_shell(&ray, s, false, &tol(), &mut seen).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, HitKind::Enter);
        assert_eq!(hits[1].kind, HitKind::Leave);
        assert_relative_eq!(hits[0].dist, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hits[1].dist, 2.0, epsilon = 1e-12);
        assert_eq!(seen.hits(), 2);
    }

    #[test]
    fn ray_in_face_plane_is_a_graze() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let ray = Ray::new(Point3::new(-1.0, 0.0, 0.5), Vector3::x()).unwrap();
        assert_eq!(m.class_ray_vs_shell(&ray, s, false, &tol()).unwrap(), PointClass::Unknown);
    }

    #[test]
    fn ray_through_box_edges_crosses_once_per_edge() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let ray = Ray::new(Point3::new(-1.0, -1.0, 0.5), Vector3::new(1.0, 1.0, 0.0)).unwrap();
        let mut seen = HitMissTable::for_model(&m);
        let hits = m.isect_ray_shell(&ray, s, false, &tol(), &mut seen).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, HitKind::Enter);
        assert_eq!(hits[1].kind, HitKind::Leave);
        assert_relative_eq!(hits[0].dist, 2f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(hits[1].dist, 2.0 * 2f64.sqrt(), epsilon = 1e-9);
        for hit in &hits {
            let Some(TopologyKey::Edge(e)) = hit.on else {
                panic!("expected an edge hit, got {:?}", hit.on);
            };
            assert_eq!(hit.index, m.edge(e).unwrap().index);
            assert_eq!(seen.get(hit.index), Some(HitMiss::Hit(hit.kind)));
        }
        // Only the two edges count as hit; the four faces around them missed.
        assert_eq!(seen.hits(), 2);

        let inside = Ray::new(Point3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert_eq!(m.class_ray_vs_shell(&inside, s, false, &tol()).unwrap(), PointClass::In);
        let outside = Ray::new(Point3::new(-1.0, -1.0, 0.5), Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert_eq!(m.class_ray_vs_shell(&outside, s, false, &tol()).unwrap(), PointClass::Out);
    }

    #[test]
    fn ray_through_box_corner() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        // Diagonal through two opposite corners.
        let diagonal = Ray::new(Point3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let hits = m.isect_ray_model(&diagonal, &tol()).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(matches!(hits[0].on, Some(TopologyKey::Vertex(_))));
        assert_eq!(hits[0].kind, HitKind::Enter);
        assert_eq!(hits[1].kind, HitKind::Leave);

        // Glancing past the corner at the origin from outside.
        let glancing = Ray::new(Point3::new(-1.0, -1.0, 2.0), Vector3::new(1.0, 1.0, -2.0)).unwrap();
        let hits = m.isect_ray_model(&glancing, &tol()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, HitKind::Touch);
        assert_eq!(m.class_ray_vs_shell(&glancing, s, false, &tol()).unwrap(), PointClass::Out);
    }

    #[test]
    fn in_or_out_only_ignores_the_origin_face() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let ray = Ray::new(Point3::new(0.0, 0.3, 0.6), Vector3::x()).unwrap();
        assert_eq!(m.class_ray_vs_shell(&ray, s, false, &tol()).unwrap(), PointClass::On);
        assert_eq!(m.class_ray_vs_shell(&ray, s, true, &tol()).unwrap(), PointClass::In);
    }

    #[test]
    fn ray_misses_box() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let ray = Ray::new(Point3::new(-1.0, 5.0, 0.5), Vector3::x()).unwrap();
        assert_eq!(m.isect_ray_model(&ray, &tol()).unwrap().len(), 0);
        let inside = Ray::new(Point3::new(0.5, 0.4, 0.3), Vector3::new(3.0, 2.0, 1.0)).unwrap();
        assert_eq!(m.class_ray_vs_shell(&inside, s, false, &tol()).unwrap(), PointClass::In);
    }

    #[test]
    fn model_hits_are_sorted() {
        let mut m = Model::new();
        make_box(&mut m, Point3::new(3.0, 0.0, 0.0), Point3::new(4.0, 1.0, 1.0)).unwrap();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.25), Vector3::x()).unwrap();
        let hits = m.isect_ray_model(&ray, &tol()).unwrap();
        assert_eq!(hits.len(), 4);
        for (hit, want) in hits.iter().zip([1.0, 2.0, 4.0, 5.0]) {
            assert_relative_eq!(hit.dist, want, epsilon = 1e-12);
        }
    }
}

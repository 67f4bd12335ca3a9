// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Face/face intersector.
//!
//! Two faces whose planes cross meet along a line. Each face lists where
//! its boundary touches that line (a point table ordered by distance along
//! the line), the two tables are merged, and every stretch of the line
//! lying on both faces becomes a cut segment. Segment endpoints become
//! vertices in both faces: an existing vertex when one is there, otherwise
//! a new vertex that breaks the edge it falls on.
//!
//! Coplanar faces are handled in 2D: the edges of each face are clipped
//! against the other, splitting edges where boundaries cross.
//!
//! The cut segments are collected per face for [`crate::fcut`].

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

use crate::ck::ck_fg_verts;
use crate::classify::{dist_point_segment_3d, wedge_class, PointClass, WedgeClass};
use crate::config::DebugFlags;
use crate::error::{Error, Result};
use crate::geometry::{dist_point_segment_2d, segment_intersection_2d, segment_param_2d, Plane};
use crate::keys::*;
use crate::model::*;
use crate::spatial::SpatialIndex;
use crate::tol::Tolerance;

/// Where a face boundary meets the line of intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePoint {
    /// Signed distance along the line from its reference point.
    pub mag: f64,
    pub point: Point3<f64>,
    /// Set when the boundary touches the line at a vertex.
    pub vertex: Option<VertexKey>,
    /// Which side of the line the face's corner at `vertex` opens to.
    pub wedge: Option<WedgeClass>,
}

/// Scratch state for intersecting the faces of two shells.
#[derive(Debug)]
pub struct Intersector {
    tol: Tolerance,
    index: SpatialIndex,
    segments: FxHashMap<FaceKey, Vec<(VertexKey, VertexKey)>>,
    joined: FxHashMap<VertexKey, VertexKey>,
    verbose: bool,
}

/// Breaks the edge of `eu` at `v`, which must lie on it within
/// `tol.dist`. Returns the edgeuse now starting at `v`, or `eu` itself
/// when `v` is already one of its ends.
pub fn break_eu_on_v(m: &mut Model, eu: EdgeUseKey, v: VertexKey, tol: &Tolerance) -> Result<EdgeUseKey> {
    let (a, b) = (m.eu_vertex(eu)?, m.eu_end_vertex(eu)?);
    if v == a {
        return Ok(eu);
    }
    if v == b {
        return m.eu_next(eu);
    }
    let p = m.vertex_point(v)?;
    let (pa, pb) = m.eu_points(eu)?;
    if dist_point_segment_3d(&p, &pa, &pb) > tol.dist {
        return Err(Error::precondition("vertex is not on the edge"));
    }
    m.split_edge(eu, Some(v))
}

fn working_plane(m: &Model, fu: FaceUseKey) -> Result<Plane> {
    match m.fu_plane(fu) {
        Err(Error::MissingGeometry(_)) => m.face_plane_from_loops(fu),
        other => other,
    }
}

fn deg(rad: f64) -> f64 {
    let d = rad.to_degrees();
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

impl Intersector {
    pub fn new(m: &Model, tol: &Tolerance) -> Result<Self> {
        tol.validate()?;
        Ok(Self {
            tol: *tol,
            index: SpatialIndex::from_model(m, tol.dist),
            segments: FxHashMap::default(),
            joined: FxHashMap::default(),
            verbose: m.config().debug.contains(DebugFlags::INTERSECT),
        })
    }

    fn resolve(&self, mut v: VertexKey) -> VertexKey {
        while let Some(&to) = self.joined.get(&v) {
            v = to;
        }
        v
    }

    /// Faces that received cut segments.
    pub fn cut_faces(&self) -> Vec<FaceKey> {
        self.segments.keys().copied().collect()
    }

    /// Cut segments recorded for a face, with joined vertices resolved and
    /// duplicates removed.
    pub fn segments_for(&self, f: FaceKey) -> Vec<(VertexKey, VertexKey)> {
        let mut out: Vec<(VertexKey, VertexKey)> = Vec::new();
        for &(a, b) in self.segments.get(&f).map(Vec::as_slice).unwrap_or(&[]) {
            let (a, b) = (self.resolve(a), self.resolve(b));
            if a != b && !out.contains(&(a, b)) && !out.contains(&(b, a)) {
                out.push((a, b));
            }
        }
        out
    }

    fn record(&mut self, m: &Model, fu: FaceUseKey, a: VertexKey, b: VertexKey) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        if m.find_eu_in_faceuse(a, b, fu)?.is_some() || m.find_eu_in_faceuse(b, a, fu)?.is_some() {
            return Ok(false);
        }
        let f = m.faceuse(fu)?.face;
        self.segments.entry(f).or_default().push((a, b));
        Ok(true)
    }

    /// Makes `v` a vertex of `fu`'s boundary when it lies on one of its
    /// edges. Returns whether `v` is now on the boundary.
    fn break_face_at(&mut self, m: &mut Model, fu: FaceUseKey, v: VertexKey) -> Result<bool> {
        if m.find_vu_in_faceuse(v, fu)?.is_some() {
            return Ok(true);
        }
        let p = m.vertex_point(v)?;
        for lu in m.faceuse(fu)?.loops.clone() {
            for eu in m.lu_edgeuses(lu)?.to_vec() {
                let (a, b) = m.eu_points(eu)?;
                let interior = (p - a).norm() > self.tol.dist && (p - b).norm() > self.tol.dist;
                if interior && dist_point_segment_3d(&p, &a, &b) <= self.tol.dist {
                    break_eu_on_v(m, eu, v, &self.tol)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Intersects two faces, recording cut segments for both. Returns the
    /// number of segments recorded.
    ///
    /// Parallel faces that are not coplanar do not intersect.
    pub fn isect_two_generic_faces(&mut self, m: &mut Model, fu1: FaceUseKey, fu2: FaceUseKey) -> Result<usize> {
        let fu1 = m.fu_same(fu1)?;
        let fu2 = m.fu_same(fu2)?;
        if m.faceuse(fu1)?.face == m.faceuse(fu2)?.face {
            return Ok(0);
        }
        if !m.fu_bbox(fu1)?.overlaps(&m.fu_bbox(fu2)?, self.tol.dist) {
            return Ok(0);
        }
        for fu in [fu1, fu2] {
            let f = m.faceuse(fu)?.face;
            if m.face(f)?.geom.is_some() {
                // Reported and carried on with the stored plane.
                ck_fg_verts(m, f, &self.tol)?;
            }
        }
        let p1 = working_plane(m, fu1)?;
        let p2 = working_plane(m, fu2)?;
        if p1.coincident(&p2, &self.tol) {
            return self.isect_coplanar(m, fu1, fu2);
        }
        let Some((origin, dir)) = p1.intersect(&p2, &self.tol) else {
            return Ok(0);
        };
        let t1 = self.line_table(m, fu1, &p2, &origin, &dir)?;
        if t1.is_empty() {
            return Ok(0);
        }
        let t2 = self.line_table(m, fu2, &p1, &origin, &dir)?;
        if t2.is_empty() {
            return Ok(0);
        }
        self.isect_two_ptbls(m, fu1, fu2, t1, t2)
    }

    /// Point table of one face along the line `origin + t * dir`, where
    /// `other` is the plane of the face being intersected with.
    pub fn line_table(
        &self,
        m: &Model,
        fu: FaceUseKey,
        other: &Plane,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
    ) -> Result<Vec<LinePoint>> {
        let normal = m.fu_normal(fu)?;
        let side = normal.cross(dir);
        let angle = |w: Vector3<f64>| deg(w.dot(&side).atan2(w.dot(dir)));
        let mag = |p: &Point3<f64>| (p - origin).dot(dir);
        let mut table = Vec::new();
        for &lu in &m.faceuse(fu)?.loops {
            match &m.loopuse(lu)?.contents {
                LoopContents::Vertex(vu) => {
                    let p = m.vu_point(*vu)?;
                    if other.dist(&p).abs() <= self.tol.dist {
                        table.push(LinePoint {
                            mag: mag(&p),
                            point: p,
                            vertex: Some(m.vertexuse(*vu)?.vertex),
                            wedge: None,
                        });
                    }
                }
                LoopContents::Edges(eus) => {
                    let n = eus.len();
                    for (i, &eu) in eus.iter().enumerate() {
                        let (a, b) = m.eu_points(eu)?;
                        let (da, db) = (other.dist(&a), other.dist(&b));
                        if da.abs() <= self.tol.dist {
                            let (prev_a, _) = m.eu_points(eus[(i + n - 1) % n])?;
                            let (wa, wb) = (angle(b - a), angle(prev_a - a));
                            table.push(LinePoint {
                                mag: mag(&a),
                                point: a,
                                vertex: Some(m.eu_vertex(eu)?),
                                wedge: Some(wedge_class(wa.min(wb), wa.max(wb))),
                            });
                        } else if db.abs() > self.tol.dist && (da > 0.0) != (db > 0.0) {
                            let p = a + (b - a) * (da / (da - db));
                            table.push(LinePoint {
                                mag: mag(&p),
                                point: p,
                                vertex: None,
                                wedge: None,
                            });
                        }
                    }
                }
            }
        }
        table.sort_by(|x, y| x.mag.total_cmp(&y.mag));
        Ok(table)
    }

    /// Merges the point tables of two faces and records every stretch of
    /// the line that lies on both faces.
    pub fn isect_two_ptbls(
        &mut self,
        m: &mut Model,
        fu1: FaceUseKey,
        fu2: FaceUseKey,
        t1: Vec<LinePoint>,
        t2: Vec<LinePoint>,
    ) -> Result<usize> {
        let mut all: Vec<LinePoint> = t1.into_iter().chain(t2).collect();
        all.sort_by(|x, y| x.mag.total_cmp(&y.mag));

        let mut clusters: Vec<Vec<LinePoint>> = Vec::new();
        for p in all {
            match clusters.last_mut() {
                Some(c) if c.last().is_some_and(|l| p.mag - l.mag <= self.tol.dist) => c.push(p),
                _ => clusters.push(vec![p]),
            }
        }
        let reps: Vec<Point3<f64>> = clusters
            .iter()
            .map(|c| match c.iter().find(|p| p.vertex.is_some()) {
                Some(p) => p.point,
                None => Point3::from(c.iter().fold(Vector3::<f64>::zeros(), |acc, p| acc + p.point.coords) / c.len() as f64),
            })
            .collect();

        let on_both = |m: &Model, p: &Point3<f64>| -> Result<bool> {
            let on = |pc: PointClass| matches!(pc, PointClass::In | PointClass::On);
            Ok(on(m.class_pnt_f(p, fu1, &self.tol)?) && on(m.class_pnt_f(p, fu2, &self.tol)?))
        };
        let mut kept = Vec::new();
        for k in 0..reps.len().saturating_sub(1) {
            if (reps[k + 1] - reps[k]).norm() <= self.tol.dist {
                continue;
            }
            if on_both(m, &nalgebra::center(&reps[k], &reps[k + 1]))? {
                kept.push(k);
            }
        }

        let mut verts: FxHashMap<usize, VertexKey> = FxHashMap::default();
        let mut recorded = 0;
        for k in kept {
            for c in [k, k + 1] {
                if !verts.contains_key(&c) {
                    let v = self.cluster_vertex(m, &clusters[c], &reps[c], fu1, fu2)?;
                    verts.insert(c, v);
                }
            }
            let (a, b) = (self.resolve(verts[&k]), self.resolve(verts[&(k + 1)]));
            if self.record(m, fu1, a, b)? {
                recorded += 1;
            }
            if self.record(m, fu2, a, b)? {
                recorded += 1;
            }
        }
        if self.verbose {
            let wedges: Vec<_> = clusters.iter().flatten().filter_map(|p| p.wedge).collect();
            tracing::trace!(
                f1 = m.faceuse(fu1)?.index,
                f2 = m.faceuse(fu2)?.index,
                points = clusters.len(),
                ?wedges,
                recorded,
                "intersected faces"
            );
        }
        Ok(recorded)
    }

    /// The vertex standing for one cluster of line points: an existing
    /// vertex when the cluster has one, otherwise a found or new vertex at
    /// `rep`. The vertex is inserted into both faces' boundaries where it
    /// falls on an edge.
    fn cluster_vertex(
        &mut self,
        m: &mut Model,
        cluster: &[LinePoint],
        rep: &Point3<f64>,
        fu1: FaceUseKey,
        fu2: FaceUseKey,
    ) -> Result<VertexKey> {
        let mut existing: Vec<VertexKey> = Vec::new();
        for v in cluster.iter().filter_map(|p| p.vertex) {
            let v = self.resolve(v);
            if !existing.contains(&v) {
                existing.push(v);
            }
        }
        let v = match existing.split_first() {
            Some((&keep, rest)) => {
                for &other in rest {
                    m.join_vertex(keep, other)?;
                    self.joined.insert(other, keep);
                }
                keep
            }
            None => m.find_or_add_vertex(&mut self.index, *rep, self.tol.dist)?,
        };
        let on1 = self.break_face_at(m, fu1, v)?;
        let on2 = self.break_face_at(m, fu2, v)?;
        if !on1 && !on2 && m.vertex(v)?.uses.is_empty() {
            tracing::warn!("intersection point is on neither face boundary");
        }
        Ok(v)
    }

    /// Clips the edges of each coplanar face against the other.
    fn isect_coplanar(&mut self, m: &mut Model, fu1: FaceUseKey, fu2: FaceUseKey) -> Result<usize> {
        let n = self.clip_edges_into(m, fu2, fu1)? + self.clip_edges_into(m, fu1, fu2)?;
        if self.verbose {
            tracing::trace!(f1 = m.faceuse(fu1)?.index, f2 = m.faceuse(fu2)?.index, recorded = n, "coplanar faces");
        }
        Ok(n)
    }

    /// Splits the edges of `src` where they meet the boundary of `dst` and
    /// records the pieces lying on `dst` as cuts of `dst`.
    fn clip_edges_into(&mut self, m: &mut Model, src: FaceUseKey, dst: FaceUseKey) -> Result<usize> {
        let frame = m.fu_frame(dst)?;
        let mut src_edges = Vec::new();
        for &lu in &m.faceuse(src)?.loops {
            for &eu in m.lu_edgeuses(lu)? {
                src_edges.push((m.eu_vertex(eu)?, m.eu_end_vertex(eu)?));
            }
        }
        let mut dst_segs = Vec::new();
        for &lu in &m.faceuse(dst)?.loops {
            for &eu in m.lu_edgeuses(lu)? {
                let (c, d) = m.eu_points(eu)?;
                dst_segs.push((frame.project(&c), frame.project(&d)));
            }
        }

        let mut recorded = 0;
        for (a, b) in src_edges {
            let (pa, pb) = (m.vertex_point(a)?, m.vertex_point(b)?);
            let (qa, qb) = (frame.project(&pa), frame.project(&pb));
            let len = (qb - qa).norm();
            if len <= self.tol.dist {
                continue;
            }
            let end_gap = self.tol.dist / len;
            let mut ts: Vec<f64> = Vec::new();
            for (qc, qd) in &dst_segs {
                for q in [qc, qd] {
                    if dist_point_segment_2d(q, &qa, &qb) <= self.tol.dist {
                        ts.push(segment_param_2d(q, &qa, &qb));
                    }
                }
                if let Some((t, u)) = segment_intersection_2d(&qa, &qb, qc, qd) {
                    if (0.0..=1.0).contains(&u) {
                        ts.push(t);
                    }
                }
            }
            ts.retain(|&t| t > end_gap && t < 1.0 - end_gap);
            ts.sort_by(f64::total_cmp);
            ts.dedup_by(|x, y| (*x - *y) <= end_gap);
            let params: Vec<f64> = std::iter::once(0.0).chain(ts).chain(std::iter::once(1.0)).collect();

            let mut kept = Vec::new();
            for k in 0..params.len() - 1 {
                let mid = pa + (pb - pa) * ((params[k] + params[k + 1]) / 2.0);
                if matches!(m.class_pnt_f(&mid, dst, &self.tol)?, PointClass::In | PointClass::On) {
                    kept.push(k);
                }
            }
            let mut verts: FxHashMap<usize, VertexKey> = FxHashMap::default();
            for k in kept {
                for i in [k, k + 1] {
                    if verts.contains_key(&i) {
                        continue;
                    }
                    let v = if i == 0 {
                        a
                    } else if i == params.len() - 1 {
                        b
                    } else {
                        let p = pa + (pb - pa) * params[i];
                        m.find_or_add_vertex(&mut self.index, p, self.tol.dist)?
                    };
                    let v = self.resolve(v);
                    self.break_face_at(m, src, v)?;
                    self.break_face_at(m, dst, v)?;
                    verts.insert(i, v);
                }
                if self.record(m, dst, verts[&k], verts[&(k + 1)])? {
                    recorded += 1;
                }
            }
        }
        Ok(recorded)
    }
}

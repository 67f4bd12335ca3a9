// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric records and queries.
//!
//! The first half of this module holds the plain geometric types the kernel
//! stores (planes, line segments, bounding boxes) and the 2D helpers used once
//! a face has been projected onto its plane. The second half adds geometric
//! queries on [`Model`] entities: vertex positions, faceuse normals, loop
//! polygons, areas, volumes and bounding boxes.

use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::{FaceGeometry, LoopContents, Model, Orientation};
use crate::tol::Tolerance;

// ============================================================================
// Geometric records
// ============================================================================

/// Plane `normal · p = d` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> Option<Self> {
        let len = normal.norm();
        if len < 1e-15 {
            return None;
        }
        let n = normal / len;
        Some(Self {
            normal: n,
            d: n.dot(&point.coords),
        })
    }

    /// Best-fit plane of a closed polygon by Newell's method.
    pub fn from_polygon(points: &[Point3<f64>]) -> Option<Self> {
        let normal = newell_normal(points)?;
        let n = points.len() as f64;
        let centroid = points.iter().fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords) / n;
        Some(Self {
            normal,
            d: normal.dot(&centroid),
        })
    }

    /// Signed distance from the plane, positive on the normal side.
    pub fn dist(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.d
    }

    /// The same plane with the opposite normal.
    pub fn reversed(&self) -> Self {
        Self {
            normal: -self.normal,
            d: -self.d,
        }
    }

    /// Whether `other` describes the same plane (either normal direction).
    pub fn coincident(&self, other: &Plane, tol: &Tolerance) -> bool {
        let cos = self.normal.dot(&other.normal);
        if cos.abs() < tol.para {
            return false;
        }
        let d = if cos < 0.0 { -other.d } else { other.d };
        (self.d - d).abs() <= tol.dist
    }

    /// Line where two planes cross, as `(point, unit direction)`.
    ///
    /// Returns `None` when the planes are parallel within `tol.para`.
    pub fn intersect(&self, other: &Plane, tol: &Tolerance) -> Option<(Point3<f64>, Vector3<f64>)> {
        let dir = self.normal.cross(&other.normal);
        let len = dir.norm();
        if len < 1e-12 || self.normal.dot(&other.normal).abs() >= tol.para {
            return None;
        }
        // Point on both planes closest to the origin.
        let n1n2 = self.normal.dot(&other.normal);
        let det = 1.0 - n1n2 * n1n2;
        let c1 = (self.d - other.d * n1n2) / det;
        let c2 = (other.d - self.d * n1n2) / det;
        let point = Point3::from(self.normal * c1 + other.normal * c2);
        Some((point, dir / len))
    }
}

/// Reference to a NURBS surface held by an external evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceRef {
    pub id: u64,
    pub order: [u32; 2],
}

/// Reference to a NURBS curve held by an external evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurveRef {
    pub id: u64,
    pub order: u32,
}

/// Infinite line carrying one or more colinear edges: a point and a
/// direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSeg {
    pub point: Point3<f64>,
    pub dir: Vector3<f64>,
}

impl LineSeg {
    /// Line through two points. Degenerate for coincident points.
    pub fn through(a: &Point3<f64>, b: &Point3<f64>) -> Self {
        Self {
            point: *a,
            dir: b - a,
        }
    }

    /// Distance from `p` to the infinite line.
    pub fn dist_to_point(&self, p: &Point3<f64>) -> f64 {
        let len = self.dir.norm();
        if len < 1e-15 {
            return (p - self.point).norm();
        }
        (p - self.point).cross(&(self.dir / len)).norm()
    }

    /// Whether both lines coincide within tolerance.
    pub fn colinear(&self, other: &LineSeg, tol: &Tolerance) -> bool {
        let (la, lb) = (self.dir.norm(), other.dir.norm());
        if la < 1e-15 || lb < 1e-15 {
            return false;
        }
        let cos = self.dir.dot(&other.dir) / (la * lb);
        cos.abs() >= tol.para
            && self.dist_to_point(&other.point) <= tol.dist
            && self.dist_to_point(&(other.point + other.dir)) <= tol.dist
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    /// An inverted box that any `extend` call replaces.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Box around a set of points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.extend(p);
        }
        bb
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Overlap test with the boxes grown by `tol`.
    pub fn overlaps(&self, other: &BoundingBox, tol: f64) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        (0..3).all(|i| self.min[i] - tol <= other.max[i] && other.min[i] - tol <= self.max[i])
    }

    pub fn contains(&self, p: &Point3<f64>, tol: f64) -> bool {
        !self.is_empty() && (0..3).all(|i| p[i] >= self.min[i] - tol && p[i] <= self.max[i] + tol)
    }
}

/// Orthonormal 2D frame on a plane, used to project faces.
///
/// `u × v == normal`, so counter-clockwise in 2D means counter-clockwise
/// seen from the normal side.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub origin: Point3<f64>,
    pub u: Vector3<f64>,
    pub v: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl Frame {
    /// Frame with the given origin and unit normal.
    pub fn new(origin: Point3<f64>, normal: Vector3<f64>) -> Self {
        let axis = if normal.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = (axis - normal * axis.dot(&normal)).normalize();
        let v = normal.cross(&u);
        Self {
            origin,
            u,
            v,
            normal,
        }
    }

    /// Frame on a plane, origin at the foot of the world origin.
    pub fn on_plane(plane: &Plane) -> Self {
        Self::new(Point3::from(plane.normal * plane.d), plane.normal)
    }

    pub fn project(&self, p: &Point3<f64>) -> Point2<f64> {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u), d.dot(&self.v))
    }

    pub fn lift(&self, q: &Point2<f64>) -> Point3<f64> {
        self.origin + self.u * q.x + self.v * q.y
    }

    /// Angle of a 3D direction within the frame, in `[0, 2π)`.
    pub fn angle_of(&self, dir: &Vector3<f64>) -> f64 {
        let a = dir.dot(&self.v).atan2(dir.dot(&self.u));
        if a < 0.0 {
            a + std::f64::consts::TAU
        } else {
            a
        }
    }
}

// ============================================================================
// Polygon helpers
// ============================================================================

/// Unit polygon normal by Newell's method; `None` for degenerate input.
///
/// The direction follows the right-hand rule relative to the winding order.
pub fn newell_normal(points: &[Point3<f64>]) -> Option<Vector3<f64>> {
    if points.len() < 3 {
        return None;
    }
    let mut normal = Vector3::<f64>::zeros();
    let n = points.len();
    for i in 0..n {
        let curr = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (curr.y - next.y) * (curr.z + next.z);
        normal.y += (curr.z - next.z) * (curr.x + next.x);
        normal.z += (curr.x - next.x) * (curr.y + next.y);
    }
    let len = normal.norm();
    if len < 1e-15 {
        return None;
    }
    Some(normal / len)
}

/// Vector area of a closed 3D polygon (half the Newell sum).
pub fn polygon_vector_area(points: &[Point3<f64>]) -> Vector3<f64> {
    if points.len() < 3 {
        return Vector3::zeros();
    }
    let p0 = points[0];
    let mut total = Vector3::<f64>::zeros();
    for i in 1..points.len() - 1 {
        total += (points[i] - p0).cross(&(points[i + 1] - p0));
    }
    total / 2.0
}

/// Shoelace signed area; positive for counter-clockwise polygons.
pub fn signed_area_2d(poly: &[Point2<f64>]) -> f64 {
    let n = poly.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = &poly[i];
        let b = &poly[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Crossing-number containment test, half-open on vertices.
pub fn point_in_polygon_2d(p: &Point2<f64>, poly: &[Point2<f64>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&poly[i], &poly[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to the segment `a`–`b`.
pub fn dist_point_segment_2d(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-30 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Parameter of the projection of `p` onto `a`–`b` (unclamped).
pub fn segment_param_2d(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-30 {
        return 0.0;
    }
    (p - a).dot(&ab) / len_sq
}

/// Parameters `(t, s)` where segments `a`–`b` and `c`–`d` cross.
///
/// Parallel segments return `None`; the caller checks the ranges.
pub fn segment_intersection_2d(
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
    d: &Point2<f64>,
) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denom = r.x * s.y - r.y * s.x;
    let scale = r.norm() * s.norm();
    if scale < 1e-30 || denom.abs() < 1e-12 * scale {
        return None;
    }
    let ac = c - a;
    let t = (ac.x * s.y - ac.y * s.x) / denom;
    let u = (ac.x * r.y - ac.y * r.x) / denom;
    Some((t, u))
}

/// Triangle signed area in 2D.
pub fn triangle_area_2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)) / 2.0
}

// ============================================================================
// Model geometry queries
// ============================================================================

impl Model {
    /// Position of a vertex.
    pub fn vertex_point(&self, v: VertexKey) -> Result<Point3<f64>> {
        self.vertex(v)?
            .point
            .ok_or(Error::MissingGeometry(v.into()))
    }

    /// Position of the vertex a vertexuse refers to.
    pub fn vu_point(&self, vu: VertexUseKey) -> Result<Point3<f64>> {
        self.vertex_point(self.vertexuse(vu)?.vertex)
    }

    /// Start and end positions of an edgeuse.
    pub fn eu_points(&self, eu: EdgeUseKey) -> Result<(Point3<f64>, Point3<f64>)> {
        Ok((
            self.vertex_point(self.eu_vertex(eu)?)?,
            self.vertex_point(self.eu_end_vertex(eu)?)?,
        ))
    }

    /// Corner positions of a loopuse in traversal order.
    pub fn lu_points(&self, lu: LoopUseKey) -> Result<Vec<Point3<f64>>> {
        self.lu_vertices(lu)?
            .into_iter()
            .map(|v| self.vertex_point(v))
            .collect()
    }

    /// Plane record of a face, if it carries planar geometry.
    pub fn face_plane(&self, f: FaceKey) -> Result<Plane> {
        let face = self.face(f)?;
        let gk = face.geom.ok_or(Error::MissingGeometry(f.into()))?;
        match &self.face_geom(gk)?.geometry {
            FaceGeometry::Plane(p) => Ok(if face.flip { p.reversed() } else { *p }),
            FaceGeometry::Snurb(_) => Err(Error::UnsupportedGeometry(f.into())),
        }
    }

    /// Plane of a faceuse with its normal pointing out of the material
    /// the faceuse bounds.
    pub fn fu_plane(&self, fu: FaceUseKey) -> Result<Plane> {
        let data = self.faceuse(fu)?;
        let plane = self.face_plane(data.face)?;
        Ok(match data.orientation {
            Orientation::Opposite => plane.reversed(),
            _ => plane,
        })
    }

    /// Outward unit normal of a faceuse.
    ///
    /// Falls back to the Newell normal of the first loop when the face has
    /// no geometry yet.
    pub fn fu_normal(&self, fu: FaceUseKey) -> Result<Vector3<f64>> {
        match self.fu_plane(fu) {
            Ok(p) => Ok(p.normal),
            Err(Error::MissingGeometry(_)) => {
                let data = self.faceuse(fu)?;
                for &lu in &data.loops {
                    if self.loopuse(lu)?.orientation == Orientation::Opposite {
                        continue;
                    }
                    if let Some(n) = newell_normal(&self.lu_points(lu)?) {
                        return Ok(n);
                    }
                }
                Err(Error::MissingGeometry(data.face.into()))
            }
            Err(e) => Err(e),
        }
    }

    /// Computes the plane of a face from its outer loops, oriented by the
    /// faceuse given.
    pub fn face_plane_from_loops(&self, fu: FaceUseKey) -> Result<Plane> {
        let data = self.faceuse(fu)?;
        let mut normal = Vector3::<f64>::zeros();
        let mut points = Vec::new();
        for &lu in &data.loops {
            let pts = self.lu_points(lu)?;
            // Holes wind the other way, so their vector area still adds up.
            normal += polygon_vector_area(&pts);
            points.extend(pts);
        }
        if points.is_empty() {
            return Err(Error::precondition("face has no loops"));
        }
        let len = normal.norm();
        if len < 1e-15 {
            return Err(Error::precondition("face loops enclose no area"));
        }
        let n = normal / len;
        let centroid = points.iter().fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords)
            / points.len() as f64;
        Ok(Plane {
            normal: n,
            d: n.dot(&centroid),
        })
    }

    /// Projection frame on the plane of a faceuse. Faces without geometry
    /// use the plane of their loops.
    pub fn fu_frame(&self, fu: FaceUseKey) -> Result<Frame> {
        let plane = match self.fu_plane(fu) {
            Err(Error::MissingGeometry(_)) => self.face_plane_from_loops(fu)?,
            other => other?,
        };
        Ok(Frame::on_plane(&plane))
    }

    /// Bounding box of a loopuse.
    pub fn lu_bbox(&self, lu: LoopUseKey) -> Result<BoundingBox> {
        Ok(BoundingBox::from_points(&self.lu_points(lu)?))
    }

    /// Bounding box of a face (both faceuses share it).
    pub fn fu_bbox(&self, fu: FaceUseKey) -> Result<BoundingBox> {
        let mut bb = BoundingBox::empty();
        for &lu in &self.faceuse(fu)?.loops {
            bb = bb.union(&self.lu_bbox(lu)?);
        }
        Ok(bb)
    }

    /// Bounding box of everything a shell holds.
    pub fn shell_bbox(&self, s: ShellKey) -> Result<BoundingBox> {
        let mut bb = BoundingBox::empty();
        for v in self.vertex_tabulate(s.into())? {
            if let Some(p) = self.vertex(v)?.point {
                bb.extend(&p);
            }
        }
        Ok(bb)
    }

    /// Recomputes and caches the bounding boxes of a region and its shells.
    ///
    /// Vertices without a position are skipped.
    pub fn region_bbox(&mut self, r: RegionKey) -> Result<BoundingBox> {
        let shells = self.region(r)?.shells.clone();
        let mut bb = BoundingBox::empty();
        for s in shells {
            let sb = self.shell_bbox(s)?;
            self.shell_mut(s)?.bbox = Some(sb);
            bb = bb.union(&sb);
        }
        self.region_mut(r)?.bbox = Some(bb);
        Ok(bb)
    }

    /// Area of a faceuse: outer loops minus holes.
    pub fn fu_area(&self, fu: FaceUseKey) -> Result<f64> {
        let normal = self.fu_normal(fu)?;
        let mut area = 0.0;
        for &lu in &self.faceuse(fu)?.loops {
            if matches!(self.loopuse(lu)?.contents, LoopContents::Vertex(_)) {
                continue;
            }
            area += polygon_vector_area(&self.lu_points(lu)?).dot(&normal);
        }
        Ok(area)
    }

    /// Signed volume enclosed by the outward faceuses of a shell.
    ///
    /// Sums signed tetrahedra from the origin over a fan of every loop;
    /// hole loops wind backwards and subtract themselves.
    pub fn shell_volume(&self, s: ShellKey) -> Result<f64> {
        let mut volume = 0.0;
        for &fu in &self.shell(s)?.faceuses {
            if self.faceuse(fu)?.orientation != Orientation::Same {
                continue;
            }
            for &lu in &self.faceuse(fu)?.loops {
                let pts = self.lu_points(lu)?;
                if pts.len() < 3 {
                    continue;
                }
                let p0 = pts[0].coords;
                for i in 1..pts.len() - 1 {
                    let p1 = pts[i].coords;
                    let p2 = pts[i + 1].coords;
                    volume += p0.dot(&p1.cross(&p2)) / 6.0;
                }
            }
        }
        Ok(volume)
    }

    /// Sum of shell volumes in a region.
    pub fn region_volume(&self, r: RegionKey) -> Result<f64> {
        let mut total = 0.0;
        for &s in &self.region(r)?.shells {
            total += self.shell_volume(s)?;
        }
        Ok(total)
    }
}

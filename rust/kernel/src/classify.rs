// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point, loop, face and shell classification.
//!
//! Loops and faces are classified in the 2D frame of their face by
//! crossing count, with an explicit distance test against the boundary
//! first so that points within `tol.dist` of an edge come back `On`.
//! Shells are classified by firing rays (see [`crate::rt`]).
//!
//! [`Model::classify_s_vs_s`] produces the table the Boolean evaluator
//! consumes: one of eight classes per loop, faceuse, wire edge and lone
//! vertex of either shell.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::config::DebugFlags;
use crate::error::{Error, Result};
use crate::geometry::{dist_point_segment_2d, newell_normal, Frame};
use crate::index::IndexTable;
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

/// Where a point lies relative to a loop, face or shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointClass {
    In,
    On,
    Out,
    Unknown,
}

/// Classification of a piece of one Boolean operand against the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Class {
    AinB,
    AonBshared,
    AonBanti,
    AoutB,
    BinA,
    BonAshared,
    BonAanti,
    BoutA,
}

impl Class {
    /// Builds the class of a piece of operand A (`is_a`) or B.
    ///
    /// `On` needs `shared` to pick between the shared and anti classes.
    pub fn of(is_a: bool, pc: PointClass, shared: bool) -> Option<Class> {
        Some(match (is_a, pc) {
            (true, PointClass::In) => Class::AinB,
            (true, PointClass::Out) => Class::AoutB,
            (true, PointClass::On) if shared => Class::AonBshared,
            (true, PointClass::On) => Class::AonBanti,
            (false, PointClass::In) => Class::BinA,
            (false, PointClass::Out) => Class::BoutA,
            (false, PointClass::On) if shared => Class::BonAshared,
            (false, PointClass::On) => Class::BonAanti,
            (_, PointClass::Unknown) => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Class::AinB => "AinB",
            Class::AonBshared => "AonBshared",
            Class::AonBanti => "AonBanti",
            Class::AoutB => "AoutB",
            Class::BinA => "BinA",
            Class::BonAshared => "BonAshared",
            Class::BonAanti => "BonAanti",
            Class::BoutA => "BoutA",
        }
    }
}

/// Per-index classification results of a shell-vs-shell pass.
#[derive(Debug, Clone)]
pub struct ClassTable {
    table: IndexTable<Option<Class>>,
}

impl ClassTable {
    pub fn for_model(m: &Model) -> Self {
        Self {
            table: IndexTable::for_model(m),
        }
    }

    pub fn set(&mut self, index: usize, class: Class) {
        self.table.set(index, Some(class));
    }

    pub fn get(&self, index: usize) -> Option<Class> {
        self.table.get(index).copied().flatten()
    }

    /// Class recorded for an entity.
    pub fn class_of(&self, m: &Model, key: TopologyKey) -> Result<Option<Class>> {
        Ok(self.get(m.index_of(key)?))
    }

    /// Number of entities holding `class`.
    pub fn count(&self, class: Class) -> usize {
        self.table.iter().filter(|(_, c)| **c == Some(class)).count()
    }
}

// ============================================================================
// Wedges
// ============================================================================

/// Where a wedge lies relative to the line through its apex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WedgeClass {
    /// Entirely within `[180°, 360°]`.
    Left,
    /// Straddles 180°.
    Cross,
    /// Entirely within `[0°, 180°]`.
    Right,
}

/// Angular zero; wedge angles are in degrees.
const WEDGE_EPS: f64 = 0.01;

fn near_zero(x: f64) -> bool {
    x.abs() <= WEDGE_EPS
}

/// Classifies the wedge from angle `a` to angle `b` (degrees, measured
/// from the line direction) against the 180° ray.
pub fn wedge_class(a: f64, b: f64) -> WedgeClass {
    let ha = a - 180.0;
    let hb = b - 180.0;
    if near_zero(ha) {
        if near_zero(hb) {
            WedgeClass::Cross
        } else if hb < 0.0 {
            WedgeClass::Right
        } else {
            WedgeClass::Left
        }
    } else if ha < 0.0 {
        if hb <= WEDGE_EPS {
            WedgeClass::Right
        } else {
            WedgeClass::Cross
        }
    } else if hb >= -WEDGE_EPS {
        WedgeClass::Left
    } else {
        WedgeClass::Cross
    }
}

/// Relation between two wedges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WedgeCompare {
    Overlap,
    NoOverlap,
    /// Wedge AB lies within wedge CD.
    AbInCd,
    /// Wedge CD lies within wedge AB.
    CdInAb,
    Identical,
}

fn smash_angle(a: f64) -> f64 {
    if a <= WEDGE_EPS {
        0.0
    } else if near_zero(a - 180.0) {
        180.0
    } else if a >= 360.0 - WEDGE_EPS {
        360.0
    } else {
        a
    }
}

/// Compares wedge `a..b` with wedge `c..d` (degrees). Endpoint order
/// within a wedge does not matter.
pub fn compare_2_wedges(a: f64, b: f64, c: f64, d: f64) -> WedgeCompare {
    let (mut a, mut b, mut c, mut d) = (smash_angle(a), smash_angle(b), smash_angle(c), smash_angle(d));
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }
    if c > d {
        std::mem::swap(&mut c, &mut d);
    }
    if a == c && b == d {
        return WedgeCompare::Identical;
    }
    let a_in_cd = c <= a && a <= d;
    let b_in_cd = c <= b && b <= d;
    let c_in_ab = a < c && c < b;
    let d_in_ab = a < d && d < b;

    if a_in_cd && b_in_cd {
        if c_in_ab || d_in_ab {
            WedgeCompare::Overlap
        } else {
            WedgeCompare::AbInCd
        }
    } else if c_in_ab && d_in_ab {
        if a_in_cd || b_in_cd {
            WedgeCompare::Overlap
        } else {
            WedgeCompare::CdInAb
        }
    } else if !a_in_cd && !b_in_cd && !c_in_ab && !d_in_ab {
        WedgeCompare::NoOverlap
    } else {
        WedgeCompare::Overlap
    }
}

// ============================================================================
// Point classification
// ============================================================================

/// Crossing parity of `p` against a set of segments, half-open in y.
fn crossing_parity(p: &Point2<f64>, segs: &[(Point2<f64>, Point2<f64>)]) -> bool {
    let mut inside = false;
    for (a, b) in segs {
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

impl Model {
    /// 2D frame for classifying against a loop: the face frame, or the
    /// loop's own plane for wire loops.
    fn lu_frame(&self, lu: LoopUseKey) -> Result<Frame> {
        if let LoopUseParent::Face(fu) = self.loopuse(lu)?.up {
            return self.fu_frame(fu);
        }
        let pts = self.lu_points(lu)?;
        let normal = newell_normal(&pts).ok_or_else(|| Error::precondition("wire loop encloses no area"))?;
        Ok(Frame::new(pts[0], normal))
    }

    /// Projected boundary segments of a loop, skipping uses of `except`.
    fn lu_segments_2d(
        &self,
        lu: LoopUseKey,
        frame: &Frame,
        except: Option<EdgeKey>,
    ) -> Result<Vec<(Point2<f64>, Point2<f64>)>> {
        let mut segs = Vec::new();
        for &eu in self.lu_edgeuses(lu)? {
            if except.is_some_and(|e| self.edgeuse(eu).map(|d| d.edge == e).unwrap_or(false)) {
                continue;
            }
            let (a, b) = self.eu_points(eu)?;
            segs.push((frame.project(&a), frame.project(&b)));
        }
        Ok(segs)
    }

    fn classify_in_loop(
        &self,
        pt: &Point3<f64>,
        lu: LoopUseKey,
        except: Option<EdgeKey>,
        tol: &Tolerance,
    ) -> Result<PointClass> {
        if !pt.coords.iter().all(|c| c.is_finite()) {
            return Ok(PointClass::Unknown);
        }
        if let LoopContents::Vertex(vu) = self.loopuse(lu)?.contents {
            let d = (self.vu_point(vu)? - pt).norm();
            return Ok(if d <= tol.dist {
                PointClass::On
            } else {
                PointClass::Out
            });
        }
        let frame = self.lu_frame(lu)?;
        let p = frame.project(pt);
        let segs = self.lu_segments_2d(lu, &frame, except)?;
        if segs
            .iter()
            .any(|(a, b)| dist_point_segment_2d(&p, a, b) <= tol.dist)
        {
            return Ok(PointClass::On);
        }
        Ok(if crossing_parity(&p, &segs) {
            PointClass::In
        } else {
            PointClass::Out
        })
    }

    /// Classifies a point against the area a loop encloses, in the loop's
    /// plane, regardless of whether the loop is a boundary or a hole.
    ///
    /// Points within `tol.dist` of the boundary are `On`. `Unknown` comes
    /// back only for a non-finite point.
    pub fn classify_pnt_loop(&self, pt: &Point3<f64>, lu: LoopUseKey, tol: &Tolerance) -> Result<PointClass> {
        self.classify_in_loop(pt, lu, None, tol)
    }

    /// Like [`Model::classify_pnt_loop`] with the uses of edge `e` left out
    /// of the boundary.
    pub fn classify_pnt_loop_except(
        &self,
        pt: &Point3<f64>,
        lu: LoopUseKey,
        e: EdgeKey,
        tol: &Tolerance,
    ) -> Result<PointClass> {
        self.classify_in_loop(pt, lu, Some(e), tol)
    }

    /// Classifies a point against the area of a face.
    ///
    /// Points off the face plane by more than `tol.dist` are `Out`. Inside
    /// means inside an odd number of the face's loops, so holes subtract.
    pub fn class_pnt_f(&self, pt: &Point3<f64>, fu: FaceUseKey, tol: &Tolerance) -> Result<PointClass> {
        let plane = match self.fu_plane(fu) {
            Err(Error::MissingGeometry(_)) => self.face_plane_from_loops(fu)?,
            other => other?,
        };
        if plane.dist(pt).abs() > tol.dist {
            return Ok(PointClass::Out);
        }
        let mut inside = false;
        for &lu in &self.faceuse(fu)?.loops {
            match self.classify_pnt_loop(pt, lu, tol)? {
                PointClass::On => return Ok(PointClass::On),
                PointClass::In => {
                    if matches!(self.loopuse(lu)?.contents, LoopContents::Edges(_)) {
                        inside = !inside;
                    }
                }
                PointClass::Unknown => return Ok(PointClass::Unknown),
                PointClass::Out => {}
            }
        }
        Ok(if inside { PointClass::In } else { PointClass::Out })
    }

    /// Whether a point touches the wires or lone vertex of a shell.
    fn pt_on_shell_wires(&self, pt: &Point3<f64>, s: ShellKey, tol: &Tolerance) -> Result<bool> {
        let sd = self.shell(s)?;
        if let Some(vu) = sd.vertexuse {
            if (self.vu_point(vu)? - pt).norm() <= tol.dist {
                return Ok(true);
            }
        }
        let mut eus = sd.wire_edges.clone();
        for &lu in &sd.wire_loops {
            if let LoopContents::Vertex(vu) = self.loopuse(lu)?.contents {
                if (self.vu_point(vu)? - pt).norm() <= tol.dist {
                    return Ok(true);
                }
            }
            eus.extend_from_slice(self.lu_edgeuses(lu)?);
        }
        for eu in eus {
            let (a, b) = self.eu_points(eu)?;
            if dist_point_segment_3d(pt, &a, &b) <= tol.dist {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Classifies a point against the volume a shell bounds.
    ///
    /// A point on a face, wire or lone vertex is `On`. Otherwise rays are
    /// fired in a fixed series of directions until one gives a clean
    /// crossing count; `Unknown` means every direction grazed.
    pub fn class_pt_s(&self, pt: &Point3<f64>, s: ShellKey, tol: &Tolerance) -> Result<PointClass> {
        let bbox = self.shell_bbox(s)?;
        if !bbox.contains(pt, tol.dist) {
            return Ok(PointClass::Out);
        }
        for fu in self.shell_faces(s)? {
            if matches!(self.class_pnt_f(pt, fu, tol)?, PointClass::In | PointClass::On) {
                return Ok(PointClass::On);
            }
        }
        if self.pt_on_shell_wires(pt, s, tol)? {
            return Ok(PointClass::On);
        }
        if self.shell(s)?.faceuses.is_empty() {
            return Ok(PointClass::Out);
        }
        self.class_pt_s_by_rays(pt, s, tol)
    }

    /// Point used to classify a piece of shell: a face interior point, a
    /// wire edge midpoint, or a vertex.
    fn class_probe_point(&self, key: TopologyKey) -> Result<Point3<f64>> {
        match key {
            TopologyKey::FaceUse(fu) => self.fu_interior_point(fu),
            TopologyKey::EdgeUse(eu) => {
                let (a, b) = self.eu_points(eu)?;
                Ok(nalgebra::center(&a, &b))
            }
            TopologyKey::LoopUse(lu) => match self.loopuse(lu)?.contents {
                LoopContents::Vertex(vu) => self.vu_point(vu),
                LoopContents::Edges(ref eus) => {
                    let eu = *eus.first().ok_or_else(|| Error::precondition("empty loop"))?;
                    let (a, b) = self.eu_points(eu)?;
                    Ok(nalgebra::center(&a, &b))
                }
            },
            TopologyKey::VertexUse(vu) => self.vu_point(vu),
            other => Err(Error::precondition(format!("cannot classify a {}", other.kind()))),
        }
    }

    /// Classifies one face of a shell against another shell.
    ///
    /// Coplanar overlap with a face of `other` is `On`, shared when the
    /// outward normals agree.
    fn classify_face_vs_shell(
        &self,
        fu: FaceUseKey,
        other: ShellKey,
        tol: &Tolerance,
    ) -> Result<(PointClass, bool)> {
        let pt = self.class_probe_point(TopologyKey::FaceUse(fu))?;
        let normal = self.fu_normal(fu)?;
        for ofu in self.shell_faces(other)? {
            if matches!(self.class_pnt_f(&pt, ofu, tol)?, PointClass::In | PointClass::On) {
                let shared = self.fu_normal(ofu)?.dot(&normal) > 0.0;
                return Ok((PointClass::On, shared));
            }
        }
        let pc = match self.class_pt_s(&pt, other, tol)? {
            // On a wire of the other shell only: no volume there.
            PointClass::On => PointClass::Out,
            pc => pc,
        };
        Ok((pc, true))
    }

    fn classify_piece(
        &self,
        key: TopologyKey,
        other: ShellKey,
        tol: &Tolerance,
    ) -> Result<(PointClass, bool)> {
        if let TopologyKey::FaceUse(fu) = key {
            return self.classify_face_vs_shell(fu, other, tol);
        }
        let pt = self.class_probe_point(key)?;
        Ok((self.class_pt_s(&pt, other, tol)?, true))
    }

    /// Pieces of a shell that get classified: outward faceuses, wire loops,
    /// wire edges (one of each mate pair) and the lone vertexuse.
    fn class_pieces(&self, s: ShellKey) -> Result<Vec<TopologyKey>> {
        let sd = self.shell(s)?;
        let mut pieces: Vec<TopologyKey> = self.shell_faces(s)?.into_iter().map(Into::into).collect();
        let mut seen_loops = Vec::new();
        for &lu in &sd.wire_loops {
            let lp = self.loopuse(lu)?.lp;
            if !seen_loops.contains(&lp) {
                seen_loops.push(lp);
                pieces.push(lu.into());
            }
        }
        let mut seen_edges = Vec::new();
        for &eu in &sd.wire_edges {
            let e = self.edgeuse(eu)?.edge;
            if !seen_edges.contains(&e) {
                seen_edges.push(e);
                pieces.push(eu.into());
            }
        }
        if let Some(vu) = sd.vertexuse {
            pieces.push(vu.into());
        }
        Ok(pieces)
    }

    /// Indices that take the class of a piece: the piece, its mate and,
    /// for a face, every loopuse on either side.
    fn piece_indices(&self, key: TopologyKey) -> Result<Vec<usize>> {
        let mut out = vec![self.index_of(key)?];
        match key {
            TopologyKey::FaceUse(fu) => {
                let mate = self.faceuse(fu)?.mate;
                out.push(self.faceuse(mate)?.index);
                for side in [fu, mate] {
                    for &lu in &self.faceuse(side)?.loops {
                        out.push(self.loopuse(lu)?.index);
                    }
                }
            }
            TopologyKey::LoopUse(lu) => {
                let mate = self.loopuse(lu)?.mate;
                out.push(self.loopuse(mate)?.index);
            }
            TopologyKey::EdgeUse(eu) => out.push(self.edgeuse(self.eu_mate(eu)?)?.index),
            _ => {}
        }
        Ok(out)
    }

    /// Classifies every piece of `sa` against `sb` and every piece of `sb`
    /// against `sa`.
    ///
    /// A piece that cannot be classified is retried once with a relaxed
    /// tolerance before [`Error::AmbiguousClassification`] is returned.
    pub fn classify_s_vs_s(&self, sa: ShellKey, sb: ShellKey, tol: &Tolerance) -> Result<ClassTable> {
        tol.validate()?;
        let relaxed = tol.relaxed();
        let verbose = self.config.debug.contains(DebugFlags::CLASSIFY);
        let mut table = ClassTable::for_model(self);
        for (is_a, from, against) in [(true, sa, sb), (false, sb, sa)] {
            for key in self.class_pieces(from)? {
                let (mut pc, mut shared) = self.classify_piece(key, against, tol)?;
                if pc == PointClass::Unknown {
                    (pc, shared) = self.classify_piece(key, against, &relaxed)?;
                }
                let class = Class::of(is_a, pc, shared).ok_or_else(|| {
                    let index = match key {
                        TopologyKey::FaceUse(fu) => self
                            .faceuse(fu)
                            .ok()
                            .and_then(|d| d.loops.first().copied())
                            .and_then(|lu| self.loopuse(lu).ok())
                            .map(|d| d.index),
                        other => self.index_of(other).ok(),
                    };
                    Error::AmbiguousClassification {
                        index: index.unwrap_or_default(),
                    }
                })?;
                if verbose {
                    tracing::trace!(piece = ?key, class = class.name(), "classified");
                }
                for i in self.piece_indices(key)? {
                    table.set(i, class);
                }
            }
        }
        tracing::debug!(
            a_in = table.count(Class::AinB),
            a_out = table.count(Class::AoutB),
            b_in = table.count(Class::BinA),
            b_out = table.count(Class::BoutA),
            "classified shells"
        );
        Ok(table)
    }
}

/// Distance from `p` to the segment `a`–`b` in 3D.
pub(crate) fn dist_point_segment_3d(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-30 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::make_box;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    fn square_with_hole(m: &mut Model) -> FaceUseKey {
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let fu = m
            .make_face_from_points(
                s,
                &[
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(4.0, 0.0, 0.0),
                    Point3::new(4.0, 4.0, 0.0),
                    Point3::new(0.0, 4.0, 0.0),
                ],
            )
            .unwrap();
        let hole: Vec<_> = [[1.0, 1.0], [1.0, 3.0], [3.0, 3.0], [3.0, 1.0]]
            .iter()
            .map(|[x, y]| Some(m.alloc_vertex(Some(Point3::new(*x, *y, 0.0)))))
            .collect();
        m.add_loop_to_face(s, Some(fu), &hole, Orientation::Opposite)
            .unwrap();
        fu
    }

    #[test]
    fn wedge_classes() {
        assert_eq!(wedge_class(10.0, 170.0), WedgeClass::Right);
        assert_eq!(wedge_class(190.0, 350.0), WedgeClass::Left);
        assert_eq!(wedge_class(90.0, 270.0), WedgeClass::Cross);
        assert_eq!(wedge_class(180.0, 180.0), WedgeClass::Cross);
        assert_eq!(wedge_class(180.0, 90.0), WedgeClass::Right);
        assert_eq!(wedge_class(180.005, 200.0), WedgeClass::Left);
    }

    #[test]
    fn wedge_comparison() {
        assert_eq!(compare_2_wedges(10.0, 50.0, 10.0, 50.0), WedgeCompare::Identical);
        assert_eq!(compare_2_wedges(50.0, 10.0, 10.0, 50.0), WedgeCompare::Identical);
        assert_eq!(compare_2_wedges(20.0, 40.0, 10.0, 50.0), WedgeCompare::AbInCd);
        assert_eq!(compare_2_wedges(10.0, 50.0, 20.0, 40.0), WedgeCompare::CdInAb);
        assert_eq!(compare_2_wedges(10.0, 50.0, 30.0, 90.0), WedgeCompare::Overlap);
        assert_eq!(compare_2_wedges(10.0, 50.0, 60.0, 90.0), WedgeCompare::NoOverlap);
        // Smashed to 0 and 360.
        assert_eq!(compare_2_wedges(0.001, 90.0, 0.0, 90.0), WedgeCompare::Identical);
    }

    #[test]
    fn point_vs_loop() {
        let mut m = Model::new();
        let fu = square_with_hole(&mut m);
        let loops = m.faceuse(fu).unwrap().loops.clone();
        let (outer, hole) = (loops[0], loops[1]);
        let t = tol();
        let p = Point3::new(2.0, 2.0, 0.0);
        assert_eq!(m.classify_pnt_loop(&p, outer, &t).unwrap(), PointClass::In);
        assert_eq!(m.classify_pnt_loop(&p, hole, &t).unwrap(), PointClass::In);
        let edge = Point3::new(4.0, 2.0, 0.0);
        assert_eq!(m.classify_pnt_loop(&edge, outer, &t).unwrap(), PointClass::On);
        let nan = Point3::new(f64::NAN, 0.0, 0.0);
        assert_eq!(m.classify_pnt_loop(&nan, outer, &t).unwrap(), PointClass::Unknown);
    }

    #[test]
    fn loop_except_ignores_edge() {
        let mut m = Model::new();
        let fu = square_with_hole(&mut m);
        let outer = m.faceuse(fu).unwrap().loops[0];
        let eu = m.lu_edgeuses(outer).unwrap()[0];
        let e = m.edgeuse(eu).unwrap().edge;
        let (a, b) = m.eu_points(eu).unwrap();
        let mid = nalgebra::center(&a, &b);
        assert_eq!(m.classify_pnt_loop(&mid, outer, &tol()).unwrap(), PointClass::On);
        assert_ne!(
            m.classify_pnt_loop_except(&mid, outer, e, &tol()).unwrap(),
            PointClass::On
        );
    }

    #[test]
    fn point_vs_face_with_hole() {
        let mut m = Model::new();
        let fu = square_with_hole(&mut m);
        let t = tol();
        assert_eq!(m.class_pnt_f(&Point3::new(0.5, 0.5, 0.0), fu, &t).unwrap(), PointClass::In);
        assert_eq!(m.class_pnt_f(&Point3::new(2.0, 2.0, 0.0), fu, &t).unwrap(), PointClass::Out);
        assert_eq!(m.class_pnt_f(&Point3::new(1.0, 2.0, 0.0), fu, &t).unwrap(), PointClass::On);
        assert_eq!(m.class_pnt_f(&Point3::new(0.5, 0.5, 0.1), fu, &t).unwrap(), PointClass::Out);
    }

    #[test]
    fn on_plane_outside_loop_is_out() {
        let mut m = Model::new();
        let fu = square_with_hole(&mut m);
        let p = Point3::new(7.0, 1.0, 0.0);
        assert_eq!(m.class_pnt_f(&p, fu, &tol()).unwrap(), PointClass::Out);
    }

    #[test]
    fn point_vs_box() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let t = tol();
        assert_eq!(m.class_pt_s(&Point3::new(0.5, 0.5, 0.5), s, &t).unwrap(), PointClass::In);
        assert_eq!(m.class_pt_s(&Point3::new(0.2, 0.7, 0.4), s, &t).unwrap(), PointClass::In);
        assert_eq!(m.class_pt_s(&Point3::new(1.5, 0.5, 0.5), s, &t).unwrap(), PointClass::Out);
        assert_eq!(m.class_pt_s(&Point3::new(1.0, 0.5, 0.5), s, &t).unwrap(), PointClass::On);
        assert_eq!(m.class_pt_s(&Point3::new(1.0, 1.0, 1.0), s, &t).unwrap(), PointClass::On);
    }

    #[test]
    fn lone_vertex_shell() {
        let mut m = Model::new();
        let (_, s, vu) = m.make_region_shell_vertex().unwrap();
        let v = m.vertexuse(vu).unwrap().vertex;
        m.set_vertex_point(v, Point3::new(1.0, 2.0, 3.0)).unwrap();
        let t = tol();
        assert_eq!(m.class_pt_s(&Point3::new(1.0, 2.0, 3.0), s, &t).unwrap(), PointClass::On);
        assert_eq!(m.class_pt_s(&Point3::new(1.0, 2.0, 3.5), s, &t).unwrap(), PointClass::Out);
        assert_eq!(m.class_pt_s(&Point3::new(9.0, 9.0, 9.0), s, &t).unwrap(), PointClass::Out);
    }

    #[test]
    fn disjoint_boxes_are_outside() {
        let mut m = Model::new();
        let (_, sa) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let (_, sb) = make_box(&mut m, Point3::new(3.0, 0.0, 0.0), Point3::new(4.0, 1.0, 1.0)).unwrap();
        let table = m.classify_s_vs_s(sa, sb, &tol()).unwrap();
        assert_eq!(table.count(Class::AinB), 0);
        for fu in m.shell_faces(sa).unwrap() {
            let lu = m.faceuse(fu).unwrap().loops[0];
            assert_eq!(table.class_of(&m, lu.into()).unwrap(), Some(Class::AoutB));
        }
        for fu in m.shell_faces(sb).unwrap() {
            assert_eq!(table.class_of(&m, fu.into()).unwrap(), Some(Class::BoutA));
        }
    }

    #[test]
    fn nested_box_is_inside() {
        let mut m = Model::new();
        let (_, sa) = make_box(&mut m, Point3::new(0.25, 0.25, 0.25), Point3::new(0.75, 0.75, 0.75)).unwrap();
        let (_, sb) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let table = m.classify_s_vs_s(sa, sb, &tol()).unwrap();
        for fu in m.shell_faces(sa).unwrap() {
            assert_eq!(table.class_of(&m, fu.into()).unwrap(), Some(Class::AinB));
        }
        for fu in m.shell_faces(sb).unwrap() {
            assert_eq!(table.class_of(&m, fu.into()).unwrap(), Some(Class::BoutA));
        }
    }

    #[test]
    fn coincident_boxes_are_shared() {
        let mut m = Model::new();
        let (_, sa) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let (_, sb) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let table = m.classify_s_vs_s(sa, sb, &tol()).unwrap();
        assert!(table.count(Class::AonBshared) > 0);
        for fu in m.shell_faces(sb).unwrap() {
            assert_eq!(table.class_of(&m, fu.into()).unwrap(), Some(Class::BonAshared));
        }
    }

    #[test]
    fn class_records_round_trip_through_json() {
        let text = serde_json::to_string(&Class::AonBanti).unwrap();
        assert_eq!(text, "\"AonBanti\"");
        let back: Class = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Class::AonBanti);
    }
}

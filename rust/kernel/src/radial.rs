// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Radial edge manager.
//!
//! The uses of one edge form a cycle: `eu → radial → mate → radial → …`.
//! Each edgeuse pair in the cycle is one side-pair of a face (or a wire).
//! When ordering is requested the pairs are sorted by the angle of their
//! face around the edge, measured from the face's inward "left" vector
//! (`N(fu) × dir(eu)`) in a frame perpendicular to the edge. Both uses of a
//! face get the same angle; wires get `-π` and sort first.

use nalgebra::Vector3;
use rustc_hash::FxHashMap;

use crate::classify::PointClass;
use crate::error::{Error, Result};
use crate::geometry::Frame;
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

/// Angle recorded for wire edgeuses.
pub const WIRE_ANGLE: f64 = -std::f64::consts::PI;

/// One edgeuse pair around an edge.
#[derive(Debug, Clone)]
pub struct RadialEntry {
    /// The member of the pair running along the reference direction.
    pub eu: EdgeUseKey,
    /// Faceuse of `eu`; `None` for wires.
    pub fu: Option<FaceUseKey>,
    pub shell: ShellKey,
    /// Angle in `[0, 2π)`, or [`WIRE_ANGLE`].
    pub angle: f64,
    /// Another pair around the edge comes from the same face.
    pub is_crack: bool,
    /// The crack folds away from the face's area.
    pub is_outie: bool,
    /// The faceuse orientation breaks alternation within its shell.
    pub needs_flip: bool,
}

impl RadialEntry {
    pub fn is_wire(&self) -> bool {
        self.fu.is_none()
    }
}

/// Checks that the face angles of a radial list increase around the edge,
/// allowing a single wrap from the largest angle back to the smallest.
/// Wires are ignored.
pub fn verify_monotone(list: &[RadialEntry], edge: EdgeKey, tol: &Tolerance) -> Result<()> {
    let angles: Vec<f64> = list.iter().filter(|r| !r.is_wire()).map(|r| r.angle).collect();
    if angles.len() < 3 {
        return Ok(());
    }
    let slack = tol.perp.max(1e-12);
    let descents = (0..angles.len())
        .filter(|&i| angles[(i + 1) % angles.len()] < angles[i] - slack)
        .count();
    if descents > 1 {
        return Err(Error::NonMonotoneRadial { edge });
    }
    Ok(())
}

impl Model {
    /// Unit vector pointing from an edgeuse into the interior of its face,
    /// or `None` for wires.
    pub fn eu_leftvec(&self, eu: EdgeUseKey) -> Result<Option<Vector3<f64>>> {
        let Some(fu) = self.eu_faceuse(eu)? else {
            return Ok(None);
        };
        let (a, b) = self.eu_points(eu)?;
        let left = self.fu_normal(fu)?.cross(&(b - a));
        let len = left.norm();
        if len < 1e-15 {
            return Ok(None);
        }
        Ok(Some(left / len))
    }

    /// Frame around the edge of `eu`: `normal` along the edgeuse, `u` the
    /// left vector of the first face found around the edge.
    pub fn eu_axes(&self, eu: EdgeUseKey, tol: &Tolerance) -> Result<Frame> {
        let (a, b) = self.eu_points(eu)?;
        let d = b - a;
        let len = d.norm();
        if len <= tol.dist || len < 1e-15 {
            return Err(Error::precondition("zero-length edge has no radial frame"));
        }
        let z = d / len;
        let mut frame = Frame::new(a, z);
        for (i, u) in self.radial_uses(eu)?.into_iter().enumerate() {
            if i % 2 == 1 {
                continue;
            }
            if let Some(left) = self.eu_leftvec(u)? {
                let x = (left - z * left.dot(&z)).normalize();
                frame.u = x;
                frame.v = z.cross(&x);
                break;
            }
        }
        Ok(frame)
    }

    /// Angle of the face of `eu` about the edge, in `axes`; [`WIRE_ANGLE`]
    /// for wires.
    pub fn measure_fu_angle(&self, eu: EdgeUseKey, axes: &Frame) -> Result<f64> {
        Ok(match self.eu_leftvec(eu)? {
            Some(left) => axes.angle_of(&left),
            None => WIRE_ANGLE,
        })
    }

    /// Lists every edgeuse pair joining the endpoints of `eu`, whether or
    /// not they are on `eu`'s edge yet.
    ///
    /// Pairs on `eu`'s own radial cycle come first in cycle order; the
    /// entry for `eu` itself is first.
    pub fn build_radial_list(&self, eu: EdgeUseKey, tol: &Tolerance) -> Result<Vec<RadialEntry>> {
        let a = self.eu_vertex(eu)?;
        let b = self.eu_end_vertex(eu)?;
        let axes = self.eu_axes(eu, tol)?;

        let mut members: Vec<EdgeUseKey> = self.radial_uses(eu)?.into_iter().step_by(2).collect();
        for other in self.find_edgeuses_between(a, b)? {
            if !members.contains(&other) {
                members.push(other);
            }
        }

        let mut list = Vec::with_capacity(members.len());
        for p in members {
            list.push(RadialEntry {
                eu: p,
                fu: self.eu_faceuse(p)?,
                shell: self.eu_shell(p)?,
                angle: self.measure_fu_angle(p, &axes)?,
                is_crack: false,
                is_outie: false,
                needs_flip: false,
            });
        }

        // Cracks: more than one pair from one face.
        let mut per_face: FxHashMap<FaceKey, usize> = FxHashMap::default();
        for r in &list {
            if let Some(fu) = r.fu {
                *per_face.entry(self.faceuse(fu)?.face).or_default() += 1;
            }
        }
        for r in list.iter_mut() {
            if let Some(fu) = r.fu {
                r.is_crack = per_face.get(&self.faceuse(fu)?.face).copied().unwrap_or(0) > 1;
            }
        }
        for r in list.iter_mut() {
            if r.is_crack {
                r.is_outie = self.is_crack_outie(r.eu, tol)?;
            }
        }

        self.mark_radial_flips(&mut list)?;
        Ok(list)
    }

    /// Marks entries whose faceuse orientation fails to alternate with the
    /// previous face of the same shell in angle order.
    fn mark_radial_flips(&self, list: &mut [RadialEntry]) -> Result<()> {
        let mut order: Vec<usize> = (0..list.len()).filter(|&i| !list[i].is_wire()).collect();
        order.sort_by(|&i, &j| list[i].angle.total_cmp(&list[j].angle));
        // Orientation of the faceuse the previous face presents to the
        // following wedge, per shell.
        let mut facing: FxHashMap<ShellKey, Orientation> = FxHashMap::default();
        for i in order {
            let Some(fu) = list[i].fu else { continue };
            let p_orient = self.faceuse(fu)?.orientation;
            let q_orient = p_orient.flipped();
            match facing.get(&list[i].shell) {
                Some(&expected) if expected != q_orient => {
                    list[i].needs_flip = true;
                    facing.insert(list[i].shell, q_orient);
                }
                _ => {
                    facing.insert(list[i].shell, p_orient);
                }
            }
        }
        Ok(())
    }

    /// Relinks `uses`, every edgeuse now on edge `e`, into one radial cycle
    /// in angle order. The uses may come from several old cycles.
    ///
    /// Edges without a usable frame (zero length, missing positions) keep
    /// the given pair order.
    pub(crate) fn relink_radial(&mut self, e: EdgeKey, uses: &[EdgeUseKey]) -> Result<()> {
        let entry = self.edge(e)?.edgeuse;
        let a = self.eu_vertex(entry)?;
        let mut pairs: Vec<EdgeUseKey> = Vec::with_capacity(uses.len() / 2);
        let mut seen: Vec<EdgeUseKey> = Vec::with_capacity(uses.len());
        for &u in uses {
            if seen.contains(&u) {
                continue;
            }
            let m = self.eu_mate(u)?;
            seen.push(u);
            seen.push(m);
            pairs.push(if self.eu_vertex(u)? == a { u } else { m });
        }

        let loose = Tolerance::new(0.0, 0.0);
        if let Ok(axes) = self.eu_axes(pairs[0], &loose) {
            let mut keyed = Vec::with_capacity(pairs.len());
            let mut ok = true;
            for &p in &pairs {
                match self.measure_fu_angle(p, &axes) {
                    Ok(angle) => keyed.push((angle, p)),
                    Err(_) => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                keyed.sort_by(|x, y| x.0.total_cmp(&y.0));
                pairs = keyed.into_iter().map(|(_, p)| p).collect();
            }
        }

        let n = pairs.len();
        for i in 0..n {
            let q_next = self.eu_mate(pairs[(i + 1) % n])?;
            self.link_radial(pairs[i], q_next)?;
        }
        if self.config.debug.contains(crate::config::DebugFlags::RADIAL) {
            tracing::trace!(pairs = n, "relinked radial cycle");
        }
        Ok(())
    }

    /// Moves every use of `src`'s edge onto `dst`'s edge and frees the old
    /// edge. The merged cycle is ordered by angle.
    pub fn join_edge(&mut self, dst: EdgeUseKey, src: EdgeUseKey) -> Result<()> {
        let e1 = self.edgeuse(dst)?.edge;
        let e2 = self.edgeuse(src)?.edge;
        if e1 == e2 {
            return Ok(());
        }
        self.check_same_ends(dst, src)?;
        if self.edge(e1)?.geom.is_none() {
            if let Some(g) = self.edge(e2)?.geom {
                self.set_edge_geom(e1, g)?;
            }
        }
        let moved = self.edge_uses(e2)?;
        let mut uses = self.edge_uses(e1)?;
        for &u in &moved {
            self.edgeuse_mut(u)?.edge = e1;
        }
        uses.extend(moved);
        self.free_edge(e2)?;
        self.relink_radial(e1, &uses)?;
        tracing::trace!(edge = self.edge(e1)?.index, "joined edges");
        Ok(())
    }

    /// Moves the pair of `eu2` alone onto `eu1`'s edge, at its angular
    /// position.
    pub fn radial_join_eu(&mut self, eu1: EdgeUseKey, eu2: EdgeUseKey) -> Result<()> {
        let e1 = self.edgeuse(eu1)?.edge;
        let e2 = self.edgeuse(eu2)?.edge;
        if e1 == e2 {
            return Ok(());
        }
        self.check_same_ends(eu1, eu2)?;
        if !self.unlink_radial_pair(eu2)? {
            self.free_edge(e2)?;
        }
        let m2 = self.eu_mate(eu2)?;
        self.edgeuse_mut(eu2)?.edge = e1;
        self.edgeuse_mut(m2)?.edge = e1;
        let mut uses = self.edge_uses(e1)?;
        uses.extend([eu2, m2]);
        self.relink_radial(e1, &uses)
    }

    fn check_same_ends(&self, eu1: EdgeUseKey, eu2: EdgeUseKey) -> Result<()> {
        let (a1, b1) = (self.eu_vertex(eu1)?, self.eu_end_vertex(eu1)?);
        let (a2, b2) = (self.eu_vertex(eu2)?, self.eu_end_vertex(eu2)?);
        if (a1, b1) == (a2, b2) || (a1, b1) == (b2, a2) {
            Ok(())
        } else {
            Err(Error::precondition("edgeuses do not share both endpoints"))
        }
    }

    /// Takes `eu` and its mate off their shared edge onto a new edge with
    /// the same geometry. A pair that is alone on its edge is left as is.
    ///
    /// Returns the new edge, if one was made.
    pub fn unglue_edge(&mut self, eu: EdgeUseKey) -> Result<Option<EdgeKey>> {
        let mate = self.eu_mate(eu)?;
        if self.eu_radial(eu)? == mate {
            return Ok(None);
        }
        let old = self.edgeuse(eu)?.edge;
        let geom = self.edge(old)?.geom;
        self.unlink_radial_pair(eu)?;
        let e = self.alloc_edge(eu);
        self.edgeuse_mut(eu)?.edge = e;
        self.edgeuse_mut(mate)?.edge = e;
        if let Some(g) = geom {
            self.set_edge_geom(e, g)?;
        }
        Ok(Some(e))
    }

    /// Whether every edge of a loop is used twice by the loop: a loop that
    /// encloses no area.
    pub fn loop_is_crack(&self, lu: LoopUseKey) -> Result<bool> {
        let eus = self.lu_edgeuses(lu)?;
        if eus.is_empty() {
            return Ok(false);
        }
        let mut counts: FxHashMap<EdgeKey, usize> = FxHashMap::default();
        for &eu in eus {
            *counts.entry(self.edgeuse(eu)?.edge).or_default() += 1;
        }
        Ok(counts.values().all(|&c| c >= 2))
    }

    /// Whether a crack edgeuse folds out of its face rather than into it.
    ///
    /// A loop made only of cracks has no area, so its cracks are outies.
    /// Otherwise the edge midpoint is classified against the loop with the
    /// crack's edge removed: inside an outer loop (or outside a hole) the
    /// crack borders area and is an innie.
    pub fn is_crack_outie(&self, eu: EdgeUseKey, tol: &Tolerance) -> Result<bool> {
        let EdgeUseParent::Loop(lu) = self.edgeuse(eu)?.up else {
            return Err(Error::precondition("crack test on a wire edgeuse"));
        };
        let LoopUseParent::Face(_) = self.loopuse(lu)?.up else {
            return Err(Error::precondition("crack test on a wire loop"));
        };
        if self.loop_is_crack(lu)? {
            return Ok(true);
        }
        let (a, b) = self.eu_points(eu)?;
        let mid = nalgebra::center(&a, &b);
        let e = self.edgeuse(eu)?.edge;
        let class = self.classify_pnt_loop_except(&mid, lu, e, tol)?;
        let hole = self.loopuse(lu)?.orientation == Orientation::Opposite;
        match class {
            PointClass::In | PointClass::On => Ok(hole),
            PointClass::Out => Ok(!hole),
            PointClass::Unknown => Err(Error::AmbiguousClassification {
                index: self.loopuse(lu)?.index,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ck::check_model;
    use nalgebra::Point3;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    /// Three triangles fanned around the edge (0,0,0)–(1,0,0), apexes at
    /// the given angles about +x measured from +y.
    fn fan(angles_deg: &[f64]) -> (Model, Vec<FaceUseKey>) {
        let mut m = Model::new();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let mut fus = Vec::new();
        for &deg in angles_deg {
            let t = deg.to_radians();
            let apex = Point3::new(0.5, t.cos(), t.sin());
            let fu = m
                .make_face_from_points(s, &[Point3::origin(), Point3::new(1.0, 0.0, 0.0), apex])
                .unwrap();
            fus.push(fu);
        }
        crate::fuse::vertex_fuse(&mut m, TopologyKey::Model, &tol()).unwrap();
        (m, fus)
    }

    fn first_eu(m: &Model, fu: FaceUseKey) -> EdgeUseKey {
        m.lu_edgeuses(m.faceuse(fu).unwrap().loops[0]).unwrap()[0]
    }

    #[test]
    fn join_orders_by_angle() {
        let (mut m, fus) = fan(&[0.0, 200.0, 90.0]);
        let base = first_eu(&m, fus[0]);
        for &fu in &fus[1..] {
            let eu = first_eu(&m, fu);
            m.join_edge(base, eu).unwrap();
        }
        assert_eq!(m.radial_uses(base).unwrap().len(), 6);
        let list = m.build_radial_list(base, &tol()).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|r| !r.is_crack));
        let e = m.edgeuse(base).unwrap().edge;
        verify_monotone(&list, e, &tol()).unwrap();
        assert_eq!(list[0].eu, base);
        assert!(list[0].angle.abs() < 1e-9);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn join_splices_both_cycles() {
        let (mut m, fus) = fan(&[0.0, 120.0]);
        let (a, b) = (first_eu(&m, fus[0]), first_eu(&m, fus[1]));
        let (am, bm) = (m.eu_mate(a).unwrap(), m.eu_mate(b).unwrap());
        assert_eq!(m.radial_uses(a).unwrap().len(), 2);
        m.join_edge(a, b).unwrap();
        let cycle = m.radial_uses(a).unwrap();
        assert_eq!(cycle.len(), 4);
        for eu in [a, am, b, bm] {
            assert!(cycle.contains(&eu));
        }
        assert_eq!(m.radial_uses(b).unwrap().len(), 4);
        assert_eq!(m.edgeuse(b).unwrap().edge, m.edgeuse(a).unwrap().edge);
        assert_eq!(m.edge_count(), 5);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn reversed_cycle_is_not_monotone() {
        let (mut m, fus) = fan(&[0.0, 90.0, 200.0]);
        let eus: Vec<_> = fus.iter().map(|&fu| first_eu(&m, fu)).collect();
        for &eu in &eus[1..] {
            m.join_edge(eus[0], eu).unwrap();
        }
        // Walk the faces backwards: 0 → 2 → 1 → 0.
        let q: Vec<_> = eus.iter().map(|&eu| m.eu_mate(eu).unwrap()).collect();
        m.link_radial(eus[0], q[2]).unwrap();
        m.link_radial(eus[2], q[1]).unwrap();
        m.link_radial(eus[1], q[0]).unwrap();
        let list = m.build_radial_list(eus[0], &tol()).unwrap();
        let e = m.edgeuse(eus[0]).unwrap().edge;
        assert!(matches!(
            verify_monotone(&list, e, &tol()),
            Err(Error::NonMonotoneRadial { .. })
        ));
    }

    #[test]
    fn radial_list_sees_unjoined_edges() {
        let (m, fus) = fan(&[0.0, 90.0]);
        let list = m.build_radial_list(first_eu(&m, fus[0]), &tol()).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn unglue_gives_private_edge() {
        let (mut m, fus) = fan(&[0.0, 90.0, 200.0]);
        let eus: Vec<_> = fus.iter().map(|&fu| first_eu(&m, fu)).collect();
        for &eu in &eus[1..] {
            m.join_edge(eus[0], eu).unwrap();
        }
        let edges = m.edge_count();
        let e = m.unglue_edge(eus[1]).unwrap().unwrap();
        assert_eq!(m.edge_count(), edges + 1);
        assert_eq!(m.radial_uses(eus[1]).unwrap().len(), 2);
        assert_eq!(m.radial_uses(eus[0]).unwrap().len(), 4);
        assert_eq!(m.edgeuse(eus[1]).unwrap().edge, e);
        assert!(m.unglue_edge(eus[1]).unwrap().is_none());
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn radial_join_single_pair() {
        let (mut m, fus) = fan(&[0.0, 90.0, 200.0]);
        let eus: Vec<_> = fus.iter().map(|&fu| first_eu(&m, fu)).collect();
        m.join_edge(eus[0], eus[1]).unwrap();
        m.radial_join_eu(eus[0], eus[2]).unwrap();
        assert_eq!(m.radial_uses(eus[0]).unwrap().len(), 6);
        let list = m.build_radial_list(eus[0], &tol()).unwrap();
        verify_monotone(&list, m.edgeuse(eus[0]).unwrap().edge, &tol()).unwrap();
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn wire_sorts_first() {
        let (mut m, fus) = fan(&[0.0, 90.0]);
        let base = first_eu(&m, fus[0]);
        m.join_edge(base, first_eu(&m, fus[1])).unwrap();
        let (a, b) = (m.eu_vertex(base).unwrap(), m.eu_end_vertex(base).unwrap());
        let s = m.eu_shell(base).unwrap();
        let wire = m.make_edge(Some(a), Some(b), s).unwrap();
        m.join_edge(base, wire).unwrap();
        let list = m.build_radial_list(base, &tol()).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().filter(|r| r.is_wire()).count(), 1);
        assert_eq!(m.radial_uses(base).unwrap().len(), 6);
        assert_eq!(m.measure_fu_angle(wire, &m.eu_axes(base, &tol()).unwrap()).unwrap(), WIRE_ANGLE);
        assert!(check_model(&m).is_ok());
    }

    fn slit_face(tip_y: f64) -> (Model, EdgeUseKey) {
        let mut m = Model::new();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let pts = [
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (1.0, 2.0),
            (1.0, tip_y),
            (0.0, 2.0),
        ];
        let verts: Vec<_> = pts
            .iter()
            .map(|&(x, y)| m.alloc_vertex(Some(Point3::new(x, y, 0.0))))
            .collect();
        let order = [0, 1, 2, 3, 4, 3, 5];
        let loop_verts: Vec<_> = order.iter().map(|&i| Some(verts[i])).collect();
        let (fu, _) = m.make_face_from_verts(s, &loop_verts).unwrap();
        m.assign_face_plane(fu).unwrap();
        let eus = m.lu_edgeuses(m.faceuse(fu).unwrap().loops[0]).unwrap().to_vec();
        m.join_edge(eus[3], eus[4]).unwrap();
        (m, eus[3])
    }

    #[test]
    fn inward_slit_is_innie() {
        let (m, eu) = slit_face(1.0);
        assert!(!m.is_crack_outie(eu, &tol()).unwrap());
        let list = m.build_radial_list(eu, &tol()).unwrap();
        assert!(list.iter().all(|r| r.is_crack && !r.is_outie));
    }

    #[test]
    fn outward_slit_is_outie() {
        let (m, eu) = slit_face(3.0);
        assert!(m.is_crack_outie(eu, &tol()).unwrap());
    }
}

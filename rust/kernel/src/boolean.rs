// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boolean evaluator.
//!
//! [`do_bool`] evaluates union, intersection or difference of two regions:
//!
//! 1. fuse the model, so coincident vertices, edges and planes are shared;
//! 2. intersect every face of A with every face of B, and cut both along
//!    the intersection curves;
//! 3. classify every piece of each shell against the other shell;
//! 4. keep, kill or flip each piece according to [`decision`];
//! 5. merge what is left into region A, fuse again, then rejoin coplanar
//!    faces that the cuts split and drop what that leaves redundant.
//!
//! Both input regions are consumed; region A's key names the result.

use serde::{Deserialize, Serialize};

use crate::ck::verify_if_enabled;
use crate::classify::{Class, ClassTable};
use crate::cleanup::{rm_redundancies, shell_coplanar_face_merge, simplify_shell};
use crate::config::DebugFlags;
use crate::error::{Error, Result};
use crate::fcut::face_cutjoin;
use crate::fuse::model_fuse;
use crate::inter::Intersector;
use crate::keys::*;
use crate::model::*;
use crate::radial::verify_monotone;
use crate::tol::Tolerance;

/// Boolean operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    Union,
    Intersect,
    Subtract,
}

/// What happens to a classified piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Keep,
    Kill,
    /// Keep with the orientation reversed.
    Flip,
}

/// Fate of a piece of class `class` under `op`.
pub fn decision(class: Class, op: BoolOp) -> Decision {
    use BoolOp::*;
    use Class::*;
    use Decision::*;
    match (op, class) {
        (Subtract, AoutB | AonBanti) => Keep,
        (Subtract, BinA) => Flip,
        (Subtract, _) => Kill,
        (Union, AoutB | AonBshared | BoutA) => Keep,
        (Union, _) => Kill,
        (Intersect, AinB | AonBshared | BinA) => Keep,
        (Intersect, _) => Kill,
    }
}

/// Merges every shell of a region into its first one.
fn single_shell(m: &mut Model, r: RegionKey) -> Result<ShellKey> {
    let shells = m.region(r)?.shells.clone();
    let (&first, rest) = shells
        .split_first()
        .ok_or_else(|| Error::precondition("boolean operand has no shells"))?;
    for &s in rest {
        m.merge_shells(first, s)?;
    }
    Ok(first)
}

/// Edges with fewer face pairs than this cannot be out of angular order.
const MIN_PAIRS_FOR_ORDER_CHECK: usize = 3;

/// Rejects edges whose faces are not in monotone angular order.
fn check_radial_order(m: &Model, tol: &Tolerance) -> Result<()> {
    for e in m.edge_keys() {
        let uses = m.edge_uses(e)?;
        if uses.len() / 2 < MIN_PAIRS_FOR_ORDER_CHECK {
            continue;
        }
        let list = m.build_radial_list(uses[0], tol)?;
        verify_monotone(&list, e, tol)?;
    }
    Ok(())
}

/// Intersects every face of `sa` with every face of `sb` and cuts the
/// faces along the curves found. Returns the number of faces cut.
fn intersect_shells(m: &mut Model, sa: ShellKey, sb: ShellKey, tol: &Tolerance) -> Result<usize> {
    let mut is = Intersector::new(m, tol)?;
    let fa = m.shell_faces(sa)?;
    let fb = m.shell_faces(sb)?;
    let boxes_b = fb.iter().map(|&fu| m.fu_bbox(fu)).collect::<Result<Vec<_>>>()?;
    for &a in &fa {
        let box_a = m.fu_bbox(a)?;
        for (&b, box_b) in fb.iter().zip(&boxes_b) {
            if box_a.overlaps(box_b, tol.dist) {
                is.isect_two_generic_faces(m, a, b)?;
            }
        }
    }
    let mut faces = is.cut_faces();
    faces.sort_by_key(|&f| m.face(f).map(|d| d.index).unwrap_or(usize::MAX));
    let mut cut = 0;
    for f in faces {
        let Ok(fd) = m.face(f) else { continue };
        let fu = m.fu_same(fd.faceuse)?;
        if !face_cutjoin(m, fu, &is.segments_for(f), tol)?.contains(&fu) {
            cut += 1;
        }
    }
    Ok(cut)
}

/// Pieces of a shell that carry a class: outward faceuses, wire loops,
/// wire edges and the lone vertexuse.
fn pieces(m: &Model, s: ShellKey) -> Result<Vec<TopologyKey>> {
    let sd = m.shell(s)?;
    let mut out: Vec<TopologyKey> = m.shell_faces(s)?.into_iter().map(Into::into).collect();
    out.extend(sd.wire_loops.iter().map(|&lu| TopologyKey::from(lu)));
    out.extend(sd.wire_edges.iter().map(|&eu| TopologyKey::from(eu)));
    out.extend(sd.vertexuse.map(TopologyKey::from));
    Ok(out)
}

fn apply(m: &mut Model, key: TopologyKey, d: Decision) -> Result<()> {
    if !m.contains(key) {
        // Went with its mate.
        return Ok(());
    }
    match (key, d) {
        (_, Decision::Keep) => {}
        (TopologyKey::FaceUse(fu), Decision::Flip) => m.reverse_face(fu)?,
        (_, Decision::Flip) => {}
        (TopologyKey::FaceUse(fu), Decision::Kill) => {
            m.kill_faceuse(fu)?;
        }
        (TopologyKey::LoopUse(lu), Decision::Kill) => {
            m.kill_loopuse(lu)?;
        }
        (TopologyKey::EdgeUse(eu), Decision::Kill) => {
            m.kill_edgeuse(eu)?;
        }
        (TopologyKey::VertexUse(vu), Decision::Kill) => m.kill_vertexuse(vu)?,
        (other, Decision::Kill) => {
            return Err(Error::precondition(format!("cannot kill a {}", other.kind())));
        }
    }
    Ok(())
}

/// Evaluates `ra op rb` in place. Returns the result region (`ra`); `rb`
/// no longer exists afterwards.
///
/// A piece that cannot be classified even with a relaxed tolerance fails
/// the whole operation with [`Error::AmbiguousClassification`].
pub fn do_bool(m: &mut Model, ra: RegionKey, rb: RegionKey, op: BoolOp, tol: &Tolerance) -> Result<RegionKey> {
    tol.validate()?;
    if ra == rb {
        return Err(Error::precondition("boolean operands are the same region"));
    }
    m.region(ra)?;
    m.region(rb)?;
    let verbose = m.config().debug.contains(DebugFlags::BOOL);
    let sa = single_shell(m, ra)?;
    let sb = single_shell(m, rb)?;

    let fused = model_fuse(m, tol)?;
    check_radial_order(m, tol)?;
    let cut = intersect_shells(m, sa, sb, tol)?;
    if verbose {
        tracing::trace!(fused, cut, "operands prepared");
    }

    let table: ClassTable = m.classify_s_vs_s(sa, sb, tol)?;
    let mut plan = Vec::new();
    for s in [sa, sb] {
        for key in pieces(m, s)? {
            let index = m.index_of(key)?;
            let class = table
                .get(index)
                .ok_or(Error::AmbiguousClassification { index })?;
            plan.push((key, decision(class, op)));
        }
    }
    let killed = plan.iter().filter(|(_, d)| *d == Decision::Kill).count();
    let flipped = plan.iter().filter(|(_, d)| *d == Decision::Flip).count();
    for (key, d) in plan {
        if verbose {
            tracing::trace!(piece = ?key, decision = ?d, "boolean decision");
        }
        apply(m, key, d)?;
    }

    m.merge_regions(ra, rb)?;
    m.merge_shells(sa, sb)?;
    if m.shell(sa)?.is_empty() {
        m.kill_shell(sa)?;
    }
    model_fuse(m, tol)?;
    let mut merged = 0;
    for s in m.region(ra)?.shells.clone() {
        merged += shell_coplanar_face_merge(m, s, tol)?;
        rm_redundancies(m, s)?;
        if simplify_shell(m, s, tol)? {
            m.kill_shell(s)?;
        }
    }
    m.collect_garbage();
    m.region_bbox(ra)?;
    tracing::debug!(?op, killed, flipped, merged, faces = m.face_count(), "boolean done");
    verify_if_enabled(m)?;
    Ok(ra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::make_box;
    use crate::ck::check_model;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    #[test]
    fn decision_table() {
        use BoolOp::*;
        use Class::*;
        use Decision::*;
        let expect = [
            (Subtract, [Kill, Kill, Keep, Keep, Flip, Kill, Kill, Kill]),
            (Union, [Kill, Keep, Kill, Keep, Kill, Kill, Kill, Keep]),
            (Intersect, [Keep, Keep, Kill, Kill, Keep, Kill, Kill, Kill]),
        ];
        let classes = [AinB, AonBshared, AonBanti, AoutB, BinA, BonAshared, BonAanti, BoutA];
        for (op, row) in expect {
            for (c, d) in classes.iter().zip(row) {
                assert_eq!(decision(*c, op), d, "{op:?} {}", c.name());
            }
        }
    }

    #[test]
    fn same_region_is_rejected() {
        let mut m = Model::new();
        let (r, _) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(matches!(
            do_bool(&mut m, r, r, BoolOp::Union, &tol()),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn disjoint_union_keeps_both() {
        let mut m = Model::new();
        let (ra, _) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let (rb, _) = make_box(&mut m, Point3::new(3.0, 0.0, 0.0), Point3::new(4.0, 1.0, 1.0)).unwrap();
        let r = do_bool(&mut m, ra, rb, BoolOp::Union, &tol()).unwrap();
        assert_eq!(m.regions(), &[r]);
        assert_eq!(m.face_count(), 12);
        assert_relative_eq!(m.region_volume(r).unwrap(), 2.0, epsilon = 1e-9);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let mut m = Model::new();
        let (ra, _) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let (rb, _) = make_box(&mut m, Point3::new(3.0, 0.0, 0.0), Point3::new(4.0, 1.0, 1.0)).unwrap();
        let r = do_bool(&mut m, ra, rb, BoolOp::Intersect, &tol()).unwrap();
        assert_eq!(m.face_count(), 0);
        assert!(m.region(r).unwrap().bbox.unwrap().is_empty());
        assert!(m.region(r).unwrap().shells.is_empty());
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn nested_subtract_leaves_a_cavity() {
        let mut m = Model::new();
        let (ra, _) = make_box(&mut m, Point3::origin(), Point3::new(4.0, 4.0, 4.0)).unwrap();
        let (rb, _) = make_box(&mut m, Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0)).unwrap();
        let r = do_bool(&mut m, ra, rb, BoolOp::Subtract, &tol()).unwrap();
        assert_eq!(m.face_count(), 12);
        assert_relative_eq!(m.region_volume(r).unwrap(), 63.0, epsilon = 1e-9);
        let bb = m.region(r).unwrap().bbox.expect("cached region box");
        assert_relative_eq!(bb.min, Point3::origin(), epsilon = 1e-12);
        assert_relative_eq!(bb.max, Point3::new(4.0, 4.0, 4.0), epsilon = 1e-12);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn union_of_adjacent_boxes_is_one_box() {
        let mut m = Model::new();
        let (ra, _) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let (rb, _) = make_box(&mut m, Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)).unwrap();
        let r = do_bool(&mut m, ra, rb, BoolOp::Union, &tol()).unwrap();
        assert_eq!(m.face_count(), 6);
        assert_eq!(m.edge_count(), 12);
        assert_eq!(m.vertex_count(), 8);
        assert_relative_eq!(m.region_volume(r).unwrap(), 2.0, epsilon = 1e-9);
        let s = m.region(r).unwrap().shells[0];
        assert!(crate::ck::ck_closed_surf(&m, s).unwrap().is_empty());
        assert!(check_model(&m).is_ok());
    }
}

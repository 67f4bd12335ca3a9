// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell cleanup.
//!
//! Cutting and classification leave faces split along curves that no
//! longer separate anything, straight edges broken at needless vertices,
//! and wires duplicating face boundaries. [`shell_coplanar_face_merge`]
//! rejoins coplanar neighbours, [`simplify_shell`] removes edges lying
//! inside faces, degenerate loops and needless vertices, and
//! [`rm_redundancies`] removes lower-dimensional leftovers.

use rustc_hash::FxHashSet;

use crate::config::DebugFlags;
use crate::error::{Error, Result};
use crate::fcut::{edge_is_interior, face_join, face_simplify};
use crate::geometry::Plane;
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

fn outward_plane(m: &Model, fu: FaceUseKey) -> Result<Plane> {
    match m.fu_plane(fu) {
        Err(Error::MissingGeometry(_)) => m.face_plane_from_loops(fu),
        other => other,
    }
}

/// Whether two outward faceuses lie in one plane with the same outward
/// sense: they share face geometry, or their planes agree within `tol`
/// and every vertex of the second lies on the plane of the first.
pub fn faces_coplanar(m: &Model, fu1: FaceUseKey, fu2: FaceUseKey, tol: &Tolerance) -> Result<bool> {
    let (fu1, fu2) = (m.fu_same(fu1)?, m.fu_same(fu2)?);
    let f1 = m.face(m.faceuse(fu1)?.face)?;
    let f2 = m.face(m.faceuse(fu2)?.face)?;
    if f1.geom.is_some() && f1.geom == f2.geom {
        return Ok(f1.flip == f2.flip);
    }
    let (p1, p2) = (outward_plane(m, fu1)?, outward_plane(m, fu2)?);
    if (p1.d - p2.d).abs() > tol.dist || p1.normal.dot(&p2.normal) < tol.para {
        return Ok(false);
    }
    for &lu in &m.faceuse(fu2)?.loops {
        for p in m.lu_points(lu)? {
            if p1.dist(&p).abs() > tol.dist {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Coplanar outward faces meeting `fu` along an edge used by nothing but
/// the two faces.
fn coplanar_neighbours(m: &Model, fu: FaceUseKey, tol: &Tolerance) -> Result<Vec<FaceUseKey>> {
    let mut out: Vec<FaceUseKey> = Vec::new();
    for &lu in &m.faceuse(fu)?.loops {
        for &eu in m.lu_edgeuses(lu)? {
            let e = m.edgeuse(eu)?.edge;
            for u in m.edge_uses(e)? {
                let Some(other) = m.eu_faceuse(u)? else { continue };
                if other == fu || out.contains(&other) {
                    continue;
                }
                if m.faceuse(other)?.orientation != Orientation::Same {
                    continue;
                }
                if edge_is_interior(m, e, &[fu, other])? && faces_coplanar(m, fu, other, tol)? {
                    out.push(other);
                }
            }
        }
    }
    Ok(out)
}

/// Joins every pair of coplanar faces of a shell that meet along an edge
/// only they use. Returns the number of joins.
pub fn shell_coplanar_face_merge(m: &mut Model, s: ShellKey, tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let mut joined = 0;
    // Every join frees the edges it crossed, so the scan ends.
    'scan: loop {
        for fu in m.shell_faces(s)? {
            for other in coplanar_neighbours(m, fu, tol)? {
                let out = face_join(m, fu, other, tol)?;
                if out != [fu, other] {
                    joined += 1;
                    continue 'scan;
                }
            }
        }
        break;
    }
    if joined > 0 {
        m.shell_mut(s)?.bbox = None;
        if m.config().debug.contains(DebugFlags::CUT) {
            tracing::trace!(shell = ?s, joined, "coplanar faces merged");
        }
    }
    Ok(joined)
}

/// Simplifies every face of a shell: edges inside a face are removed
/// (joining loops that touch along them), degenerate loops are killed,
/// and straight edges broken at a vertex nothing else uses are rejoined.
/// Returns whether the shell is now empty.
pub fn simplify_shell(m: &mut Model, s: ShellKey, tol: &Tolerance) -> Result<bool> {
    tol.validate()?;
    for fu in m.shell_faces(s)? {
        if m.contains(fu.into()) {
            face_simplify(m, fu, tol)?;
        }
    }

    let mut killed = 0;
    for fu in m.shell_faces(s)? {
        for lu in m.faceuse(fu)?.loops.clone() {
            if m.contains(lu.into()) && m.loop_is_degenerate(lu)? {
                m.kill_loopuse(lu)?;
                killed += 1;
            }
        }
    }

    let mut unbroken = 0;
    // Every rejoin frees an edge, so the scan ends.
    'scan: loop {
        for fu in m.shell_faces(s)? {
            let loops = m.faceuse(fu)?.loops.clone();
            for lu in loops {
                for eu in m.lu_edgeuses(lu)?.to_vec() {
                    if m.unbreak_edge(eu, tol)? {
                        unbroken += 1;
                        continue 'scan;
                    }
                }
            }
        }
        break;
    }

    let empty = m.shell(s)?.is_empty();
    tracing::debug!(shell = ?s, killed, unbroken, empty, "simplified shell");
    Ok(empty)
}

fn edge_on_face_of(m: &Model, e: EdgeKey, s: ShellKey) -> Result<bool> {
    for u in m.edge_uses(e)? {
        if let Some(fu) = m.eu_faceuse(u)? {
            if m.faceuse(fu)?.shell == s {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn edge_on_wire_loop_of(m: &Model, e: EdgeKey, s: ShellKey) -> Result<bool> {
    for u in m.edge_uses(e)? {
        if let EdgeUseParent::Loop(lu) = m.edgeuse(u)?.up {
            if m.loopuse(lu)?.up == LoopUseParent::Shell(s) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn loop_edges(m: &Model, lu: LoopUseKey) -> Result<FxHashSet<EdgeKey>> {
    m.lu_edgeuses(lu)?.iter().map(|&eu| Ok(m.edgeuse(eu)?.edge)).collect()
}

/// Removes parts of a shell that repeat other parts of it: wire loops and
/// wire edges lying on face edges, wire edges lying on wire loops, vertex
/// loops on vertices used by anything else, a lone vertexuse in a shell
/// with other contents, and pairs of opposite loops of one face running
/// over the same edges. Returns the number of parts removed.
pub fn rm_redundancies(m: &mut Model, s: ShellKey) -> Result<usize> {
    let mut removed = 0;

    if !m.shell(s)?.faceuses.is_empty() {
        for lu in m.shell(s)?.wire_loops.clone() {
            if !m.contains(lu.into()) || m.lu_edgeuses(lu)?.is_empty() {
                continue;
            }
            let mut on_faces = true;
            for e in loop_edges(m, lu)? {
                if !edge_on_face_of(m, e, s)? {
                    on_faces = false;
                    break;
                }
            }
            if on_faces {
                m.kill_loopuse(lu)?;
                removed += 1;
            }
        }
        for eu in m.shell(s)?.wire_edges.clone() {
            if m.contains(eu.into()) && edge_on_face_of(m, m.edgeuse(eu)?.edge, s)? {
                m.kill_edgeuse(eu)?;
                removed += 1;
            }
        }
    }

    for eu in m.shell(s)?.wire_edges.clone() {
        if m.contains(eu.into()) && edge_on_wire_loop_of(m, m.edgeuse(eu)?.edge, s)? {
            m.kill_edgeuse(eu)?;
            removed += 1;
        }
    }

    for lu in m.shell(s)?.wire_loops.clone() {
        if !m.contains(lu.into()) {
            continue;
        }
        let LoopContents::Vertex(vu) = m.loopuse(lu)?.contents else {
            continue;
        };
        let own = [vu, vertexuse_of_loop(m, m.loopuse(lu)?.mate)?];
        let v = m.vertexuse(vu)?.vertex;
        let mut used_elsewhere = false;
        for &other in &m.vertex(v)?.uses {
            if !own.contains(&other) && m.vu_shell(other)? == s {
                used_elsewhere = true;
                break;
            }
        }
        if used_elsewhere {
            m.kill_loopuse(lu)?;
            removed += 1;
        }
    }

    if let Some(vu) = m.shell(s)?.vertexuse {
        let sd = m.shell(s)?;
        if !sd.faceuses.is_empty() || !sd.wire_loops.is_empty() || !sd.wire_edges.is_empty() {
            tracing::warn!(shell = ?s, "lone vertexuse in a shell with other contents");
            m.kill_vertexuse(vu)?;
            removed += 1;
        }
    }

    for fu in m.shell_faces(s)? {
        'face: loop {
            if !m.contains(fu.into()) {
                break;
            }
            let loops = m.faceuse(fu)?.loops.clone();
            for (i, &a) in loops.iter().enumerate() {
                if m.lu_edgeuses(a)?.is_empty() {
                    continue;
                }
                let edges_a = loop_edges(m, a)?;
                for &b in &loops[i + 1..] {
                    if m.lu_edgeuses(b)?.is_empty()
                        || m.loopuse(a)?.orientation == m.loopuse(b)?.orientation
                    {
                        continue;
                    }
                    if loop_edges(m, b)? == edges_a {
                        m.kill_loopuse(a)?;
                        if m.contains(b.into()) {
                            m.kill_loopuse(b)?;
                        }
                        removed += 2;
                        continue 'face;
                    }
                }
            }
            break;
        }
    }

    if removed > 0 {
        tracing::debug!(shell = ?s, removed, "removed redundant parts");
    }
    Ok(removed)
}

fn vertexuse_of_loop(m: &Model, lu: LoopUseKey) -> Result<VertexUseKey> {
    match m.loopuse(lu)?.contents {
        LoopContents::Vertex(vu) => Ok(vu),
        LoopContents::Edges(_) => Err(Error::InvariantViolation(
            "mate of a vertex loop holds edges".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::make_box;
    use crate::ck::{check_model, ck_closed_surf};
    use crate::fuse::edge_fuse;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    /// Two unit squares side by side in z = 0, sharing the edge x = 1.
    fn two_squares(m: &mut Model) -> (ShellKey, FaceUseKey, FaceUseKey, Vec<VertexKey>) {
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let v: Vec<VertexKey> = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| m.alloc_vertex(Some(Point3::new(x, y, 0.0))))
            .collect();
        let (a, _) = m
            .make_face_from_verts(s, &[Some(v[0]), Some(v[1]), Some(v[4]), Some(v[5])])
            .unwrap();
        let (b, _) = m
            .make_face_from_verts(s, &[Some(v[1]), Some(v[2]), Some(v[3]), Some(v[4])])
            .unwrap();
        for fu in [a, b] {
            m.assign_face_plane(fu).unwrap();
        }
        edge_fuse(m, TopologyKey::Shell(s), &tol()).unwrap();
        (s, a, b, v)
    }

    #[test]
    fn coplanar_squares_merge_into_one_face() {
        let mut m = Model::new();
        let (s, a, b, _) = two_squares(&mut m);
        assert!(faces_coplanar(&m, a, b, &tol()).unwrap());
        assert_eq!(m.edge_count(), 7);

        assert_eq!(shell_coplanar_face_merge(&mut m, s, &tol()).unwrap(), 1);
        let faces = m.shell_faces(s).unwrap();
        assert_eq!(faces.len(), 1);
        assert_relative_eq!(m.fu_area(faces[0]).unwrap(), 2.0, epsilon = 1e-9);
        // The shared edge is gone; its ends stay on the long sides.
        assert_eq!(m.edge_count(), 6);
        assert!(check_model(&m).is_ok());

        assert!(!simplify_shell(&mut m, s, &tol()).unwrap());
        assert_eq!(m.edge_count(), 4);
        let faces = m.shell_faces(s).unwrap();
        assert_eq!(m.lu_vertices(m.faceuse(faces[0]).unwrap().loops[0]).unwrap().len(), 4);
        assert_relative_eq!(m.fu_area(faces[0]).unwrap(), 2.0, epsilon = 1e-9);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn tilted_neighbour_is_not_merged() {
        let mut m = Model::new();
        let (s, a, b, v) = two_squares(&mut m);
        m.set_vertex_point(v[2], Point3::new(2.0, 0.0, 1.0)).unwrap();
        m.set_vertex_point(v[3], Point3::new(2.0, 1.0, 1.0)).unwrap();
        m.assign_face_plane(b).unwrap();
        assert!(!faces_coplanar(&m, a, b, &tol()).unwrap());
        assert_eq!(shell_coplanar_face_merge(&mut m, s, &tol()).unwrap(), 0);
        assert_eq!(m.shell_faces(s).unwrap().len(), 2);
    }

    #[test]
    fn box_faces_stay_apart() {
        let mut m = Model::new();
        let (r, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(shell_coplanar_face_merge(&mut m, s, &tol()).unwrap(), 0);
        assert!(!simplify_shell(&mut m, s, &tol()).unwrap());
        assert_eq!(m.face_count(), 6);
        assert_eq!(m.edge_count(), 12);
        assert_relative_eq!(m.region_volume(r).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn split_box_top_is_rejoined() {
        let mut m = Model::new();
        let (r, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let top = m
            .shell_faces(s)
            .unwrap()
            .into_iter()
            .find(|&fu| m.fu_normal(fu).unwrap().z > 0.5)
            .unwrap();
        // Break two opposite top edges at their middles and cut across.
        let mut mids = Vec::new();
        for eu in m.lu_edgeuses(m.faceuse(top).unwrap().loops[0]).unwrap().to_vec() {
            let (a, b) = m.eu_points(eu).unwrap();
            if (a.y - b.y).abs() < 1e-12 {
                let v = m.alloc_vertex(Some(Point3::new(0.5, a.y, 1.0)));
                m.split_edge(eu, Some(v)).unwrap();
                mids.push(v);
            }
        }
        assert_eq!(mids.len(), 2);
        let pieces = crate::fcut::face_cutjoin(&mut m, top, &[(mids[0], mids[1])], &tol()).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(m.face_count(), 7);
        assert!(ck_closed_surf(&m, s).unwrap().is_empty());

        assert_eq!(shell_coplanar_face_merge(&mut m, s, &tol()).unwrap(), 1);
        assert_eq!(m.face_count(), 6);
        simplify_shell(&mut m, s, &tol()).unwrap();
        m.collect_garbage();
        assert_eq!(m.edge_count(), 12);
        assert_eq!(m.vertex_count(), 8);
        assert_relative_eq!(m.region_volume(r).unwrap(), 1.0, epsilon = 1e-9);
        assert!(ck_closed_surf(&m, s).unwrap().is_empty());
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn spur_inside_face_is_simplified_away() {
        let mut m = Model::new();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let v: Vec<VertexKey> = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0), (0.0, 2.0)]
            .iter()
            .map(|&(x, y)| m.alloc_vertex(Some(Point3::new(x, y, 0.0))))
            .collect();
        let ring = [v[0], v[1], v[2], v[3], v[4], v[3], v[5]].map(Some);
        let (fu, _) = m.make_face_from_verts(s, &ring).unwrap();
        m.assign_face_plane(fu).unwrap();
        edge_fuse(&mut m, TopologyKey::Shell(s), &tol()).unwrap();
        assert_eq!(m.edge_count(), 6);

        let out = face_simplify(&mut m, fu, &tol()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(m.edge_count(), 5);
        assert_relative_eq!(m.fu_area(out[0]).unwrap(), 4.0, epsilon = 1e-9);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn wires_on_faces_are_redundant() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let top = m.shell_faces(s).unwrap()[0];
        let side = m.lu_edgeuses(m.faceuse(top).unwrap().loops[0]).unwrap()[0];
        let (a, b) = (m.eu_vertex(side).unwrap(), m.eu_end_vertex(side).unwrap());
        let wire = m.make_edge(Some(a), None, s).unwrap();
        let far = m.eu_end_vertex(wire).unwrap();
        m.set_vertex_point(far, Point3::new(3.0, 3.0, 3.0)).unwrap();
        let on_face = m.make_edge(Some(a), Some(b), s).unwrap();
        edge_fuse(&mut m, TopologyKey::Shell(s), &tol()).unwrap();
        assert_eq!(m.edgeuse(on_face).unwrap().edge, m.edgeuse(side).unwrap().edge);
        let lone = m
            .make_loop_vertex(LoopUseParent::Shell(s), Some(b), Orientation::Unspecified)
            .unwrap();

        let removed = rm_redundancies(&mut m, s).unwrap();
        assert_eq!(removed, 2);
        assert!(!m.contains(on_face.into()));
        assert!(!m.contains(lone.into()));
        // The wire reaching out of the box is kept.
        assert!(m.contains(wire.into()));
        assert_eq!(m.face_count(), 6);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn hole_over_outer_boundary_cancels() {
        let mut m = Model::new();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let v: Vec<VertexKey> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| m.alloc_vertex(Some(Point3::new(x, y, 0.0))))
            .collect();
        let (fu, _) = m.make_face_from_verts(s, &v.iter().copied().map(Some).collect::<Vec<_>>()).unwrap();
        let rev: Vec<Option<VertexKey>> = v.iter().rev().copied().map(Some).collect();
        m.add_loop_to_face(s, Some(fu), &rev, Orientation::Opposite).unwrap();
        edge_fuse(&mut m, TopologyKey::Shell(s), &tol()).unwrap();
        assert_eq!(m.faceuse(fu).unwrap().loops.len(), 2);

        assert_eq!(rm_redundancies(&mut m, s).unwrap(), 2);
        assert_eq!(m.face_count(), 0);
        assert!(m.shell(s).unwrap().is_empty());
        assert!(check_model(&m).is_ok());
    }
}

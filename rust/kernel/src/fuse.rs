// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric fusing.
//!
//! Each pass merges entities that are topologically distinct but coincide
//! within `tol.dist`, and returns how many entities it eliminated. Passes
//! visit entities in index order, so results do not depend on slot-map
//! layout. Degeneracies created by a merge (a loop collapsing to a crack,
//! a zero-length edge) are left for later passes to clean up.

use rustc_hash::FxHashMap;

use crate::ck::verify_if_enabled;
use crate::error::Result;
use crate::keys::*;
use crate::model::{EdgeGeometry, FaceGeometry, Model};
use crate::spatial::SpatialIndex;
use crate::tol::Tolerance;

/// Merges vertices within `tol.dist` of an earlier surviving vertex.
///
/// With `tol.dist == 0` only identical coordinates merge.
pub fn vertex_fuse(m: &mut Model, scope: TopologyKey, tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let mut verts = m.vertex_tabulate(scope)?;
    verts.sort_by_key(|&v| m.vertex(v).map(|d| d.index).unwrap_or(usize::MAX));

    let mut survivors = SpatialIndex::new(tol.dist);
    let mut merged = 0;
    for v in verts {
        let Some(p) = m.vertex(v)?.point else {
            continue;
        };
        match survivors.find_near(&p, tol.dist) {
            Some(keep) => {
                m.join_vertex(keep, v)?;
                merged += 1;
            }
            None => survivors.insert(v, p),
        }
    }
    if merged > 0 {
        tracing::debug!(merged, "vertex fuse");
    }
    verify_if_enabled(m)?;
    Ok(merged)
}

/// Joins edges that share both endpoint vertices into one radial cycle.
pub fn edge_fuse(m: &mut Model, scope: TopologyKey, tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let edges = m.edge_tabulate(scope)?;
    let mut first: FxHashMap<(usize, usize), EdgeUseKey> = FxHashMap::default();
    let mut merged = 0;
    for e in edges {
        // Already absorbed by an earlier join.
        let Ok(data) = m.edge(e) else { continue };
        let eu = data.edgeuse;
        let (a, b) = m.edge_vertices(e)?;
        let (ia, ib) = (m.vertex(a)?.index, m.vertex(b)?.index);
        let key = (ia.min(ib), ia.max(ib));
        match first.get(&key) {
            Some(&keep) if m.edgeuse(keep)?.edge != e => {
                m.join_edge(keep, eu)?;
                merged += 1;
            }
            Some(_) => {}
            None => {
                first.insert(key, eu);
            }
        }
    }
    if merged > 0 {
        tracing::debug!(merged, "edge fuse");
    }
    verify_if_enabled(m)?;
    Ok(merged)
}

/// Makes colinear line geometry records shared.
pub fn edge_g_fuse(m: &mut Model, scope: TopologyKey, tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let geoms = m.edge_g_tabulate(scope)?;
    let mut kept: Vec<EdgeGeomKey> = Vec::new();
    let mut merged = 0;
    for g in geoms {
        let EdgeGeometry::Lseg(line) = m.edge_geom(g)?.geometry else {
            continue;
        };
        let mut target = None;
        for &k in &kept {
            if let EdgeGeometry::Lseg(other) = m.edge_geom(k)?.geometry {
                if other.colinear(&line, tol) {
                    target = Some(k);
                    break;
                }
            }
        }
        match target {
            Some(k) => {
                for e in m.edge_geom(g)?.edges.clone() {
                    m.set_edge_geom(e, k)?;
                }
                merged += 1;
            }
            None => kept.push(g),
        }
    }
    if merged > 0 {
        tracing::debug!(merged, "edge geometry fuse");
    }
    Ok(merged)
}

/// Makes coincident face planes shared, adjusting `flip` so every face keeps
/// its normal.
pub fn face_fuse(m: &mut Model, scope: TopologyKey, tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let faces = m.face_tabulate(scope)?;
    let mut kept: Vec<(FaceKey, FaceGeomKey)> = Vec::new();
    let mut merged = 0;
    for f in faces {
        let Some(g) = m.face(f)?.geom else { continue };
        let FaceGeometry::Plane(plane) = m.face_geom(g)?.geometry else {
            continue;
        };
        if kept.iter().any(|&(_, k)| k == g) {
            continue;
        }
        let mut target = None;
        for &(kf, k) in &kept {
            if let FaceGeometry::Plane(other) = m.face_geom(k)?.geometry {
                if other.coincident(&plane, tol) {
                    target = Some(kf);
                    break;
                }
            }
        }
        match target {
            Some(kf) => {
                for other in m.face_geom(g)?.faces.clone() {
                    m.join_face_geometry(kf, other)?;
                }
                merged += 1;
            }
            None => kept.push((f, g)),
        }
    }
    if merged > 0 {
        tracing::debug!(merged, "face fuse");
    }
    Ok(merged)
}

/// Runs every fusing pass over the whole model: vertices, edges, edge
/// geometry, then face geometry.
pub fn model_fuse(m: &mut Model, tol: &Tolerance) -> Result<usize> {
    let scope = TopologyKey::Model;
    let total = vertex_fuse(m, scope, tol)?
        + edge_fuse(m, scope, tol)?
        + edge_g_fuse(m, scope, tol)?
        + face_fuse(m, scope, tol)?;
    tracing::debug!(total, "model fuse");
    verify_if_enabled(m)?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::make_box;
    use crate::ck::check_model;
    use crate::error::Error;
    use nalgebra::Point3;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let before = m.vertex_count();
        let bad = Tolerance::new(-1.0, 1e-6);
        assert!(matches!(
            vertex_fuse(&mut m, TopologyKey::Model, &bad),
            Err(Error::InvalidTolerance(_))
        ));
        assert_eq!(m.vertex_count(), before);
    }

    #[test]
    fn stacked_boxes_share_a_face() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        make_box(&mut m, Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 1.0, 2.0)).unwrap();
        assert_eq!(m.vertex_count(), 16);
        assert_eq!(vertex_fuse(&mut m, TopologyKey::Model, &tol()).unwrap(), 4);
        assert_eq!(vertex_fuse(&mut m, TopologyKey::Model, &tol()).unwrap(), 0);
        // The four edges around the shared square.
        assert_eq!(edge_fuse(&mut m, TopologyKey::Model, &tol()).unwrap(), 4);
        assert_eq!(edge_fuse(&mut m, TopologyKey::Model, &tol()).unwrap(), 0);
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn zero_tolerance_merges_identical_only() {
        let mut m = Model::new();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        m.make_face_from_points(
            s,
            &[Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
        )
        .unwrap();
        m.make_face_from_points(
            s,
            &[
                Point3::new(1e-9, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
            ],
        )
        .unwrap();
        let zero = Tolerance::new(0.0, 1e-6);
        assert_eq!(vertex_fuse(&mut m, TopologyKey::Model, &zero).unwrap(), 2);
        assert_eq!(m.vertex_count(), 4);
    }

    #[test]
    fn coplanar_faces_share_plane() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        make_box(&mut m, Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)).unwrap();
        let before = m.face_geom_count();
        // Bottoms, tops, fronts and backs line up.
        assert_eq!(face_fuse(&mut m, TopologyKey::Model, &tol()).unwrap(), 4);
        assert_eq!(m.face_geom_count(), before - 4);
        for f in m.face_keys() {
            let fu = m.face(f).unwrap().faceuse;
            let same = m.fu_same(fu).unwrap();
            let n = m.fu_normal(same).unwrap();
            let verts = m.lu_points(m.faceuse(same).unwrap().loops[0]).unwrap();
            let from_loop = crate::geometry::newell_normal(&verts).unwrap();
            assert!((n - from_loop).norm() < 1e-9);
        }
    }

    #[test]
    fn colinear_lines_share_geometry() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        make_box(&mut m, Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)).unwrap();
        let before = m.edge_geom_count();
        // Four x-parallel edges of each box lie on shared lines.
        assert_eq!(edge_g_fuse(&mut m, TopologyKey::Model, &tol()).unwrap(), 4);
        assert_eq!(m.edge_geom_count(), before - 4);
    }

    #[test]
    fn model_fuse_is_idempotent() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        make_box(&mut m, Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)).unwrap();
        assert!(model_fuse(&mut m, &tol()).unwrap() > 0);
        assert_eq!(model_fuse(&mut m, &tol()).unwrap(), 0);
        assert!(check_model(&m).is_ok());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Convenience constructors for closed shells.
//!
//! [`shell_from_polygons`] is the "face list to shell" pattern: corner
//! positions within tolerance become one vertex through the spatial grid,
//! and faces that end up with common vertex pairs are glued into shared
//! radial edges.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::fuse::edge_fuse;
use crate::keys::*;
use crate::mesh::glue_faces;
use crate::model::Model;
use crate::spatial::SpatialIndex;
use crate::tol::Tolerance;

/// Corner numbering: bit 0 is x, bit 1 is y, bit 2 is z.
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 2, 3, 1], // -z
    [4, 5, 7, 6], // +z
    [0, 1, 5, 4], // -y
    [2, 6, 7, 3], // +y
    [0, 4, 6, 2], // -x
    [1, 3, 7, 5], // +x
];

/// Builds an axis-aligned box in a new region: 8 vertices, 6 outward quad
/// faces with planes, 12 shared edges with line geometry.
pub fn make_box(m: &mut Model, min: Point3<f64>, max: Point3<f64>) -> Result<(RegionKey, ShellKey)> {
    if (0..3).any(|i| !(min[i] < max[i])) {
        return Err(Error::precondition("box corners are not ordered"));
    }
    let (r, s, _) = m.make_region_shell_vertex()?;
    let corners: Vec<VertexKey> = (0..8)
        .map(|i| {
            let pick = |bit: usize, k: usize| if i & bit != 0 { max[k] } else { min[k] };
            m.alloc_vertex(Some(Point3::new(pick(1, 0), pick(2, 1), pick(4, 2))))
        })
        .collect();
    let mut faces = Vec::with_capacity(6);
    for quad in BOX_FACES {
        let verts: Vec<_> = quad.iter().map(|&i| Some(corners[i])).collect();
        let (fu, _) = m.make_face_from_verts(s, &verts)?;
        m.assign_face_plane(fu)?;
        faces.push(fu);
    }
    edge_fuse(m, TopologyKey::Shell(s), &Tolerance::new(0.0, 1e-6))?;
    for fu in faces {
        m.assign_face_edge_geometry(fu)?;
    }
    Ok((r, s))
}

/// Builds a shell in a new region from polygons given as corner lists.
///
/// Corners within `tol.dist` share a vertex. Repeated corners are dropped,
/// and polygons left with fewer than three corners or no area are skipped.
pub fn shell_from_polygons(
    m: &mut Model,
    polygons: &[Vec<Point3<f64>>],
    tol: &Tolerance,
) -> Result<(RegionKey, ShellKey)> {
    tol.validate()?;
    if polygons.is_empty() {
        return Err(Error::precondition("no polygons"));
    }
    let mut index = SpatialIndex::from_model(m, tol.dist);
    let (r, s, _) = m.make_region_shell_vertex()?;
    let mut faces = Vec::with_capacity(polygons.len());
    for poly in polygons {
        let mut verts: Vec<VertexKey> = Vec::with_capacity(poly.len());
        for p in poly {
            let v = m.find_or_add_vertex(&mut index, *p, tol.dist)?;
            if verts.last() != Some(&v) {
                verts.push(v);
            }
        }
        while verts.len() > 1 && verts.first() == verts.last() {
            verts.pop();
        }
        if verts.len() < 3 {
            tracing::warn!(corners = poly.len(), "skipping degenerate polygon");
            continue;
        }
        let opt: Vec<_> = verts.iter().map(|&v| Some(v)).collect();
        let (fu, _) = m.make_face_from_verts(s, &opt)?;
        if m.assign_face_plane(fu).is_err() {
            tracing::warn!("skipping polygon with no area");
            m.kill_faceuse(fu)?;
            continue;
        }
        faces.push(fu);
    }
    glue_faces(m, &faces, tol)?;
    for &fu in &faces {
        m.assign_face_edge_geometry(fu)?;
    }
    m.collect_garbage();
    tracing::debug!(faces = faces.len(), "built shell from polygons");
    Ok((r, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ck::check_model;
    use approx::assert_relative_eq;

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    #[test]
    fn box_counts_and_volume() {
        let mut m = Model::new();
        let (r, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(m.vertex_count(), 8);
        assert_eq!(m.edge_count(), 12);
        assert_eq!(m.face_count(), 6);
        assert_eq!(m.edge_geom_count(), 12);
        assert_eq!(m.shell_faces(s).unwrap().len(), 6);
        assert_relative_eq!(m.region_volume(r).unwrap(), 6.0, epsilon = 1e-9);
        for e in m.edge_keys() {
            assert_eq!(m.edge_uses(e).unwrap().len(), 4);
        }
        assert!(check_model(&m).is_ok());
    }

    #[test]
    fn inverted_box_is_rejected() {
        let mut m = Model::new();
        assert!(make_box(&mut m, Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0)).is_err());
        assert_eq!(m.regions().len(), 0);
    }

    #[test]
    fn polygon_soup_is_sewn() {
        let mut m = Model::new();
        // A tetrahedron with one corner given slightly off.
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let d = Point3::new(0.0, 0.0, 1.0);
        let d_off = Point3::new(0.0, 0.0, 1.0 + 1e-8);
        let polys = vec![
            vec![a, c, b],
            vec![a, b, d],
            vec![a, d_off, c],
            vec![b, c, d],
            vec![a, a, b],
        ];
        let (r, _) = shell_from_polygons(&mut m, &polys, &tol()).unwrap();
        assert_eq!(m.vertex_count(), 4);
        assert_eq!(m.face_count(), 4);
        assert_eq!(m.edge_count(), 6);
        assert_relative_eq!(m.region_volume(r).unwrap(), 1.0 / 6.0, epsilon = 1e-6);
        assert!(check_model(&m).is_ok());
    }
}

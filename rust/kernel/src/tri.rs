// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Triangulator.
//!
//! Faces are projected onto their plane, each outer loop is grouped with
//! the holes it contains, and every group goes through `earcutr`, which
//! bridges holes into the outer boundary before clipping ears. Triangles
//! are re-oriented counter-clockwise in the face frame, so they keep the
//! face normal, and zero-area ears are dropped.

use nalgebra::{Point2, Point3};

use crate::ck::verify_if_enabled;
use crate::error::{Error, Result};
use crate::fuse::edge_fuse;
use crate::geometry::{point_in_polygon_2d, signed_area_2d, triangle_area_2d, Frame};
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

/// One edge loop of a face in the face's 2D frame.
#[derive(Debug, Clone)]
pub(crate) struct ProjectedLoop {
    pub verts: Vec<VertexKey>,
    pub pts: Vec<Point2<f64>>,
}

/// An outer loop and the holes it contains.
#[derive(Debug, Clone)]
pub(crate) struct LoopGroup {
    pub outer: ProjectedLoop,
    pub holes: Vec<ProjectedLoop>,
}

impl LoopGroup {
    /// Vertices in earcut order: outer boundary, then each hole.
    pub fn flat_verts(&self) -> Vec<VertexKey> {
        let mut out = self.outer.verts.clone();
        for h in &self.holes {
            out.extend_from_slice(&h.verts);
        }
        out
    }

    pub fn flat_points(&self) -> Vec<Point2<f64>> {
        let mut out = self.outer.pts.clone();
        for h in &self.holes {
            out.extend_from_slice(&h.pts);
        }
        out
    }

    /// Counter-clockwise triangles of the group, as indices into
    /// [`LoopGroup::flat_points`].
    pub fn triangles(&self, min_area: f64) -> Result<Vec<[usize; 3]>> {
        let holes: Vec<Vec<Point2<f64>>> = self.holes.iter().map(|h| h.pts.clone()).collect();
        ear_triangles(&self.outer.pts, &holes, min_area)
    }
}

/// A face projected onto its plane with loops grouped by containment.
#[derive(Debug, Clone)]
pub(crate) struct ProjectedFace {
    pub frame: Frame,
    pub groups: Vec<LoopGroup>,
}

/// Ear-clips a polygon with holes.
///
/// Returns counter-clockwise triangles indexing the outer points followed
/// by each hole's points. Triangles with area at most `min_area` are
/// skipped.
pub(crate) fn ear_triangles(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
    min_area: f64,
) -> Result<Vec<[usize; 3]>> {
    if outer.len() < 3 {
        return Err(Error::Triangulation(
            "need at least 3 points in outer boundary".to_string(),
        ));
    }
    let total = outer.len() + holes.iter().map(|h| h.len()).sum::<usize>();
    let mut coords = Vec::with_capacity(total * 2);
    let mut points = Vec::with_capacity(total);
    for p in outer {
        coords.push(p.x);
        coords.push(p.y);
        points.push(*p);
    }
    let mut hole_indices = Vec::with_capacity(holes.len());
    for hole in holes {
        hole_indices.push(points.len());
        for p in hole {
            coords.push(p.x);
            coords.push(p.y);
            points.push(*p);
        }
    }

    let indices = earcutr::earcut(&coords, &hole_indices, 2)
        .map_err(|e| Error::Triangulation(format!("{:?}", e)))?;

    let mut out = Vec::with_capacity(indices.len() / 3);
    for chunk in indices.chunks(3) {
        if chunk.len() < 3 {
            continue;
        }
        let (a, b, c) = (chunk[0], chunk[1], chunk[2]);
        let area = triangle_area_2d(&points[a], &points[b], &points[c]);
        if area.abs() <= min_area {
            continue;
        }
        out.push(if area > 0.0 { [a, b, c] } else { [a, c, b] });
    }
    Ok(out)
}

impl Model {
    /// Projects the edge loops of a faceuse and groups each hole with the
    /// smallest outer loop containing it.
    pub(crate) fn project_face(&self, fu: FaceUseKey) -> Result<ProjectedFace> {
        let frame = self.fu_frame(fu)?;
        let mut outers: Vec<ProjectedLoop> = Vec::new();
        let mut holes: Vec<ProjectedLoop> = Vec::new();
        for &lu in &self.faceuse(fu)?.loops {
            if matches!(self.loopuse(lu)?.contents, LoopContents::Vertex(_)) {
                continue;
            }
            let verts = self.lu_vertices(lu)?;
            let pts = verts
                .iter()
                .map(|&v| Ok(frame.project(&self.vertex_point(v)?)))
                .collect::<Result<Vec<_>>>()?;
            let pl = ProjectedLoop { verts, pts };
            // Orientation flags can be stale after edits; winding decides.
            if signed_area_2d(&pl.pts) >= 0.0 {
                outers.push(pl);
            } else {
                holes.push(pl);
            }
        }
        let mut groups: Vec<LoopGroup> = outers
            .into_iter()
            .map(|outer| LoopGroup {
                outer,
                holes: Vec::new(),
            })
            .collect();
        for hole in holes {
            let probe = hole.pts.iter().fold(Point2::origin(), |acc, p| acc + p.coords)
                / hole.pts.len().max(1) as f64;
            let mut best: Option<(f64, usize)> = None;
            for (i, g) in groups.iter().enumerate() {
                if point_in_polygon_2d(&probe, &g.outer.pts) || point_in_polygon_2d(&hole.pts[0], &g.outer.pts) {
                    let area = signed_area_2d(&g.outer.pts);
                    if best.map_or(true, |(a, _)| area < a) {
                        best = Some((area, i));
                    }
                }
            }
            match best {
                Some((_, i)) => groups[i].holes.push(hole),
                None => tracing::warn!("hole loop outside every outer loop; ignored"),
            }
        }
        Ok(ProjectedFace { frame, groups })
    }

    /// A point strictly inside the area of a faceuse: the centroid of its
    /// largest triangle.
    pub fn fu_interior_point(&self, fu: FaceUseKey) -> Result<Point3<f64>> {
        let pf = self.project_face(fu)?;
        let mut best: Option<(f64, Point2<f64>)> = None;
        for g in &pf.groups {
            let pts = g.flat_points();
            for [a, b, c] in g.triangles(0.0)? {
                let area = triangle_area_2d(&pts[a], &pts[b], &pts[c]);
                if best.map_or(true, |(ba, _)| area > ba) {
                    let centroid = Point2::from((pts[a].coords + pts[b].coords + pts[c].coords) / 3.0);
                    best = Some((area, centroid));
                }
            }
        }
        match best {
            Some((_, q)) => Ok(pf.frame.lift(&q)),
            None => Err(Error::precondition("face encloses no area")),
        }
    }

    /// Replaces a face with triangular faces sharing its geometry.
    ///
    /// A face whose only loop is a triangle is left alone. Returns the
    /// outward faceuses now covering the face's area.
    pub fn triangulate_face(&mut self, fu: FaceUseKey, tol: &Tolerance) -> Result<Vec<FaceUseKey>> {
        tol.validate()?;
        let fu = self.fu_same(fu)?;
        let loops = self.faceuse(fu)?.loops.clone();
        if loops.len() == 1 && self.lu_edgeuses(loops[0])?.len() == 3 {
            return Ok(vec![fu]);
        }
        let pf = self.project_face(fu)?;
        let (s, f) = (self.faceuse(fu)?.shell, self.faceuse(fu)?.face);
        let fd = self.face(f)?;
        let geom = fd.geom.map(|g| (g, fd.flip));

        let mut created = Vec::new();
        for g in &pf.groups {
            let verts = g.flat_verts();
            for [a, b, c] in g.triangles(tol.dist_sq * 0.5)? {
                let tri = [verts[a], verts[b], verts[c]];
                if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                    continue;
                }
                let new_fu = self.make_face_with_loops(s, &tri, &[], geom)?;
                if geom.is_none() {
                    self.assign_face_plane(new_fu)?;
                }
                self.assign_face_edge_geometry(new_fu)?;
                created.push(new_fu);
            }
        }
        if created.is_empty() {
            return Err(Error::Triangulation("face produced no triangles".into()));
        }
        self.kill_faceuse(fu)?;
        edge_fuse(self, TopologyKey::Shell(s), tol)?;
        if self.config.debug.contains(crate::config::DebugFlags::TRI) {
            tracing::trace!(triangles = created.len(), "triangulated face");
        }
        Ok(created)
    }

    /// Triangulates every face of a shell. Returns the number of faces
    /// created.
    pub fn triangulate_shell(&mut self, s: ShellKey, tol: &Tolerance) -> Result<usize> {
        let mut created = 0;
        for fu in self.shell_faces(s)? {
            let out = self.triangulate_face(fu, tol)?;
            if out != [fu] {
                created += out.len();
            }
        }
        tracing::debug!(created, "triangulated shell");
        verify_if_enabled(self)?;
        Ok(created)
    }

    /// Triangulates every shell of the model.
    pub fn triangulate_model(&mut self, tol: &Tolerance) -> Result<usize> {
        let mut created = 0;
        for r in self.regions().to_vec() {
            for s in self.region(r)?.shells.clone() {
                created += self.triangulate_shell(s, tol)?;
            }
        }
        Ok(created)
    }
}

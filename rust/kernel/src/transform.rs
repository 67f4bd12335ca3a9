// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell duplication and rigid/affine transforms.

use nalgebra::{Matrix4, Vector3};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::fuse::edge_fuse;
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

/// Copies vertices on first sight.
struct VertexMap {
    map: FxHashMap<VertexKey, VertexKey>,
}

impl VertexMap {
    fn get(&mut self, m: &mut Model, v: VertexKey) -> Result<VertexKey> {
        if let Some(&n) = self.map.get(&v) {
            return Ok(n);
        }
        let point = m.vertex(v)?.point;
        let n = m.alloc_vertex(point);
        self.map.insert(v, n);
        Ok(n)
    }

    fn all(&mut self, m: &mut Model, vs: &[VertexKey]) -> Result<Vec<Option<VertexKey>>> {
        vs.iter().map(|&v| self.get(m, v).map(Some)).collect()
    }
}

impl Model {
    /// Deep copy of a shell into a new region, on new vertices and new
    /// geometry. Returns the new region and shell.
    ///
    /// Edges of the copy are shared wherever two of its faces run between
    /// the same vertices.
    pub fn dup_shell(&mut self, s: ShellKey) -> Result<(RegionKey, ShellKey)> {
        let src = self.shell(s)?.clone();
        let r = self.alloc_region();
        let (ns, lone) = self.make_shell_vertex(r)?;
        let mut verts = VertexMap {
            map: FxHashMap::default(),
        };

        if let Some(vu) = src.vertexuse {
            let old = self.vertexuse(vu)?.vertex;
            let new = self.vertexuse(lone)?.vertex;
            let point = self.vertex(old)?.point;
            self.vertex_mut(new)?.point = point;
            verts.map.insert(old, new);
        }

        let mut seen = Vec::new();
        for &lu in &src.wire_loops {
            let data = self.loopuse(lu)?;
            if seen.contains(&data.lp) {
                continue;
            }
            seen.push(data.lp);
            let orientation = data.orientation;
            let vertex_loop = matches!(data.contents, LoopContents::Vertex(_));
            let corners = self.lu_vertices(lu)?;
            if vertex_loop {
                let v = verts.get(self, corners[0])?;
                self.make_loop_vertex(LoopUseParent::Shell(ns), Some(v), orientation)?;
            } else {
                let new = verts.all(self, &corners)?;
                for i in 0..new.len() {
                    self.make_edge(new[i], new[(i + 1) % new.len()], ns)?;
                }
                self.make_loop_from_wires(ns)?;
            }
        }

        let mut seen = Vec::new();
        for &eu in &src.wire_edges {
            let e = self.edgeuse(eu)?.edge;
            if seen.contains(&e) {
                continue;
            }
            seen.push(e);
            let (a, b) = (self.eu_vertex(eu)?, self.eu_end_vertex(eu)?);
            let a = verts.get(self, a)?;
            let b = verts.get(self, b)?;
            self.make_edge(Some(a), Some(b), ns)?;
        }

        let mut faces = Vec::new();
        for fu in self.shell_faces(s)? {
            let mut new_fu = None;
            for lu in self.faceuse(fu)?.loops.clone() {
                let orientation = self.loopuse(lu)?.orientation;
                let corners = self.lu_vertices(lu)?;
                let corners = verts.all(self, &corners)?;
                let (nlu, _) = self.add_loop_to_face(ns, new_fu, &corners, orientation)?;
                if new_fu.is_none() {
                    let LoopUseParent::Face(nfu) = self.loopuse(nlu)?.up else {
                        return Err(Error::InvariantViolation("copied loop is not in a face".into()));
                    };
                    new_fu = Some(nfu);
                }
            }
            let Some(nfu) = new_fu else { continue };
            let face = self.face(self.faceuse(fu)?.face)?.clone();
            if let Some(g) = face.geom {
                let geometry = self.face_geom(g)?.geometry;
                let ng = self.alloc_face_geom(geometry);
                let nf = self.faceuse(nfu)?.face;
                self.set_face_geom(nf, ng)?;
                self.face_mut(nf)?.flip = face.flip;
            }
            faces.push(nfu);
        }
        edge_fuse(self, TopologyKey::Shell(ns), &Tolerance::new(0.0, 1e-6))?;
        for fu in faces {
            self.assign_face_edge_geometry(fu)?;
        }
        tracing::debug!(
            vertices = verts.map.len(),
            faces = self.shell(ns)?.faceuses.len() / 2,
            "duplicated shell"
        );
        Ok((r, ns))
    }

    /// Moves every vertex of a shell by `offset`.
    pub fn translate_shell(&mut self, s: ShellKey, offset: &Vector3<f64>) -> Result<()> {
        self.transform_shell(s, &Matrix4::new_translation(offset))
    }

    /// Applies an affine transform to a shell.
    ///
    /// Face planes and edge lines are recomputed from the moved vertices.
    /// A mirroring transform also reverses every face so the outward sides
    /// stay outward. Vertices used by other shells are not touched: the
    /// call fails instead.
    pub fn transform_shell(&mut self, s: ShellKey, mat: &Matrix4<f64>) -> Result<()> {
        let det = mat.fixed_view::<3, 3>(0, 0).determinant();
        if det.abs() < 1e-12 {
            return Err(Error::precondition("transform is singular"));
        }
        let vertices = self.vertex_tabulate(TopologyKey::Shell(s))?;
        for &v in &vertices {
            for &vu in &self.vertex(v)?.uses {
                if self.vu_shell(vu)? != s {
                    return Err(Error::precondition("shell shares vertices with another shell"));
                }
            }
        }
        for &v in &vertices {
            if let Some(p) = self.vertex(v)?.point {
                self.vertex_mut(v)?.point = Some(mat.transform_point(&p));
            }
        }

        let faces = self.shell_faces(s)?;
        for &fu in &faces {
            if det < 0.0 {
                self.reverse_face(fu)?;
            }
        }
        for fu in self.shell_faces(s)? {
            if self.face(self.faceuse(fu)?.face)?.geom.is_some() {
                let plane = self.face_plane_from_loops(fu)?;
                self.set_face_plane(fu, plane)?;
            }
        }
        for e in self.edge_tabulate(TopologyKey::Shell(s))? {
            if self.edge(e)?.geom.is_some() {
                self.assign_edge_geometry(e)?;
            }
        }
        self.shell_mut(s)?.bbox = None;
        let r = self.shell(s)?.region;
        self.region_mut(r)?.bbox = None;
        tracing::debug!(vertices = vertices.len(), mirrored = det < 0.0, "transformed shell");
        Ok(())
    }
}

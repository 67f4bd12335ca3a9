// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction primitives: make, kill, demote and join.
//!
//! Every operation either succeeds and leaves the model valid, or returns
//! an error before touching anything. Kills cascade upward only as far as
//! the structure requires: removing the last edgeuse of a loop removes the
//! loop, removing the last loop of a face removes the face, but shells and
//! regions are allowed to become empty.

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::geometry::{newell_normal, LineSeg, Plane};
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

/// Creates an empty model.
pub fn make_model() -> Model {
    Model::new()
}

impl Model {
    // ========================================================================
    // Make
    // ========================================================================

    /// Creates the smallest legal non-empty structure: a region holding a
    /// shell holding one lone vertexuse on a new vertex.
    pub fn make_region_shell_vertex(&mut self) -> Result<(RegionKey, ShellKey, VertexUseKey)> {
        let r = self.alloc_region();
        let (s, vu) = self.make_shell_vertex(r)?;
        Ok((r, s, vu))
    }

    /// Adds a new shell with a lone vertexuse on a new vertex to a region.
    pub fn make_shell_vertex(&mut self, r: RegionKey) -> Result<(ShellKey, VertexUseKey)> {
        let s = self.alloc_shell(r)?;
        let v = self.alloc_vertex(None);
        let vu = self.alloc_vertexuse(v, VertexUseParent::Shell(s))?;
        self.shell_mut(s)?.vertexuse = Some(vu);
        Ok((s, vu))
    }

    /// Creates a wire edge between two vertices in a shell. `None` means a
    /// new vertex. A lone vertexuse in the shell is absorbed.
    ///
    /// Returns the edgeuse that starts at `v1`.
    pub fn make_edge(
        &mut self,
        v1: Option<VertexKey>,
        v2: Option<VertexKey>,
        s: ShellKey,
    ) -> Result<EdgeUseKey> {
        self.shell(s)?;
        for v in [v1, v2].into_iter().flatten() {
            self.vertex(v)?;
        }
        let v1 = match v1 {
            Some(v) => v,
            None => self.alloc_vertex(None),
        };
        let v2 = match v2 {
            Some(v) => v,
            None => self.alloc_vertex(None),
        };
        let up = EdgeUseParent::Shell(s);
        let (eu, mate) = self.alloc_edgeuse_pair(v1, v2, up, up, None)?;
        let sd = self.shell_mut(s)?;
        sd.wire_edges.push(eu);
        sd.wire_edges.push(mate);
        self.drop_lone_vertexuse(s)?;
        Ok(eu)
    }

    /// Wire edge from an existing vertex to a new one.
    pub fn make_edge_vertex(&mut self, v: VertexKey, s: ShellKey) -> Result<EdgeUseKey> {
        self.make_edge(Some(v), None, s)
    }

    /// Creates a single-vertex loop in a shell or face.
    ///
    /// In a shell holding a lone vertexuse, the lone vertexuse is taken
    /// over when `v` is `None` or names its vertex.
    pub fn make_loop_vertex(
        &mut self,
        parent: LoopUseParent,
        v: Option<VertexKey>,
        orientation: Orientation,
    ) -> Result<LoopUseKey> {
        if let Some(v) = v {
            self.vertex(v)?;
        }
        let (up, mate_up) = self.loop_parents(parent)?;
        let mut stolen = None;
        if let LoopUseParent::Shell(s) = parent {
            if let Some(lone) = self.shell(s)?.vertexuse {
                let lone_v = self.vertexuse(lone)?.vertex;
                if v.is_none() || v == Some(lone_v) {
                    stolen = Some((lone, lone_v));
                }
            }
        }
        let v = match (stolen, v) {
            (Some((_, lv)), _) => lv,
            (None, Some(v)) => v,
            (None, None) => self.alloc_vertex(None),
        };
        let (lu, lumate) = self.alloc_loopuse_pair(up, mate_up, orientation);
        let vu = match stolen {
            Some((lone, _)) => {
                if let LoopUseParent::Shell(s) = parent {
                    self.shell_mut(s)?.vertexuse = None;
                }
                self.vertexuse_mut(lone)?.up = VertexUseParent::Loop(lu);
                lone
            }
            None => self.alloc_vertexuse(v, VertexUseParent::Loop(lu))?,
        };
        let vu_mate = self.alloc_vertexuse(v, VertexUseParent::Loop(lumate))?;
        self.loopuse_mut(lu)?.contents = LoopContents::Vertex(vu);
        self.loopuse_mut(lumate)?.contents = LoopContents::Vertex(vu_mate);
        self.push_loop_pair(lu, lumate)?;
        Ok(lu)
    }

    /// Turns a vertex loop into a loop of one edge that starts and ends at
    /// the loop's vertex.
    pub fn make_edge_on_vertexuse(&mut self, vu: VertexUseKey) -> Result<EdgeUseKey> {
        let VertexUseParent::Loop(lu) = self.vertexuse(vu)?.up else {
            return Err(Error::precondition("vertexuse is not the child of a loop"));
        };
        let lumate = self.loopuse(lu)?.mate;
        let LoopContents::Vertex(mate_vu) = self.loopuse(lumate)?.contents else {
            return Err(Error::InvariantViolation("vertex loop mate holds edges".into()));
        };
        let v = self.vertexuse(vu)?.vertex;
        let (eu, eumate) =
            self.alloc_edgeuse_pair(v, v, EdgeUseParent::Loop(lu), EdgeUseParent::Loop(lumate), None)?;
        self.loopuse_mut(lu)?.contents = LoopContents::Edges(vec![eu]);
        self.loopuse_mut(lumate)?.contents = LoopContents::Edges(vec![eumate]);
        self.free_vertexuse(vu)?;
        self.free_vertexuse(mate_vu)?;
        Ok(eu)
    }

    /// Closes a chain of the shell's wire edges into a wire loop.
    ///
    /// The chain starts at the first wire edgeuse and follows shared
    /// vertices until it returns to its start.
    pub fn make_loop_from_wires(&mut self, s: ShellKey) -> Result<LoopUseKey> {
        let wires = self.shell(s)?.wire_edges.clone();
        let Some(&first) = wires.first() else {
            return Err(Error::precondition("shell has no wire edges"));
        };
        let start = self.eu_vertex(first)?;
        let mut chain = vec![first];
        let mut used: Vec<EdgeUseKey> = vec![first, self.eu_mate(first)?];
        let mut at = self.eu_end_vertex(first)?;
        while at != start {
            let mut next = None;
            for &w in &wires {
                if !used.contains(&w) && self.eu_vertex(w)? == at {
                    next = Some(w);
                    break;
                }
            }
            let Some(w) = next else {
                return Err(Error::precondition("wire edges do not close into a loop"));
            };
            chain.push(w);
            used.push(w);
            used.push(self.eu_mate(w)?);
            at = self.eu_end_vertex(w)?;
        }

        let parent = LoopUseParent::Shell(s);
        let (lu, lumate) = self.alloc_loopuse_pair(parent, parent, Orientation::Unspecified);
        let mut mates = Vec::with_capacity(chain.len());
        for &eu in &chain {
            let mate = self.eu_mate(eu)?;
            self.detach_edgeuse(eu)?;
            self.detach_edgeuse(mate)?;
            self.edgeuse_mut(eu)?.up = EdgeUseParent::Loop(lu);
            self.edgeuse_mut(mate)?.up = EdgeUseParent::Loop(lumate);
            mates.push(mate);
        }
        mates.reverse();
        self.loopuse_mut(lu)?.contents = LoopContents::Edges(chain);
        self.loopuse_mut(lumate)?.contents = LoopContents::Edges(mates);
        self.push_loop_pair(lu, lumate)?;
        self.drop_lone_vertexuse(s)?;
        Ok(lu)
    }

    /// Promotes a wire loop of a shell into a new face.
    ///
    /// The loop and its mate move under a new faceuse pair and both take
    /// `Same` orientation. The new face has no geometry yet.
    pub fn make_face(&mut self, lu: LoopUseKey) -> Result<FaceUseKey> {
        let LoopUseParent::Shell(s) = self.loopuse(lu)?.up else {
            return Err(Error::precondition("loopuse already belongs to a face"));
        };
        let lumate = self.loopuse(lu)?.mate;
        if self.loopuse(lumate)?.up != LoopUseParent::Shell(s) {
            return Err(Error::InvariantViolation("loopuse mate lives in another shell".into()));
        }
        let (fu, fumate) = self.alloc_faceuse_pair(s)?;
        self.detach_loopuse(lu)?;
        self.detach_loopuse(lumate)?;
        self.attach_loopuse(lu, LoopUseParent::Face(fu))?;
        self.attach_loopuse(lumate, LoopUseParent::Face(fumate))?;
        self.loopuse_mut(lu)?.orientation = Orientation::Same;
        self.loopuse_mut(lumate)?.orientation = Orientation::Same;
        Ok(fu)
    }

    /// Creates a face bounded by one loop through `verts` (`None` entries
    /// become new vertices). Returns the `Same` faceuse and the vertices
    /// used.
    pub fn make_face_from_verts(
        &mut self,
        s: ShellKey,
        verts: &[Option<VertexKey>],
    ) -> Result<(FaceUseKey, Vec<VertexKey>)> {
        let (lu, used) = self.add_loop_to_face(s, None, verts, Orientation::Same)?;
        let LoopUseParent::Face(fu) = self.loopuse(lu)?.up else {
            return Err(Error::InvariantViolation("new loop is not in a face".into()));
        };
        Ok((fu, used))
    }

    /// Creates a face from corner positions, making a vertex per corner and
    /// assigning the face plane and edge lines.
    pub fn make_face_from_points(&mut self, s: ShellKey, points: &[Point3<f64>]) -> Result<FaceUseKey> {
        if points.len() < 3 {
            return Err(Error::precondition("a face needs at least three corners"));
        }
        self.shell(s)?;
        let verts: Vec<_> = points
            .iter()
            .map(|p| Some(self.alloc_vertex(Some(*p))))
            .collect();
        let (fu, _) = self.make_face_from_verts(s, &verts)?;
        self.assign_face_plane(fu)?;
        self.assign_face_edge_geometry(fu)?;
        Ok(fu)
    }

    /// Adds a loop through `verts` to the faceuse `fu` (its mate gets the
    /// reversed loop), or to a new face when `fu` is `None`.
    ///
    /// A single vertex makes a vertex loop. `orientation` is `Same` for an
    /// outer boundary and `Opposite` for a hole.
    pub fn add_loop_to_face(
        &mut self,
        s: ShellKey,
        fu: Option<FaceUseKey>,
        verts: &[Option<VertexKey>],
        orientation: Orientation,
    ) -> Result<(LoopUseKey, Vec<VertexKey>)> {
        if verts.is_empty() {
            return Err(Error::precondition("a loop needs at least one vertex"));
        }
        if !matches!(orientation, Orientation::Same | Orientation::Opposite) {
            return Err(Error::precondition("face loops are Same or Opposite"));
        }
        self.shell(s)?;
        if let Some(fu) = fu {
            if self.faceuse(fu)?.shell != s {
                return Err(Error::precondition("faceuse is not in the given shell"));
            }
        }
        for v in verts.iter().flatten() {
            self.vertex(*v)?;
        }
        let used: Vec<VertexKey> = verts
            .iter()
            .map(|v| v.unwrap_or_else(|| self.alloc_vertex(None)))
            .collect();
        let fu = match fu {
            Some(fu) => fu,
            None => self.alloc_faceuse_pair(s)?.0,
        };
        let lu = self.build_face_loop(fu, &used, orientation)?;
        self.drop_lone_vertexuse(s)?;
        Ok((lu, used))
    }

    /// Creates a face with an outer loop and hole loops on existing
    /// vertices, optionally sharing face geometry.
    pub(crate) fn make_face_with_loops(
        &mut self,
        s: ShellKey,
        outer: &[VertexKey],
        holes: &[Vec<VertexKey>],
        geom: Option<(FaceGeomKey, bool)>,
    ) -> Result<FaceUseKey> {
        let (fu, _) = self.alloc_faceuse_pair(s)?;
        self.build_face_loop(fu, outer, Orientation::Same)?;
        for hole in holes {
            self.build_face_loop(fu, hole, Orientation::Opposite)?;
        }
        if let Some((g, flip)) = geom {
            let f = self.faceuse(fu)?.face;
            self.set_face_geom(f, g)?;
            self.face_mut(f)?.flip = flip;
        }
        self.drop_lone_vertexuse(s)?;
        Ok(fu)
    }

    /// A lone vertexuse only survives in an otherwise empty shell.
    fn drop_lone_vertexuse(&mut self, s: ShellKey) -> Result<()> {
        if let Some(lone) = self.shell_mut(s)?.vertexuse.take() {
            self.free_vertexuse(lone)?;
        }
        Ok(())
    }

    fn build_face_loop(
        &mut self,
        fu: FaceUseKey,
        verts: &[VertexKey],
        orientation: Orientation,
    ) -> Result<LoopUseKey> {
        let fumate = self.faceuse(fu)?.mate;
        let (lu, lumate) = self.alloc_loopuse_pair(
            LoopUseParent::Face(fu),
            LoopUseParent::Face(fumate),
            orientation,
        );
        if verts.len() == 1 {
            let vu = self.alloc_vertexuse(verts[0], VertexUseParent::Loop(lu))?;
            let vm = self.alloc_vertexuse(verts[0], VertexUseParent::Loop(lumate))?;
            self.loopuse_mut(lu)?.contents = LoopContents::Vertex(vu);
            self.loopuse_mut(lumate)?.contents = LoopContents::Vertex(vm);
        } else {
            self.fill_edge_loop(lu, lumate, verts)?;
        }
        self.push_loop_pair(lu, lumate)?;
        Ok(lu)
    }

    /// Builds `lu` as the cycle `verts[0] → verts[1] → … → verts[0]` and its
    /// mate as the reversed cycle.
    fn fill_edge_loop(&mut self, lu: LoopUseKey, lumate: LoopUseKey, verts: &[VertexKey]) -> Result<()> {
        let n = verts.len();
        let mut fwd = Vec::with_capacity(n);
        let mut rev = Vec::with_capacity(n);
        for i in 0..n {
            let (eu, mate) = self.alloc_edgeuse_pair(
                verts[i],
                verts[(i + 1) % n],
                EdgeUseParent::Loop(lu),
                EdgeUseParent::Loop(lumate),
                None,
            )?;
            fwd.push(eu);
            rev.push(mate);
        }
        rev.reverse();
        self.loopuse_mut(lu)?.contents = LoopContents::Edges(fwd);
        self.loopuse_mut(lumate)?.contents = LoopContents::Edges(rev);
        Ok(())
    }

    fn loop_parents(&self, parent: LoopUseParent) -> Result<(LoopUseParent, LoopUseParent)> {
        Ok(match parent {
            LoopUseParent::Shell(s) => {
                self.shell(s)?;
                (parent, parent)
            }
            LoopUseParent::Face(fu) => (parent, LoopUseParent::Face(self.faceuse(fu)?.mate)),
        })
    }

    /// Registers a freshly built loopuse pair with its owners.
    fn push_loop_pair(&mut self, lu: LoopUseKey, lumate: LoopUseKey) -> Result<()> {
        let up = self.loopuse(lu)?.up;
        let mate_up = self.loopuse(lumate)?.up;
        self.attach_loopuse(lu, up)?;
        self.attach_loopuse(lumate, mate_up)?;
        Ok(())
    }

    // ========================================================================
    // Geometry assignment
    // ========================================================================

    /// Sets a vertex position.
    pub fn set_vertex_point(&mut self, v: VertexKey, point: Point3<f64>) -> Result<()> {
        self.vertex_mut(v)?.point = Some(point);
        Ok(())
    }

    /// Sets the per-use normal attribute of a vertexuse.
    pub fn set_vertexuse_normal(&mut self, vu: VertexUseKey, normal: Vector3<f64>) -> Result<()> {
        self.vertexuse_mut(vu)?.normal = Some(normal);
        Ok(())
    }

    /// Gives a face a plane of its own, oriented so that `plane` is the
    /// outward plane of `fu`.
    pub fn set_face_plane(&mut self, fu: FaceUseKey, plane: Plane) -> Result<()> {
        let data = self.faceuse(fu)?;
        let f = data.face;
        let stored = if data.orientation == Orientation::Opposite {
            plane.reversed()
        } else {
            plane
        };
        let g = self.alloc_face_geom(FaceGeometry::Plane(stored));
        self.set_face_geom(f, g)?;
        self.face_mut(f)?.flip = false;
        Ok(())
    }

    /// Computes the plane of a face from its loops and stores it.
    pub fn assign_face_plane(&mut self, fu: FaceUseKey) -> Result<Plane> {
        let plane = self.face_plane_from_loops(fu)?;
        self.set_face_plane(fu, plane)?;
        Ok(plane)
    }

    /// Gives an edge line geometry through its endpoints.
    pub fn assign_edge_geometry(&mut self, e: EdgeKey) -> Result<EdgeGeomKey> {
        let (a, b) = self.edge_vertices(e)?;
        let line = LineSeg::through(&self.vertex_point(a)?, &self.vertex_point(b)?);
        let g = self.alloc_edge_geom(EdgeGeometry::Lseg(line));
        self.set_edge_geom(e, g)?;
        Ok(g)
    }

    /// Assigns line geometry to every edge of a face lacking one.
    pub fn assign_face_edge_geometry(&mut self, fu: FaceUseKey) -> Result<()> {
        for lu in self.faceuse(fu)?.loops.clone() {
            for eu in self.lu_edgeuses(lu)?.to_vec() {
                let e = self.edgeuse(eu)?.edge;
                if self.edge(e)?.geom.is_none() {
                    self.assign_edge_geometry(e)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Kill
    // ========================================================================

    /// Kills a lone vertexuse of a shell.
    pub fn kill_vertexuse(&mut self, vu: VertexUseKey) -> Result<()> {
        match self.vertexuse(vu)?.up {
            VertexUseParent::Shell(s) => {
                self.shell_mut(s)?.vertexuse = None;
                self.free_vertexuse(vu)
            }
            VertexUseParent::Loop(_) => Err(Error::precondition(
                "vertexuse of a vertex loop dies with its loopuse",
            )),
            VertexUseParent::EdgeUse(_) => Err(Error::precondition(
                "vertexuse of an edgeuse dies with its edgeuse",
            )),
        }
    }

    /// Frees an edgeuse pair already detached from its owners: leaves the
    /// radial cycle (freeing the edge if nothing else uses it) and frees
    /// both vertexuses.
    fn free_edgeuse_pair(&mut self, eu: EdgeUseKey) -> Result<()> {
        let mate = self.eu_mate(eu)?;
        let e = self.edgeuse(eu)?.edge;
        if !self.unlink_radial_pair(eu)? {
            self.free_edge(e)?;
        }
        for x in [eu, mate] {
            let vu = self.edgeuse(x)?.vu;
            self.free_vertexuse(vu)?;
            self.edgeuses.remove(x);
        }
        Ok(())
    }

    /// Kills an edgeuse and its mate.
    ///
    /// A loop left without edgeuses is killed, and a face left without
    /// loops is killed with it. Returns `true` when the owner (loop or
    /// shell) was emptied.
    pub fn kill_edgeuse(&mut self, eu: EdgeUseKey) -> Result<bool> {
        let mate = self.eu_mate(eu)?;
        let up = self.edgeuse(eu)?.up;
        self.detach_edgeuse(eu)?;
        self.detach_edgeuse(mate)?;
        self.free_edgeuse_pair(eu)?;
        match up {
            EdgeUseParent::Loop(lu) => {
                if self.lu_edgeuses(lu)?.is_empty() {
                    self.kill_loopuse(lu)?;
                    return Ok(true);
                }
                Ok(false)
            }
            EdgeUseParent::Shell(s) => Ok(self.shell(s)?.is_empty()),
        }
    }

    /// Kills a loopuse, its mate and the loop. A face left without loops is
    /// killed too. Returns `true` when the owner was emptied.
    pub fn kill_loopuse(&mut self, lu: LoopUseKey) -> Result<bool> {
        let lumate = self.loopuse(lu)?.mate;
        let up = self.loopuse(lu)?.up;
        let lp = self.loopuse(lu)?.lp;
        for x in [lu, lumate] {
            match self.loopuse(x)?.contents.clone() {
                LoopContents::Vertex(vu) => self.free_vertexuse(vu)?,
                LoopContents::Edges(eus) => {
                    if x == lu {
                        for eu in eus {
                            // The mate sits in `lumate` and goes with it.
                            self.free_edgeuse_pair(eu)?;
                        }
                    }
                }
            }
        }
        self.detach_loopuse(lu)?;
        self.detach_loopuse(lumate)?;
        self.loopuses.remove(lu);
        self.loopuses.remove(lumate);
        self.loops.remove(lp);
        match up {
            LoopUseParent::Face(fu) => {
                if self.faceuse(fu)?.loops.is_empty() {
                    self.kill_faceuse(fu)?;
                    return Ok(true);
                }
                Ok(false)
            }
            LoopUseParent::Shell(s) => Ok(self.shell(s)?.is_empty()),
        }
    }

    /// Kills a faceuse, its mate and the face. Returns `true` when the
    /// shell is left empty.
    pub fn kill_faceuse(&mut self, fu: FaceUseKey) -> Result<bool> {
        let data = self.faceuse(fu)?;
        let (fumate, f, s) = (data.mate, data.face, data.shell);
        while let Some(&lu) = self.faceuse(fu)?.loops.first() {
            if self.kill_loopuse(lu)? && !self.faceuses.contains_key(fu) {
                // The last loop took the face with it.
                return Ok(self.shell(s)?.is_empty());
            }
        }
        // Loops of the mate are mates of the loops just killed.
        self.release_face_geom(f)?;
        self.faces.remove(f);
        self.faceuses.remove(fu);
        self.faceuses.remove(fumate);
        self.shell_mut(s)?.faceuses.retain(|&x| x != fu && x != fumate);
        Ok(self.shell(s)?.is_empty())
    }

    /// Kills a shell and everything in it. Returns `true` when the region
    /// is left empty.
    pub fn kill_shell(&mut self, s: ShellKey) -> Result<bool> {
        while let Some(&fu) = self.shell(s)?.faceuses.first() {
            self.kill_faceuse(fu)?;
        }
        while let Some(&lu) = self.shell(s)?.wire_loops.first() {
            self.kill_loopuse(lu)?;
        }
        while let Some(&eu) = self.shell(s)?.wire_edges.first() {
            self.kill_edgeuse(eu)?;
        }
        if let Some(vu) = self.shell(s)?.vertexuse {
            self.kill_vertexuse(vu)?;
        }
        let r = self.shell(s)?.region;
        self.shells.remove(s);
        let rd = self.region_mut(r)?;
        rd.shells.retain(|&x| x != s);
        Ok(rd.shells.is_empty())
    }

    /// Kills a region and its shells. Returns `true` when the model is left
    /// empty, in which case index numbering restarts at zero.
    pub fn kill_region(&mut self, r: RegionKey) -> Result<bool> {
        while let Some(&s) = self.region(r)?.shells.first() {
            self.kill_shell(s)?;
        }
        self.regions.remove(r);
        self.region_list.retain(|&x| x != r);
        self.collect_garbage();
        let empty = self.region_list.is_empty();
        if empty && self.vertices.is_empty() {
            self.maxindex = 0;
        }
        Ok(empty)
    }

    // ========================================================================
    // Demote
    // ========================================================================

    /// Whether an edge loop encloses nothing: fewer than three edgeuses, or
    /// every edge it uses is used twice by it (a loop made only of cracks).
    pub fn loop_is_degenerate(&self, lu: LoopUseKey) -> Result<bool> {
        let eus = match &self.loopuse(lu)?.contents {
            LoopContents::Edges(eus) => eus,
            LoopContents::Vertex(_) => return Ok(false),
        };
        if eus.len() < 3 {
            return Ok(true);
        }
        let mut counts: FxHashMap<EdgeKey, usize> = FxHashMap::default();
        for &eu in eus {
            *counts.entry(self.edgeuse(eu)?.edge).or_default() += 1;
        }
        Ok(counts.values().all(|&c| c >= 2))
    }

    /// Demotes a degenerate edge loop into wire edges of its shell and
    /// kills the loop. A face left without loops is killed.
    pub fn demote_loopuse(&mut self, lu: LoopUseKey) -> Result<()> {
        if matches!(self.loopuse(lu)?.contents, LoopContents::Vertex(_)) {
            return Err(Error::precondition("cannot demote a vertex loop"));
        }
        if !self.loop_is_degenerate(lu)? {
            return Err(Error::precondition("loop is not degenerate"));
        }
        let s = self.lu_shell(lu)?;
        let lumate = self.loopuse(lu)?.mate;
        let up = self.loopuse(lu)?.up;
        let lp = self.loopuse(lu)?.lp;
        let wire = EdgeUseParent::Shell(s);
        for x in [lu, lumate] {
            let LoopContents::Edges(eus) = std::mem::replace(
                &mut self.loopuse_mut(x)?.contents,
                LoopContents::Edges(Vec::new()),
            ) else {
                continue;
            };
            for eu in eus {
                self.attach_edgeuse(eu, wire, usize::MAX)?;
            }
        }
        self.detach_loopuse(lu)?;
        self.detach_loopuse(lumate)?;
        self.loopuses.remove(lu);
        self.loopuses.remove(lumate);
        self.loops.remove(lp);
        if let LoopUseParent::Face(fu) = up {
            if self.faceuse(fu)?.loops.is_empty() {
                self.kill_faceuse(fu)?;
            }
        }
        tracing::trace!(shell = ?s, "demoted loop to wire edges");
        Ok(())
    }

    /// Removes a degenerate wire edge (both ends on one vertex).
    ///
    /// If nothing else in the shell uses the vertex, it survives as the
    /// shell's lone vertexuse when the shell would otherwise be empty, or as
    /// a vertex loop.
    pub fn demote_edgeuse(&mut self, eu: EdgeUseKey) -> Result<()> {
        let EdgeUseParent::Shell(s) = self.edgeuse(eu)?.up else {
            return Err(Error::precondition("edgeuse is not a wire edge"));
        };
        let mate = self.eu_mate(eu)?;
        let v = self.eu_vertex(eu)?;
        if self.eu_vertex(mate)? != v {
            return Err(Error::precondition("wire edge endpoints differ"));
        }
        let own = [self.edgeuse(eu)?.vu, self.edgeuse(mate)?.vu];
        let mut used_elsewhere = false;
        for &vu in &self.vertex(v)?.uses {
            if !own.contains(&vu) && self.vu_shell(vu)? == s {
                used_elsewhere = true;
                break;
            }
        }
        let shell = self.shell(s)?;
        let only_this = shell.faceuses.is_empty()
            && shell.wire_loops.is_empty()
            && shell.vertexuse.is_none()
            && shell.wire_edges.len() == 2;
        if !used_elsewhere {
            if only_this {
                let vu = self.alloc_vertexuse(v, VertexUseParent::Shell(s))?;
                self.shell_mut(s)?.vertexuse = Some(vu);
            } else {
                self.make_loop_vertex(LoopUseParent::Shell(s), Some(v), Orientation::Unspecified)?;
            }
        }
        self.kill_edgeuse(eu)?;
        Ok(())
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Removes cracks from the loops of a face: consecutive edgeuses that
    /// run out along an edge and straight back. A loop made of nothing but
    /// one crack is killed. Returns the number of cracks removed.
    pub fn kill_cracks(&mut self, fu: FaceUseKey) -> Result<usize> {
        let fu = self.fu_same(fu)?;
        let mut killed = 0;
        for lu in self.faceuse(fu)?.loops.clone() {
            while self.loopuses.contains_key(lu) {
                let eus = self.lu_edgeuses(lu)?.to_vec();
                let n = eus.len();
                let mut crack = None;
                for i in 0..n {
                    let (a, b) = (eus[i], eus[(i + 1) % n]);
                    if a != b && self.edgeuse(a)?.edge == self.edgeuse(b)?.edge {
                        crack = Some((a, b));
                        break;
                    }
                }
                let Some((a, b)) = crack else { break };
                killed += 1;
                if n == 2 {
                    self.kill_loopuse(lu)?;
                    break;
                }
                self.kill_edgeuse(a)?;
                self.kill_edgeuse(b)?;
            }
        }
        if killed > 0 {
            tracing::trace!(killed, "killed cracks");
        }
        Ok(killed)
    }

    /// Undoes an edge split: when the edge of `eu` and the edge of the
    /// edgeuse after it meet at a vertex used by nothing else, lie on one
    /// line and carry the same uses, the second edge is removed and the
    /// first stretched over both. Returns whether the edges were joined.
    pub fn unbreak_edge(&mut self, eu: EdgeUseKey, tol: &Tolerance) -> Result<bool> {
        if !matches!(self.edgeuse(eu)?.up, EdgeUseParent::Loop(_)) {
            return Ok(false);
        }
        let next = self.eu_next(eu)?;
        let (e1, e2) = (self.edgeuse(eu)?.edge, self.edgeuse(next)?.edge);
        let (a, v, c) = (self.eu_vertex(eu)?, self.eu_end_vertex(eu)?, self.eu_end_vertex(next)?);
        if e1 == e2 || a == c || a == v {
            return Ok(false);
        }
        let uses1 = self.edge_uses(e1)?;
        let uses2 = self.edge_uses(e2)?;
        if uses1.len() != uses2.len() {
            return Ok(false);
        }
        for &vu in &self.vertex(v)?.uses {
            match self.vertexuse(vu)?.up {
                VertexUseParent::EdgeUse(x) if [e1, e2].contains(&self.edgeuse(x)?.edge) => {}
                _ => return Ok(false),
            }
        }
        if let (Some(pa), Some(pv), Some(pc)) =
            (self.vertex(a)?.point, self.vertex(v)?.point, self.vertex(c)?.point)
        {
            let between = (pv - pa).dot(&(pc - pa)) > 0.0 && (pv - pc).dot(&(pa - pc)) > 0.0;
            if !between || LineSeg::through(&pa, &pc).dist_to_point(&pv) > tol.dist {
                return Ok(false);
            }
        }

        // Every use of e1 running a -> v must be followed by a use of e2.
        let mut pairs = Vec::with_capacity(uses1.len() / 2);
        for &x in &uses1 {
            if self.eu_vertex(x)? != a {
                continue;
            }
            if !matches!(self.edgeuse(x)?.up, EdgeUseParent::Loop(_)) {
                return Ok(false);
            }
            let y = self.eu_next(x)?;
            if self.edgeuse(y)?.edge != e2 || self.eu_vertex(y)? != v {
                return Ok(false);
            }
            pairs.push((x, y));
        }
        if 2 * pairs.len() != uses2.len() {
            return Ok(false);
        }

        for (x, y) in pairs {
            let (xm, ym) = (self.eu_mate(x)?, self.eu_mate(y)?);
            self.detach_edgeuse(y)?;
            self.detach_edgeuse(ym)?;
            self.free_edgeuse_pair(y)?;
            let vu = self.edgeuse(xm)?.vu;
            self.relink_vertexuse(vu, c)?;
        }
        if self.edge(e1)?.geom.is_some() {
            self.assign_edge_geometry(e1)?;
        }
        tracing::trace!(edge = self.edge(e1)?.index, "unbroke edge");
        Ok(true)
    }

    // ========================================================================
    // Move / join / split
    // ========================================================================

    /// Moves a vertexuse onto another vertex.
    pub fn move_vertexuse(&mut self, vu: VertexUseKey, v: VertexKey) -> Result<()> {
        self.relink_vertexuse(vu, v)
    }

    /// Joins `v2` into `v1`: every use of `v2` moves to `v1`, and `v2` is
    /// freed. `v1` keeps its position, or takes `v2`'s if it has none.
    pub fn join_vertex(&mut self, v1: VertexKey, v2: VertexKey) -> Result<()> {
        if v1 == v2 {
            return Ok(());
        }
        let p2 = self.vertex(v2)?.point;
        if self.vertex(v1)?.point.is_none() {
            self.vertex_mut(v1)?.point = p2;
        }
        for vu in self.vertex(v2)?.uses.clone() {
            self.relink_vertexuse(vu, v1)?;
        }
        Ok(())
    }

    /// Makes `f2` share the geometry of `f1`, keeping `f2`'s effective
    /// normal.
    pub fn join_face_geometry(&mut self, f1: FaceKey, f2: FaceKey) -> Result<()> {
        let g = self
            .face(f1)?
            .geom
            .ok_or(Error::MissingGeometry(f1.into()))?;
        if self.face(f2)?.geom == Some(g) {
            return Ok(());
        }
        let flip = match (self.face_plane(f2), &self.face_geom(g)?.geometry) {
            (Ok(p2), FaceGeometry::Plane(shared)) => shared.normal.dot(&p2.normal) < 0.0,
            _ => self.face(f1)?.flip,
        };
        self.set_face_geom(f2, g)?;
        self.face_mut(f2)?.flip = flip;
        Ok(())
    }

    /// Breaks the edge used by `eu` at vertex `v` (a new vertex when
    /// `None`), splitting every use of the edge.
    ///
    /// `eu` keeps its start and now ends at `v`; the returned edgeuse runs
    /// from `v` to `eu`'s old end. The new edge shares the old edge's
    /// geometry and mirrors its radial ordering.
    pub fn split_edge(&mut self, eu: EdgeUseKey, v: Option<VertexKey>) -> Result<EdgeUseKey> {
        let p = self.eu_vertex(eu)?;
        let q = self.eu_end_vertex(eu)?;
        let v = match v {
            Some(v) => {
                self.vertex(v)?;
                if v == p || v == q {
                    return Err(Error::precondition("split vertex is an edge endpoint"));
                }
                v
            }
            None => self.alloc_vertex(None),
        };
        let old_edge = self.edgeuse(eu)?.edge;
        let geom = self.edge(old_edge)?.geom;
        let walk = self.radial_uses(eu)?;
        let old_radial: Vec<(EdgeUseKey, EdgeUseKey)> = walk
            .iter()
            .map(|&u| Ok((u, self.edgeuse(u)?.radial)))
            .collect::<Result<_>>()?;

        let mut new_of: FxHashMap<EdgeUseKey, EdgeUseKey> = FxHashMap::default();
        let mut new_edge = None;
        // Even walk positions run the same way as `eu`.
        for &x in walk.iter().step_by(2) {
            let xm = self.eu_mate(x)?;
            let up = self.edgeuse(x)?.up;
            let mate_up = self.edgeuse(xm)?.up;
            let (y, ym) = self.alloc_edgeuse_pair(v, q, up, mate_up, new_edge)?;
            let e_new = self.edgeuse(y)?.edge;
            new_edge = Some(e_new);

            let pos = self.edgeuse_slot(x)?;
            self.attach_edgeuse(y, up, pos + 1)?;
            let mpos = self.edgeuse_slot(xm)?;
            self.attach_edgeuse(ym, mate_up, mpos)?;
            let xm_vu = self.edgeuse(xm)?.vu;
            self.relink_vertexuse(xm_vu, v)?;
            new_of.insert(x, y);
            new_of.insert(xm, ym);
        }
        for (u, r) in old_radial {
            if let (Some(&nu), Some(&nr)) = (new_of.get(&u), new_of.get(&r)) {
                self.edgeuse_mut(nu)?.radial = nr;
            }
        }
        if let (Some(e_new), Some(g)) = (new_edge, geom) {
            self.set_edge_geom(e_new, g)?;
        }
        new_of
            .get(&eu)
            .copied()
            .ok_or_else(|| Error::InvariantViolation("split lost the edgeuse".into()))
    }

    /// Reverses a face: the faceuses swap orientation and the face's
    /// geometry sense flips, so each faceuse keeps its loops.
    pub fn reverse_face(&mut self, fu: FaceUseKey) -> Result<()> {
        let data = self.faceuse(fu)?;
        let (mate, f) = (data.mate, data.face);
        let o = data.orientation;
        self.faceuse_mut(fu)?.orientation = o.flipped();
        let om = self.faceuse(mate)?.orientation;
        self.faceuse_mut(mate)?.orientation = om.flipped();
        let fd = self.face_mut(f)?;
        fd.flip = !fd.flip;
        Ok(())
    }

    /// Turns a shell inside out: every face is reversed once.
    pub fn invert_shell(&mut self, s: ShellKey) -> Result<()> {
        let faces = self.shell_faces(s)?;
        for &fu in &faces {
            self.reverse_face(fu)?;
        }
        tracing::trace!(shell = ?s, faces = faces.len(), "inverted shell");
        Ok(())
    }

    /// Resets the orientation of a face loop and its mate from geometry:
    /// a loop winding counter-clockwise about the outward normal is an
    /// outer loop (`Same`), a clockwise one a hole (`Opposite`). Returns
    /// whether the orientation changed.
    pub fn lu_reorient(&mut self, lu: LoopUseKey) -> Result<bool> {
        let LoopUseParent::Face(fu) = self.loopuse(lu)?.up else {
            return Err(Error::precondition("only face loops have an orientation to fix"));
        };
        let lu = if self.faceuse(fu)?.orientation == Orientation::Same {
            lu
        } else {
            self.loopuse(lu)?.mate
        };
        if matches!(self.loopuse(lu)?.contents, LoopContents::Vertex(_)) {
            return Ok(false);
        }
        let normal = self.fu_normal(self.fu_same(fu)?)?;
        let Some(winding) = newell_normal(&self.lu_points(lu)?) else {
            return Ok(false);
        };
        let orientation = if winding.dot(&normal) < 0.0 {
            Orientation::Opposite
        } else {
            Orientation::Same
        };
        if self.loopuse(lu)?.orientation == orientation {
            return Ok(false);
        }
        let mate = self.loopuse(lu)?.mate;
        self.loopuse_mut(lu)?.orientation = orientation;
        self.loopuse_mut(mate)?.orientation = orientation;
        tracing::trace!(loopuse = self.loopuse(lu)?.index, ?orientation, "reoriented loop");
        Ok(true)
    }

    /// Moves everything from shell `src` into `dst` and kills `src`.
    ///
    /// A lone vertexuse does not survive in a shell that has other contents.
    pub fn merge_shells(&mut self, dst: ShellKey, src: ShellKey) -> Result<()> {
        if dst == src {
            return Err(Error::precondition("cannot merge a shell with itself"));
        }
        self.shell(dst)?;
        let sd = self.shell(src)?.clone();
        for &fu in &sd.faceuses {
            self.faceuse_mut(fu)?.shell = dst;
        }
        for &lu in &sd.wire_loops {
            self.loopuse_mut(lu)?.up = LoopUseParent::Shell(dst);
        }
        for &eu in &sd.wire_edges {
            self.edgeuse_mut(eu)?.up = EdgeUseParent::Shell(dst);
        }
        {
            let d = self.shell_mut(dst)?;
            d.faceuses.extend_from_slice(&sd.faceuses);
            d.wire_loops.extend_from_slice(&sd.wire_loops);
            d.wire_edges.extend_from_slice(&sd.wire_edges);
        }
        let mut lone = [self.shell(dst)?.vertexuse, sd.vertexuse];
        self.shell_mut(dst)?.vertexuse = None;
        let has_other = {
            let d = self.shell(dst)?;
            !d.faceuses.is_empty() || !d.wire_loops.is_empty() || !d.wire_edges.is_empty()
        };
        if !has_other {
            if let Some(keep) = lone[0].take().or_else(|| lone[1].take()) {
                self.vertexuse_mut(keep)?.up = VertexUseParent::Shell(dst);
                self.shell_mut(dst)?.vertexuse = Some(keep);
            }
        }
        for vu in lone.into_iter().flatten() {
            self.free_vertexuse(vu)?;
        }
        self.shells.remove(src);
        self.region_mut(sd.region)?.shells.retain(|&x| x != src);
        self.shell_mut(dst)?.bbox = None;
        Ok(())
    }

    /// Moves every shell of `src` into `dst` and removes `src`.
    pub fn merge_regions(&mut self, dst: RegionKey, src: RegionKey) -> Result<()> {
        if dst == src {
            return Err(Error::precondition("cannot merge a region with itself"));
        }
        self.region(dst)?;
        let shells = self.region(src)?.shells.clone();
        for &s in &shells {
            self.shell_mut(s)?.region = dst;
        }
        self.region_mut(dst)?.shells.extend(shells);
        self.regions.remove(src);
        self.region_list.retain(|&x| x != src);
        self.region_bbox(dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ck::check_model;

    fn square(m: &mut Model, s: ShellKey) -> FaceUseKey {
        m.make_face_from_points(
            s,
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
        )
        .unwrap()
    }

    /// Triangle hanging off the first edge of `fu`, on that edge's vertices.
    fn flap(m: &mut Model, s: ShellKey, fu: FaceUseKey, apex: Point3<f64>) -> FaceUseKey {
        let verts = m.lu_vertices(m.faceuse(fu).unwrap().loops[0]).unwrap();
        let top = m.alloc_vertex(Some(apex));
        m.make_face_from_verts(s, &[Some(verts[1]), Some(verts[0]), Some(top)])
            .unwrap()
            .0
    }

    fn assert_valid(m: &Model) {
        let report = check_model(m);
        assert!(report.is_ok(), "violations: {:?}", report.violations);
    }

    // --- Make tests ---

    #[test]
    fn region_shell_vertex() {
        let mut m = make_model();
        let (r, s, vu) = m.make_region_shell_vertex().unwrap();
        assert_eq!(m.regions(), &[r]);
        assert_eq!(m.shell(s).unwrap().vertexuse, Some(vu));
        assert_eq!(m.maxindex(), 4);
        assert_valid(&m);
    }

    #[test]
    fn make_edge_absorbs_lone_vertex() {
        let mut m = make_model();
        let (_, s, vu) = m.make_region_shell_vertex().unwrap();
        let lone_v = m.vertexuse(vu).unwrap().vertex;
        let eu = m.make_edge(Some(lone_v), None, s).unwrap();
        assert!(m.shell(s).unwrap().vertexuse.is_none());
        assert_eq!(m.eu_vertex(eu).unwrap(), lone_v);
        assert_eq!(m.shell(s).unwrap().wire_edges.len(), 2);
        assert_eq!(m.vertex_count(), 2);
        assert_valid(&m);
    }

    #[test]
    fn loop_vertex_steals_lone_vertexuse() {
        let mut m = make_model();
        let (_, s, vu) = m.make_region_shell_vertex().unwrap();
        let lu = m
            .make_loop_vertex(LoopUseParent::Shell(s), None, Orientation::Unspecified)
            .unwrap();
        assert_eq!(m.loopuse(lu).unwrap().contents, LoopContents::Vertex(vu));
        assert!(m.shell(s).unwrap().vertexuse.is_none());
        assert_valid(&m);
    }

    #[test]
    fn edge_on_vertex_loop() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let lu = m
            .make_loop_vertex(LoopUseParent::Shell(s), None, Orientation::Unspecified)
            .unwrap();
        let LoopContents::Vertex(vu) = m.loopuse(lu).unwrap().contents else {
            panic!("expected vertex loop");
        };
        let eu = m.make_edge_on_vertexuse(vu).unwrap();
        assert_eq!(m.eu_vertex(eu).unwrap(), m.eu_end_vertex(eu).unwrap());
        assert_eq!(m.lu_edgeuses(lu).unwrap(), &[eu]);
        assert_valid(&m);
    }

    #[test]
    fn wires_close_into_loop_then_face() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let a = m.make_edge(None, None, s).unwrap();
        let v0 = m.eu_vertex(a).unwrap();
        let v1 = m.eu_end_vertex(a).unwrap();
        let b = m.make_edge_vertex(v1, s).unwrap();
        let v2 = m.eu_end_vertex(b).unwrap();
        m.make_edge(Some(v2), Some(v0), s).unwrap();
        let lu = m.make_loop_from_wires(s).unwrap();
        assert_eq!(m.lu_edgeuses(lu).unwrap().len(), 3);
        assert!(m.shell(s).unwrap().wire_edges.is_empty());
        for (v, p) in [(v0, [0.0, 0.0, 0.0]), (v1, [1.0, 0.0, 0.0]), (v2, [0.0, 1.0, 0.0])] {
            m.set_vertex_point(v, Point3::from(p)).unwrap();
        }
        let fu = m.make_face(lu).unwrap();
        m.assign_face_plane(fu).unwrap();
        assert_eq!(m.loopuse(lu).unwrap().orientation, Orientation::Same);
        assert_eq!(m.face_count(), 1);
        assert_valid(&m);
    }

    #[test]
    fn open_wire_chain_is_rejected() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        m.make_edge(None, None, s).unwrap();
        let before = m.maxindex();
        assert!(matches!(m.make_loop_from_wires(s), Err(Error::Precondition(_))));
        assert_eq!(m.maxindex(), before);
    }

    #[test]
    fn face_from_points_has_plane() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let fu = square(&mut m, s);
        let plane = m.fu_plane(fu).unwrap();
        assert!((plane.normal.z - 1.0).abs() < 1e-12);
        let mate = m.faceuse(fu).unwrap().mate;
        assert!((m.fu_plane(mate).unwrap().normal.z + 1.0).abs() < 1e-12);
        assert!(m.shell(s).unwrap().vertexuse.is_none());
        assert_valid(&m);
    }

    // --- Kill tests ---

    #[test]
    fn killing_last_edge_kills_loop_and_face() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let (fu, _) = m.make_face_from_verts(s, &[None, None]).unwrap();
        let lu = m.faceuse(fu).unwrap().loops[0];
        let eus = m.lu_edgeuses(lu).unwrap().to_vec();
        assert!(!m.kill_edgeuse(eus[0]).unwrap());
        assert!(m.kill_edgeuse(eus[1]).unwrap());
        assert_eq!(m.face_count(), 0);
        assert_eq!(m.loop_count(), 0);
        assert_eq!(m.edgeuse_count(), 0);
        assert_valid(&m);
    }

    #[test]
    fn kill_region_resets_index() {
        let mut m = make_model();
        let (r, s, _) = m.make_region_shell_vertex().unwrap();
        square(&mut m, s);
        assert!(m.kill_region(r).unwrap());
        assert_eq!(m.maxindex(), 0);
        assert_eq!(m.vertex_count(), 0);
        assert_eq!(m.face_geom_count(), 0);
        assert_eq!(m.edge_geom_count(), 0);
    }

    #[test]
    fn kill_face_keeps_shared_edges() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let a = square(&mut m, s);
        let b = flap(&mut m, s, a, Point3::new(0.5, 0.0, 1.0));
        let eu_a = m.lu_edgeuses(m.faceuse(a).unwrap().loops[0]).unwrap()[0];
        let shared = m.edgeuse(eu_a).unwrap().edge;
        let other = m.lu_edgeuses(m.faceuse(b).unwrap().loops[0]).unwrap()[0];
        m.join_edge(eu_a, other).unwrap();
        m.kill_faceuse(b).unwrap();
        assert!(m.edge(shared).is_ok());
        assert_eq!(m.edge_uses(shared).unwrap().len(), 2);
        assert_valid(&m);
    }

    // --- Demote tests ---

    #[test]
    fn demote_rejects_real_loop() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let fu = square(&mut m, s);
        let lu = m.faceuse(fu).unwrap().loops[0];
        let before = m.maxindex();
        assert!(matches!(m.demote_loopuse(lu), Err(Error::Precondition(_))));
        assert_eq!(m.maxindex(), before);
        assert_eq!(m.face_count(), 1);
    }

    #[test]
    fn demote_crack_loop_to_wires() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let (fu, _) = m.make_face_from_verts(s, &[None, None]).unwrap();
        let lu = m.faceuse(fu).unwrap().loops[0];
        m.demote_loopuse(lu).unwrap();
        assert_eq!(m.face_count(), 0);
        assert_eq!(m.shell(s).unwrap().wire_edges.len(), 4);
        assert_valid(&m);
    }

    #[test]
    fn demote_zero_length_wire_leaves_lone_vertex() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let eu = m.make_edge(None, None, s).unwrap();
        let (a, b) = (m.eu_vertex(eu).unwrap(), m.eu_end_vertex(eu).unwrap());
        assert!(matches!(m.demote_edgeuse(eu), Err(Error::Precondition(_))));
        m.join_vertex(a, b).unwrap();
        m.demote_edgeuse(eu).unwrap();
        let shell = m.shell(s).unwrap();
        assert!(shell.wire_edges.is_empty());
        assert!(shell.vertexuse.is_some());
        assert_eq!(m.vertex_count(), 1);
        assert_valid(&m);
    }

    // --- Cleanup tests ---

    #[test]
    fn kill_cracks_removes_spur() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.5, 0.5, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let v: Vec<_> = p.iter().map(|q| m.alloc_vertex(Some(*q))).collect();
        let ring = [v[0], v[1], v[2], v[3], v[2], v[4]].map(Some);
        let (fu, _) = m.make_face_from_verts(s, &ring).unwrap();
        m.assign_face_plane(fu).unwrap();
        crate::fuse::edge_fuse(&mut m, TopologyKey::Shell(s), &Tolerance::new(1e-6, 1e-6)).unwrap();
        assert_eq!(m.edge_count(), 5);

        assert_eq!(m.kill_cracks(fu).unwrap(), 1);
        let lu = m.faceuse(fu).unwrap().loops[0];
        assert_eq!(m.lu_edgeuses(lu).unwrap().len(), 4);
        assert_eq!(m.edge_count(), 4);
        assert_eq!(m.vertex_count(), 4);
        assert!((m.fu_area(fu).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(m.kill_cracks(fu).unwrap(), 0);
        assert_valid(&m);
    }

    #[test]
    fn unbreak_edge_undoes_split() {
        let mut m = make_model();
        let (_, s) = crate::builders::make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let tol = Tolerance::new(1e-6, 1e-6);
        let fu = m.shell_faces(s).unwrap()[0];
        let eu = m.lu_edgeuses(m.faceuse(fu).unwrap().loops[0]).unwrap()[0];
        let (a, b) = m.eu_points(eu).unwrap();
        let far = m.eu_end_vertex(eu).unwrap();
        let mid = m.alloc_vertex(Some(nalgebra::center(&a, &b)));
        m.split_edge(eu, Some(mid)).unwrap();
        assert_eq!((m.vertex_count(), m.edge_count()), (9, 13));

        assert!(m.unbreak_edge(eu, &tol).unwrap());
        assert_eq!((m.vertex_count(), m.edge_count()), (8, 12));
        assert_eq!(m.eu_end_vertex(eu).unwrap(), far);
        assert!((m.shell_volume(s).unwrap() - 1.0).abs() < 1e-12);
        assert_valid(&m);
    }

    #[test]
    fn unbreak_edge_keeps_bent_corner() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let fu = square(&mut m, s);
        let eu = m.lu_edgeuses(m.faceuse(fu).unwrap().loops[0]).unwrap()[0];
        assert!(!m.unbreak_edge(eu, &Tolerance::new(1e-6, 1e-6)).unwrap());
        assert_eq!(m.edge_count(), 4);
    }

    #[test]
    fn invert_shell_turns_volume_negative() {
        let mut m = make_model();
        let (_, s) = crate::builders::make_box(&mut m, Point3::origin(), Point3::new(1.0, 2.0, 3.0)).unwrap();
        m.invert_shell(s).unwrap();
        assert!((m.shell_volume(s).unwrap() + 6.0).abs() < 1e-9);
        assert!(crate::ck::ck_closed_surf(&m, s).unwrap().is_empty());
        m.invert_shell(s).unwrap();
        assert!((m.shell_volume(s).unwrap() - 6.0).abs() < 1e-9);
        assert_valid(&m);
    }

    #[test]
    fn lu_reorient_fixes_mislabelled_hole() {
        let mut m = make_model();
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
        let hole: Vec<Option<VertexKey>> = [(1.0, 1.0), (1.0, 3.0), (3.0, 3.0), (3.0, 1.0)]
            .iter()
            .map(|&(x, y)| Some(m.alloc_vertex(Some(Point3::new(x, y, 0.0)))))
            .collect();
        let (lu, _) = m.add_loop_to_face(s, Some(fu), &hole, Orientation::Opposite).unwrap();
        let outer = m.faceuse(fu).unwrap().loops[0];
        assert!(!m.lu_reorient(outer).unwrap());
        assert!(!m.lu_reorient(lu).unwrap());

        let mate = m.loopuse(lu).unwrap().mate;
        m.loopuse_mut(lu).unwrap().orientation = Orientation::Same;
        m.loopuse_mut(mate).unwrap().orientation = Orientation::Same;
        // Asking through the mate fixes both sides.
        assert!(m.lu_reorient(mate).unwrap());
        assert_eq!(m.loopuse(lu).unwrap().orientation, Orientation::Opposite);
        assert_eq!(m.loopuse(mate).unwrap().orientation, Orientation::Opposite);
        assert_valid(&m);
    }

    // --- Join / split tests ---

    #[test]
    fn join_vertex_moves_uses() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let e1 = m.make_edge(None, None, s).unwrap();
        let e2 = m.make_edge(None, None, s).unwrap();
        let a = m.eu_end_vertex(e1).unwrap();
        let b = m.eu_vertex(e2).unwrap();
        m.set_vertex_point(b, Point3::new(2.0, 0.0, 0.0)).unwrap();
        m.join_vertex(a, b).unwrap();
        assert!(m.vertex(b).is_err());
        assert_eq!(m.vertex(a).unwrap().uses.len(), 2);
        assert_eq!(m.vertex_point(a).unwrap(), Point3::new(2.0, 0.0, 0.0));
        assert_valid(&m);
    }

    #[test]
    fn split_edge_splits_every_use() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let a = square(&mut m, s);
        let b = flap(&mut m, s, a, Point3::new(0.5, 0.0, 1.0));
        let eu_a = m.lu_edgeuses(m.faceuse(a).unwrap().loops[0]).unwrap()[0];
        let eu_b = m.lu_edgeuses(m.faceuse(b).unwrap().loops[0]).unwrap()[0];
        m.join_edge(eu_a, eu_b).unwrap();

        let mid = m.alloc_vertex(Some(Point3::new(0.5, 0.0, 0.0)));
        let new_eu = m.split_edge(eu_a, Some(mid)).unwrap();
        assert_eq!(m.eu_vertex(new_eu).unwrap(), mid);
        assert_eq!(m.eu_end_vertex(eu_a).unwrap(), mid);
        assert_eq!(m.lu_edgeuses(m.faceuse(a).unwrap().loops[0]).unwrap().len(), 5);
        assert_eq!(m.lu_edgeuses(m.faceuse(b).unwrap().loops[0]).unwrap().len(), 4);
        assert_eq!(m.radial_uses(new_eu).unwrap().len(), 4);
        assert_eq!(m.eu_next(eu_a).unwrap(), new_eu);
        assert_valid(&m);
    }

    #[test]
    fn split_at_endpoint_is_rejected() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let eu = m.make_edge(None, None, s).unwrap();
        let v = m.eu_vertex(eu).unwrap();
        assert!(matches!(m.split_edge(eu, Some(v)), Err(Error::Precondition(_))));
    }

    #[test]
    fn reverse_face_keeps_loops() {
        let mut m = make_model();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        let fu = square(&mut m, s);
        let n0 = m.fu_normal(fu).unwrap();
        m.reverse_face(fu).unwrap();
        assert_eq!(m.faceuse(fu).unwrap().orientation, Orientation::Opposite);
        let n1 = m.fu_normal(fu).unwrap();
        assert!((n0 - n1).norm() < 1e-12);
        let same = m.fu_same(fu).unwrap();
        assert!((m.fu_normal(same).unwrap() + n0).norm() < 1e-12);
        assert_valid(&m);
    }

    #[test]
    fn merge_shells_and_regions() {
        let mut m = make_model();
        let (r1, s1, _) = m.make_region_shell_vertex().unwrap();
        let (r2, s2, _) = m.make_region_shell_vertex().unwrap();
        square(&mut m, s1);
        square(&mut m, s2);
        m.translate_shell(s2, &Vector3::new(0.0, 0.0, 2.0)).unwrap();
        m.merge_regions(r1, r2).unwrap();
        assert_eq!(m.region(r1).unwrap().shells.len(), 2);
        let bb = m.region(r1).unwrap().bbox.unwrap();
        assert_eq!((bb.min.z, bb.max.z), (0.0, 2.0));
        assert_eq!(m.shell(s2).unwrap().bbox.unwrap().min.z, 2.0);
        m.merge_shells(s1, s2).unwrap();
        assert!(m.shell(s1).unwrap().bbox.is_none());
        assert_eq!(m.region_bbox(r1).unwrap(), bb);
        assert_eq!(m.shell(s1).unwrap().bbox, Some(bb));
        let shell = m.shell(s1).unwrap();
        assert_eq!(shell.faceuses.len(), 4);
        assert!(shell.vertexuse.is_none());
        assert_eq!(m.regions(), &[r1]);
        assert_valid(&m);
    }
}

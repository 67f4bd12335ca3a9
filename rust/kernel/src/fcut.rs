// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Face cutter.
//!
//! [`face_cutjoin`] cuts a face along segments between its vertices. The
//! face boundary and the cut segments form a planar graph in the face's
//! frame; edges hanging off the graph are pruned, and the remaining
//! half-edges are walked with the face on their left. Counter-clockwise
//! walks bound cells, clockwise walks are the outsides of connected pieces
//! and become holes of the smallest cell around them. Cells lying inside
//! the original face replace it.
//!
//! A segment that only touches the boundary, or that already is an edge,
//! leaves the face as it was.
//!
//! [`face_join`] and [`face_simplify`] run the same walk the other way:
//! edges lying inside the area of one or two coplanar faces are left out
//! of the graph, and the cells left are rebuilt as faces.

use nalgebra::Point2;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::classify::PointClass;
use crate::config::DebugFlags;
use crate::error::{Error, Result};
use crate::fuse::edge_fuse;
use crate::geometry::{
    dist_point_segment_2d, point_in_polygon_2d, segment_param_2d, signed_area_2d, triangle_area_2d, Frame,
};
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;
use crate::tri::ear_triangles;

/// A cycle of graph nodes with its signed area.
#[derive(Debug, Clone)]
struct Cycle {
    nodes: Vec<usize>,
    area: f64,
    component: usize,
}

#[derive(Debug, Default)]
struct Arrangement {
    verts: Vec<VertexKey>,
    pts: Vec<Point2<f64>>,
    node_of: FxHashMap<VertexKey, usize>,
    edges: FxHashSet<(usize, usize)>,
}

impl Arrangement {
    fn node(&mut self, v: VertexKey, p: Point2<f64>) -> usize {
        if let Some(&i) = self.node_of.get(&v) {
            return i;
        }
        self.verts.push(v);
        self.pts.push(p);
        self.node_of.insert(v, self.verts.len() - 1);
        self.verts.len() - 1
    }

    fn key(a: usize, b: usize) -> (usize, usize) {
        (a.min(b), a.max(b))
    }

    /// Adds edge `a`–`b`, broken at every node lying on it. Returns whether
    /// it had to be broken.
    fn add_edge(&mut self, a: usize, b: usize, tol: f64) -> bool {
        if a == b {
            return false;
        }
        let (pa, pb) = (self.pts[a], self.pts[b]);
        let mut on: Vec<(f64, usize)> = (0..self.pts.len())
            .filter(|&i| i != a && i != b)
            .filter(|&i| {
                let q = &self.pts[i];
                (q - pa).norm() > tol && (q - pb).norm() > tol && dist_point_segment_2d(q, &pa, &pb) <= tol
            })
            .map(|i| (segment_param_2d(&self.pts[i], &pa, &pb), i))
            .collect();
        on.sort_by(|x, y| x.0.total_cmp(&y.0));
        let chain: Vec<usize> = std::iter::once(a)
            .chain(on.iter().map(|&(_, i)| i))
            .chain(std::iter::once(b))
            .collect();
        for w in chain.windows(2) {
            if w[0] != w[1] {
                self.edges.insert(Self::key(w[0], w[1]));
            }
        }
        !on.is_empty()
    }

    /// Removes edges ending at a node of degree one until none are left.
    fn prune(&mut self) {
        loop {
            let mut degree = vec![0usize; self.pts.len()];
            for &(a, b) in &self.edges {
                degree[a] += 1;
                degree[b] += 1;
            }
            let before = self.edges.len();
            self.edges.retain(|&(a, b)| degree[a] > 1 && degree[b] > 1);
            if self.edges.len() == before {
                return;
            }
        }
    }

    /// Neighbours of every node, counter-clockwise by angle.
    fn fans(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.pts.len()];
        for &(a, b) in &self.edges {
            adj[a].push(b);
            adj[b].push(a);
        }
        for (i, list) in adj.iter_mut().enumerate() {
            let o = self.pts[i];
            list.sort_by(|&x, &y| {
                let ax = (self.pts[x].y - o.y).atan2(self.pts[x].x - o.x);
                let ay = (self.pts[y].y - o.y).atan2(self.pts[y].x - o.x);
                ax.total_cmp(&ay)
            });
        }
        adj
    }

    fn components(&self, adj: &[Vec<usize>]) -> Vec<usize> {
        let mut comp = vec![usize::MAX; adj.len()];
        let mut next = 0;
        for start in 0..adj.len() {
            if comp[start] != usize::MAX || adj[start].is_empty() {
                continue;
            }
            let mut stack = vec![start];
            comp[start] = next;
            while let Some(n) = stack.pop() {
                for &w in &adj[n] {
                    if comp[w] == usize::MAX {
                        comp[w] = next;
                        stack.push(w);
                    }
                }
            }
            next += 1;
        }
        comp
    }

    /// Walks every half-edge once, keeping the face on the left: after
    /// `u → v` comes the neighbour of `v` just clockwise of `u`.
    fn cycles(&self) -> Result<Vec<Cycle>> {
        let adj = self.fans();
        let comp = self.components(&adj);
        let limit = 2 * self.edges.len() + 1;
        let mut used: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut out = Vec::new();
        let mut starts: Vec<(usize, usize)> = self.edges.iter().flat_map(|&(a, b)| [(a, b), (b, a)]).collect();
        starts.sort_unstable();
        for start in starts {
            if used.contains(&start) {
                continue;
            }
            let mut nodes = Vec::new();
            let (mut u, mut v) = start;
            loop {
                used.insert((u, v));
                nodes.push(u);
                let fan = &adj[v];
                let k = fan
                    .iter()
                    .position(|&w| w == u)
                    .ok_or_else(|| Error::InvariantViolation("cut graph lost a half-edge".into()))?;
                let w = fan[(k + fan.len() - 1) % fan.len()];
                (u, v) = (v, w);
                if (u, v) == start {
                    break;
                }
                if nodes.len() > limit {
                    return Err(Error::InvariantViolation("cut graph walk does not close".into()));
                }
            }
            let pts: Vec<Point2<f64>> = nodes.iter().map(|&i| self.pts[i]).collect();
            out.push(Cycle {
                area: signed_area_2d(&pts),
                component: comp[nodes[0]],
                nodes,
            });
        }
        Ok(out)
    }

    fn points(&self, nodes: &[usize]) -> Vec<Point2<f64>> {
        nodes.iter().map(|&i| self.pts[i]).collect()
    }
}

/// A point inside a polygon with holes: the centroid of its largest
/// triangle.
fn sample_point(outer: &[Point2<f64>], holes: &[Vec<Point2<f64>>]) -> Result<Option<Point2<f64>>> {
    let mut all = outer.to_vec();
    for h in holes {
        all.extend_from_slice(h);
    }
    let mut best: Option<(f64, Point2<f64>)> = None;
    for [a, b, c] in ear_triangles(outer, holes, 0.0)? {
        let area = triangle_area_2d(&all[a], &all[b], &all[c]);
        if best.map_or(true, |(x, _)| area > x) {
            best = Some((area, Point2::from((all[a].coords + all[b].coords + all[c].coords) / 3.0)));
        }
    }
    Ok(best.map(|(_, p)| p))
}

/// Cuts a face along `segments` (pairs of vertices with positions on the
/// face). Returns the outward faceuses now covering the face: the original
/// faceuse when nothing was cut.
///
/// New faces share the original face's geometry, and their edges are
/// joined radially with the rest of the shell.
pub fn face_cutjoin(
    m: &mut Model,
    fu: FaceUseKey,
    segments: &[(VertexKey, VertexKey)],
    tol: &Tolerance,
) -> Result<Vec<FaceUseKey>> {
    tol.validate()?;
    let fu = m.fu_same(fu)?;
    let s = m.faceuse(fu)?.shell;
    let frame = m.fu_frame(fu)?;
    let mut arr = Arrangement::default();

    let mut boundary: FxHashSet<(usize, usize)> = FxHashSet::default();
    let mut lone_vertices = 0;
    let mut edges = Vec::new();
    for &lu in &m.faceuse(fu)?.loops {
        match &m.loopuse(lu)?.contents {
            LoopContents::Vertex(_) => lone_vertices += 1,
            LoopContents::Edges(eus) => {
                for &eu in eus {
                    let (a, b) = (m.eu_vertex(eu)?, m.eu_end_vertex(eu)?);
                    let ia = arr.node(a, frame.project(&m.vertex_point(a)?));
                    let ib = arr.node(b, frame.project(&m.vertex_point(b)?));
                    boundary.insert(Arrangement::key(ia, ib));
                    edges.push((ia, ib));
                }
            }
        }
    }
    let mut cuts = Vec::new();
    for &(a, b) in segments {
        let ia = arr.node(a, frame.project(&m.vertex_point(a)?));
        let ib = arr.node(b, frame.project(&m.vertex_point(b)?));
        if ia != ib && !boundary.contains(&Arrangement::key(ia, ib)) {
            cuts.push((ia, ib));
        }
    }
    if cuts.is_empty() {
        return Ok(vec![fu]);
    }

    let mut changed = false;
    for (a, b) in edges.into_iter().chain(cuts) {
        changed |= arr.add_edge(a, b, tol.dist);
    }
    arr.prune();
    changed |= arr.edges.iter().any(|e| !boundary.contains(e));
    if !changed {
        return Ok(vec![fu]);
    }

    if lone_vertices > 0 {
        tracing::warn!(lone_vertices, "vertex loops dropped by face cut");
    }
    let cells = cells_inside(m, &arr, &frame, &[fu], tol)?;
    if cells.is_empty() {
        tracing::warn!(face = m.faceuse(fu)?.index, "cut left no cell inside the face");
        return Ok(vec![fu]);
    }
    let index = m.faceuse(fu)?.index;
    let out = replace_faces(m, s, &[fu], cells, tol)?;
    if m.config().debug.contains(DebugFlags::CUT) {
        tracing::trace!(face = index, pieces = out.len(), "cut face");
    }
    Ok(out)
}

/// Whether every use of `e` lies on the faces of `fus` (outward faceuses)
/// and at least two of them on the outward side: the edge then runs
/// through the area those faces cover instead of bounding it.
pub(crate) fn edge_is_interior(m: &Model, e: EdgeKey, fus: &[FaceUseKey]) -> Result<bool> {
    let mut outward = 0;
    for eu in m.edge_uses(e)? {
        let Some(fu) = m.eu_faceuse(eu)? else {
            return Ok(false);
        };
        if fus.contains(&fu) {
            outward += 1;
        } else if !fus.contains(&m.faceuse(fu)?.mate) {
            return Ok(false);
        }
    }
    Ok(outward >= 2)
}

/// Rebuilds the area covered by coplanar faces `fus` of shell `s` without
/// the edges running through it. Returns `fus` unchanged when no such
/// edge exists.
fn rebuild_without_interior(
    m: &mut Model,
    s: ShellKey,
    fus: &[FaceUseKey],
    tol: &Tolerance,
) -> Result<Vec<FaceUseKey>> {
    let frame = m.fu_frame(fus[0])?;
    let mut arr = Arrangement::default();
    let mut edges = Vec::new();
    let mut dropped = 0;
    let mut lone_vertices = 0;
    for &fu in fus {
        for &lu in &m.faceuse(fu)?.loops {
            let eus = match &m.loopuse(lu)?.contents {
                LoopContents::Vertex(_) => {
                    lone_vertices += 1;
                    continue;
                }
                LoopContents::Edges(eus) => eus,
            };
            for &eu in eus {
                if edge_is_interior(m, m.edgeuse(eu)?.edge, fus)? {
                    dropped += 1;
                    continue;
                }
                let (a, b) = (m.eu_vertex(eu)?, m.eu_end_vertex(eu)?);
                let ia = arr.node(a, frame.project(&m.vertex_point(a)?));
                let ib = arr.node(b, frame.project(&m.vertex_point(b)?));
                edges.push((ia, ib));
            }
        }
    }
    if dropped == 0 {
        return Ok(fus.to_vec());
    }
    for (a, b) in edges {
        arr.add_edge(a, b, tol.dist);
    }
    arr.prune();
    if lone_vertices > 0 {
        tracing::warn!(lone_vertices, "vertex loops dropped by face join");
    }
    let cells = cells_inside(m, &arr, &frame, fus, tol)?;
    if cells.is_empty() {
        tracing::warn!(faces = fus.len(), "join left no cell inside the faces");
        return Ok(fus.to_vec());
    }
    replace_faces(m, s, fus, cells, tol)
}

/// Joins two coplanar faces of one shell across the edges only they use.
/// Those edges vanish and the union is rebuilt as one face per connected
/// area. Returns the outward faceuses now covering both; the two faces
/// as they were when they share no such edge.
pub fn face_join(m: &mut Model, fu1: FaceUseKey, fu2: FaceUseKey, tol: &Tolerance) -> Result<Vec<FaceUseKey>> {
    tol.validate()?;
    let (fu1, fu2) = (m.fu_same(fu1)?, m.fu_same(fu2)?);
    if m.faceuse(fu1)?.face == m.faceuse(fu2)?.face {
        return Err(Error::precondition("cannot join a face with itself"));
    }
    let s = m.faceuse(fu1)?.shell;
    if m.faceuse(fu2)?.shell != s {
        return Err(Error::precondition("faces to join lie in different shells"));
    }
    let out = rebuild_without_interior(m, s, &[fu1, fu2], tol)?;
    if m.config().debug.contains(DebugFlags::CUT) {
        tracing::trace!(pieces = out.len(), "joined faces");
    }
    Ok(out)
}

/// Removes edges lying inside a face: cracks, and edges shared by two of
/// its own loops. Loops touching along such an edge become one. Returns
/// the outward faceuses now covering the face.
pub fn face_simplify(m: &mut Model, fu: FaceUseKey, tol: &Tolerance) -> Result<Vec<FaceUseKey>> {
    tol.validate()?;
    let fu = m.fu_same(fu)?;
    let s = m.faceuse(fu)?.shell;
    rebuild_without_interior(m, s, &[fu], tol)
}

/// A cell of the arrangement as vertex cycles: the outer boundary, then
/// its holes.
type CellLoops = (Vec<VertexKey>, Vec<Vec<VertexKey>>);

/// Cells of the arrangement whose interior lies inside one of `fus`.
fn cells_inside(
    m: &Model,
    arr: &Arrangement,
    frame: &Frame,
    fus: &[FaceUseKey],
    tol: &Tolerance,
) -> Result<Vec<CellLoops>> {
    let min_area = tol.dist_sq;
    let cycles = arr.cycles()?;
    let cells: Vec<&Cycle> = cycles.iter().filter(|c| c.area > min_area).collect();
    let mut holes: Vec<Vec<usize>> = vec![Vec::new(); cells.len()];
    for (ci, c) in cycles.iter().enumerate().filter(|(_, c)| c.area < -min_area) {
        let start = arr.pts[c.nodes[0]];
        let host = cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.component != c.component)
            .filter(|(_, cell)| point_in_polygon_2d(&start, &arr.points(&cell.nodes)))
            .min_by(|(_, x), (_, y)| x.area.total_cmp(&y.area))
            .map(|(i, _)| i);
        if let Some(h) = host {
            holes[h].push(ci);
        }
    }

    let mut out = Vec::new();
    for (i, cell) in cells.iter().enumerate() {
        let outer = arr.points(&cell.nodes);
        let hole_pts: Vec<Vec<Point2<f64>>> = holes[i].iter().map(|&h| arr.points(&cycles[h].nodes)).collect();
        let Some(q) = sample_point(&outer, &hole_pts)? else {
            continue;
        };
        let p = frame.lift(&q);
        let mut inside = false;
        for &fu in fus {
            if m.class_pnt_f(&p, fu, tol)? == PointClass::In {
                inside = true;
                break;
            }
        }
        if !inside {
            continue;
        }
        let outer_verts: Vec<VertexKey> = cell.nodes.iter().map(|&n| arr.verts[n]).collect();
        let hole_verts: Vec<Vec<VertexKey>> = holes[i]
            .iter()
            .map(|&h| cycles[h].nodes.iter().map(|&n| arr.verts[n]).collect())
            .collect();
        out.push((outer_verts, hole_verts));
    }
    Ok(out)
}

/// Replaces the faces `old` with faces built on `cells`. The new faces
/// share the geometry of the first old face; their edges are joined
/// radially with the rest of the shell.
fn replace_faces(
    m: &mut Model,
    s: ShellKey,
    old: &[FaceUseKey],
    cells: Vec<CellLoops>,
    tol: &Tolerance,
) -> Result<Vec<FaceUseKey>> {
    let geom = {
        let fd = m.face(m.faceuse(old[0])?.face)?;
        fd.geom.map(|g| (g, fd.flip))
    };
    let mut out = Vec::with_capacity(cells.len());
    for (outer, holes) in cells {
        let nfu = m.make_face_with_loops(s, &outer, &holes, geom)?;
        if geom.is_none() {
            m.assign_face_plane(nfu)?;
        }
        out.push(nfu);
    }
    for &fu in old {
        m.kill_faceuse(fu)?;
    }
    edge_fuse(m, TopologyKey::Shell(s), tol)?;
    for &nfu in &out {
        m.assign_face_edge_geometry(nfu)?;
    }
    Ok(out)
}

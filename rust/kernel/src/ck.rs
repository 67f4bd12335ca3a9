// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consistency checker.
//!
//! A read-only pass over every arena of a model that validates the
//! structural invariants: up/down links agree, mates are symmetric, radial
//! cycles close and cover every use of their edge, loops are connected
//! chains, shared geometry user lists are exact, and entity indices are
//! unique and below `maxindex`. The checker never repairs anything.
//!
//! [`ck_closed_surf`] is a separate, topological test that a shell's faces
//! close up around every edge.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::*;
use crate::tol::Tolerance;

/// Violations found by [`check_model`], in discovery order.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub violations: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

struct Checker<'a> {
    m: &'a Model,
    report: CheckReport,
}

impl<'a> Checker<'a> {
    fn fail(&mut self, msg: String) {
        self.report.violations.push(msg);
    }

    fn ensure(&mut self, cond: bool, msg: impl FnOnce() -> String) {
        if !cond {
            self.fail(msg());
        }
    }

    fn regions(&mut self) {
        let m = self.m;
        for (r, rd) in m.regions.iter() {
            self.ensure(m.region_list.contains(&r), || format!("region #{} not listed in model", rd.index));
            for &s in &rd.shells {
                match m.shells.get(s) {
                    Some(sd) => self.ensure(sd.region == r, || {
                        format!("shell #{} listed in region #{} but points elsewhere", sd.index, rd.index)
                    }),
                    None => self.fail(format!("region #{} lists a dead shell", rd.index)),
                }
            }
        }
        for &r in &m.region_list {
            self.ensure(m.regions.contains_key(r), || "model lists a dead region".to_string());
        }
    }

    fn shells(&mut self) {
        let m = self.m;
        for (s, sd) in m.shells.iter() {
            let listed = m.regions.get(sd.region).is_some_and(|rd| rd.shells.contains(&s));
            self.ensure(listed, || format!("shell #{} missing from its region", sd.index));
            for &fu in &sd.faceuses {
                let ok = m.faceuses.get(fu).is_some_and(|d| d.shell == s);
                self.ensure(ok, || format!("shell #{} lists a faceuse it does not own", sd.index));
            }
            for &lu in &sd.wire_loops {
                let ok = m
                    .loopuses
                    .get(lu)
                    .is_some_and(|d| d.up == LoopUseParent::Shell(s));
                self.ensure(ok, || format!("shell #{} lists a wire loop it does not own", sd.index));
            }
            for &eu in &sd.wire_edges {
                let ok = m
                    .edgeuses
                    .get(eu)
                    .is_some_and(|d| d.up == EdgeUseParent::Shell(s));
                self.ensure(ok, || format!("shell #{} lists a wire edge it does not own", sd.index));
            }
            if let Some(vu) = sd.vertexuse {
                let ok = m
                    .vertexuses
                    .get(vu)
                    .is_some_and(|d| d.up == VertexUseParent::Shell(s));
                self.ensure(ok, || format!("shell #{} lone vertexuse has another owner", sd.index));
                let alone = sd.faceuses.is_empty() && sd.wire_loops.is_empty() && sd.wire_edges.is_empty();
                self.ensure(alone, || format!("shell #{} has a lone vertexuse beside other contents", sd.index));
            }
        }
    }

    fn faceuses(&mut self) {
        let m = self.m;
        for (fu, d) in m.faceuses.iter() {
            let Some(mate) = m.faceuses.get(d.mate) else {
                self.fail(format!("faceuse #{} has a dead mate", d.index));
                continue;
            };
            self.ensure(mate.mate == fu, || format!("faceuse #{} mate is not symmetric", d.index));
            self.ensure(mate.face == d.face, || format!("faceuse #{} and mate use different faces", d.index));
            self.ensure(mate.shell == d.shell, || format!("faceuse #{} and mate in different shells", d.index));
            let paired = matches!(
                (d.orientation, mate.orientation),
                (Orientation::Same, Orientation::Opposite) | (Orientation::Opposite, Orientation::Same)
            );
            self.ensure(paired, || format!("faceuse #{} orientation does not complement its mate", d.index));
            match m.faces.get(d.face) {
                Some(f) => self.ensure(f.faceuse == fu || f.faceuse == d.mate, || {
                    format!("face #{} does not point back to faceuse #{}", f.index, d.index)
                }),
                None => self.fail(format!("faceuse #{} uses a dead face", d.index)),
            }
            self.ensure(!d.loops.is_empty(), || format!("faceuse #{} has no loops", d.index));
            for &lu in &d.loops {
                let Some(ld) = m.loopuses.get(lu) else {
                    self.fail(format!("faceuse #{} lists a dead loopuse", d.index));
                    continue;
                };
                self.ensure(ld.up == LoopUseParent::Face(fu), || {
                    format!("loopuse #{} does not point up to faceuse #{}", ld.index, d.index)
                });
                let mate_up = m.loopuses.get(ld.mate).map(|x| x.up);
                self.ensure(mate_up == Some(LoopUseParent::Face(d.mate)), || {
                    format!("mate of loopuse #{} is not in the mate faceuse", ld.index)
                });
            }
        }
    }

    fn faces(&mut self) {
        let m = self.m;
        for (f, d) in m.faces.iter() {
            let back = m.faceuses.get(d.faceuse).is_some_and(|x| x.face == f);
            self.ensure(back, || format!("face #{} entry faceuse does not use it", d.index));
            if let Some(g) = d.geom {
                let listed = m.face_geoms.get(g).is_some_and(|x| x.faces.contains(&f));
                self.ensure(listed, || format!("face #{} geometry does not list it", d.index));
            }
        }
        for (g, gd) in m.face_geoms.iter() {
            self.ensure(!gd.faces.is_empty(), || format!("face geometry #{} has no users", gd.index));
            for &f in &gd.faces {
                let ok = m.faces.get(f).is_some_and(|x| x.geom == Some(g));
                self.ensure(ok, || format!("face geometry #{} lists a face using other geometry", gd.index));
            }
        }
    }

    fn loopuses(&mut self) {
        let m = self.m;
        for (lu, d) in m.loopuses.iter() {
            let Some(mate) = m.loopuses.get(d.mate) else {
                self.fail(format!("loopuse #{} has a dead mate", d.index));
                continue;
            };
            self.ensure(mate.mate == lu, || format!("loopuse #{} mate is not symmetric", d.index));
            self.ensure(mate.lp == d.lp, || format!("loopuse #{} and mate use different loops", d.index));
            self.ensure(mate.orientation == d.orientation, || {
                format!("loopuse #{} orientation differs from its mate", d.index)
            });
            let entry_ok = m
                .loops
                .get(d.lp)
                .is_some_and(|l| l.loopuse == lu || l.loopuse == d.mate);
            self.ensure(entry_ok, || format!("loop of loopuse #{} does not point back", d.index));
            let listed = match d.up {
                LoopUseParent::Face(fu) => m.faceuses.get(fu).is_some_and(|x| x.loops.contains(&lu)),
                LoopUseParent::Shell(s) => m.shells.get(s).is_some_and(|x| x.wire_loops.contains(&lu)),
            };
            self.ensure(listed, || format!("loopuse #{} missing from its parent", d.index));
            match &d.contents {
                LoopContents::Vertex(vu) => {
                    let ok = m
                        .vertexuses
                        .get(*vu)
                        .is_some_and(|x| x.up == VertexUseParent::Loop(lu));
                    self.ensure(ok, || format!("vertex loop #{} vertexuse has another owner", d.index));
                }
                LoopContents::Edges(eus) => self.edge_loop(lu, d, eus),
            }
        }
    }

    fn edge_loop(&mut self, lu: LoopUseKey, d: &LoopUseData, eus: &[EdgeUseKey]) {
        let m = self.m;
        if eus.is_empty() {
            self.fail(format!("loopuse #{} has no edgeuses", d.index));
            return;
        }
        let mate_eus = match m.loopuses.get(d.mate).map(|x| &x.contents) {
            Some(LoopContents::Edges(x)) => x.as_slice(),
            _ => &[],
        };
        for (i, &eu) in eus.iter().enumerate() {
            let Some(ed) = m.edgeuses.get(eu) else {
                self.fail(format!("loopuse #{} lists a dead edgeuse", d.index));
                return;
            };
            self.ensure(ed.up == EdgeUseParent::Loop(lu), || {
                format!("edgeuse #{} does not point up to loopuse #{}", ed.index, d.index)
            });
            self.ensure(mate_eus.contains(&ed.mate), || {
                format!("mate of edgeuse #{} is not in the mate loopuse", ed.index)
            });
            let next = eus[(i + 1) % eus.len()];
            let (Ok(end), Ok(start)) = (m.eu_end_vertex(eu), m.eu_vertex(next)) else {
                self.fail(format!("loopuse #{} has unreadable vertices", d.index));
                return;
            };
            self.ensure(end == start, || format!("loopuse #{} is not a closed chain at edgeuse #{}", d.index, ed.index));
        }
    }

    fn edgeuses(&mut self, counts: &mut FxHashMap<EdgeKey, usize>) {
        let m = self.m;
        for (eu, d) in m.edgeuses.iter() {
            *counts.entry(d.edge).or_default() += 1;
            let Some(mate) = m.edgeuses.get(d.mate) else {
                self.fail(format!("edgeuse #{} has a dead mate", d.index));
                continue;
            };
            self.ensure(mate.mate == eu, || format!("edgeuse #{} mate is not symmetric", d.index));
            self.ensure(mate.edge == d.edge, || format!("edgeuse #{} and mate use different edges", d.index));
            match m.edgeuses.get(d.radial) {
                Some(r) => {
                    self.ensure(r.radial == eu, || format!("edgeuse #{} radial link is not symmetric", d.index));
                    self.ensure(r.edge == d.edge, || format!("edgeuse #{} radial neighbour on another edge", d.index));
                }
                None => self.fail(format!("edgeuse #{} has a dead radial", d.index)),
            }
            let vu_ok = m
                .vertexuses
                .get(d.vu)
                .is_some_and(|x| x.up == VertexUseParent::EdgeUse(eu));
            self.ensure(vu_ok, || format!("edgeuse #{} vertexuse has another owner", d.index));
            if let (Ok(end), Ok(mate_start)) = (m.eu_end_vertex(eu), m.eu_vertex(d.mate)) {
                self.ensure(end == mate_start, || format!("edgeuse #{} mate does not run backwards", d.index));
            }
            let listed = match d.up {
                EdgeUseParent::Loop(lu) => m
                    .loopuses
                    .get(lu)
                    .is_some_and(|x| matches!(&x.contents, LoopContents::Edges(l) if l.contains(&eu))),
                EdgeUseParent::Shell(s) => m.shells.get(s).is_some_and(|x| x.wire_edges.contains(&eu)),
            };
            self.ensure(listed, || format!("edgeuse #{} missing from its parent", d.index));
        }
    }

    fn edges(&mut self, counts: &FxHashMap<EdgeKey, usize>) {
        let m = self.m;
        for (e, d) in m.edges.iter() {
            let entry_ok = m.edgeuses.get(d.edgeuse).is_some_and(|x| x.edge == e);
            if !entry_ok {
                self.fail(format!("edge #{} entry edgeuse does not use it", d.index));
                continue;
            }
            match m.radial_uses(d.edgeuse) {
                Ok(walk) => {
                    let expected = counts.get(&e).copied().unwrap_or(0);
                    self.ensure(walk.len() == expected, || {
                        format!("radial cycle of edge #{} covers {} of {} uses", d.index, walk.len(), expected)
                    });
                    if let Ok((a, b)) = m.edge_vertices(e) {
                        for &u in &walk {
                            let ends = (m.eu_vertex(u), m.eu_end_vertex(u));
                            let ok = matches!(ends, (Ok(x), Ok(y)) if (x, y) == (a, b) || (x, y) == (b, a));
                            self.ensure(ok, || format!("edge #{} has a use with other endpoints", d.index));
                        }
                    }
                }
                Err(err) => self.fail(format!("edge #{}: {err}", d.index)),
            }
            if let Some(g) = d.geom {
                let listed = m.edge_geoms.get(g).is_some_and(|x| x.edges.contains(&e));
                self.ensure(listed, || format!("edge #{} geometry does not list it", d.index));
            }
        }
        for (e, _) in counts {
            self.ensure(m.edges.contains_key(*e), || "edgeuse on a dead edge".to_string());
        }
        for (g, gd) in m.edge_geoms.iter() {
            self.ensure(!gd.edges.is_empty(), || format!("edge geometry #{} has no users", gd.index));
            for &e in &gd.edges {
                let ok = m.edges.get(e).is_some_and(|x| x.geom == Some(g));
                self.ensure(ok, || format!("edge geometry #{} lists an edge using other geometry", gd.index));
            }
        }
    }

    fn vertices(&mut self) {
        let m = self.m;
        for (vu, d) in m.vertexuses.iter() {
            let listed = m.vertices.get(d.vertex).is_some_and(|v| v.uses.contains(&vu));
            self.ensure(listed, || format!("vertexuse #{} missing from its vertex", d.index));
            let owned = match d.up {
                VertexUseParent::EdgeUse(eu) => m.edgeuses.get(eu).is_some_and(|x| x.vu == vu),
                VertexUseParent::Loop(lu) => m
                    .loopuses
                    .get(lu)
                    .is_some_and(|x| x.contents == LoopContents::Vertex(vu)),
                VertexUseParent::Shell(s) => m.shells.get(s).is_some_and(|x| x.vertexuse == Some(vu)),
            };
            self.ensure(owned, || format!("vertexuse #{} parent does not own it", d.index));
        }
        for (v, d) in m.vertices.iter() {
            self.ensure(!d.uses.is_empty(), || format!("vertex #{} has no uses", d.index));
            for &vu in &d.uses {
                let ok = m.vertexuses.get(vu).is_some_and(|x| x.vertex == v);
                self.ensure(ok, || format!("vertex #{} lists a use of another vertex", d.index));
            }
        }
    }

    fn indices(&mut self) {
        let m = self.m;
        let mut all: Vec<usize> = Vec::new();
        all.extend(m.regions.values().map(|d| d.index));
        all.extend(m.shells.values().map(|d| d.index));
        all.extend(m.faceuses.values().map(|d| d.index));
        all.extend(m.faces.values().map(|d| d.index));
        all.extend(m.face_geoms.values().map(|d| d.index));
        all.extend(m.loopuses.values().map(|d| d.index));
        all.extend(m.loops.values().map(|d| d.index));
        all.extend(m.edgeuses.values().map(|d| d.index));
        all.extend(m.edges.values().map(|d| d.index));
        all.extend(m.edge_geoms.values().map(|d| d.index));
        all.extend(m.vertexuses.values().map(|d| d.index));
        all.extend(m.vertices.values().map(|d| d.index));
        let mut seen = FxHashSet::default();
        for i in all {
            self.ensure(i < m.maxindex, || format!("index {i} is not below maxindex {}", m.maxindex));
            self.ensure(seen.insert(i), || format!("index {i} is used twice"));
        }
    }
}

/// Validates every structural invariant of a model.
pub fn check_model(m: &Model) -> CheckReport {
    let mut ck = Checker {
        m,
        report: CheckReport::default(),
    };
    ck.regions();
    ck.shells();
    ck.faceuses();
    ck.faces();
    ck.loopuses();
    let mut counts = FxHashMap::default();
    ck.edgeuses(&mut counts);
    ck.edges(&counts);
    ck.vertices();
    ck.indices();
    ck.report
}

/// Like [`check_model`], reporting only the first violation.
pub fn check_model_first(m: &Model) -> Result<()> {
    match check_model(m).violations.into_iter().next() {
        Some(first) => Err(Error::InvariantViolation(first)),
        None => Ok(()),
    }
}

/// Runs the checker when the model's configuration asks for verification.
pub(crate) fn verify_if_enabled(m: &Model) -> Result<()> {
    if !m.config().verify() {
        return Ok(());
    }
    let report = check_model(m);
    if let Some(first) = report.violations.first() {
        tracing::error!(count = report.violations.len(), first = %first, "model failed verification");
        return Err(Error::InvariantViolation(first.clone()));
    }
    Ok(())
}

/// Counts the vertices of a face lying off its stored plane by more than
/// `tol.dist`, logging a warning when there are any.
pub fn ck_fg_verts(m: &Model, f: FaceKey, tol: &Tolerance) -> Result<usize> {
    let plane = m.face_plane(f)?;
    let fu = m.face(f)?.faceuse;
    let mut off = 0;
    for &lu in &m.faceuse(fu)?.loops {
        for v in m.lu_vertices(lu)? {
            if plane.dist(&m.vertex_point(v)?).abs() > tol.dist {
                off += 1;
            }
        }
    }
    if off > 0 {
        tracing::warn!(face = m.face(f)?.index, off, "face plane does not fit its vertices");
    }
    Ok(off)
}

/// Whether the uses of a shell's faces around the edge of `eu` pair up
/// across every wedge: a use and its radial neighbour (skipping other
/// shells) must come from faceuses of the same orientation. A face edge
/// no other face of the shell shares fails this, as does a misoriented
/// neighbour.
fn radial_closes(m: &Model, eu: EdgeUseKey, s: ShellKey) -> Result<bool> {
    let mut sides = Vec::new();
    for u in m.radial_uses(eu)? {
        let Some(fu) = m.eu_faceuse(u)? else { continue };
        let fd = m.faceuse(fu)?;
        if fd.shell == s {
            sides.push(fd.orientation);
        }
    }
    // The walk alternates radial and mate steps; pairs across a wedge
    // start at even positions.
    Ok(sides.len() >= 4 && sides.chunks(2).all(|w| w.len() == 2 && w[0] == w[1]))
}

/// Edges along which a shell's faces fail to close up. An empty list
/// means the faces bound a volume with consistent outward sides.
pub fn ck_closed_surf(m: &Model, s: ShellKey) -> Result<Vec<EdgeKey>> {
    let mut seen: FxHashSet<EdgeKey> = FxHashSet::default();
    let mut open = Vec::new();
    for fu in m.shell_faces(s)? {
        for &lu in &m.faceuse(fu)?.loops {
            for &eu in m.lu_edgeuses(lu)? {
                let e = m.edgeuse(eu)?.edge;
                if seen.insert(e) && !radial_closes(m, eu, s)? {
                    open.push(e);
                }
            }
        }
    }
    if !open.is_empty() {
        tracing::debug!(shell = ?s, open = open.len(), "shell is not closed");
    }
    Ok(open)
}

/// [`ck_closed_surf`] over every shell of a region.
pub fn ck_closed_region(m: &Model, r: RegionKey) -> Result<Vec<EdgeKey>> {
    let mut open = Vec::new();
    for &s in &m.region(r)?.shells {
        open.extend(ck_closed_surf(m, s)?);
    }
    Ok(open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::make_box;
    use crate::config::{DebugFlags, KernelConfig};
    use crate::geometry::Plane;
    use nalgebra::{Point3, Vector3};

    fn tol() -> Tolerance {
        Tolerance::new(1e-6, 1e-6)
    }

    #[test]
    fn empty_model_is_valid() {
        assert!(check_model(&Model::new()).is_ok());
        assert!(check_model_first(&Model::new()).is_ok());
    }

    #[test]
    fn broken_mate_is_reported() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let eu = m.edgeuses.keys().next().unwrap();
        let other = m.edgeuses.keys().nth(5).unwrap();
        m.edgeuses.get_mut(eu).unwrap().mate = other;
        let report = check_model(&m);
        assert!(!report.is_ok());
        assert!(report.violations.iter().any(|v| v.contains("mate")));
        assert!(matches!(check_model_first(&m), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn duplicate_index_is_reported() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let v = m.vertex_keys()[1];
        let first = m.vertex(m.vertex_keys()[0]).unwrap().index;
        m.vertex_mut(v).unwrap().index = first;
        let report = check_model(&m);
        assert!(report.violations.iter().any(|v| v.contains("used twice")));
    }

    #[test]
    fn broken_radial_is_reported() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let e = m.edge_keys()[0];
        let entry = m.edge(e).unwrap().edgeuse;
        let mate = m.eu_mate(entry).unwrap();
        // Cut the pair out of the cycle from one side only.
        m.edgeuse_mut(entry).unwrap().radial = mate;
        assert!(!check_model(&m).is_ok());
    }

    #[test]
    fn verification_follows_config() {
        let mut m = Model::with_config(KernelConfig::with_debug(DebugFlags::VERIFY));
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(verify_if_enabled(&m).is_ok());
        let v = m.vertex_keys()[0];
        m.vertex_mut(v).unwrap().uses.clear();
        assert!(verify_if_enabled(&m).is_err());
        m.set_config(KernelConfig::default());
        assert!(verify_if_enabled(&m).is_ok());
    }

    #[test]
    fn plane_vertex_mismatch_is_counted() {
        let mut m = Model::new();
        make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let f = m.face_keys()[0];
        assert_eq!(ck_fg_verts(&m, f, &tol()).unwrap(), 0);
        let fu = m.face(f).unwrap().faceuse;
        let tilted = Plane::from_point_normal(&Point3::origin(), &Vector3::new(0.0, 0.1, -1.0)).unwrap();
        m.set_face_plane(fu, tilted).unwrap();
        assert!(ck_fg_verts(&m, f, &tol()).unwrap() > 0);
    }

    #[test]
    fn box_is_closed_until_a_face_goes() {
        let mut m = Model::new();
        let (r, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(ck_closed_surf(&m, s).unwrap().is_empty());
        assert!(ck_closed_region(&m, r).unwrap().is_empty());

        let top = m.shell_faces(s).unwrap()[0];
        m.kill_faceuse(top).unwrap();
        assert_eq!(ck_closed_surf(&m, s).unwrap().len(), 4);
        assert_eq!(ck_closed_region(&m, r).unwrap().len(), 4);
    }

    #[test]
    fn flipped_face_opens_the_box() {
        let mut m = Model::new();
        let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let fu = m.shell_faces(s).unwrap()[0];
        m.reverse_face(fu).unwrap();
        // Every edge of the flipped face now meets a neighbour side to
        // opposite side.
        assert_eq!(ck_closed_surf(&m, s).unwrap().len(), 4);
        m.reverse_face(fu).unwrap();
        assert!(ck_closed_surf(&m, s).unwrap().is_empty());
    }

    #[test]
    fn lone_face_is_open() {
        let mut m = Model::new();
        let (_, s, _) = m.make_region_shell_vertex().unwrap();
        m.make_face_from_points(
            s,
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
        )
        .unwrap();
        assert_eq!(ck_closed_surf(&m, s).unwrap().len(), 3);
    }
}

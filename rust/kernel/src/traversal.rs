// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tabulation and find routines.
//!
//! The `*_tabulate` methods take any [`TopologyKey`] as root and return
//! every entity of one kind reachable beneath it, each once, in discovery
//! order. Roots that name a use-pair entity (face, loop, edge) cover both
//! uses.

use crate::error::Result;
use crate::index::IndexTable;
use crate::keys::*;
use crate::model::*;

/// Uses collected under a root, in discovery order, with duplicates.
#[derive(Default)]
struct UseWalk {
    faceuses: Vec<FaceUseKey>,
    loopuses: Vec<LoopUseKey>,
    edgeuses: Vec<EdgeUseKey>,
    vertexuses: Vec<VertexUseKey>,
}

impl Model {
    fn walk_uses(&self, root: TopologyKey) -> Result<UseWalk> {
        let mut w = UseWalk::default();
        match root {
            TopologyKey::Model => {
                for &r in self.regions() {
                    self.walk_region(r, &mut w)?;
                }
            }
            TopologyKey::Region(r) => self.walk_region(r, &mut w)?,
            TopologyKey::Shell(s) => self.walk_shell(s, &mut w)?,
            TopologyKey::FaceUse(fu) => self.walk_faceuse(fu, &mut w)?,
            TopologyKey::Face(f) => {
                let fu = self.face(f)?.faceuse;
                self.walk_faceuse(fu, &mut w)?;
                self.walk_faceuse(self.faceuse(fu)?.mate, &mut w)?;
            }
            TopologyKey::FaceGeom(g) => {
                for &f in &self.face_geom(g)?.faces {
                    let fu = self.face(f)?.faceuse;
                    self.walk_faceuse(fu, &mut w)?;
                    self.walk_faceuse(self.faceuse(fu)?.mate, &mut w)?;
                }
            }
            TopologyKey::LoopUse(lu) => self.walk_loopuse(lu, &mut w)?,
            TopologyKey::Loop(l) => {
                let lu = self.loop_(l)?.loopuse;
                self.walk_loopuse(lu, &mut w)?;
                self.walk_loopuse(self.loopuse(lu)?.mate, &mut w)?;
            }
            TopologyKey::EdgeUse(eu) => self.walk_edgeuse(eu, &mut w)?,
            TopologyKey::Edge(e) => {
                for eu in self.edge_uses(e)? {
                    self.walk_edgeuse(eu, &mut w)?;
                }
            }
            TopologyKey::EdgeGeom(g) => {
                for &e in &self.edge_geom(g)?.edges {
                    for eu in self.edge_uses(e)? {
                        self.walk_edgeuse(eu, &mut w)?;
                    }
                }
            }
            TopologyKey::VertexUse(vu) => {
                self.vertexuse(vu)?;
                w.vertexuses.push(vu);
            }
            TopologyKey::Vertex(v) => w.vertexuses.extend(self.vertex(v)?.uses.iter().copied()),
        }
        Ok(w)
    }

    fn walk_region(&self, r: RegionKey, w: &mut UseWalk) -> Result<()> {
        for &s in &self.region(r)?.shells {
            self.walk_shell(s, w)?;
        }
        Ok(())
    }

    fn walk_shell(&self, s: ShellKey, w: &mut UseWalk) -> Result<()> {
        let sd = self.shell(s)?;
        for &fu in &sd.faceuses {
            self.walk_faceuse(fu, w)?;
        }
        for &lu in &sd.wire_loops {
            self.walk_loopuse(lu, w)?;
        }
        for &eu in &sd.wire_edges {
            self.walk_edgeuse(eu, w)?;
        }
        if let Some(vu) = sd.vertexuse {
            w.vertexuses.push(vu);
        }
        Ok(())
    }

    fn walk_faceuse(&self, fu: FaceUseKey, w: &mut UseWalk) -> Result<()> {
        w.faceuses.push(fu);
        for &lu in &self.faceuse(fu)?.loops {
            self.walk_loopuse(lu, w)?;
        }
        Ok(())
    }

    fn walk_loopuse(&self, lu: LoopUseKey, w: &mut UseWalk) -> Result<()> {
        w.loopuses.push(lu);
        match &self.loopuse(lu)?.contents {
            LoopContents::Edges(eus) => {
                for &eu in eus {
                    self.walk_edgeuse(eu, w)?;
                }
            }
            LoopContents::Vertex(vu) => w.vertexuses.push(*vu),
        }
        Ok(())
    }

    fn walk_edgeuse(&self, eu: EdgeUseKey, w: &mut UseWalk) -> Result<()> {
        w.edgeuses.push(eu);
        w.vertexuses.push(self.edgeuse(eu)?.vu);
        Ok(())
    }

    /// Keeps the first occurrence of each entity, by index.
    fn dedup_by_index<K: Copy + Into<TopologyKey>>(&self, keys: impl IntoIterator<Item = K>) -> Result<Vec<K>> {
        let mut seen = IndexTable::<bool>::for_model(self);
        let mut out = Vec::new();
        for k in keys {
            if seen.visit(self.index_of(k.into())?) {
                out.push(k);
            }
        }
        Ok(out)
    }

    /// Every vertex beneath `root`.
    pub fn vertex_tabulate(&self, root: TopologyKey) -> Result<Vec<VertexKey>> {
        let w = self.walk_uses(root)?;
        let verts = w
            .vertexuses
            .iter()
            .map(|&vu| Ok(self.vertexuse(vu)?.vertex))
            .collect::<Result<Vec<_>>>()?;
        self.dedup_by_index(verts)
    }

    /// Every vertexuse beneath `root`.
    pub fn vertexuse_tabulate(&self, root: TopologyKey) -> Result<Vec<VertexUseKey>> {
        let w = self.walk_uses(root)?;
        self.dedup_by_index(w.vertexuses)
    }

    /// Every edge beneath `root`.
    pub fn edge_tabulate(&self, root: TopologyKey) -> Result<Vec<EdgeKey>> {
        let w = self.walk_uses(root)?;
        let edges = w
            .edgeuses
            .iter()
            .map(|&eu| Ok(self.edgeuse(eu)?.edge))
            .collect::<Result<Vec<_>>>()?;
        self.dedup_by_index(edges)
    }

    /// Every edgeuse beneath `root`.
    pub fn edgeuse_tabulate(&self, root: TopologyKey) -> Result<Vec<EdgeUseKey>> {
        let w = self.walk_uses(root)?;
        self.dedup_by_index(w.edgeuses)
    }

    /// Every loopuse beneath `root`.
    pub fn loopuse_tabulate(&self, root: TopologyKey) -> Result<Vec<LoopUseKey>> {
        let w = self.walk_uses(root)?;
        self.dedup_by_index(w.loopuses)
    }

    /// Every face beneath `root`.
    pub fn face_tabulate(&self, root: TopologyKey) -> Result<Vec<FaceKey>> {
        let w = self.walk_uses(root)?;
        let faces = w
            .faceuses
            .iter()
            .map(|&fu| Ok(self.faceuse(fu)?.face))
            .collect::<Result<Vec<_>>>()?;
        self.dedup_by_index(faces)
    }

    /// Every edge geometry record used beneath `root`.
    pub fn edge_g_tabulate(&self, root: TopologyKey) -> Result<Vec<EdgeGeomKey>> {
        let mut geoms = Vec::new();
        for e in self.edge_tabulate(root)? {
            if let Some(g) = self.edge(e)?.geom {
                geoms.push(g);
            }
        }
        self.dedup_by_index(geoms)
    }

    // ========================================================================
    // Find
    // ========================================================================

    /// Edgeuses running from `v1` to `v2`, anywhere in the model.
    pub fn find_edgeuses_between(&self, v1: VertexKey, v2: VertexKey) -> Result<Vec<EdgeUseKey>> {
        let mut out = Vec::new();
        for &vu in &self.vertex(v1)?.uses {
            if let VertexUseParent::EdgeUse(eu) = self.vertexuse(vu)?.up {
                if self.eu_end_vertex(eu)? == v2 {
                    out.push(eu);
                }
            }
        }
        Ok(out)
    }

    /// Any edge joining `v1` and `v2`.
    pub fn find_edge_between(&self, v1: VertexKey, v2: VertexKey) -> Result<Option<EdgeKey>> {
        let eus = self.find_edgeuses_between(v1, v2)?;
        Ok(match eus.first() {
            Some(&eu) => Some(self.edgeuse(eu)?.edge),
            None => None,
        })
    }

    /// Edgeuse of faceuse `fu` running from `v1` to `v2`.
    pub fn find_eu_in_faceuse(
        &self,
        v1: VertexKey,
        v2: VertexKey,
        fu: FaceUseKey,
    ) -> Result<Option<EdgeUseKey>> {
        for eu in self.find_edgeuses_between(v1, v2)? {
            if self.eu_faceuse(eu)? == Some(fu) {
                return Ok(Some(eu));
            }
        }
        Ok(None)
    }

    /// A vertexuse of `v` beneath faceuse `fu`.
    pub fn find_vu_in_faceuse(&self, v: VertexKey, fu: FaceUseKey) -> Result<Option<VertexUseKey>> {
        for &vu in &self.vertex(v)?.uses {
            let owner = match self.vertexuse(vu)?.up {
                VertexUseParent::EdgeUse(eu) => self.eu_faceuse(eu)?,
                VertexUseParent::Loop(lu) => match self.loopuse(lu)?.up {
                    LoopUseParent::Face(f) => Some(f),
                    LoopUseParent::Shell(_) => None,
                },
                VertexUseParent::Shell(_) => None,
            };
            if owner == Some(fu) {
                return Ok(Some(vu));
            }
        }
        Ok(None)
    }

    /// Whether any use of `v` lives in shell `s`.
    pub fn vertex_in_shell(&self, v: VertexKey, s: ShellKey) -> Result<bool> {
        for &vu in &self.vertex(v)?.uses {
            if self.vu_shell(vu)? == s {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Faceuses of `s` with the given orientation.
    pub fn shell_faceuses(&self, s: ShellKey, orientation: Orientation) -> Result<Vec<FaceUseKey>> {
        let mut out = Vec::new();
        for &fu in &self.shell(s)?.faceuses {
            if self.faceuse(fu)?.orientation == orientation {
                out.push(fu);
            }
        }
        Ok(out)
    }
}

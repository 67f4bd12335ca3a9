// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manifold classification.
//!
//! Every entity gets a set of bits telling in which dimensional contexts it
//! takes part: a lone vertex is 0-manifold, wires are 1-manifold, faces
//! that do not bound a volume ("dangling" faces) are 2-manifold and faces
//! of closed sheets are 3-manifold. An edge shared by a dangling fin and a
//! closed shell carries both the 2 and the 3 bit.

use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::index::IndexTable;
use crate::keys::*;
use crate::model::*;

/// Manifold dimension bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Manifolds(u8);

impl Manifolds {
    pub const NONE: Manifolds = Manifolds(0);
    pub const DIM0: Manifolds = Manifolds(1 << 0);
    pub const DIM1: Manifolds = Manifolds(1 << 1);
    pub const DIM2: Manifolds = Manifolds(1 << 2);
    pub const DIM3: Manifolds = Manifolds(1 << 3);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Manifolds) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Highest dimension present, if any.
    pub fn max_dim(&self) -> Option<u8> {
        (0..4).rev().find(|d| self.0 & (1 << d) != 0)
    }
}

impl std::ops::BitOr for Manifolds {
    type Output = Manifolds;

    fn bitor(self, rhs: Manifolds) -> Manifolds {
        Manifolds(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Manifolds {
    fn bitor_assign(&mut self, rhs: Manifolds) {
        self.0 |= rhs.0;
    }
}

/// Manifold bits for every entity of a model, by index.
#[derive(Debug, Clone)]
pub struct ManifoldTable {
    bits: IndexTable<Manifolds>,
    dangling: Vec<FaceKey>,
}

impl ManifoldTable {
    pub fn get(&self, index: usize) -> Manifolds {
        self.bits.get(index).copied().unwrap_or_default()
    }

    /// Bits recorded for an entity.
    pub fn of(&self, m: &Model, key: TopologyKey) -> Result<Manifolds> {
        Ok(self.get(m.index_of(key)?))
    }

    /// Faces found not to bound any volume.
    pub fn dangling_faces(&self) -> &[FaceKey] {
        &self.dangling
    }

    fn mark(&mut self, m: &Model, key: TopologyKey, dim: Manifolds) -> Result<()> {
        *self.bits.slot_mut(m.index_of(key)?) |= dim;
        Ok(())
    }

    fn mark_vertexuse(&mut self, m: &Model, vu: VertexUseKey, dim: Manifolds) -> Result<()> {
        self.mark(m, vu.into(), dim)?;
        self.mark(m, m.vertexuse(vu)?.vertex.into(), dim)
    }

    fn mark_edgeuse(&mut self, m: &Model, eu: EdgeUseKey, dim: Manifolds) -> Result<()> {
        let data = m.edgeuse(eu)?;
        self.mark(m, eu.into(), dim)?;
        self.mark(m, data.edge.into(), dim)?;
        self.mark_vertexuse(m, data.vu, dim)
    }

    fn mark_loopuse(&mut self, m: &Model, lu: LoopUseKey, dim: Manifolds) -> Result<()> {
        let data = m.loopuse(lu)?;
        self.mark(m, lu.into(), dim)?;
        self.mark(m, data.lp.into(), dim)?;
        match &data.contents {
            LoopContents::Vertex(vu) => self.mark_vertexuse(m, *vu, dim),
            LoopContents::Edges(eus) => eus.iter().try_for_each(|&eu| self.mark_edgeuse(m, eu, dim)),
        }
    }

    fn mark_face(&mut self, m: &Model, f: FaceKey, dim: Manifolds) -> Result<()> {
        let fu = m.face(f)?.faceuse;
        let mate = m.faceuse(fu)?.mate;
        self.mark(m, f.into(), dim)?;
        for side in [fu, mate] {
            self.mark(m, side.into(), dim)?;
            for &lu in &m.faceuse(side)?.loops {
                self.mark_loopuse(m, lu, dim)?;
            }
        }
        Ok(())
    }
}

impl Model {
    /// Faces other than `f` (and not in `skip`) that use edge `e`.
    fn other_faces_on_edge(&self, e: EdgeKey, f: FaceKey, skip: &FxHashSet<FaceKey>) -> Result<usize> {
        let mut faces = FxHashSet::default();
        for eu in self.edge_uses(e)? {
            if let Some(fu) = self.eu_faceuse(eu)? {
                let g = self.faceuse(fu)?.face;
                if g != f && !skip.contains(&g) {
                    faces.insert(g);
                }
            }
        }
        Ok(faces.len())
    }

    /// Edges bounding a face, from its `Same` side.
    fn face_edges(&self, f: FaceKey) -> Result<Vec<EdgeKey>> {
        let fu = self.fu_same(self.face(f)?.faceuse)?;
        let mut out = Vec::new();
        for &lu in &self.faceuse(fu)?.loops {
            if let LoopContents::Edges(eus) = &self.loopuse(lu)?.contents {
                for &eu in eus {
                    out.push(self.edgeuse(eu)?.edge);
                }
            }
        }
        Ok(out)
    }

    /// True when some edge of the face is used by no other face.
    pub fn dangling_face(&self, fu: FaceUseKey) -> Result<bool> {
        let f = self.faceuse(fu)?.face;
        let none = FxHashSet::default();
        for e in self.face_edges(f)? {
            if self.other_faces_on_edge(e, f, &none)? == 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Classifies every entity of the model by manifold dimension.
    ///
    /// Dangling faces are peeled off repeatedly: once a fin is known to be
    /// dangling, faces that only met the rest of the shell through it
    /// dangle too.
    pub fn manifolds(&self) -> Result<ManifoldTable> {
        let mut table = ManifoldTable {
            bits: IndexTable::for_model(self),
            dangling: Vec::new(),
        };
        for &r in self.regions() {
            for &s in &self.region(r)?.shells {
                let sd = self.shell(s)?;
                if let Some(vu) = sd.vertexuse {
                    table.mark_vertexuse(self, vu, Manifolds::DIM0)?;
                }
                for &eu in &sd.wire_edges {
                    table.mark_edgeuse(self, eu, Manifolds::DIM1)?;
                }
                for &lu in &sd.wire_loops {
                    let dim = match self.loopuse(lu)?.contents {
                        LoopContents::Vertex(_) => Manifolds::DIM0,
                        LoopContents::Edges(_) => Manifolds::DIM1,
                    };
                    table.mark_loopuse(self, lu, dim)?;
                }

                let faces: Vec<FaceKey> = self
                    .shell_faces(s)?
                    .into_iter()
                    .map(|fu| self.faceuse(fu).map(|d| d.face))
                    .collect::<Result<_>>()?;
                let mut dangling = FxHashSet::default();
                loop {
                    let mut changed = false;
                    for &f in &faces {
                        if dangling.contains(&f) {
                            continue;
                        }
                        for e in self.face_edges(f)? {
                            if self.other_faces_on_edge(e, f, &dangling)? == 0 {
                                dangling.insert(f);
                                changed = true;
                                break;
                            }
                        }
                    }
                    if !changed {
                        break;
                    }
                }
                for &f in &faces {
                    if dangling.contains(&f) {
                        table.mark_face(self, f, Manifolds::DIM2)?;
                        table.dangling.push(f);
                    } else {
                        table.mark_face(self, f, Manifolds::DIM3)?;
                    }
                }
            }
        }
        tracing::debug!(dangling = table.dangling.len(), "manifold classification");
        Ok(table)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The topology store.
//!
//! A [`Model`] owns every entity of a radial-edge boundary representation:
//!
//! ```text
//! model → region → shell → faceuse → loopuse → edgeuse → vertexuse
//!                        ↘ loopuse (wire)  ↘ edgeuse (wire) ↘ vertexuse (lone)
//! ```
//!
//! Each kind lives in its own slot map. Faceuses, loopuses and edgeuses come
//! in mate pairs; all edgeuses of one edge are chained by the involutive
//! `radial` link. "Up" links are closed enums, so an edgeuse can only ever
//! be owned by a loopuse or a shell.
//!
//! Structural links are only edited through the small set of `pub(crate)`
//! helpers at the bottom of this file. Every algorithm above this layer goes
//! through them, which keeps mate, radial and up/down lists in step.

use nalgebra::{Point3, Vector3};
use slotmap::SlotMap;

use crate::config::KernelConfig;
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, CurveRef, LineSeg, Plane, SurfaceRef};
use crate::keys::*;

/// Orientation of a use relative to its underlying entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Same sense as the entity: an outward faceuse, an outer loop.
    Same,
    /// Opposite sense: the inward faceuse, a hole loop.
    Opposite,
    /// Not yet decided (wire loops).
    Unspecified,
    /// Orientation does not apply (edgeuses).
    None,
}

impl Orientation {
    /// `Same` ↔ `Opposite`; other values are returned unchanged.
    pub fn flipped(self) -> Self {
        match self {
            Orientation::Same => Orientation::Opposite,
            Orientation::Opposite => Orientation::Same,
            other => other,
        }
    }
}

/// A disjoint volume-set grouping of shells.
#[derive(Debug, Clone)]
pub struct RegionData {
    pub index: usize,
    pub shells: Vec<ShellKey>,
    pub bbox: Option<BoundingBox>,
}

/// A connected set of faces, wire loops, wire edges, or a single lone
/// vertexuse.
#[derive(Debug, Clone)]
pub struct ShellData {
    pub index: usize,
    pub region: RegionKey,
    pub faceuses: Vec<FaceUseKey>,
    pub wire_loops: Vec<LoopUseKey>,
    pub wire_edges: Vec<EdgeUseKey>,
    pub vertexuse: Option<VertexUseKey>,
    pub bbox: Option<BoundingBox>,
}

impl ShellData {
    /// True when the shell holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.faceuses.is_empty()
            && self.wire_loops.is_empty()
            && self.wire_edges.is_empty()
            && self.vertexuse.is_none()
    }
}

/// One oriented side of a face.
#[derive(Debug, Clone)]
pub struct FaceUseData {
    pub index: usize,
    pub shell: ShellKey,
    pub mate: FaceUseKey,
    pub face: FaceKey,
    pub orientation: Orientation,
    pub loops: Vec<LoopUseKey>,
}

/// A face, shared by a faceuse and its mate.
///
/// `flip` reverses the stored geometry's normal for this face, which lets
/// faces with opposite normals share one plane record.
#[derive(Debug, Clone)]
pub struct FaceData {
    pub index: usize,
    pub faceuse: FaceUseKey,
    pub geom: Option<FaceGeomKey>,
    pub flip: bool,
}

/// Face geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceGeometry {
    Plane(Plane),
    Snurb(SurfaceRef),
}

/// Shared face geometry and the faces using it.
#[derive(Debug, Clone)]
pub struct FaceGeomData {
    pub index: usize,
    pub geometry: FaceGeometry,
    pub faces: Vec<FaceKey>,
}

/// Owner of a loopuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopUseParent {
    Face(FaceUseKey),
    Shell(ShellKey),
}

/// Children of a loopuse: a cycle of edgeuses or one vertexuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopContents {
    Edges(Vec<EdgeUseKey>),
    Vertex(VertexUseKey),
}

#[derive(Debug, Clone)]
pub struct LoopUseData {
    pub index: usize,
    pub up: LoopUseParent,
    pub mate: LoopUseKey,
    pub lp: LoopKey,
    pub orientation: Orientation,
    pub contents: LoopContents,
}

#[derive(Debug, Clone)]
pub struct LoopData {
    pub index: usize,
    pub loopuse: LoopUseKey,
}

/// Owner of an edgeuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeUseParent {
    Loop(LoopUseKey),
    Shell(ShellKey),
}

/// A directed use of an edge.
///
/// The edgeuse starts at `vu`; its `mate` starts at the other end.
/// `radial` pairs it with the next use around the edge.
#[derive(Debug, Clone)]
pub struct EdgeUseData {
    pub index: usize,
    pub up: EdgeUseParent,
    pub mate: EdgeUseKey,
    pub radial: EdgeUseKey,
    pub edge: EdgeKey,
    pub vu: VertexUseKey,
    pub orientation: Orientation,
}

#[derive(Debug, Clone)]
pub struct EdgeData {
    pub index: usize,
    /// Any one use of the edge, the entry point to its radial cycle.
    pub edgeuse: EdgeUseKey,
    pub geom: Option<EdgeGeomKey>,
}

/// Edge geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeGeometry {
    Lseg(LineSeg),
    Cnurb(CurveRef),
}

#[derive(Debug, Clone)]
pub struct EdgeGeomData {
    pub index: usize,
    pub geometry: EdgeGeometry,
    pub edges: Vec<EdgeKey>,
}

/// Owner of a vertexuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexUseParent {
    EdgeUse(EdgeUseKey),
    Loop(LoopUseKey),
    Shell(ShellKey),
}

#[derive(Debug, Clone)]
pub struct VertexUseData {
    pub index: usize,
    pub up: VertexUseParent,
    pub vertex: VertexKey,
    /// Optional per-use normal attribute.
    pub normal: Option<Vector3<f64>>,
}

#[derive(Debug, Clone)]
pub struct VertexData {
    pub index: usize,
    pub uses: Vec<VertexUseKey>,
    pub point: Option<Point3<f64>>,
}

/// The arena owning every entity of one boundary-representation model.
///
/// # Example
///
/// ```
/// use nmg_kernel::Model;
///
/// let mut m = Model::new();
/// let (r, s, _vu) = m.make_region_shell_vertex().unwrap();
/// assert_eq!(m.region(r).unwrap().shells, vec![s]);
/// assert_eq!(m.vertex_count(), 1);
/// ```
#[derive(Debug)]
pub struct Model {
    pub(crate) regions: SlotMap<RegionKey, RegionData>,
    pub(crate) shells: SlotMap<ShellKey, ShellData>,
    pub(crate) faceuses: SlotMap<FaceUseKey, FaceUseData>,
    pub(crate) faces: SlotMap<FaceKey, FaceData>,
    pub(crate) face_geoms: SlotMap<FaceGeomKey, FaceGeomData>,
    pub(crate) loopuses: SlotMap<LoopUseKey, LoopUseData>,
    pub(crate) loops: SlotMap<LoopKey, LoopData>,
    pub(crate) edgeuses: SlotMap<EdgeUseKey, EdgeUseData>,
    pub(crate) edges: SlotMap<EdgeKey, EdgeData>,
    pub(crate) edge_geoms: SlotMap<EdgeGeomKey, EdgeGeomData>,
    pub(crate) vertexuses: SlotMap<VertexUseKey, VertexUseData>,
    pub(crate) vertices: SlotMap<VertexKey, VertexData>,

    /// Regions in creation order.
    pub(crate) region_list: Vec<RegionKey>,
    /// Next index to hand out.
    pub(crate) maxindex: usize,
    pub(crate) config: KernelConfig,
}

macro_rules! entity_accessors {
    ($($get:ident, $get_mut:ident, $count:ident, $field:ident, $key:ty, $data:ty;)*) => {
        impl Model {
            $(
                #[doc = concat!("Looks up a `", stringify!($field), "` record.")]
                pub fn $get(&self, key: $key) -> Result<&$data> {
                    self.$field.get(key).ok_or(Error::NotFound(key.into()))
                }

                pub(crate) fn $get_mut(&mut self, key: $key) -> Result<&mut $data> {
                    self.$field.get_mut(key).ok_or(Error::NotFound(key.into()))
                }

                #[doc = concat!("Number of live `", stringify!($field), "` records.")]
                pub fn $count(&self) -> usize {
                    self.$field.len()
                }
            )*
        }
    };
}

entity_accessors! {
    region, region_mut, region_count, regions, RegionKey, RegionData;
    shell, shell_mut, shell_count, shells, ShellKey, ShellData;
    faceuse, faceuse_mut, faceuse_count, faceuses, FaceUseKey, FaceUseData;
    face, face_mut, face_count, faces, FaceKey, FaceData;
    face_geom, face_geom_mut, face_geom_count, face_geoms, FaceGeomKey, FaceGeomData;
    loopuse, loopuse_mut, loopuse_count, loopuses, LoopUseKey, LoopUseData;
    loop_, loop_mut, loop_count, loops, LoopKey, LoopData;
    edgeuse, edgeuse_mut, edgeuse_count, edgeuses, EdgeUseKey, EdgeUseData;
    edge, edge_mut, edge_count, edges, EdgeKey, EdgeData;
    edge_geom, edge_geom_mut, edge_geom_count, edge_geoms, EdgeGeomKey, EdgeGeomData;
    vertexuse, vertexuse_mut, vertexuse_count, vertexuses, VertexUseKey, VertexUseData;
    vertex, vertex_mut, vertex_count, vertices, VertexKey, VertexData;
}

impl Model {
    /// Creates an empty model (`maxindex == 0`).
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Creates an empty model with explicit configuration.
    pub fn with_config(config: KernelConfig) -> Self {
        Self {
            regions: SlotMap::with_key(),
            shells: SlotMap::with_key(),
            faceuses: SlotMap::with_key(),
            faces: SlotMap::with_key(),
            face_geoms: SlotMap::with_key(),
            loopuses: SlotMap::with_key(),
            loops: SlotMap::with_key(),
            edgeuses: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            edge_geoms: SlotMap::with_key(),
            vertexuses: SlotMap::with_key(),
            vertices: SlotMap::with_key(),
            region_list: Vec::new(),
            maxindex: 0,
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: KernelConfig) {
        self.config = config;
    }

    /// One past the largest index handed out so far.
    pub fn maxindex(&self) -> usize {
        self.maxindex
    }

    /// Regions in creation order.
    pub fn regions(&self) -> &[RegionKey] {
        &self.region_list
    }

    /// All live vertex keys, ordered by index.
    pub fn vertex_keys(&self) -> Vec<VertexKey> {
        let mut keys: Vec<_> = self.vertices.iter().map(|(k, d)| (d.index, k)).collect();
        keys.sort_unstable_by_key(|(i, _)| *i);
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// All live edge keys, ordered by index.
    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        let mut keys: Vec<_> = self.edges.iter().map(|(k, d)| (d.index, k)).collect();
        keys.sort_unstable_by_key(|(i, _)| *i);
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// All live face keys, ordered by index.
    pub fn face_keys(&self) -> Vec<FaceKey> {
        let mut keys: Vec<_> = self.faces.iter().map(|(k, d)| (d.index, k)).collect();
        keys.sort_unstable_by_key(|(i, _)| *i);
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Index of any entity.
    pub fn index_of(&self, key: TopologyKey) -> Result<usize> {
        let missing = || Error::NotFound(key);
        Ok(match key {
            TopologyKey::Model => return Err(missing()),
            TopologyKey::Region(k) => self.region(k)?.index,
            TopologyKey::Shell(k) => self.shell(k)?.index,
            TopologyKey::FaceUse(k) => self.faceuse(k)?.index,
            TopologyKey::Face(k) => self.face(k)?.index,
            TopologyKey::FaceGeom(k) => self.face_geom(k)?.index,
            TopologyKey::LoopUse(k) => self.loopuse(k)?.index,
            TopologyKey::Loop(k) => self.loop_(k)?.index,
            TopologyKey::EdgeUse(k) => self.edgeuse(k)?.index,
            TopologyKey::Edge(k) => self.edge(k)?.index,
            TopologyKey::EdgeGeom(k) => self.edge_geom(k)?.index,
            TopologyKey::VertexUse(k) => self.vertexuse(k)?.index,
            TopologyKey::Vertex(k) => self.vertex(k)?.index,
        })
    }

    /// Whether a key addresses a live entity.
    pub fn contains(&self, key: TopologyKey) -> bool {
        match key {
            TopologyKey::Model => true,
            other => self.index_of(other).is_ok(),
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Vertex an edgeuse starts at.
    pub fn eu_vertex(&self, eu: EdgeUseKey) -> Result<VertexKey> {
        Ok(self.vertexuse(self.edgeuse(eu)?.vu)?.vertex)
    }

    /// Vertex an edgeuse ends at (where its mate starts).
    pub fn eu_end_vertex(&self, eu: EdgeUseKey) -> Result<VertexKey> {
        self.eu_vertex(self.edgeuse(eu)?.mate)
    }

    pub fn eu_mate(&self, eu: EdgeUseKey) -> Result<EdgeUseKey> {
        Ok(self.edgeuse(eu)?.mate)
    }

    pub fn eu_radial(&self, eu: EdgeUseKey) -> Result<EdgeUseKey> {
        Ok(self.edgeuse(eu)?.radial)
    }

    /// Edgeuses of a loopuse in traversal order; empty for a vertex loop.
    pub fn lu_edgeuses(&self, lu: LoopUseKey) -> Result<&[EdgeUseKey]> {
        Ok(match &self.loopuse(lu)?.contents {
            LoopContents::Edges(eus) => eus.as_slice(),
            LoopContents::Vertex(_) => &[],
        })
    }

    /// Corner vertices of a loopuse in traversal order.
    pub fn lu_vertices(&self, lu: LoopUseKey) -> Result<Vec<VertexKey>> {
        match &self.loopuse(lu)?.contents {
            LoopContents::Edges(eus) => eus.iter().map(|&eu| self.eu_vertex(eu)).collect(),
            LoopContents::Vertex(vu) => Ok(vec![self.vertexuse(*vu)?.vertex]),
        }
    }

    /// Position of an edgeuse within its owner's list.
    fn eu_position(&self, eu: EdgeUseKey) -> Result<(EdgeUseParent, usize)> {
        let up = self.edgeuse(eu)?.up;
        let list = self.eu_sibling_list(up)?;
        let pos = list
            .iter()
            .position(|&e| e == eu)
            .ok_or_else(|| Error::InvariantViolation(format!("edgeuse {eu:?} missing from its parent")))?;
        Ok((up, pos))
    }

    fn eu_sibling_list(&self, up: EdgeUseParent) -> Result<&[EdgeUseKey]> {
        match up {
            EdgeUseParent::Loop(lu) => self.lu_edgeuses(lu),
            EdgeUseParent::Shell(s) => Ok(self.shell(s)?.wire_edges.as_slice()),
        }
    }

    /// Next edgeuse around the owning loop.
    pub fn eu_next(&self, eu: EdgeUseKey) -> Result<EdgeUseKey> {
        let (up, pos) = self.eu_position(eu)?;
        match up {
            EdgeUseParent::Loop(lu) => {
                let eus = self.lu_edgeuses(lu)?;
                Ok(eus[(pos + 1) % eus.len()])
            }
            EdgeUseParent::Shell(_) => Err(Error::precondition("wire edgeuse has no loop successor")),
        }
    }

    /// Previous edgeuse around the owning loop.
    pub fn eu_prev(&self, eu: EdgeUseKey) -> Result<EdgeUseKey> {
        let (up, pos) = self.eu_position(eu)?;
        match up {
            EdgeUseParent::Loop(lu) => {
                let eus = self.lu_edgeuses(lu)?;
                Ok(eus[(pos + eus.len() - 1) % eus.len()])
            }
            EdgeUseParent::Shell(_) => Err(Error::precondition("wire edgeuse has no loop predecessor")),
        }
    }

    /// Faceuse an edgeuse belongs to, if it is part of a face.
    pub fn eu_faceuse(&self, eu: EdgeUseKey) -> Result<Option<FaceUseKey>> {
        match self.edgeuse(eu)?.up {
            EdgeUseParent::Loop(lu) => match self.loopuse(lu)?.up {
                LoopUseParent::Face(fu) => Ok(Some(fu)),
                LoopUseParent::Shell(_) => Ok(None),
            },
            EdgeUseParent::Shell(_) => Ok(None),
        }
    }

    /// Shell an edgeuse ultimately belongs to.
    pub fn eu_shell(&self, eu: EdgeUseKey) -> Result<ShellKey> {
        match self.edgeuse(eu)?.up {
            EdgeUseParent::Loop(lu) => self.lu_shell(lu),
            EdgeUseParent::Shell(s) => Ok(s),
        }
    }

    /// Shell a loopuse ultimately belongs to.
    pub fn lu_shell(&self, lu: LoopUseKey) -> Result<ShellKey> {
        match self.loopuse(lu)?.up {
            LoopUseParent::Face(fu) => Ok(self.faceuse(fu)?.shell),
            LoopUseParent::Shell(s) => Ok(s),
        }
    }

    /// Shell a vertexuse ultimately belongs to.
    pub fn vu_shell(&self, vu: VertexUseKey) -> Result<ShellKey> {
        match self.vertexuse(vu)?.up {
            VertexUseParent::EdgeUse(eu) => self.eu_shell(eu),
            VertexUseParent::Loop(lu) => self.lu_shell(lu),
            VertexUseParent::Shell(s) => Ok(s),
        }
    }

    /// Whichever of `fu` and its mate has `Same` orientation.
    pub fn fu_same(&self, fu: FaceUseKey) -> Result<FaceUseKey> {
        let data = self.faceuse(fu)?;
        if data.orientation == Orientation::Same {
            Ok(fu)
        } else {
            Ok(data.mate)
        }
    }

    /// Outward (`Same`) faceuses of a shell.
    pub fn shell_faces(&self, s: ShellKey) -> Result<Vec<FaceUseKey>> {
        let mut out = Vec::new();
        for &fu in &self.shell(s)?.faceuses {
            if self.faceuse(fu)?.orientation == Orientation::Same {
                out.push(fu);
            }
        }
        Ok(out)
    }

    /// Every edgeuse of the edge `eu` uses, by walking `radial` then `mate`.
    ///
    /// The first element is `eu`. Walks that do not return within the
    /// number of edgeuses in the model indicate a corrupt radial cycle.
    pub fn radial_uses(&self, eu: EdgeUseKey) -> Result<Vec<EdgeUseKey>> {
        let limit = self.edgeuses.len() + 2;
        let mut out = vec![eu];
        let mut cur = eu;
        loop {
            let radial = self.edgeuse(cur)?.radial;
            if radial == eu {
                break;
            }
            out.push(radial);
            let mate = self.edgeuse(radial)?.mate;
            if mate == eu {
                break;
            }
            out.push(mate);
            cur = mate;
            if out.len() > limit {
                return Err(Error::InvariantViolation(format!(
                    "radial cycle of edgeuse {eu:?} does not close"
                )));
            }
        }
        Ok(out)
    }

    /// Edgeuses of an edge, starting from its recorded entry use.
    pub fn edge_uses(&self, e: EdgeKey) -> Result<Vec<EdgeUseKey>> {
        self.radial_uses(self.edge(e)?.edgeuse)
    }

    /// End vertices of an edge as seen from its entry edgeuse.
    pub fn edge_vertices(&self, e: EdgeKey) -> Result<(VertexKey, VertexKey)> {
        let eu = self.edge(e)?.edgeuse;
        Ok((self.eu_vertex(eu)?, self.eu_end_vertex(eu)?))
    }

    // ========================================================================
    // Centralized link / unlink helpers
    // ========================================================================

    pub(crate) fn next_index(&mut self) -> usize {
        let i = self.maxindex;
        self.maxindex += 1;
        i
    }

    pub(crate) fn alloc_region(&mut self) -> RegionKey {
        let index = self.next_index();
        let r = self.regions.insert(RegionData {
            index,
            shells: Vec::new(),
            bbox: None,
        });
        self.region_list.push(r);
        r
    }

    pub(crate) fn alloc_shell(&mut self, region: RegionKey) -> Result<ShellKey> {
        self.region(region)?;
        let index = self.next_index();
        let s = self.shells.insert(ShellData {
            index,
            region,
            faceuses: Vec::new(),
            wire_loops: Vec::new(),
            wire_edges: Vec::new(),
            vertexuse: None,
            bbox: None,
        });
        self.region_mut(region)?.shells.push(s);
        Ok(s)
    }

    /// New vertex with no uses yet. The caller must attach a use (or let
    /// [`Model::collect_garbage`] sweep it).
    pub(crate) fn alloc_vertex(&mut self, point: Option<Point3<f64>>) -> VertexKey {
        let index = self.next_index();
        self.vertices.insert(VertexData {
            index,
            uses: Vec::new(),
            point,
        })
    }

    /// New vertexuse of `v` owned by `up`. Owner lists are the caller's job.
    pub(crate) fn alloc_vertexuse(&mut self, v: VertexKey, up: VertexUseParent) -> Result<VertexUseKey> {
        self.vertex(v)?;
        let index = self.next_index();
        let vu = self.vertexuses.insert(VertexUseData {
            index,
            up,
            vertex: v,
            normal: None,
        });
        self.vertex_mut(v)?.uses.push(vu);
        Ok(vu)
    }

    /// Frees a vertexuse, and its vertex once no uses remain.
    pub(crate) fn free_vertexuse(&mut self, vu: VertexUseKey) -> Result<()> {
        let data = self
            .vertexuses
            .remove(vu)
            .ok_or(Error::NotFound(vu.into()))?;
        let v = data.vertex;
        let vd = self.vertex_mut(v)?;
        vd.uses.retain(|&u| u != vu);
        if vd.uses.is_empty() {
            self.vertices.remove(v);
        }
        Ok(())
    }

    /// Points a vertexuse at another vertex, freeing the old vertex if that
    /// was its last use.
    pub(crate) fn relink_vertexuse(&mut self, vu: VertexUseKey, v: VertexKey) -> Result<()> {
        self.vertex(v)?;
        let old = self.vertexuse(vu)?.vertex;
        if old == v {
            return Ok(());
        }
        self.vertexuse_mut(vu)?.vertex = v;
        self.vertex_mut(v)?.uses.push(vu);
        let od = self.vertex_mut(old)?;
        od.uses.retain(|&u| u != vu);
        if od.uses.is_empty() {
            self.vertices.remove(old);
        }
        Ok(())
    }

    pub(crate) fn alloc_edge(&mut self, entry: EdgeUseKey) -> EdgeKey {
        let index = self.next_index();
        self.edges.insert(EdgeData {
            index,
            edgeuse: entry,
            geom: None,
        })
    }

    /// Creates an edgeuse pair: `(eu, mate)` where `eu` starts at `v1` and
    /// the mate at `v2`. The pair is its own radial cycle, on `edge` when
    /// given or on a fresh edge otherwise. Owner lists are the caller's job.
    pub(crate) fn alloc_edgeuse_pair(
        &mut self,
        v1: VertexKey,
        v2: VertexKey,
        up: EdgeUseParent,
        mate_up: EdgeUseParent,
        edge: Option<EdgeKey>,
    ) -> Result<(EdgeUseKey, EdgeUseKey)> {
        if let Some(e) = edge {
            self.edge(e)?;
        }
        self.vertex(v1)?;
        self.vertex(v2)?;
        let placeholder_vu = VertexUseKey::default();
        let i1 = self.next_index();
        let i2 = self.next_index();
        let eu = self.edgeuses.insert(EdgeUseData {
            index: i1,
            up,
            mate: EdgeUseKey::default(),
            radial: EdgeUseKey::default(),
            edge: EdgeKey::default(),
            vu: placeholder_vu,
            orientation: Orientation::None,
        });
        let mate = self.edgeuses.insert(EdgeUseData {
            index: i2,
            up: mate_up,
            mate: eu,
            radial: eu,
            edge: EdgeKey::default(),
            vu: placeholder_vu,
            orientation: Orientation::None,
        });
        let e = match edge {
            Some(e) => e,
            None => self.alloc_edge(eu),
        };
        let vu1 = self.alloc_vertexuse(v1, VertexUseParent::EdgeUse(eu))?;
        let vu2 = self.alloc_vertexuse(v2, VertexUseParent::EdgeUse(mate))?;
        {
            let d = self.edgeuse_mut(eu)?;
            d.mate = mate;
            d.radial = mate;
            d.edge = e;
            d.vu = vu1;
        }
        {
            let d = self.edgeuse_mut(mate)?;
            d.edge = e;
            d.vu = vu2;
        }
        Ok((eu, mate))
    }

    /// Creates a loopuse pair on a fresh loop. Owner lists are the caller's
    /// job; contents start as an empty edge list.
    pub(crate) fn alloc_loopuse_pair(
        &mut self,
        up: LoopUseParent,
        mate_up: LoopUseParent,
        orientation: Orientation,
    ) -> (LoopUseKey, LoopUseKey) {
        let i1 = self.next_index();
        let i2 = self.next_index();
        let il = self.next_index();
        let lu = self.loopuses.insert(LoopUseData {
            index: i1,
            up,
            mate: LoopUseKey::default(),
            lp: LoopKey::default(),
            orientation,
            contents: LoopContents::Edges(Vec::new()),
        });
        let lp = self.loops.insert(LoopData { index: il, loopuse: lu });
        let mate = self.loopuses.insert(LoopUseData {
            index: i2,
            up: mate_up,
            mate: lu,
            lp,
            orientation,
            contents: LoopContents::Edges(Vec::new()),
        });
        if let Some(d) = self.loopuses.get_mut(lu) {
            d.mate = mate;
            d.lp = lp;
        }
        (lu, mate)
    }

    /// Creates a faceuse pair on a fresh face with no geometry. The `Same`
    /// faceuse is returned first; both are pushed onto the shell.
    pub(crate) fn alloc_faceuse_pair(&mut self, s: ShellKey) -> Result<(FaceUseKey, FaceUseKey)> {
        self.shell(s)?;
        let i1 = self.next_index();
        let i2 = self.next_index();
        let fi = self.next_index();
        let fu = self.faceuses.insert(FaceUseData {
            index: i1,
            shell: s,
            mate: FaceUseKey::default(),
            face: FaceKey::default(),
            orientation: Orientation::Same,
            loops: Vec::new(),
        });
        let f = self.faces.insert(FaceData {
            index: fi,
            faceuse: fu,
            geom: None,
            flip: false,
        });
        let mate = self.faceuses.insert(FaceUseData {
            index: i2,
            shell: s,
            mate: fu,
            face: f,
            orientation: Orientation::Opposite,
            loops: Vec::new(),
        });
        {
            let d = self.faceuse_mut(fu)?;
            d.mate = mate;
            d.face = f;
        }
        let sd = self.shell_mut(s)?;
        sd.faceuses.push(fu);
        sd.faceuses.push(mate);
        Ok((fu, mate))
    }

    /// Sets both halves of a radial link.
    pub(crate) fn link_radial(&mut self, a: EdgeUseKey, b: EdgeUseKey) -> Result<()> {
        self.edgeuse_mut(a)?.radial = b;
        self.edgeuse_mut(b)?.radial = a;
        Ok(())
    }

    /// Takes an edgeuse pair out of its edge's radial cycle, closing the gap
    /// between its neighbours. The pair ends up radial to itself, still on
    /// the old edge; returns `true` if other uses remained on that edge.
    pub(crate) fn unlink_radial_pair(&mut self, eu: EdgeUseKey) -> Result<bool> {
        let mate = self.edgeuse(eu)?.mate;
        let eu_radial = self.edgeuse(eu)?.radial;
        if eu_radial == mate {
            return Ok(false);
        }
        let mate_radial = self.edgeuse(mate)?.radial;
        self.link_radial(eu_radial, mate_radial)?;
        self.link_radial(eu, mate)?;
        let e = self.edgeuse(eu)?.edge;
        let entry = self.edge(e)?.edgeuse;
        if entry == eu || entry == mate {
            self.edge_mut(e)?.edgeuse = eu_radial;
        }
        Ok(true)
    }

    /// Attaches shared face geometry to a face, releasing what it had.
    pub(crate) fn set_face_geom(&mut self, f: FaceKey, g: FaceGeomKey) -> Result<()> {
        self.face_geom(g)?;
        if self.face(f)?.geom == Some(g) {
            return Ok(());
        }
        self.release_face_geom(f)?;
        self.face_mut(f)?.geom = Some(g);
        self.face_geom_mut(g)?.faces.push(f);
        Ok(())
    }

    pub(crate) fn alloc_face_geom(&mut self, geometry: FaceGeometry) -> FaceGeomKey {
        let index = self.next_index();
        self.face_geoms.insert(FaceGeomData {
            index,
            geometry,
            faces: Vec::new(),
        })
    }

    /// Drops a face's reference to its geometry, freeing it when unused.
    pub(crate) fn release_face_geom(&mut self, f: FaceKey) -> Result<()> {
        let Some(g) = self.face_mut(f)?.geom.take() else {
            return Ok(());
        };
        let gd = self.face_geom_mut(g)?;
        gd.faces.retain(|&x| x != f);
        if gd.faces.is_empty() {
            self.face_geoms.remove(g);
        }
        Ok(())
    }

    pub(crate) fn alloc_edge_geom(&mut self, geometry: EdgeGeometry) -> EdgeGeomKey {
        let index = self.next_index();
        self.edge_geoms.insert(EdgeGeomData {
            index,
            geometry,
            edges: Vec::new(),
        })
    }

    /// Attaches shared edge geometry to an edge, releasing what it had.
    pub(crate) fn set_edge_geom(&mut self, e: EdgeKey, g: EdgeGeomKey) -> Result<()> {
        self.edge_geom(g)?;
        if self.edge(e)?.geom == Some(g) {
            return Ok(());
        }
        self.release_edge_geom(e)?;
        self.edge_mut(e)?.geom = Some(g);
        self.edge_geom_mut(g)?.edges.push(e);
        Ok(())
    }

    pub(crate) fn release_edge_geom(&mut self, e: EdgeKey) -> Result<()> {
        let Some(g) = self.edge_mut(e)?.geom.take() else {
            return Ok(());
        };
        let gd = self.edge_geom_mut(g)?;
        gd.edges.retain(|&x| x != e);
        if gd.edges.is_empty() {
            self.edge_geoms.remove(g);
        }
        Ok(())
    }

    /// Frees an edge record and its geometry reference.
    pub(crate) fn free_edge(&mut self, e: EdgeKey) -> Result<()> {
        self.release_edge_geom(e)?;
        self.edges.remove(e);
        Ok(())
    }

    /// Removes an edgeuse from its owner's list.
    pub(crate) fn detach_edgeuse(&mut self, eu: EdgeUseKey) -> Result<()> {
        match self.edgeuse(eu)?.up {
            EdgeUseParent::Loop(lu) => {
                if let LoopContents::Edges(eus) = &mut self.loopuse_mut(lu)?.contents {
                    eus.retain(|&x| x != eu);
                }
            }
            EdgeUseParent::Shell(s) => self.shell_mut(s)?.wire_edges.retain(|&x| x != eu),
        }
        Ok(())
    }

    /// Inserts an edgeuse into an owner's list at `pos` (appends when `pos`
    /// is past the end) and sets its up link.
    pub(crate) fn attach_edgeuse(&mut self, eu: EdgeUseKey, up: EdgeUseParent, pos: usize) -> Result<()> {
        self.edgeuse_mut(eu)?.up = up;
        let list = match up {
            EdgeUseParent::Loop(lu) => match &mut self.loopuse_mut(lu)?.contents {
                LoopContents::Edges(eus) => eus,
                LoopContents::Vertex(_) => {
                    return Err(Error::precondition("cannot add an edgeuse to a vertex loop"))
                }
            },
            EdgeUseParent::Shell(s) => &mut self.shell_mut(s)?.wire_edges,
        };
        let pos = pos.min(list.len());
        list.insert(pos, eu);
        Ok(())
    }

    /// Index of an edgeuse in its owner's list.
    pub(crate) fn edgeuse_slot(&self, eu: EdgeUseKey) -> Result<usize> {
        Ok(self.eu_position(eu)?.1)
    }

    /// Removes a loopuse from its owner's list.
    pub(crate) fn detach_loopuse(&mut self, lu: LoopUseKey) -> Result<()> {
        match self.loopuse(lu)?.up {
            LoopUseParent::Face(fu) => self.faceuse_mut(fu)?.loops.retain(|&x| x != lu),
            LoopUseParent::Shell(s) => self.shell_mut(s)?.wire_loops.retain(|&x| x != lu),
        }
        Ok(())
    }

    /// Appends a loopuse to an owner's list and sets its up link.
    pub(crate) fn attach_loopuse(&mut self, lu: LoopUseKey, up: LoopUseParent) -> Result<()> {
        match up {
            LoopUseParent::Face(fu) => self.faceuse_mut(fu)?.loops.push(lu),
            LoopUseParent::Shell(s) => self.shell_mut(s)?.wire_loops.push(lu),
        }
        self.loopuse_mut(lu)?.up = up;
        Ok(())
    }

    /// Removes vertices with no uses and geometry with no users.
    ///
    /// Returns the number of records swept.
    pub fn collect_garbage(&mut self) -> usize {
        let dead_v: Vec<_> = self
            .vertices
            .iter()
            .filter(|(_, d)| d.uses.is_empty())
            .map(|(k, _)| k)
            .collect();
        let dead_fg: Vec<_> = self
            .face_geoms
            .iter()
            .filter(|(_, d)| d.faces.is_empty())
            .map(|(k, _)| k)
            .collect();
        let dead_eg: Vec<_> = self
            .edge_geoms
            .iter()
            .filter(|(_, d)| d.edges.is_empty())
            .map(|(k, _)| k)
            .collect();
        let swept = dead_v.len() + dead_fg.len() + dead_eg.len();
        for v in dead_v {
            self.vertices.remove(v);
        }
        for g in dead_fg {
            self.face_geoms.remove(g);
        }
        for g in dead_eg {
            self.edge_geoms.remove(g);
        }
        if swept > 0 {
            tracing::trace!(swept, "collected unused records");
        }
        swept
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

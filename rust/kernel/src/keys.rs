// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed keys for every NMG entity kind.
//!
//! Each entity lives in its own `slotmap::SlotMap`, so a key can only ever
//! address a record of the right kind. [`TopologyKey`] plays the part of the
//! classic "magic pointer": an opaque handle to any entity whose kind is
//! recovered by pattern matching instead of a runtime tag comparison.

use slotmap::new_key_type;

new_key_type! {
    /// Key for a region (a disjoint volume-set grouping of shells).
    pub struct RegionKey;

    /// Key for a shell (connected faces, wires, or a lone vertex).
    pub struct ShellKey;

    /// Key for one oriented side of a face.
    pub struct FaceUseKey;

    /// Key for a face shared by a faceuse and its mate.
    pub struct FaceKey;

    /// Key for shared face geometry (plane or surface reference).
    pub struct FaceGeomKey;

    /// Key for one use of a loop.
    pub struct LoopUseKey;

    /// Key for a loop shared by a loopuse and its mate.
    pub struct LoopKey;

    /// Key for a directed use of an edge.
    pub struct EdgeUseKey;

    /// Key for a topological edge.
    pub struct EdgeKey;

    /// Key for shared edge geometry (line segment or curve reference).
    pub struct EdgeGeomKey;

    /// Key for one use of a vertex.
    pub struct VertexUseKey;

    /// Key for a vertex.
    pub struct VertexKey;
}

/// A key that can reference any entity in a model.
///
/// `Model` addresses the whole arena and is used as the root of model-wide
/// tabulations and fuse passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyKey {
    Model,
    Region(RegionKey),
    Shell(ShellKey),
    FaceUse(FaceUseKey),
    Face(FaceKey),
    FaceGeom(FaceGeomKey),
    LoopUse(LoopUseKey),
    Loop(LoopKey),
    EdgeUse(EdgeUseKey),
    Edge(EdgeKey),
    EdgeGeom(EdgeGeomKey),
    VertexUse(VertexUseKey),
    Vertex(VertexKey),
}

impl TopologyKey {
    /// Returns the entity kind addressed by this key.
    pub fn kind(&self) -> EntityKind {
        match self {
            TopologyKey::Model => EntityKind::Model,
            TopologyKey::Region(_) => EntityKind::Region,
            TopologyKey::Shell(_) => EntityKind::Shell,
            TopologyKey::FaceUse(_) => EntityKind::FaceUse,
            TopologyKey::Face(_) => EntityKind::Face,
            TopologyKey::FaceGeom(_) => EntityKind::FaceGeom,
            TopologyKey::LoopUse(_) => EntityKind::LoopUse,
            TopologyKey::Loop(_) => EntityKind::Loop,
            TopologyKey::EdgeUse(_) => EntityKind::EdgeUse,
            TopologyKey::Edge(_) => EntityKind::Edge,
            TopologyKey::EdgeGeom(_) => EntityKind::EdgeGeom,
            TopologyKey::VertexUse(_) => EntityKind::VertexUse,
            TopologyKey::Vertex(_) => EntityKind::Vertex,
        }
    }
}

/// Discriminant for entity kinds, ordered from the root of the hierarchy
/// down to vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Model = 0,
    Region = 1,
    Shell = 2,
    FaceUse = 3,
    Face = 4,
    FaceGeom = 5,
    LoopUse = 6,
    Loop = 7,
    EdgeUse = 8,
    Edge = 9,
    EdgeGeom = 10,
    VertexUse = 11,
    Vertex = 12,
}

impl EntityKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Model => "model",
            EntityKind::Region => "region",
            EntityKind::Shell => "shell",
            EntityKind::FaceUse => "faceuse",
            EntityKind::Face => "face",
            EntityKind::FaceGeom => "face_g",
            EntityKind::LoopUse => "loopuse",
            EntityKind::Loop => "loop",
            EntityKind::EdgeUse => "edgeuse",
            EntityKind::Edge => "edge",
            EntityKind::EdgeGeom => "edge_g",
            EntityKind::VertexUse => "vertexuse",
            EntityKind::Vertex => "vertex",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! impl_topology_key_from {
    ($($key:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$key> for TopologyKey {
                fn from(k: $key) -> Self {
                    TopologyKey::$variant(k)
                }
            }
        )*
    };
}

impl_topology_key_from! {
    RegionKey => Region,
    ShellKey => Shell,
    FaceUseKey => FaceUse,
    FaceKey => Face,
    FaceGeomKey => FaceGeom,
    LoopUseKey => LoopUse,
    LoopKey => Loop,
    EdgeUseKey => EdgeUse,
    EdgeKey => Edge,
    EdgeGeomKey => EdgeGeom,
    VertexUseKey => VertexUse,
    VertexKey => Vertex,
}

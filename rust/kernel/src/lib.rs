// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # NMG Kernel
//!
//! Radial-edge non-manifold boundary representation with planar Boolean
//! evaluation.
//!
//! A [`Model`] holds regions of shells. A shell is made of faces (each seen
//! through a pair of oppositely oriented faceuses), wire loops, wire edges
//! or a single lone vertex. Every edge keeps its uses in a radial cycle
//! ordered by the angle of the faces around it, which is what lets the
//! kernel represent non-manifold junctions: three faces on one edge, two
//! solids touching at a corner, a fin hanging off a closed shell.
//!
//! ## Pipeline
//!
//! - Construction ([`construction`]) builds and kills topology and keeps
//!   every use paired with its mate.
//! - Fusing ([`fuse`]) merges vertices, edges and face planes that agree
//!   within a [`Tolerance`].
//! - Intersection ([`inter`]) and face cutting ([`fcut`]) split the faces
//!   of two shells along the curves where they meet.
//! - Classification ([`classify`]) places each piece inside, outside or on
//!   the other shell, and [`boolean::do_bool`] keeps what the operator
//!   asks for.
//! - Cleanup ([`cleanup`]) rejoins coplanar faces the cuts left apart and
//!   removes needless edges, vertices and wires.
//! - [`tri`] triangulates faces in place, [`rt`] fires rays at shells and
//!   [`ck`] audits the structure.
//!
//! ## Example
//!
//! ```
//! use nalgebra::Point3;
//! use nmg_kernel::{do_bool, make_box, BoolOp, Model, Tolerance};
//!
//! let mut m = Model::new();
//! let (a, _) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
//! let (b, _) = make_box(&mut m, Point3::new(0.5, 0.5, 0.5), Point3::new(1.5, 1.5, 1.5)).unwrap();
//! let r = do_bool(&mut m, a, b, BoolOp::Intersect, &Tolerance::new(1e-6, 1e-6)).unwrap();
//! assert!((m.region_volume(r).unwrap() - 0.125).abs() < 1e-9);
//! ```

pub mod boolean;
pub mod builders;
pub mod ck;
pub mod classify;
pub mod cleanup;
pub mod config;
pub mod construction;
pub mod error;
pub mod fcut;
pub mod fuse;
pub mod geometry;
pub mod index;
pub mod inter;
pub mod keys;
pub mod manifold;
pub mod mesh;
pub mod model;
pub mod radial;
pub mod rt;
pub mod spatial;
pub mod tol;
pub mod transform;
pub mod traversal;
pub mod tri;

pub use boolean::{decision, do_bool, BoolOp, Decision};
pub use builders::{make_box, shell_from_polygons};
pub use ck::{check_model, check_model_first, ck_closed_region, ck_closed_surf, ck_fg_verts, CheckReport};
pub use classify::{Class, ClassTable, PointClass, WedgeClass};
pub use cleanup::{faces_coplanar, rm_redundancies, shell_coplanar_face_merge, simplify_shell};
pub use config::{DebugFlags, KernelConfig};
pub use construction::make_model;
pub use error::{Error, Result};
pub use fcut::{face_cutjoin, face_join, face_simplify};
pub use fuse::{edge_fuse, edge_g_fuse, face_fuse, model_fuse, vertex_fuse};
pub use geometry::{BoundingBox, LineSeg, Plane};
pub use index::IndexTable;
pub use inter::{break_eu_on_v, Intersector};
pub use keys::{
    EdgeGeomKey, EdgeKey, EdgeUseKey, EntityKind, FaceGeomKey, FaceKey, FaceUseKey, LoopKey,
    LoopUseKey, RegionKey, ShellKey, TopologyKey, VertexKey, VertexUseKey,
};
pub use manifold::{ManifoldTable, Manifolds};
pub use mesh::{glue_faces, mesh_two_faces};
pub use model::{LoopContents, Model, Orientation};
pub use radial::RadialEntry;
pub use rt::{Hit, HitKind, HitMissTable, Ray};
pub use spatial::SpatialIndex;
pub use tol::Tolerance;

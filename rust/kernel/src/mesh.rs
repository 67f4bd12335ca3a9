// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh and glue: radially join edgeuses of different faces that run
//! between the same two vertices.

use crate::ck::verify_if_enabled;
use crate::config::DebugFlags;
use crate::error::Result;
use crate::keys::*;
use crate::model::Model;
use crate::tol::Tolerance;

/// Joins every edge of `fu1` with the edges of `fu2` between the same
/// vertices. Returns the number of joins made.
pub fn mesh_two_faces(m: &mut Model, fu1: FaceUseKey, fu2: FaceUseKey, tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let f1 = m.faceuse(fu1)?.face;
    let f2 = m.faceuse(fu2)?.face;
    let eus1: Vec<EdgeUseKey> = m
        .faceuse(fu1)?
        .loops
        .iter()
        .map(|&lu| m.lu_edgeuses(lu).map(|s| s.to_vec()))
        .collect::<Result<Vec<_>>>()?
        .concat();
    let eus2: Vec<EdgeUseKey> = m
        .faceuse(fu2)?
        .loops
        .iter()
        .map(|&lu| m.lu_edgeuses(lu).map(|s| s.to_vec()))
        .collect::<Result<Vec<_>>>()?
        .concat();

    let mut joined = 0;
    for &a in &eus1 {
        let (a1, a2) = (m.eu_vertex(a)?, m.eu_end_vertex(a)?);
        for &b in &eus2 {
            let (b1, b2) = (m.eu_vertex(b)?, m.eu_end_vertex(b)?);
            let same_ends = (a1, a2) == (b1, b2) || (a1, a2) == (b2, b1);
            if !same_ends || m.edgeuse(a)?.edge == m.edgeuse(b)?.edge {
                continue;
            }
            m.join_edge(a, b)?;
            joined += 1;
        }
    }
    if joined > 0 && m.config().debug.contains(DebugFlags::MESH) {
        tracing::trace!(f1 = m.face(f1)?.index, f2 = m.face(f2)?.index, joined, "meshed faces");
    }
    Ok(joined)
}

/// Meshes every pair of the given faces whose bounding boxes touch.
pub fn glue_faces(m: &mut Model, fus: &[FaceUseKey], tol: &Tolerance) -> Result<usize> {
    tol.validate()?;
    let boxes = fus
        .iter()
        .map(|&fu| m.fu_bbox(fu))
        .collect::<Result<Vec<_>>>()?;
    let mut joined = 0;
    for i in 0..fus.len() {
        for j in i + 1..fus.len() {
            if boxes[i].overlaps(&boxes[j], tol.dist) {
                joined += mesh_two_faces(m, fus[i], fus[j], tol)?;
            }
        }
    }
    tracing::debug!(faces = fus.len(), joined, "glued faces");
    verify_if_enabled(m)?;
    Ok(joined)
}

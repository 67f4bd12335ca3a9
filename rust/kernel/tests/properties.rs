// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural properties that must hold after every kernel operation.

use approx::assert_relative_eq;
use nalgebra::Point3;
use nmg_kernel::{
    check_model, do_bool, make_box, model_fuse, shell_from_polygons, BoolOp, Model, RegionKey,
    Tolerance, TopologyKey,
};
use rustc_hash::FxHashSet;

fn tol() -> Tolerance {
    Tolerance::new(1e-6, 1e-6)
}

fn cube(m: &mut Model, min: f64, max: f64) -> RegionKey {
    make_box(m, Point3::new(min, min, min), Point3::new(max, max, max))
        .unwrap()
        .0
}

/// Two boxes glued along a face, then triangulated: a model with shared
/// edges, non-quad faces and several shells.
fn busy_model() -> Model {
    let mut m = Model::new();
    make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
    make_box(&mut m, Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 1.0, 2.0)).unwrap();
    make_box(&mut m, Point3::new(5.0, 0.0, 0.0), Point3::new(6.0, 2.0, 1.0)).unwrap();
    model_fuse(&mut m, &tol()).unwrap();
    m.triangulate_model(&tol()).unwrap();
    m
}

#[test]
fn radial_cycles_close_over_every_use() {
    let m = busy_model();
    let all = m.edgeuse_tabulate(TopologyKey::Model).unwrap();
    for e in m.edge_keys() {
        let uses = m.edge_uses(e).unwrap();
        assert_eq!(uses.len() % 2, 0);
        let mut seen = FxHashSet::default();
        for &eu in &uses {
            assert!(seen.insert(eu), "edgeuse visited twice");
            assert_eq!(m.edgeuse(eu).unwrap().edge, e);
        }
        let owned = all.iter().filter(|&&eu| m.edgeuse(eu).unwrap().edge == e).count();
        assert_eq!(owned, uses.len());
    }
}

#[test]
fn mates_are_symmetric() {
    let m = busy_model();
    for eu in m.edgeuse_tabulate(TopologyKey::Model).unwrap() {
        let mate = m.eu_mate(eu).unwrap();
        assert_ne!(mate, eu);
        assert_eq!(m.eu_mate(mate).unwrap(), eu);
        assert_eq!(m.eu_radial(m.eu_radial(eu).unwrap()).unwrap(), eu);
    }
    for lu in m.loopuse_tabulate(TopologyKey::Model).unwrap() {
        let mate = m.loopuse(lu).unwrap().mate;
        assert_eq!(m.loopuse(mate).unwrap().mate, lu);
    }
    for r in m.regions() {
        for &s in &m.region(*r).unwrap().shells {
            for &fu in &m.shell(s).unwrap().faceuses {
                let data = m.faceuse(fu).unwrap();
                let mate = m.faceuse(data.mate).unwrap();
                assert_eq!(mate.mate, fu);
                assert_eq!(mate.orientation, data.orientation.flipped());
            }
        }
    }
}

#[test]
fn indices_are_unique_and_bounded() {
    let m = busy_model();
    let mut keys: Vec<TopologyKey> = Vec::new();
    keys.extend(m.vertex_keys().into_iter().map(TopologyKey::from));
    keys.extend(m.edge_keys().into_iter().map(TopologyKey::from));
    keys.extend(m.face_keys().into_iter().map(TopologyKey::from));
    keys.extend(m.edgeuse_tabulate(TopologyKey::Model).unwrap().into_iter().map(TopologyKey::from));
    keys.extend(m.loopuse_tabulate(TopologyKey::Model).unwrap().into_iter().map(TopologyKey::from));
    keys.extend(m.vertexuse_tabulate(TopologyKey::Model).unwrap().into_iter().map(TopologyKey::from));
    let mut seen = FxHashSet::default();
    for key in keys {
        let index = m.index_of(key).unwrap();
        assert!(index < m.maxindex());
        assert!(seen.insert(index), "index {index} used twice");
    }
    assert!(check_model(&m).is_ok());
}

#[test]
fn fusing_twice_changes_nothing() {
    let mut m = Model::new();
    make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
    make_box(&mut m, Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)).unwrap();
    assert!(model_fuse(&mut m, &tol()).unwrap() > 0);
    let counts = (m.vertex_count(), m.edge_count(), m.face_count());
    assert_eq!(model_fuse(&mut m, &tol()).unwrap(), 0);
    assert_eq!((m.vertex_count(), m.edge_count(), m.face_count()), counts);
    assert!(check_model(&m).is_ok());
}

#[test]
fn triangles_are_a_fixed_point() {
    let mut m = Model::new();
    let (_, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
    assert_eq!(m.triangulate_shell(s, &tol()).unwrap(), 12);
    let faces = m.face_count();
    assert_eq!(m.triangulate_shell(s, &tol()).unwrap(), 0);
    assert_eq!(m.face_count(), faces);
    assert_relative_eq!(m.shell_volume(s).unwrap(), 1.0, epsilon = 1e-9);
    assert!(check_model(&m).is_ok());
}

#[test]
fn polygon_soup_sews_into_a_closed_shell() {
    let mut m = Model::new();
    let p = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
    let quads = vec![
        vec![p(0.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(1.0, 1.0, 0.0), p(1.0, 0.0, 0.0)],
        vec![p(0.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(1.0, 1.0, 1.0), p(0.0, 1.0, 1.0)],
        vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(1.0, 0.0, 1.0), p(0.0, 0.0, 1.0)],
        vec![p(0.0, 1.0, 0.0), p(0.0, 1.0, 1.0), p(1.0, 1.0, 1.0), p(1.0, 1.0, 0.0)],
        vec![p(0.0, 0.0, 0.0), p(0.0, 0.0, 1.0), p(0.0, 1.0, 1.0), p(0.0, 1.0, 0.0)],
        vec![p(1.0, 0.0, 0.0), p(1.0, 1.0, 0.0), p(1.0, 1.0, 1.0), p(1.0, 0.0, 1.0)],
    ];
    let (_, s) = shell_from_polygons(&mut m, &quads, &tol()).unwrap();
    assert_eq!(m.vertex_count(), 8);
    assert_eq!(m.edge_count(), 12);
    assert!(m.manifolds().unwrap().dangling_faces().is_empty());
    assert_relative_eq!(m.shell_volume(s).unwrap(), 1.0, epsilon = 1e-9);
    assert!(check_model(&m).is_ok());
}

#[test]
fn boolean_with_a_copy_is_idempotent() {
    for op in [BoolOp::Intersect, BoolOp::Union] {
        let mut m = Model::new();
        let (a, s) = make_box(&mut m, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let (b, _) = m.dup_shell(s).unwrap();
        let r = do_bool(&mut m, a, b, op, &tol()).unwrap();
        assert_eq!(m.face_count(), 6, "{op:?}");
        assert_eq!(m.vertex_count(), 8, "{op:?}");
        assert_eq!(m.edge_count(), 12, "{op:?}");
        assert_relative_eq!(m.region_volume(r).unwrap(), 1.0, epsilon = 1e-9);
        assert!(check_model(&m).is_ok());
    }
}

#[test]
fn difference_then_union_restores_the_union() {
    let mut m = Model::new();
    let a = cube(&mut m, 0.0, 2.0);
    let b = cube(&mut m, 1.0, 3.0);
    let diff = do_bool(&mut m, a, b, BoolOp::Subtract, &tol()).unwrap();
    assert_relative_eq!(m.region_volume(diff).unwrap(), 7.0, epsilon = 1e-9);
    assert!(check_model(&m).is_ok());

    let b2 = cube(&mut m, 1.0, 3.0);
    let joined = do_bool(&mut m, diff, b2, BoolOp::Union, &tol()).unwrap();
    let rebuilt = m.region_volume(joined).unwrap();
    assert!(check_model(&m).is_ok());

    let mut other = Model::new();
    let a = cube(&mut other, 0.0, 2.0);
    let b3 = cube(&mut other, 1.0, 3.0);
    let union = do_bool(&mut other, a, b3, BoolOp::Union, &tol()).unwrap();
    let direct = other.region_volume(union).unwrap();

    assert_relative_eq!(direct, 15.0, epsilon = 1e-9);
    assert_relative_eq!(rebuilt, direct, epsilon = 1e-9);
}

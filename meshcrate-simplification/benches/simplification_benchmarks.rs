//! Benchmarks comparing quadric and midpoint collapse placement

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshcrate_core::{HalfEdgeMesh, MeshData, Point3f};
use meshcrate_simplification::{
    FaceCountRatioCriterion, MeshSimplifier, MidpointCollapseStrategy, SimplifyParams,
};

fn generate_grid_mesh(size: usize) -> MeshData {
    let mut vertices = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
            let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
            vertices.push(Point3f::new(x as f32, y as f32, (fx.sin() * fy.sin()) * 2.0));
        }
    }
    let mut faces = Vec::with_capacity((size - 1) * (size - 1) * 2);
    for y in 0..(size - 1) {
        for x in 0..(size - 1) {
            let tl = y * size + x;
            let tr = tl + 1;
            let bl = (y + 1) * size + x;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    MeshData::from_triangles(vertices, faces)
}

fn bench_simplification(c: &mut Criterion) {
    let sizes = [10, 20, 40];
    let ratios = [0.3, 0.5, 0.7];

    let mut group = c.benchmark_group("simplification");

    for &size in &sizes {
        let mesh = generate_grid_mesh(size);
        let face_count = mesh.face_count();

        for &ratio in &ratios {
            let id = format!("{}f_r{}", face_count, (ratio * 100.0) as u32);

            group.bench_with_input(BenchmarkId::new("qem", &id), &(&mesh, ratio), |b, &(mesh, ratio)| {
                let simplifier = MeshSimplifier::default();
                b.iter(|| {
                    let mut target = mesh.clone();
                    let mut criterion = FaceCountRatioCriterion::new(ratio).unwrap();
                    let stats = simplifier.simplify(black_box(&mut target), &mut criterion).unwrap();
                    black_box(stats);
                });
            });

            group.bench_with_input(BenchmarkId::new("midpoint", &id), &(&mesh, ratio), |b, &(mesh, ratio)| {
                let simplifier = MeshSimplifier::default().with_strategy(MidpointCollapseStrategy);
                b.iter(|| {
                    let mut target = mesh.clone();
                    let mut criterion = FaceCountRatioCriterion::new(ratio).unwrap();
                    let stats = simplifier.simplify(black_box(&mut target), &mut criterion).unwrap();
                    black_box(stats);
                });
            });
        }
    }

    group.finish();
}

fn bench_half_edge_only(c: &mut Criterion) {
    let mesh = generate_grid_mesh(60);
    let params = SimplifyParams::default().with_normals(false).with_tangents(false);

    c.bench_function("half_edge_build", |b| {
        b.iter(|| black_box(HalfEdgeMesh::from_mesh(black_box(&mesh)).unwrap()));
    });

    c.bench_function("half_edge_simplify_r10", |b| {
        let simplifier = MeshSimplifier::new(params.clone());
        b.iter(|| {
            let mut hem = HalfEdgeMesh::from_mesh(&mesh).unwrap();
            let mut criterion = FaceCountRatioCriterion::new(0.1).unwrap();
            black_box(simplifier.simplify_mesh(&mut hem, &mut criterion));
        });
    });
}

criterion_group!(benches, bench_simplification, bench_half_edge_only);
criterion_main!(benches);

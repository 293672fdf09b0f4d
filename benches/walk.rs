use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use shapewalk::{reflect_struct, Registry, Walker};

struct Vertex {
    x: i64,
    y: i64,
    z: i64,
}
reflect_struct!(Vertex {
    x: i64,
    y: i64,
    z: i64
});

struct Edge {
    from: Vertex,
    to: Vertex,
    weight: i64,
}
reflect_struct!(Edge {
    from: Vertex,
    to: Vertex,
    weight: i64
});

fn summing() -> Registry<i64> {
    let mut registry = Registry::<i64>::new();
    registry.compile_i64(|_| {
        Box::new(|sum, leaf| {
            *sum += *leaf.get();
            Ok(())
        })
    });
    registry.compile_struct(|shape, reg| {
        for i in 0..shape.struct_fields().unwrap().len() {
            reg.register(i);
        }
        Ok(Box::new(|sum: &mut i64, view| {
            for i in 0..view.num_fields() {
                view.walk_field(sum, i)?;
            }
            Ok(())
        }))
    });
    registry
}

fn bench_walk(c: &mut Criterion) {
    let registry = summing();
    let walker = Walker::new(&registry);
    let typed = walker.for_type::<Edge>().unwrap();
    let edge = Edge {
        from: Vertex { x: 1, y: 2, z: 3 },
        to: Vertex { x: 4, y: 5, z: 6 },
        weight: 7,
    };

    c.bench_function("walk_dynamic", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            walker.walk(&mut sum, black_box(&edge)).unwrap();
            sum
        })
    });

    c.bench_function("walk_typed", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            typed.walk_ref(&mut sum, black_box(&edge)).unwrap();
            sum
        })
    });
}

criterion_group!(benches, bench_walk);
criterion_main!(benches);

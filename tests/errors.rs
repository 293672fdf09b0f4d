use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shapewalk::{reflect_struct, Kind, Registry, WalkError, Walker};

struct Point {
    x: i64,
    y: i64,
}
reflect_struct!(Point { x: i64, y: i64 });

#[test]
fn missing_kind_handlers_surface_at_walk_time() {
    let registry = Registry::<()>::new();
    let walker = Walker::new(&registry);

    let err = walker.walk(&mut (), &5i64).unwrap_err();
    assert!(matches!(
        err,
        WalkError::UnregisteredKind { kind: Kind::I64, .. }
    ));
}

#[test]
fn missing_dependent_handlers_fail_the_whole_compilation() {
    let mut registry = Registry::<()>::new();
    // Struct handler present, i64 handler missing.
    registry.compile_struct(|_, reg| {
        reg.register(0);
        Ok(Box::new(|ctx: &mut (), view| view.walk_field(ctx, 0)))
    });
    let walker = Walker::new(&registry);

    let err = walker.walk(&mut (), &Point { x: 1, y: 2 }).unwrap_err();
    assert!(matches!(
        err,
        WalkError::UnregisteredKind { kind: Kind::I64, .. }
    ));
}

#[test]
fn bad_field_registrations_are_compile_errors() {
    let mut registry = Registry::<()>::new();
    registry.compile_i64(|_| Box::new(|_, _| Ok(())));
    registry.compile_struct(|_, reg| {
        reg.register(9);
        Ok(Box::new(|_: &mut (), _| Ok(())))
    });
    let walker = Walker::new(&registry);

    let err = walker.walk(&mut (), &Point { x: 0, y: 0 }).unwrap_err();
    assert!(matches!(
        err,
        WalkError::FieldIndexOutOfBounds {
            index: 9,
            field_count: 2,
            ..
        }
    ));
}

#[test]
fn handler_errors_short_circuit_the_traversal() {
    let mut registry = Registry::<Vec<i64>>::new();
    registry.compile_i64(|_| {
        Box::new(|out, leaf| {
            let v = *leaf.get();
            if v < 0 {
                return Err(WalkError::custom(format!("negative value {v}")));
            }
            out.push(v);
            Ok(())
        })
    });
    registry.compile_list(|_| {
        Ok(Box::new(|out: &mut Vec<i64>, view| {
            for i in 0..view.len() {
                view.walk_elem(out, i)?;
            }
            Ok(())
        }))
    });
    let walker = Walker::new(&registry);

    let mut out = Vec::new();
    let err = walker.walk(&mut out, &vec![1i64, -2, 3]).unwrap_err();
    assert!(matches!(err, WalkError::Handler(_)));
    assert!(err.to_string().contains("negative value -2"));
    // The element after the failure was never visited.
    assert_eq!(out, vec![1]);
}

#[test]
fn failed_compilations_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut registry = Registry::<Vec<i64>>::new();
    registry.compile_i64(|_| {
        Box::new(|out, leaf| {
            out.push(*leaf.get());
            Ok(())
        })
    });
    registry.compile_struct(move |_, reg| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(WalkError::custom("transient"));
        }
        reg.register(0);
        reg.register(1);
        Ok(Box::new(|out: &mut Vec<i64>, view| {
            view.walk_field(out, 0)?;
            view.walk_field(out, 1)
        }))
    });
    let walker = Walker::new(&registry);
    let value = Point { x: 1, y: 2 };

    let mut out = Vec::new();
    assert!(walker.walk(&mut out, &value).is_err());

    // Nothing was cached for the failed attempt; the next walk
    // recompiles and succeeds.
    walker.walk(&mut out, &value).unwrap();
    assert_eq!(out, vec![1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

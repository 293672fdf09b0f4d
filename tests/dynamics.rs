use std::fmt::Write;

use shapewalk::{reflect_struct, Dynamic, Registry, WalkError, Walker};

struct Point {
    x: i64,
    y: i64,
}
reflect_struct!(Point { x: i64, y: i64 });

struct Tagged {
    label: String,
    payload: Dynamic,
}
reflect_struct!(Tagged {
    label: String,
    payload: Dynamic
});

fn printer() -> Registry<String> {
    let mut registry = Registry::<String>::new();
    registry.compile_i64(|_| {
        Box::new(|out: &mut String, leaf| {
            write!(out, "{}", leaf.get())?;
            Ok(())
        })
    });
    registry.compile_string(|_| {
        Box::new(|out: &mut String, leaf| {
            write!(out, "{:?}", leaf.get())?;
            Ok(())
        })
    });
    registry.compile_struct(|shape, reg| {
        let fields = shape.struct_fields().unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
        for i in 0..fields.len() {
            reg.register(i);
        }
        Ok(Box::new(move |out: &mut String, view| {
            out.push('{');
            for i in 0..view.num_fields() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(names[i]);
                out.push(':');
                view.walk_field(out, i)?;
            }
            out.push('}');
            Ok(())
        }))
    });
    registry.compile_dynamic(|_| {
        Ok(Box::new(|out: &mut String, view| {
            if view.is_nil() {
                out.push_str("none");
                Ok(())
            } else {
                view.walk(out)
            }
        }))
    });
    registry
}

#[test]
fn dispatches_to_the_concrete_walker_at_walk_time() {
    let walker = Walker::new(&printer());

    let mut out = String::new();
    walker
        .walk(&mut out, &Dynamic::new(Point { x: 1, y: 2 }))
        .unwrap();
    assert_eq!(out, "{x:1,y:2}");

    // The same dynamic shape carrying a different concrete type.
    let mut out = String::new();
    walker.walk(&mut out, &Dynamic::new(7i64)).unwrap();
    assert_eq!(out, "7");
}

#[test]
fn empty_dynamics_reach_the_handler_as_nil() {
    let walker = Walker::new(&printer());

    let mut out = String::new();
    walker.walk(&mut out, &Dynamic::none()).unwrap();
    assert_eq!(out, "none");
}

#[test]
fn dynamic_fields_walk_inside_structs() {
    let walker = Walker::new(&printer());
    let value = Tagged {
        label: "pt".into(),
        payload: Dynamic::new(Point { x: 3, y: 4 }),
    };

    let mut out = String::new();
    walker.walk(&mut out, &value).unwrap();
    assert_eq!(out, "{label:\"pt\",payload:{x:3,y:4}}");
}

#[test]
fn walking_an_empty_dynamic_is_an_error() {
    let mut registry = printer();
    // A handler that does not check for nil first.
    registry.compile_dynamic(|_| Ok(Box::new(|out: &mut String, view| view.walk(out))));
    let walker = Walker::new(&registry);

    let mut out = String::new();
    let err = walker.walk(&mut out, &Dynamic::none()).unwrap_err();
    assert!(matches!(err, WalkError::NilDynamic { .. }));
}

#[test]
fn erased_entry_points_use_the_concrete_shape() {
    let mut registry = Registry::<i64>::new();
    registry.compile_i64(|_| {
        Box::new(|sum, leaf| {
            *sum += *leaf.get();
            Ok(())
        })
    });
    let walker = Walker::new(&registry);

    let value = 40i64;
    let erased: &dyn shapewalk::AnyReflect = &value;
    let mut sum = 2;
    walker.walk_any(&mut sum, erased).unwrap();
    assert_eq!(sum, 42);
}

#[test]
fn typed_reads_from_dynamic_slots() {
    let mut registry = Registry::<i64>::new();
    registry.compile_dynamic(|_| {
        Ok(Box::new(|out: &mut i64, view| {
            assert!(view.get::<String>().is_none());
            *out = *view.get::<i64>().unwrap();
            Ok(())
        }))
    });
    let walker = Walker::new(&registry);

    let mut out = 0;
    walker.walk(&mut out, &Dynamic::new(9i64)).unwrap();
    assert_eq!(out, 9);
}

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use shapewalk::{Registry, Walker};

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
    registry.compile_array(|_| {
        Ok(Box::new(|out: &mut String, view| {
            out.push('[');
            for i in 0..view.len() {
                if i > 0 {
                    out.push(',');
                }
                view.walk_elem(out, i)?;
            }
            out.push(']');
            Ok(())
        }))
    });
    registry.compile_list(|_| {
        Ok(Box::new(|out: &mut String, view| {
            out.push('[');
            for i in 0..view.len() {
                if i > 0 {
                    out.push(',');
                }
                view.walk_elem(out, i)?;
            }
            out.push(']');
            Ok(())
        }))
    });
    registry.compile_map(|_| {
        Ok(Box::new(|out: &mut String, view| {
            out.push('{');
            for (i, entry) in view.entries().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                entry.walk_key(out)?;
                out.push('=');
                entry.walk_value(out)?;
            }
            out.push('}');
            Ok(())
        }))
    });
    registry
}

#[test]
fn fixed_arrays_print_every_element() {
    let walker = Walker::new(&printer());
    let value: [String; 3] = ["abc".into(), "def".into(), "ghi".into()];

    let mut out = String::new();
    walker.walk(&mut out, &value).unwrap();
    assert_eq!(out, "[\"abc\",\"def\",\"ghi\"]");
}

#[test]
fn lists_print_their_current_contents() {
    let walker = Walker::new(&printer());

    let mut out = String::new();
    walker.walk(&mut out, &vec![1i64, 2, 3]).unwrap();
    assert_eq!(out, "[1,2,3]");

    let mut out = String::new();
    walker.walk(&mut out, &Vec::<i64>::new()).unwrap();
    assert_eq!(out, "[]");
}

#[test]
fn nested_lists_recurse() {
    let walker = Walker::new(&printer());
    let value: Vec<Vec<i64>> = vec![vec![1], vec![], vec![2, 3]];

    let mut out = String::new();
    walker.walk(&mut out, &value).unwrap();
    assert_eq!(out, "[[1],[],[2,3]]");
}

#[test]
fn ordered_maps_print_deterministically() {
    let walker = Walker::new(&printer());
    let mut value = BTreeMap::new();
    value.insert(2i64, String::from("two"));
    value.insert(1i64, String::from("one"));

    let mut out = String::new();
    walker.walk(&mut out, &value).unwrap();
    assert_eq!(out, "{1=\"one\",2=\"two\"}");
}

#[test]
fn map_views_report_length_and_visit_each_entry() {
    let mut registry = Registry::<(usize, i64)>::new();
    registry.compile_i64(|_| {
        Box::new(|ctx: &mut (usize, i64), leaf| {
            ctx.1 += *leaf.get();
            Ok(())
        })
    });
    registry.compile_string(|_| Box::new(|_, _| Ok(())));
    registry.compile_map(|_| {
        Ok(Box::new(|ctx: &mut (usize, i64), view| {
            assert_eq!(view.len(), 2);
            assert!(!view.is_empty());
            for entry in view.entries() {
                ctx.0 += 1;
                entry.walk_value(ctx)?;
            }
            Ok(())
        }))
    });
    let walker = Walker::new(&registry);

    let mut value = HashMap::new();
    value.insert(String::from("a"), 40i64);
    value.insert(String::from("b"), 2i64);

    let mut ctx = (0usize, 0i64);
    walker.walk(&mut ctx, &value).unwrap();
    assert_eq!(ctx, (2, 42));
}

#[test]
fn typed_reads_from_container_views() {
    let mut registry = Registry::<Vec<i64>>::new();
    registry.compile_i64(|_| Box::new(|_, _| Ok(())));
    registry.compile_string(|_| Box::new(|_, _| Ok(())));
    registry.compile_list(|_| {
        Ok(Box::new(|out: &mut Vec<i64>, view| {
            assert!(view.get::<Vec<i64>>().is_some());
            for i in 0..view.len() {
                out.push(*view.elem(i).get::<i64>().unwrap());
                assert!(view.elem(i).get::<bool>().is_none());
            }
            Ok(())
        }))
    });
    registry.compile_map(|_| {
        Ok(Box::new(|out: &mut Vec<i64>, view| {
            for entry in view.entries() {
                assert!(entry.key::<String>().is_some());
                assert!(entry.value::<String>().is_none());
                out.push(*entry.value::<i64>().unwrap());
            }
            Ok(())
        }))
    });
    let walker = Walker::new(&registry);

    let mut out = Vec::new();
    walker.walk(&mut out, &vec![4i64, 5]).unwrap();
    assert_eq!(out, vec![4, 5]);

    let mut map = HashMap::new();
    map.insert(String::from("k"), 6i64);
    walker.walk(&mut out, &map).unwrap();
    assert_eq!(out, vec![4, 5, 6]);
}

#[test]
fn list_views_report_capacity() {
    let mut registry = Registry::<(usize, usize)>::new();
    registry.compile_i64(|_| Box::new(|_, _| Ok(())));
    registry.compile_list(|_| {
        Ok(Box::new(|ctx: &mut (usize, usize), view| {
            *ctx = (view.len(), view.capacity());
            Ok(())
        }))
    });
    let walker = Walker::new(&registry);

    let mut value: Vec<i64> = Vec::with_capacity(16);
    value.extend([1, 2, 3]);

    let mut ctx = (0, 0);
    walker.walk(&mut ctx, &value).unwrap();
    assert_eq!(ctx.0, 3);
    assert_eq!(ctx.1, value.capacity());
    assert!(ctx.1 >= 16);
}

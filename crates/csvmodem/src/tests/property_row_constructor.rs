use std::sync::Arc;

use quickcheck::QuickCheck;

use super::utils::test_count;
use crate::{CellError, Error, MemberOptions, RowConstructor, Schema, SchemaBuilder};

#[derive(Debug, Clone, Default, PartialEq)]
struct Shipment {
    id: u64,
    origin: String,
    weight: i32,
    fragile: bool,
    note: String,
}

fn required() -> MemberOptions {
    MemberOptions {
        required: true,
        ..Default::default()
    }
}

/// Setter-bound members only.
fn setters() -> Arc<Schema<Shipment>> {
    Arc::new(
        SchemaBuilder::with_default()
            .parsed("id", |s: &mut Shipment, v| s.id = v, required())
            .parsed("origin", |s: &mut Shipment, v| s.origin = v, MemberOptions::default())
            .parsed("weight", |s: &mut Shipment, v| s.weight = v, MemberOptions::default())
            .parsed("fragile", |s: &mut Shipment, v| s.fragile = v, MemberOptions::default())
            .parsed("note", |s: &mut Shipment, v| s.note = v, MemberOptions::default())
            .build()
            .unwrap(),
    )
}

/// Constructor parameters declared out of column order, plus setters that
/// must wait for construction.
fn constructed() -> Arc<Schema<Shipment>> {
    Arc::new(
        SchemaBuilder::new()
            .constructor(3, |args| {
                Ok(Shipment {
                    id: args.take(0).ok_or_else(|| CellError::new("id missing"))?,
                    origin: args.take_or_default(2),
                    weight: args.take_or_default(1),
                    ..Default::default()
                })
            })
            .parsed_parameter::<u64>("id", 0, required())
            .parsed_parameter::<String>("origin", 2, MemberOptions::default())
            .parsed_parameter::<i32>("weight", 1, MemberOptions::default())
            .parsed("fragile", |s: &mut Shipment, v| s.fragile = v, MemberOptions::default())
            .parsed("note", |s: &mut Shipment, v| s.note = v, MemberOptions::default())
            .build()
            .unwrap(),
    )
}

fn cells(id: u64, origin: &str, weight: i32, fragile: bool, note: &str) -> Vec<(usize, String)> {
    vec![
        (0, id.to_string()),
        (1, origin.to_string()),
        (2, weight.to_string()),
        (3, fragile.to_string()),
        (4, note.to_string()),
    ]
}

fn bind(schema: &Arc<Schema<Shipment>>, cells: &[(usize, String)]) -> crate::Result<Shipment> {
    let mut constructor = RowConstructor::new(schema.clone());
    constructor.start_row(0)?;
    for (column, text) in cells {
        constructor.column_available(*column, text)?;
    }
    constructor.finish_row()
}

/// Deterministic shuffle driven by arbitrary keys.
fn permute<T>(mut items: Vec<T>, keys: &[usize]) -> Vec<T> {
    for (i, key) in keys.iter().enumerate() {
        let len = items.len();
        if len < 2 {
            break;
        }
        items.swap(i % len, key % len);
    }
    items
}

/// Property: the order cells arrive in never changes the row.
#[test]
fn order_independence_quickcheck() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(id: u64, origin: String, weight: i32, fragile: bool, note: String, keys: Vec<usize>) -> bool {
        let in_order = cells(id, &origin, weight, fragile, &note);
        let shuffled = permute(in_order.clone(), &keys);
        [setters(), constructed()].iter().all(|schema| {
            let expected = bind(schema, &in_order).unwrap();
            let actual = bind(schema, &shuffled).unwrap();
            expected == actual
                && actual
                    == Shipment {
                        id,
                        origin: origin.clone(),
                        weight,
                        fragile,
                        note: note.clone(),
                    }
        })
    }

    QuickCheck::new()
        .tests(test_count())
        .quickcheck(prop as fn(u64, String, i32, bool, String, Vec<usize>) -> bool);
}

/// Property: leaving out the required column rejects the row; leaving out
/// anything else leaves the member at its default.
#[test]
fn required_enforcement_quickcheck() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(id: u64, origin: String, weight: i32, fragile: bool, note: String, keep: Vec<bool>) -> bool {
        let kept: Vec<(usize, String)> = cells(id, &origin, weight, fragile, &note)
            .into_iter()
            .filter(|(column, _)| keep.get(*column).copied().unwrap_or(true))
            .collect();
        let has = |column: usize| kept.iter().any(|(c, _)| *c == column);
        let expected = Shipment {
            id,
            origin: if has(1) { origin.clone() } else { String::new() },
            weight: if has(2) { weight } else { 0 },
            fragile: has(3) && fragile,
            note: if has(4) { note.clone() } else { String::new() },
        };

        [setters(), constructed()].iter().all(|schema| match bind(schema, &kept) {
            Ok(shipment) => has(0) && shipment == expected,
            Err(Error::MissingRequiredColumn { ref member, .. }) => !has(0) && &**member == "id",
            Err(_) => false,
        })
    }

    QuickCheck::new()
        .tests(test_count())
        .quickcheck(prop as fn(u64, String, i32, bool, String, Vec<bool>) -> bool);
}

#[test]
fn clones_bind_independently() {
    let mut first = RowConstructor::new(setters());
    let mut second = first.clone();
    first.start_row(0).unwrap();
    second.start_row(0).unwrap();
    first.column_available(0, "1").unwrap();
    second.column_available(0, "2").unwrap();
    first.column_available(4, "left").unwrap();
    assert_eq!(second.finish_row().unwrap(), Shipment { id: 2, ..Default::default() });
    assert_eq!(
        first.finish_row().unwrap(),
        Shipment {
            id: 1,
            note: "left".into(),
            ..Default::default()
        }
    );
}

use hashbrown::HashMap;

use crate::condition::{CondData, Condition};
use crate::symbol::{SymbolId, SymbolStore};
use crate::test::{add_test, tests_are_equal, tests_identical};

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Collapse positive conditions that test the same slot into one.
///
/// Two positive conditions merge when their id and attr equality
/// referents match and their value tests bind the same thing: the same
/// symbol for identifiers and variables, or the same constant under
/// the same grounding for literals. The earlier condition survives;
/// non-equality value conjuncts of the absorbed condition fold into
/// it, skipping conjuncts already present.
///
/// Negative conditions and NCCs never merge.
pub fn merge_conditions(conds: &mut Vec<Condition>, symbols: &SymbolStore) {
    let mut merged: Vec<Condition> = Vec::with_capacity(conds.len());
    let mut by_pair: HashMap<(SymbolId, SymbolId), Vec<usize>> = HashMap::new();

    for cond in conds.drain(..) {
        let key = match &cond {
            Condition::Positive(data) => match (
                data.tests.id.equality_referent(),
                data.tests.attr.equality_referent(),
            ) {
                (Some(id), Some(attr)) => Some((id, attr)),
                _ => None,
            },
            _ => None,
        };
        let Some(key) = key else {
            merged.push(cond);
            continue;
        };

        let survivor = by_pair.get(&key).and_then(|indices| {
            indices.iter().copied().find(|&i| {
                let a = merged[i].data().expect("indexed condition is positive");
                let b = cond.data().expect("keyed condition is positive");
                values_bind_same(a, b, symbols)
            })
        });

        match survivor {
            Some(index) => {
                #[cfg(feature = "tracing")]
                debug!(into = index, "merging duplicate slot condition");
                let incoming = match cond {
                    Condition::Positive(data) => data,
                    _ => unreachable!("keyed condition is positive"),
                };
                let target = merged[index]
                    .data_mut()
                    .expect("indexed condition is positive");
                fold_extra_value_tests(target, incoming, symbols);
            }
            None => {
                by_pair.entry(key).or_default().push(merged.len());
                merged.push(cond);
            }
        }
    }

    *conds = merged;
}

/// Whether two positive conditions' value slots bind the same thing.
fn values_bind_same(a: &CondData, b: &CondData, symbols: &SymbolStore) -> bool {
    if a.acceptable != b.acceptable {
        return false;
    }
    let (Some(va), Some(vb)) = (a.tests.value.equality_test(), b.tests.value.equality_test())
    else {
        return false;
    };
    let (Some(ra), Some(rb)) = (va.referent(), vb.referent()) else {
        return false;
    };
    let a_symbolic = symbols.is_sti(ra) || symbols.is_variable(ra);
    let b_symbolic = symbols.is_sti(rb) || symbols.is_variable(rb);
    if a_symbolic != b_symbolic {
        return false;
    }
    if a_symbolic {
        return ra == rb;
    }
    // Two literal constants merge only when they trace to the same
    // binding, not merely the same printed value.
    ra == rb
        && va.identity.grounding_id == vb.identity.grounding_id
        && va.identity.original_var == vb.identity.original_var
}

fn fold_extra_value_tests(target: &mut CondData, incoming: CondData, symbols: &SymbolStore) {
    for conjunct in incoming.tests.value.conjuncts() {
        if conjunct.is_equality() {
            continue;
        }
        let present = target
            .tests
            .value
            .conjuncts()
            .any(|existing| tests_identical(existing, conjunct, symbols, true));
        if !present {
            add_test(&mut target.tests.value, conjunct.clone());
        }
    }
    if target.wme.is_none() {
        target.wme = incoming.wme;
    }
}

/// Drop conditions that are structural duplicates of an earlier one.
///
/// Quadratic pairwise scan; condition lists at this stage are small.
/// Negated conditions compare with variable referents wildcarded, so
/// two negations differing only in which chunk variable they name
/// count as duplicates.
pub fn remove_dupe_conditions(conds: &mut Vec<Condition>, symbols: &SymbolStore) {
    let mut dead = vec![false; conds.len()];
    for i in 0..conds.len() {
        if dead[i] {
            continue;
        }
        for j in (i + 1)..conds.len() {
            if !dead[j] && conditions_equal(&conds[i], &conds[j], symbols) {
                dead[j] = true;
            }
        }
    }
    let mut keep = dead.iter();
    conds.retain(|_| !*keep.next().expect("flag per condition"));
}

fn conditions_equal(a: &Condition, b: &Condition, symbols: &SymbolStore) -> bool {
    match (a, b) {
        (Condition::Positive(da), Condition::Positive(db)) => {
            data_equal(da, db, symbols, false)
        }
        (Condition::Negative(da), Condition::Negative(db)) => {
            data_equal(da, db, symbols, true)
        }
        (Condition::Ncc(ca), Condition::Ncc(cb)) => {
            ca.len() == cb.len()
                && ca
                    .iter()
                    .zip(cb)
                    .all(|(x, y)| conditions_equal(x, y, symbols))
        }
        _ => false,
    }
}

fn data_equal(a: &CondData, b: &CondData, symbols: &SymbolStore, neg: bool) -> bool {
    a.acceptable == b.acceptable
        && tests_are_equal(&a.tests.id, &b.tests.id, symbols, neg)
        && tests_are_equal(&a.tests.attr, &b.tests.attr, symbols, neg)
        && tests_are_equal(&a.tests.value, &b.tests.value, symbols, neg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{GroundId, Identity, OvarId};
    use crate::test::{Relation, Test, TestContent};
    use crate::wme::{Wme, WmeStore};

    fn cond(id: Test, attr: Test, value: Test) -> Condition {
        Condition::positive(id, attr, value)
    }

    // ========== MERGE ==========

    #[test]
    fn same_slot_same_identifier_value_merges() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let b3 = symbols.identifier(b'B', 3);
        let mut conds = vec![
            cond(Test::equality(s1), Test::equality(color), Test::equality(b3)),
            cond(Test::equality(s1), Test::equality(color), Test::equality(b3)),
        ];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn merge_folds_relational_conjuncts_into_survivor() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let size = symbols.str_const("size");
        let five = symbols.int_const(5);
        let ten = symbols.int_const(10);
        let grounded = |g: u64| Identity {
            grounding_id: GroundId(g),
            ..Identity::default()
        };
        let mut conds = vec![
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::equality(five).with_identity(grounded(1)),
            ),
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::conjunction(vec![
                    Test::equality(five).with_identity(grounded(1)),
                    Test::relational(Relation::Less, ten),
                ]),
            ),
        ];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 1);
        let value = &conds[0].data().unwrap().tests.value;
        assert!(value
            .conjuncts()
            .any(|t| matches!(t.content, TestContent::Relational(Relation::Less, r) if r == ten)));
    }

    #[test]
    fn merge_does_not_duplicate_folded_conjuncts() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let size = symbols.str_const("size");
        let five = symbols.int_const(5);
        let ten = symbols.int_const(10);
        let make = || {
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::conjunction(vec![
                    Test::equality(five),
                    Test::relational(Relation::Less, ten),
                ]),
            )
        };
        let mut conds = vec![make(), make()];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 1);
        let count = conds[0]
            .data()
            .unwrap()
            .tests
            .value
            .conjuncts()
            .filter(|t| matches!(t.content, TestContent::Relational(_, _)))
            .count();
        assert_eq!(count, 1, "The folded conjunct was already present");
    }

    #[test]
    fn constants_with_different_groundings_do_not_merge() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let size = symbols.str_const("size");
        let five = symbols.int_const(5);
        let with_g = |g: u64| {
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::equality(five).with_identity(Identity {
                    grounding_id: GroundId(g),
                    ..Identity::default()
                }),
            )
        };
        let mut conds = vec![with_g(1), with_g(2)];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(
            conds.len(),
            2,
            "Same printed constant from different bindings stays separate"
        );
    }

    #[test]
    fn acceptable_flag_blocks_merge() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let op = symbols.str_const("operator");
        let o1 = symbols.identifier(b'O', 1);
        let mut conds = vec![
            cond(Test::equality(s1), Test::equality(op), Test::equality(o1)),
            cond(Test::equality(s1), Test::equality(op), Test::equality(o1))
                .acceptable(),
        ];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn negative_conditions_never_merge() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let red = symbols.str_const("red");
        let mut conds = vec![
            Condition::negative(
                Test::equality(s1),
                Test::equality(color),
                Test::equality(red),
            ),
            cond(Test::equality(s1), Test::equality(color), Test::equality(red)),
        ];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn merge_adopts_wme_when_survivor_has_none() {
        let symbols = SymbolStore::new();
        let mut wmes = WmeStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let b3 = symbols.identifier(b'B', 3);
        let w = wmes.add(Wme {
            id: s1,
            attr: color,
            value: b3,
            acceptable: false,
            pref: None,
        });
        let mut conds = vec![
            cond(Test::equality(s1), Test::equality(color), Test::equality(b3)),
            cond(Test::equality(s1), Test::equality(color), Test::equality(b3))
                .with_wme(w),
        ];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds[0].data().unwrap().wme, Some(w));
    }

    // ========== DEDUP ==========

    #[test]
    fn earlier_duplicate_survives() {
        let symbols = SymbolStore::new();
        let mut wmes = WmeStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let red = symbols.str_const("red");
        let w = wmes.add(Wme {
            id: s1,
            attr: color,
            value: red,
            acceptable: false,
            pref: None,
        });
        let first = cond(
            Test::equality(s1),
            Test::equality(color),
            Test::equality(red),
        )
        .with_wme(w);
        let second = cond(
            Test::equality(s1),
            Test::equality(color),
            Test::equality(red),
        );
        let mut conds = vec![first.clone(), second];
        remove_dupe_conditions(&mut conds, &symbols);
        assert_eq!(conds, vec![first]);
    }

    #[test]
    fn negated_duplicates_match_across_variables() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let v1 = symbols.variable("<v1>");
        let v2 = symbols.variable("<v2>");
        let mut conds = vec![
            Condition::negative(
                Test::equality(s1),
                Test::equality(color),
                Test::equality(v1),
            ),
            Condition::negative(
                Test::equality(s1),
                Test::equality(color),
                Test::equality(v2),
            ),
        ];
        remove_dupe_conditions(&mut conds, &symbols);
        assert_eq!(
            conds.len(),
            1,
            "Negations differing only in variable naming are duplicates"
        );
    }

    #[test]
    fn positive_conditions_do_not_wildcard_variables() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let v1 = symbols.variable("<v1>");
        let v2 = symbols.variable("<v2>");
        let mut conds = vec![
            cond(Test::equality(s1), Test::equality(color), Test::equality(v1)),
            cond(Test::equality(s1), Test::equality(color), Test::equality(v2)),
        ];
        remove_dupe_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn variant_mismatch_is_not_a_duplicate() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let red = symbols.str_const("red");
        let mut conds = vec![
            cond(Test::equality(s1), Test::equality(color), Test::equality(red)),
            Condition::negative(
                Test::equality(s1),
                Test::equality(color),
                Test::equality(red),
            ),
        ];
        remove_dupe_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn ncc_duplicates_compare_recursively() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let color = symbols.str_const("color");
        let red = symbols.str_const("red");
        let make = || {
            Condition::Ncc(vec![Condition::negative(
                Test::equality(s1),
                Test::equality(color),
                Test::equality(red),
            )])
        };
        let mut conds = vec![make(), make()];
        remove_dupe_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn conjunct_order_does_not_block_dedup() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let size = symbols.str_const("size");
        let five = symbols.int_const(5);
        let ten = symbols.int_const(10);
        let mut conds = vec![
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::conjunction(vec![
                    Test::equality(five),
                    Test::relational(Relation::Less, ten),
                ]),
            ),
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::conjunction(vec![
                    Test::relational(Relation::Less, ten),
                    Test::equality(five),
                ]),
            ),
        ];
        remove_dupe_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn merge_keys_on_identity_bearing_literals() {
        let symbols = SymbolStore::new();
        let s1 = symbols.identifier(b'S', 1);
        let size = symbols.str_const("size");
        let five = symbols.int_const(5);
        let identity = Identity {
            grounding_id: GroundId(3),
            o_id: OvarId(9),
            ..Identity::default()
        };
        let make = || {
            cond(
                Test::equality(s1),
                Test::equality(size),
                Test::equality(five).with_identity(identity),
            )
        };
        let mut conds = vec![make(), make()];
        merge_conditions(&mut conds, &symbols);
        assert_eq!(conds.len(), 1);
    }
}

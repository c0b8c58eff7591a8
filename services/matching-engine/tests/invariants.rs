//! Registry invariants under random operation sequences
//!
//! Whatever happens, a row's coupling agrees with its sides, keys stay
//! unique, and nobody is coupled with themselves.

use proptest::prelude::*;
use std::collections::HashSet;
use svar_matching::{Registry, N_VARS};
use svar_types::control::Control;
use svar_types::ids::ApNum3;
use svar_types::name::VarName;
use svar_types::partner::{Coupling, Partner};

#[derive(Debug, Clone)]
enum Op {
    Offer { from: usize, to: Option<usize>, name: usize },
    Retract { who: usize, row: usize },
    Write { who: usize, row: usize },
    Read { who: usize, row: usize },
    Control { who: usize, row: usize, bits: u8 },
    Die { who: usize },
}

const NAMES: [&str; 4] = ["A", "B", "CTL", "DAT"];

fn partner(i: usize) -> Partner {
    Partner::new(ApNum3::single(1001 + i as i32), 100 + i as u32, 0)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..4usize, proptest::option::of(0..4usize), 0..4usize)
            .prop_map(|(from, to, name)| Op::Offer { from, to, name }),
        2 => (0..4usize, 0..N_VARS).prop_map(|(who, row)| Op::Retract { who, row }),
        1 => (0..4usize, 0..N_VARS).prop_map(|(who, row)| Op::Write { who, row }),
        1 => (0..4usize, 0..N_VARS).prop_map(|(who, row)| Op::Read { who, row }),
        1 => (0..4usize, 0..N_VARS, 0u8..16).prop_map(|(who, row, bits)| Op::Control { who, row, bits }),
        1 => (0..4usize).prop_map(|who| Op::Die { who }),
    ]
}

fn check(reg: &Registry) -> Result<(), TestCaseError> {
    let mut keys = HashSet::new();
    for row in reg.used_rows() {
        prop_assert!(keys.insert(row.key), "duplicate key {}", row.key);
        prop_assert!(row.key.is_some());
        match row.coupling() {
            Coupling::Coupled => {
                prop_assert!(row.offering.is_present() && row.accepting.is_present());
                prop_assert_ne!(row.offering.id, row.accepting.id);
            }
            Coupling::Offered => {
                prop_assert!(row.offering.is_present() && !row.accepting.is_present());
            }
            Coupling::NoCoupling => prop_assert!(false, "used row without sides"),
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_invariants_hold(ops in proptest::collection::vec(op(), 1..120)) {
        let mut reg = Registry::new();
        let mut out = Vec::new();

        for op in ops {
            let key_at = |reg: &Registry, row: usize| reg.rows()[row].key;
            match op {
                Op::Offer { from, to, name } => {
                    let to = to.map(|t| partner(t).id).unwrap_or(ApNum3::GENERAL);
                    let _ = reg.match_or_make(&VarName::new(NAMES[name]), to, partner(from), &mut out);
                }
                Op::Retract { who, row } => {
                    let key = key_at(&reg, row);
                    reg.retract(key, &partner(who).id, &mut out);
                }
                Op::Write { who, row } => {
                    let key = key_at(&reg, row);
                    if reg.may_set(key, &partner(who).id, 0, &mut out) {
                        reg.set_state(key, &partner(who).id, false, &mut out);
                    }
                }
                Op::Read { who, row } => {
                    let key = key_at(&reg, row);
                    if reg.may_use(key, &partner(who).id, 0, &mut out) {
                        reg.set_state(key, &partner(who).id, true, &mut out);
                    }
                }
                Op::Control { who, row, bits } => {
                    let key = key_at(&reg, row);
                    reg.set_control(key, &partner(who).id, Control::from_bits(bits), &mut out);
                }
                Op::Die { who } => {
                    let dead = partner(who).pid;
                    reg.remove_stale(&move |pid: u32| pid != dead, &mut out);
                }
            }
            check(&reg)?;
        }
    }
}

#[test]
fn test_no_duplicate_coupling_for_complementary_offers() {
    let mut reg = Registry::new();
    let mut out = Vec::new();
    let a = partner(0);
    let b = partner(1);

    reg.match_or_make(&VarName::new("X"), b.id, a, &mut out).unwrap();
    reg.match_or_make(&VarName::new("X"), a.id, b, &mut out).unwrap();
    // a third, repeated request does not couple a second time
    let (_, c) = reg.match_or_make(&VarName::new("X"), a.id, b, &mut out).unwrap();

    assert_eq!(c, Coupling::Offered);
    let coupled = reg
        .used_rows()
        .filter(|r| r.coupling() == Coupling::Coupled)
        .count();
    assert_eq!(coupled, 1);
}

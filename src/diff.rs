//! Structural comparison between two Config trees (§4.7).

use std::collections::HashMap;

use crate::context::{Context, NodeRef, Payload, Variant};
use crate::error::Result;

/// The nature of a single difference found by [`compare`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    /// Present in the second tree, absent from the first
    Added,
    /// Present in the first tree, absent from the second
    Removed,
    /// Present in both, but the Keyval's value differs
    Changed {
        /// Value on the first tree
        from: String,
        /// Value on the second tree
        to: String,
    },
}

/// A single named divergence between two trees, addressed by its dotted path.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Dotted path (Section/Keyval names, `[index]` suffix for repeated names) to the difference
    pub path: String,
    /// What kind of divergence this is
    pub kind: ChangeKind,
}

/// Recursively diff two Config (or Section) subtrees, reporting every added, removed or
/// changed Keyval underneath. Sections present in only one side are reported as a single
/// `Added`/`Removed` conflict at the section's path, not expanded into its descendants.
pub fn compare(a: &Context, b: &Context) -> Result<Vec<Conflict>> {
    let mut conflicts = Vec::new();
    diff_level(&a.get_elements()?, &b.get_elements()?, "", &mut conflicts)?;
    Ok(conflicts)
}

fn diff_level(a: &[Context], b: &[Context], prefix: &str, out: &mut Vec<Conflict>) -> Result<()> {
    let a_by_name = group_by_name(a)?;
    let b_by_name = group_by_name(b)?;

    let names = ordered_names(a, b)?;

    for name in &names {
        let a_list = a_by_name.get(name).map(Vec::as_slice).unwrap_or(&[]);
        let b_list = b_by_name.get(name).map(Vec::as_slice).unwrap_or(&[]);
        let max_len = a_list.len().max(b_list.len());
        let multiple = max_len > 1;

        for i in 0..max_len {
            let path = if multiple { format!("{prefix}{name}[{i}]") } else { format!("{prefix}{name}") };
            match (a_list.get(i), b_list.get(i)) {
                (Some(ac), Some(bc)) => {
                    if ac.variant() == Variant::Section {
                        diff_level(&ac.get_elements()?, &bc.get_elements()?, &format!("{path}."), out)?;
                    } else {
                        let av = ac.get_value()?.format();
                        let bv = bc.get_value()?.format();
                        if av != bv {
                            out.push(Conflict { path, kind: ChangeKind::Changed { from: av, to: bv } });
                        }
                    }
                }
                (Some(_), None) => out.push(Conflict { path, kind: ChangeKind::Removed }),
                (None, Some(_)) => out.push(Conflict { path, kind: ChangeKind::Added }),
                (None, None) => unreachable!(),
            }
        }
    }
    Ok(())
}

fn group_by_name(elements: &[Context]) -> Result<HashMap<String, Vec<Context>>> {
    let mut map: HashMap<String, Vec<Context>> = HashMap::new();
    for ctx in elements {
        if matches!(ctx.variant(), Variant::Section | Variant::Keyval) {
            map.entry(ctx.get_name()?).or_default().push(ctx.clone());
        }
    }
    Ok(map)
}

/// Name order for a diff level: the Mold-equivalent definition's insertion order (§4.7), so a
/// report reads in the order the schema declares its slots rather than alphabetically. Falls
/// back to first-seen order across `a` then `b` when neither side has a resolvable Mold
/// equivalent (e.g. comparing two Molds directly).
fn ordered_names(a: &[Context], b: &[Context]) -> Result<Vec<String>> {
    if let Some(names) = mold_order(a).or_else(|| mold_order(b)) {
        return Ok(names);
    }
    let mut seen = Vec::new();
    for ctx in a.iter().chain(b.iter()) {
        if matches!(ctx.variant(), Variant::Section | Variant::Keyval) {
            let name = ctx.get_name()?;
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    Ok(seen)
}

/// Every Context at a diff level shares the same parent container, so the first element's Mold
/// equivalent's parent holds the canonical declaration order for the whole level.
fn mold_order(elements: &[Context]) -> Option<Vec<String>> {
    let first = elements.iter().find(|c| matches!(c.variant(), Variant::Section | Variant::Keyval))?;
    let mold_node = mold_equivalent_of(&first.node)?;
    let parent = mold_node.borrow().parent.clone()?.upgrade()?;
    let parent_ref = parent.borrow();
    let storage = parent_ref.payload_elements()?;

    let mut seen = Vec::new();
    for child in storage.get_all() {
        let name = match &child.borrow().payload {
            Payload::Section(s) => s.name.clone(),
            Payload::Keyval(k) => k.name.clone(),
            _ => continue,
        };
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    Some(seen)
}

fn mold_equivalent_of(node: &NodeRef) -> Option<NodeRef> {
    match &node.borrow().payload {
        Payload::Section(s) => s.mold_equivalent.as_ref()?.upgrade(),
        Payload::Keyval(k) => k.mold_equivalent.as_ref()?.upgrade(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context as Ctx;
    use crate::value::Value;
    use crate::version::Version;

    fn build_config(port: i64) -> Ctx {
        let mold = Ctx::new_mold();
        let keyval = Ctx::begin(&mold, Variant::Keyval).unwrap();
        keyval.set_name("port").unwrap();
        keyval.set_value(Value::Integer(0)).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Integer(0)).unwrap();
        keyval.finalize().unwrap();
        mold.clone().finalize().unwrap();

        let config = Ctx::new_config(&mold).unwrap();
        let ckeyval = Ctx::begin(&config, Variant::Keyval).unwrap();
        ckeyval.set_name("port").unwrap();
        ckeyval.set_value(Value::Integer(port)).unwrap();
        ckeyval.finalize().unwrap();
        config.clone().finalize().unwrap();
        config
    }

    #[test]
    fn test_compare_detects_changed_value() {
        let a = build_config(8080);
        let b = build_config(9090);
        let conflicts = compare(&a, &b).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "port");
        assert_eq!(conflicts[0].kind, ChangeKind::Changed { from: "8080".into(), to: "9090".into() });
    }

    #[test]
    fn test_compare_identical_configs_is_empty() {
        let a = build_config(8080);
        let b = build_config(8080);
        assert!(compare(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn test_compare_orders_report_by_mold_declaration_not_alphabetically() {
        let mold = Ctx::new_mold();
        for (name, introduced) in [("zebra", 0), ("alpha", 0)] {
            let keyval = Ctx::begin(&mold, Variant::Keyval).unwrap();
            keyval.set_name(name).unwrap();
            keyval.set_value(Value::Integer(0)).unwrap();
            keyval.add_default(Version::new(1, 0, 0), Value::Integer(introduced)).unwrap();
            keyval.finalize().unwrap();
        }
        mold.clone().finalize().unwrap();

        let build = |zebra: i64, alpha: i64| {
            let config = Ctx::new_config(&mold).unwrap();
            for (name, value) in [("zebra", zebra), ("alpha", alpha)] {
                let ckeyval = Ctx::begin(&config, Variant::Keyval).unwrap();
                ckeyval.set_name(name).unwrap();
                ckeyval.set_value(Value::Integer(value)).unwrap();
                ckeyval.finalize().unwrap();
            }
            config.clone().finalize().unwrap();
            config
        };

        let a = build(1, 1);
        let b = build(2, 2);
        let conflicts = compare(&a, &b).unwrap();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].path, "zebra");
        assert_eq!(conflicts[1].path, "alpha");
    }
}

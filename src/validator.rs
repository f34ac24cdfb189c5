//! Recursive validation and verdict aggregation (§4.8).
//!
//! Precedence, strongest first: `InternalError > RestrictionViolated > WrongValueType >
//! MoldMissing > InvalidContext > ElementsInvalid > Ok`. A node's own violations are ranked
//! by this order; if a node's own checks all pass but any child is invalid, the node's
//! verdict is `ElementsInvalid` regardless of how severe the child's own failure was -
//! severity only travels one level before being folded into `ElementsInvalid`.

use std::rc::Rc;

use crate::context::{Context, NodeRef, Payload, Variant};
use crate::error::{Error, Result};
use crate::version::Version;

/// Run (or re-run) validation over `ctx` and its full subtree, clearing and re-setting the
/// soft-invalid bit on every visited node as it goes (§3: cleared at the start of every call).
pub fn validate(ctx: &Context) -> Result<()> {
    validate_node(&ctx.node)
}

fn validate_node(node: &NodeRef) -> Result<()> {
    node.borrow_mut().invalid = false;

    let mut own_violations = own_checks(node);
    check_cardinality_of_children(node, &mut own_violations);

    let children = child_nodes(node);
    let mut any_child_invalid = false;
    for child in &children {
        if validate_node(child).is_err() {
            any_child_invalid = true;
        }
    }

    let strongest_own = own_violations.into_iter().max_by_key(|e| e.validation_rank().unwrap_or(0));

    let verdict = match strongest_own {
        Some(e) => Err(e),
        None if any_child_invalid => {
            Err(Error::ElementsInvalid(format!("one or more elements under {} failed validation", node.borrow().variant)))
        }
        None => Ok(()),
    };

    if verdict.is_err() {
        node.borrow_mut().invalid = true;
    }
    verdict
}

fn child_nodes(node: &NodeRef) -> Vec<NodeRef> {
    let n = node.borrow();
    match n.payload_elements() {
        Some(elements) => elements.get_all(),
        None => Vec::new(),
    }
}

/// Checks intrinsic to the node itself: does it have what finalize required, and do any
/// applicable exclusive-value restrictions still accept its current value.
fn own_checks(node: &NodeRef) -> Vec<Error> {
    let mut violations = Vec::new();
    let n = node.borrow();

    if let Some(msg) = &n.error_slot {
        violations.push(Error::InvalidContext(msg.clone()));
    }

    match &n.payload {
        Payload::Keyval(k) => {
            let root_is_mold = matches!(root_variant(node), Variant::Mold);
            if root_is_mold {
                if k.value_type.is_none() {
                    violations.push(Error::InvalidContext(format!("{} has no value-type declared", k.name)));
                }
                if k.defaults.is_empty() {
                    violations.push(Error::InvalidContext(format!("{} has no default value defined", k.name)));
                }
            } else {
                match &k.value {
                    None => violations.push(Error::InvalidContext("keyval has no value set".into())),
                    Some(value) => {
                        let config_version = config_version_of(node).unwrap_or_default();
                        let applicable: Vec<NodeRef> = restrictions_of(node)
                            .into_iter()
                            .filter(|rn| {
                                matches!(&rn.borrow().payload,
                                    Payload::Restriction(r) if !r.kind.is_inclusive() && r.applies_at(config_version))
                            })
                            .collect();
                        // An applicable exclusive restriction passes the keyval if *any* of them
                        // accepts the value, not only if every one of them does (§4.5: they form
                        // a whitelist, not an AND-chain of independent constraints).
                        if !applicable.is_empty() {
                            let mut accepted = false;
                            let mut hard_error = None;
                            for restriction_node in &applicable {
                                if let Payload::Restriction(r) = &restriction_node.borrow().payload {
                                    match r.accepts(value) {
                                        Ok(true) => {
                                            accepted = true;
                                            break;
                                        }
                                        Ok(false) => {}
                                        Err(e) => hard_error = Some(e),
                                    }
                                }
                            }
                            if !accepted {
                                violations.push(hard_error.unwrap_or_else(|| {
                                    Error::RestrictionViolated(format!(
                                        "value {value} satisfies none of the {} applicable restriction(s) on {}",
                                        applicable.len(),
                                        k.name
                                    ))
                                }));
                            }
                        }
                    }
                }
                if k.mold_equivalent.as_ref().and_then(|w| w.upgrade()).is_none() {
                    violations.push(Error::MoldMissing(format!("{} has no mold equivalent", k.name)));
                }
            }
        }
        Payload::Restriction(r) => {
            if let Err(e) = r.validate_self() {
                violations.push(e);
            }
        }
        _ => {}
    }

    violations
}

/// The restrictions that govern `node`: its own, if it's a Mold-side definition, or its
/// mold equivalent's, if it's a Config-side instance (Config-side nodes never carry their
/// own restriction queue - those only get attached while building the Mold).
fn restrictions_of(node: &NodeRef) -> Vec<NodeRef> {
    let n = node.borrow();
    match &n.payload {
        Payload::Keyval(k) => match k.mold_equivalent.as_ref().and_then(|w| w.upgrade()) {
            Some(me) => match &me.borrow().payload {
                Payload::Keyval(mk) => mk.restrictions.iter().map(Rc::clone).collect(),
                _ => Vec::new(),
            },
            None => k.restrictions.iter().map(Rc::clone).collect(),
        },
        Payload::Section(s) => match s.mold_equivalent.as_ref().and_then(|w| w.upgrade()) {
            Some(me) => match &me.borrow().payload {
                Payload::Section(ms) => ms.restrictions.iter().map(Rc::clone).collect(),
                _ => Vec::new(),
            },
            None => s.restrictions.iter().map(Rc::clone).collect(),
        },
        _ => Vec::new(),
    }
}

fn root_variant(node: &NodeRef) -> Variant {
    let n = node.borrow();
    if matches!(n.variant, Variant::Config | Variant::Mold | Variant::FreeText) {
        n.variant
    } else {
        n.root.upgrade().map(|r| r.borrow().variant).unwrap_or(Variant::Unknown)
    }
}

fn config_version_of(node: &NodeRef) -> Option<Version> {
    let n = node.borrow();
    let root = if matches!(n.variant, Variant::Config | Variant::Mold) {
        return match &n.payload {
            Payload::Config(c) => Some(c.version),
            Payload::Mold(m) => Some(m.version),
            _ => None,
        };
    } else {
        n.root.upgrade()?
    };
    let root_ref = root.borrow();
    match &root_ref.payload {
        Payload::Config(c) => Some(c.version),
        Payload::Mold(m) => Some(m.version),
        _ => None,
    }
}

/// Cardinality restrictions (`IncEntryMin`/`IncEntryMax`) constrain how many times a named
/// slot may repeat under its parent container. They're attached to the slot's Mold-side
/// definition but evaluated against the actual sibling count in the container being checked.
fn check_cardinality_of_children(node: &NodeRef, violations: &mut Vec<Error>) {
    let n = node.borrow();
    let Some(elements) = n.payload_elements() else { return };
    let version = config_version_of(node).unwrap_or_default();
    let mut seen_names: Vec<String> = Vec::new();
    for child in elements.get_all() {
        let name = match &child.borrow().payload {
            Payload::Section(s) => s.name.clone(),
            Payload::Keyval(k) => k.name.clone(),
            _ => continue,
        };
        if seen_names.contains(&name) {
            continue;
        }
        seen_names.push(name.clone());
        let count = elements.count(&name) as u32;
        let restrictions_src = restrictions_of(&child);

        let mut cardinality = crate::restriction::Cardinality::default();
        for r in &restrictions_src {
            if let Payload::Restriction(restriction) = &r.borrow().payload {
                if restriction.kind.is_inclusive() && restriction.applies_at(version) {
                    match &restriction.kind {
                        crate::restriction::RestrictionKind::IncEntryMin(min) => cardinality.min = *min,
                        crate::restriction::RestrictionKind::IncEntryMax(max) => cardinality.max = *max,
                        _ => {}
                    }
                }
            }
        }

        if !cardinality.accepts(count) {
            violations.push(Error::RestrictionViolated(format!(
                "{name} occurs {count} time(s), outside [{}, {}]",
                cardinality.min,
                if cardinality.is_unbounded() { "unbounded".to_string() } else { cardinality.max.to_string() }
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, Variant as V};
    use crate::restriction::RestrictionKind;
    use crate::value::Value;

    #[test]
    fn test_validate_clean_config_is_ok() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, V::Keyval).unwrap();
        keyval.set_name("port").unwrap();
        keyval.set_value(Value::Integer(0)).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Integer(0)).unwrap();
        keyval.finalize().unwrap();
        mold.clone().finalize().unwrap();

        let config = Context::new_config(&mold).unwrap();
        let ckeyval = Context::begin(&config, V::Keyval).unwrap();
        ckeyval.set_name("port").unwrap();
        ckeyval.set_value(Value::Integer(8080)).unwrap();
        ckeyval.finalize().unwrap();
        config.clone().finalize().unwrap();

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_fatal_error_aggregates_as_elements_invalid_without_losing_message() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, V::Keyval).unwrap();
        keyval.set_name("port").unwrap();
        keyval.set_value(Value::Integer(0)).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Integer(0)).unwrap();
        keyval.finalize().unwrap();
        mold.clone().finalize().unwrap();

        let config = Context::new_config(&mold).unwrap();
        let ckeyval = Context::begin(&config, V::Keyval).unwrap();
        ckeyval.set_name("port").unwrap();
        ckeyval.set_value(Value::Integer(8080)).unwrap();
        ckeyval.fatal_error("plugin failed mid-construction").unwrap();
        // finalize still proceeds; the node carries the fatal message as soft-invalid.
        let _ = ckeyval.clone().finalize();
        let _ = config.clone().finalize();

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, Error::ElementsInvalid(_)));

        let child = config.find_element("port", 0).unwrap();
        assert_eq!(child.context_error(), Some("plugin failed mid-construction".to_string()));
    }

    #[test]
    fn test_exclusive_enum_restriction_violation_detected() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, V::Keyval).unwrap();
        keyval.set_name("level").unwrap();
        keyval.set_value(Value::Enum("info".into())).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Enum("info".into())).unwrap();
        let restriction = Context::begin(&keyval, V::Restriction).unwrap();
        restriction.set_restriction_kind(RestrictionKind::ExcValueEnum("info".into())).unwrap();
        restriction.finalize().unwrap();
        keyval.finalize().unwrap();
        mold.clone().finalize().unwrap();

        let config = Context::new_config(&mold).unwrap();
        let ckeyval = Context::begin(&config, V::Keyval).unwrap();
        ckeyval.set_name("level").unwrap();
        ckeyval.set_value(Value::Enum("debug".into())).unwrap();
        ckeyval.finalize().unwrap();
        config.clone().finalize().unwrap();

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, Error::ElementsInvalid(_)));
    }

    #[test]
    fn test_exclusive_enum_restrictions_are_whitelist_not_and_chain() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, V::Keyval).unwrap();
        keyval.set_name("level").unwrap();
        keyval.set_value(Value::Enum("low".into())).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Enum("low".into())).unwrap();
        for allowed in ["low", "med", "high"] {
            let restriction = Context::begin(&keyval, V::Restriction).unwrap();
            restriction.set_restriction_kind(RestrictionKind::ExcValueEnum(allowed.into())).unwrap();
            restriction.finalize().unwrap();
        }
        keyval.finalize().unwrap();
        mold.clone().finalize().unwrap();

        let config = Context::new_config(&mold).unwrap();
        let ckeyval = Context::begin(&config, V::Keyval).unwrap();
        ckeyval.set_name("level").unwrap();
        ckeyval.set_value(Value::Enum("high".into())).unwrap();
        ckeyval.finalize().unwrap();
        config.clone().finalize().unwrap();

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_cardinality_max_violation_surfaces_on_repeated_keyval() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, V::Keyval).unwrap();
        keyval.set_name("tag").unwrap();
        keyval.set_value(Value::String(String::new())).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::String(String::new())).unwrap();
        let restriction = Context::begin(&keyval, V::Restriction).unwrap();
        restriction.set_restriction_kind(RestrictionKind::IncEntryMax(1)).unwrap();
        restriction.finalize().unwrap();
        keyval.finalize().unwrap();
        mold.clone().finalize().unwrap();

        let config = Context::new_config(&mold).unwrap();
        for value in ["a", "b"] {
            let ckeyval = Context::begin(&config, V::Keyval).unwrap();
            ckeyval.set_name("tag").unwrap();
            ckeyval.set_value(Value::String(value.into())).unwrap();
            ckeyval.finalize().unwrap();
        }
        config.clone().finalize().unwrap();

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, Error::RestrictionViolated(_)));
    }
}

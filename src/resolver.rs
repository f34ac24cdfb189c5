//! Finalize-time node validation and versioned default resolution (§4.3, §4.4).

use std::rc::Rc;

use crate::context::{Node, NodeRef, Payload, Variant};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::version::Version;

fn root_variant(node: &NodeRef) -> Variant {
    let n = node.borrow();
    if matches!(n.variant, Variant::Config | Variant::Mold | Variant::FreeText) {
        n.variant
    } else {
        n.root.upgrade().map(|r| r.borrow().variant).unwrap_or(Variant::Unknown)
    }
}

/// Run the variant-specific consistency checks a node must pass before it may transition
/// from Constructing to Finalized. Does not touch storage attachment (handled separately).
pub(crate) fn finalize_validate(node: &NodeRef) -> Result<()> {
    let n = node.borrow();
    match &n.payload {
        Payload::Keyval(k) => {
            let mold_rooted = matches!(root_variant(node), Variant::Mold);
            if mold_rooted {
                if k.value_type.is_none() {
                    return Err(Error::InvalidContext(format!("{} has no value-type declared", k.name)));
                }
                if k.defaults.is_empty() {
                    return Err(Error::InvalidContext(format!("{} has no default value defined", k.name)));
                }
            } else {
                if k.value.is_none() {
                    return Err(Error::InvalidContext("keyval has no value set".into()));
                }
                if let Some(mold_equiv) = k.mold_equivalent.as_ref().and_then(|w| w.upgrade()) {
                    let expected = match &mold_equiv.borrow().payload {
                        Payload::Keyval(mk) => mk.value_type,
                        _ => None,
                    };
                    if let (Some(expected), Some(actual)) = (expected, k.value.as_ref().map(|v| v.value_type())) {
                        if expected != actual {
                            return Err(Error::WrongValueType {
                                expected: expected.to_string(),
                                actual: actual.to_string(),
                            });
                        }
                    }
                } else {
                    return Err(Error::MoldMissing("keyval has no mold equivalent".into()));
                }
            }
            Ok(())
        }
        Payload::Default(d) => {
            let value = d.value.clone();
            let parent = n.parent.clone();
            drop(n);
            let value = value.ok_or_else(|| Error::InvalidContext("default has no value set".into()))?;
            if let Some(parent) = parent.and_then(|w| w.upgrade()) {
                if let Payload::Keyval(k) = &parent.borrow().payload {
                    if let Some(expected) = k.value_type {
                        if expected != value.value_type() {
                            return Err(Error::WrongValueType {
                                expected: expected.to_string(),
                                actual: value.value_type().to_string(),
                            });
                        }
                    }
                }
            }
            Ok(())
        }
        Payload::Documentation(doc) => {
            if doc.text.is_none() {
                return Err(Error::InvalidContext("documentation has no text set".into()));
            }
            Ok(())
        }
        Payload::Restriction(r) => {
            r.validate_self()?;
            let parent = n.parent.clone();
            if let Some(parent) = parent.and_then(|w| w.upgrade()) {
                if let Payload::Keyval(k) = &parent.borrow().payload {
                    if let Some(value_type) = k.value_type {
                        if !r.kind.is_inclusive() && !r.kind.compatible_with(value_type) {
                            return Err(Error::RestrictionViolated(format!(
                                "restriction is incompatible with value type {value_type}"
                            )));
                        }
                    }
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Resolve the applicable Default value on a Mold-side Keyval: the greatest `introduced`
/// not exceeding `version`, or the lowest-introduced Default if none qualifies. `version`
/// of `None` resolves the highest-introduced Default overall (§4.4).
pub(crate) fn resolve_default(node: &NodeRef, version: Option<Version>) -> Result<Value> {
    let n = node.borrow();
    let Payload::Keyval(k) = &n.payload else {
        return Err(Error::WrongContext(format!("get_default is not supported on {}", n.variant)));
    };
    if k.defaults.is_empty() {
        return Err(Error::NotExist("keyval has no defaults defined".into()));
    }

    let introduced_of = |node: &NodeRef| -> Version {
        match &node.borrow().payload {
            Payload::Default(d) => d.introduced,
            _ => unreachable!("defaults queue holds only Default nodes"),
        }
    };

    let target = version.unwrap_or_else(|| introduced_of(k.defaults.last().expect("checked non-empty above")));

    let mut best: Option<NodeRef> = None;
    for d in &k.defaults {
        if introduced_of(d) <= target {
            best = Some(Rc::clone(d));
        }
    }
    let chosen = best.unwrap_or_else(|| Rc::clone(&k.defaults[0]));
    let chosen_ref = chosen.borrow();
    match &chosen_ref.payload {
        Payload::Default(d) => d
            .value
            .clone()
            .ok_or_else(|| Error::InternalError("default node has no value".into())),
        _ => unreachable!(),
    }
}

#[allow(unused)]
fn _assert_node_type(_: &Node) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, Variant as V};

    #[test]
    fn test_resolve_default_picks_greatest_not_exceeding_version() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, V::Keyval).unwrap();
        keyval.set_name("level").unwrap();
        keyval.set_value(Value::Enum("info".into())).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Enum("info".into())).unwrap();
        keyval.add_default(Version::new(2, 0, 0), Value::Enum("debug".into())).unwrap();

        assert_eq!(keyval.get_default(Some(Version::new(1, 5, 0))).unwrap(), "info");
        assert_eq!(keyval.get_default(Some(Version::new(2, 5, 0))).unwrap(), "debug");
        assert_eq!(keyval.get_default(Some(Version::new(0, 5, 0))).unwrap(), "info");
        assert_eq!(keyval.get_default(None).unwrap(), "debug");
    }
}

//! The polymorphic context node: the universal element of both Mold and Config trees.
//!
//! A [`Context`] is a handle onto a reference-counted [`Node`]. Construction follows the
//! `begin` -> mutate -> `finalize` (or `destroy`) state machine described in the module's
//! governing specification: a node is `Constructing` until `finalize` attaches it to its
//! parent's [`ElementStorage`] and flips it to `Finalized`, or `destroy` tears it down.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::element_storage::ElementStorage;
use crate::error::{Error, Result};
use crate::restriction::{Restriction, RestrictionKind};
use crate::value::{Value, ValueType};
use crate::version::Version;

/// The eight node kinds a [`Context`] may be, plus the `Unknown` sentinel for a null/invalid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Top-level instance context, product of a Mold
    Config,
    /// Top-level schema context
    Mold,
    /// Internal grouping node
    Section,
    /// Leaf node carrying a typed value (Config) or default queue (Mold)
    Keyval,
    /// A (version, value) pair owned by a Mold-side Keyval
    Default,
    /// Human-readable documentation attached to a Mold-side Section/Keyval/Mold
    Documentation,
    /// A typed constraint attached to a Mold-side Section/Keyval
    Restriction,
    /// A standalone, unattachable string container
    FreeText,
    /// Sentinel for a destroyed or otherwise invalid handle
    Unknown,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Variant::Config => "CONFIG",
            Variant::Mold => "MOLD",
            Variant::Section => "SECTION",
            Variant::Keyval => "KEYVAL",
            Variant::Default => "DEFAULT",
            Variant::Documentation => "DOCUMENTATION",
            Variant::Restriction => "RESTRICTION",
            Variant::FreeText => "FREE_TEXT",
            Variant::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Construction/lifecycle state of a node (orthogonal to the `Invalid` verdict cache,
/// tracked separately on [`Node::invalid`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Mutable, not yet attached to its parent's element storage
    Constructing,
    /// Attached and read-only
    Finalized,
    /// Refcount has collapsed to zero; only a dangling marker remains
    Destroyed,
}

/// Config payload: an instance tree bound to a shared Mold.
pub struct ConfigPayload {
    pub(crate) mold: NodeRef,
    pub(crate) version: Version,
    pub(crate) elements: ElementStorage,
    pub(crate) plugin_name: Option<String>,
}

/// Mold payload: a schema tree, versioned by the highest version among its descendants.
pub struct MoldPayload {
    pub(crate) elements: ElementStorage,
    pub(crate) version: Version,
    pub(crate) documentation: Vec<NodeRef>,
}

/// Section payload: an internal grouping node.
pub struct SectionPayload {
    pub(crate) name: String,
    pub(crate) mold_equivalent: Option<Weak<RefCell<Node>>>,
    pub(crate) elements: ElementStorage,
    pub(crate) documentation: Vec<NodeRef>,
    pub(crate) restrictions: Vec<NodeRef>,
}

/// Keyval payload: a leaf node, Config-side carrying a concrete [`Value`],
/// Mold-side carrying a version-ordered queue of Default contexts.
pub struct KeyvalPayload {
    pub(crate) name: String,
    pub(crate) value_type: Option<ValueType>,
    pub(crate) value: Option<Value>,
    pub(crate) defaults: Vec<NodeRef>,
    pub(crate) mold_equivalent: Option<Weak<RefCell<Node>>>,
    pub(crate) documentation: Vec<NodeRef>,
    pub(crate) restrictions: Vec<NodeRef>,
    pub(crate) introduced: Version,
    pub(crate) deprecated: Option<Version>,
}

/// Default payload: a single (version, value) pair.
pub struct DefaultPayload {
    pub(crate) introduced: Version,
    pub(crate) value: Option<Value>,
}

/// Documentation payload: a string value with an introduced-version.
pub struct DocumentationPayload {
    pub(crate) text: Option<Value>,
    pub(crate) introduced: Version,
}

/// The variant-specific data carried by a [`Node`].
pub enum Payload {
    Config(ConfigPayload),
    Mold(MoldPayload),
    Section(SectionPayload),
    Keyval(KeyvalPayload),
    Default(DefaultPayload),
    Documentation(DocumentationPayload),
    Restriction(Restriction),
    FreeText(String),
}

/// The universal node. Shared fields live outside the payload; the payload carries the
/// variant-specific data (§9: "tagged sum over the eight variants").
pub struct Node {
    pub(crate) variant: Variant,
    pub(crate) state: State,
    pub(crate) invalid: bool,
    pub(crate) parent: Option<Weak<RefCell<Node>>>,
    pub(crate) root: Weak<RefCell<Node>>,
    pub(crate) error_slot: Option<String>,
    pub(crate) payload: Payload,
}

impl Node {
    pub(crate) fn new_detached(variant: Variant, state: State, payload: Payload) -> Node {
        Node { variant, state, invalid: false, parent: None, root: Weak::new(), payload, error_slot: None }
    }

    /// Whether this node is itself a root (Config, Mold or FreeText).
    fn is_root(&self) -> bool {
        matches!(self.variant, Variant::Config | Variant::Mold | Variant::FreeText)
    }
}

/// A strong, tree-owning reference to a node.
pub type NodeRef = Rc<RefCell<Node>>;

/// How this handle was obtained: an owned construction handle (from `begin`/`new_mold`/
/// `new_config`), or a borrowed query handle (from `get_elements`/`find_element`/etc).
/// This distinction exists purely to give `putcontext` vs `destroy` the right preconditions
/// (§4.3); it has no effect on the underlying refcount, which `Rc` already manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Owned,
    Query,
}

/// A handle onto a [`Node`]. Cloning a `Context` is cheap (bumps the `Rc` strong count) and
/// models the refcounted query handles described in §4.3/§5.
#[derive(Clone)]
pub struct Context {
    pub(crate) node: NodeRef,
    kind: HandleKind,
}

fn root_of(node: &NodeRef) -> NodeRef {
    let n = node.borrow();
    if n.is_root() {
        drop(n);
        Rc::clone(node)
    } else {
        n.root.upgrade().expect("root outlives its descendants")
    }
}

fn root_is_mold(node: &NodeRef) -> bool {
    matches!(root_of(node).borrow().variant, Variant::Mold)
}

fn legal_child(parent_variant: Variant, parent_root_is_mold: bool, child: Variant) -> bool {
    use Variant::*;
    match (parent_variant, child) {
        (Config, Section) | (Config, Keyval) => true,
        (Mold, Section) | (Mold, Keyval) | (Mold, Documentation) => true,
        (Section, Section) | (Section, Keyval) => true,
        (Section, Documentation) | (Section, Restriction) => parent_root_is_mold,
        (Keyval, Default) | (Keyval, Documentation) | (Keyval, Restriction) => parent_root_is_mold,
        _ => false,
    }
}

impl Context {
    /// Construct a fresh Mold root, version `1.0.0` (§3).
    pub fn new_mold() -> Context {
        let node = Rc::new_cyclic(|weak| {
            RefCell::new(Node {
                variant: Variant::Mold,
                state: State::Constructing,
                invalid: false,
                parent: None,
                root: weak.clone(),
                error_slot: None,
                payload: Payload::Mold(MoldPayload {
                    elements: ElementStorage::new(),
                    version: Version::MOLD_DEFAULT,
                    documentation: Vec::new(),
                }),
            })
        });
        tracing::debug!(variant = %Variant::Mold, "context begun");
        Context { node, kind: HandleKind::Owned }
    }

    /// Construct a Config root bound to a finalized Mold. The Config holds a strong
    /// reference on the Mold (§3 ownership rules).
    pub fn new_config(mold: &Context) -> Result<Context> {
        if mold.node.borrow().variant != Variant::Mold {
            return Err(Error::WrongContext(format!("expected MOLD, got {}", mold.node.borrow().variant)));
        }
        if mold.node.borrow().state != State::Finalized {
            return Err(Error::ContextInWrongState("mold must be finalized before binding a config".into()));
        }
        let mold_version = match &mold.node.borrow().payload {
            Payload::Mold(m) => m.version,
            _ => unreachable!(),
        };
        let mold_ref = Rc::clone(&mold.node);
        let node = Rc::new_cyclic(|weak| {
            RefCell::new(Node {
                variant: Variant::Config,
                state: State::Constructing,
                invalid: false,
                parent: None,
                root: weak.clone(),
                error_slot: None,
                payload: Payload::Config(ConfigPayload {
                    mold: mold_ref,
                    version: mold_version,
                    elements: ElementStorage::new(),
                    plugin_name: None,
                }),
            })
        });
        tracing::debug!(variant = %Variant::Config, "context begun");
        Ok(Context { node, kind: HandleKind::Owned })
    }

    /// Create a standalone `FreeText` context. Never attached to a tree (§3).
    pub fn free_text_create(text: impl Into<String>) -> Context {
        let node = Rc::new(RefCell::new(Node::new_detached(
            Variant::FreeText,
            State::Constructing,
            Payload::FreeText(text.into()),
        )));
        Context { node, kind: HandleKind::Owned }
    }

    /// Start construction of a new child context under `parent`.
    pub fn begin(parent: &Context, variant: Variant) -> Result<Context> {
        {
            let p = parent.node.borrow();
            if p.state == State::Destroyed {
                return Err(Error::InvalidContext("parent has been destroyed".into()));
            }
            if !legal_child(p.variant, root_is_mold(&parent.node), variant) {
                return Err(Error::WrongContext(format!(
                    "{variant} is not a legal child of {}", p.variant
                )));
            }
        }
        let root = {
            let p = parent.node.borrow();
            if p.is_root() { Rc::downgrade(&parent.node) } else { p.root.clone() }
        };
        let payload = match variant {
            Variant::Section => Payload::Section(SectionPayload {
                name: String::new(),
                mold_equivalent: None,
                elements: ElementStorage::new(),
                documentation: Vec::new(),
                restrictions: Vec::new(),
            }),
            Variant::Keyval => Payload::Keyval(KeyvalPayload {
                name: String::new(),
                value_type: None,
                value: None,
                defaults: Vec::new(),
                mold_equivalent: None,
                documentation: Vec::new(),
                restrictions: Vec::new(),
                introduced: Version::default(),
                deprecated: None,
            }),
            Variant::Default => Payload::Default(DefaultPayload { introduced: Version::default(), value: None }),
            Variant::Documentation => {
                Payload::Documentation(DocumentationPayload { text: None, introduced: Version::default() })
            }
            Variant::Restriction => {
                Payload::Restriction(Restriction::new(RestrictionKind::IncEntryMin(1), Version::default()))
            }
            _ => return Err(Error::WrongContext(format!("{variant} cannot be constructed via begin"))),
        };
        let node = Rc::new(RefCell::new(Node {
            variant,
            state: State::Constructing,
            invalid: false,
            parent: Some(Rc::downgrade(&parent.node)),
            root,
            error_slot: None,
            payload,
        }));
        tracing::debug!(variant = %variant, parent = %parent.node.borrow().variant, "context begun");
        Ok(Context { node, kind: HandleKind::Owned })
    }

    /// Variant of this context.
    pub fn variant(&self) -> Variant {
        self.node.borrow().variant
    }

    /// The last fatal error message recorded on this context, if any.
    pub fn context_error(&self) -> Option<String> {
        self.node.borrow().error_slot.clone()
    }

    /// True iff this node's cached validation verdict is not `Ok` (§3 lifecycle).
    pub fn is_invalid(&self) -> bool {
        self.node.borrow().invalid
    }

    /// Overwrite the error slot and mark the node soft-invalid. Only legal while Constructing.
    pub fn fatal_error(&self, msg: impl Into<String>) -> Result<()> {
        let mut n = self.node.borrow_mut();
        if n.state == State::Finalized {
            return Err(Error::ContextInWrongState("cannot set a fatal error on a finalized context".into()));
        }
        n.error_slot = Some(msg.into());
        n.invalid = true;
        Ok(())
    }

    /// Recursively resolve the dotted path from root to this context.
    pub fn resolve_root_name(&self) -> Result<String> {
        let mut segments = Vec::new();
        let mut current = Some(Rc::clone(&self.node));
        while let Some(node) = current {
            let n = node.borrow();
            let name = match &n.payload {
                Payload::Section(s) => Some(s.name.clone()),
                Payload::Keyval(k) => Some(k.name.clone()),
                _ => None,
            };
            if let Some(name) = name {
                segments.push(name);
            }
            current = n.parent.as_ref().and_then(|w| w.upgrade());
        }
        segments.reverse();
        Ok(segments.join("."))
    }

    /// Associate a name with a Keyval or Section. On the Config side, resolves and stores
    /// the Mold equivalent of matching variant (§4.3).
    pub fn set_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("name must not be empty".into()));
        }
        let variant = self.node.borrow().variant;
        if !matches!(variant, Variant::Keyval | Variant::Section) {
            return Err(Error::NoCanDo(format!("set_name is not supported on {variant}")));
        }
        if self.node.borrow().state == State::Finalized {
            return Err(Error::ContextInWrongState("cannot rename a finalized context".into()));
        }

        let mold_equivalent = if root_is_mold(&self.node) {
            None
        } else {
            let parent = self
                .node
                .borrow()
                .parent
                .as_ref()
                .and_then(|w| w.upgrade())
                .ok_or_else(|| Error::NotExist("context has no parent to resolve a mold equivalent from".into()))?;
            let parent_mold_equiv = mold_equivalent_of(&parent)?;
            let candidate = parent_mold_equiv
                .borrow()
                .payload_elements()
                .and_then(|elements| elements.first(name))
                .ok_or_else(|| Error::NotExist(format!("no mold equivalent for {name}")))?;
            if candidate.borrow().variant != variant {
                return Err(Error::WrongContext(format!(
                    "mold equivalent for {name} is {}, not {variant}", candidate.borrow().variant
                )));
            }
            Some(Rc::downgrade(&candidate))
        };

        let mut n = self.node.borrow_mut();
        match &mut n.payload {
            Payload::Section(s) => {
                s.name = name.to_string();
                s.mold_equivalent = mold_equivalent;
            }
            Payload::Keyval(k) => {
                k.name = name.to_string();
                k.mold_equivalent = mold_equivalent;
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Retrieve the name of a Keyval or Section.
    pub fn get_name(&self) -> Result<String> {
        let n = self.node.borrow();
        match &n.payload {
            Payload::Section(s) => Ok(s.name.clone()),
            Payload::Keyval(k) => Ok(k.name.clone()),
            _ => Err(Error::WrongContext(format!("get_name is not supported on {}", n.variant))),
        }
    }

    /// Set the value-type of a Mold-side Keyval, or the concrete value of a Config-side one.
    pub fn set_value(&self, value: Value) -> Result<()> {
        let mut n = self.node.borrow_mut();
        let Payload::Keyval(k) = &mut n.payload else {
            return Err(Error::WrongContext(format!("set_value is not supported on {}", n.variant)));
        };
        k.value_type = Some(value.value_type());
        k.value = Some(value);
        Ok(())
    }

    /// Read the concrete value of a Config-side Keyval, or a Default/Documentation's value.
    pub fn get_value(&self) -> Result<Value> {
        let n = self.node.borrow();
        match &n.payload {
            Payload::Keyval(k) => k
                .value
                .clone()
                .ok_or_else(|| Error::InvalidContext("keyval has no value set".into())),
            Payload::Default(d) => d
                .value
                .clone()
                .ok_or_else(|| Error::InvalidContext("default has no value set".into())),
            Payload::Documentation(doc) => doc
                .text
                .clone()
                .ok_or_else(|| Error::InvalidContext("documentation has no text set".into())),
            _ => Err(Error::WrongContext(format!("get_value is not supported on {}", n.variant))),
        }
    }

    /// Set the `introduced_version` of a Default, Restriction or Mold-side Keyval.
    pub fn set_introduced(&self, version: Version) -> Result<()> {
        let mut n = self.node.borrow_mut();
        match &mut n.payload {
            Payload::Default(d) => d.introduced = version,
            Payload::Documentation(doc) => doc.introduced = version,
            Payload::Restriction(r) => r.introduced = version,
            Payload::Keyval(k) => k.introduced = version,
            other => return Err(Error::WrongContext(format!("set_introduced is not supported on {:?}", variant_of(other)))),
        }
        Ok(())
    }

    /// Set the `deprecated_version` of a Restriction or Mold-side Keyval.
    pub fn set_deprecated(&self, version: Version) -> Result<()> {
        let mut n = self.node.borrow_mut();
        match &mut n.payload {
            Payload::Restriction(r) => r.deprecated = Some(version),
            Payload::Keyval(k) => k.deprecated = Some(version),
            other => return Err(Error::WrongContext(format!("set_deprecated is not supported on {:?}", variant_of(other)))),
        }
        Ok(())
    }

    /// Set the kind and bound(s) of a Restriction under construction.
    pub fn set_restriction_kind(&self, kind: RestrictionKind) -> Result<()> {
        let mut n = self.node.borrow_mut();
        let Payload::Restriction(r) = &mut n.payload else {
            return Err(Error::WrongContext(format!("set_restriction_kind is not supported on {}", n.variant)));
        };
        r.kind = kind;
        Ok(())
    }

    /// Finalize the context, running its variant-specific validation and attaching it to its
    /// parent's storage/queues (§4.3). Consumes the handle: a finalized node can only be
    /// reached again through a query.
    pub fn finalize(self) -> Result<()> {
        if self.kind != HandleKind::Owned {
            return Err(Error::ContextInWrongState("finalize requires an owned construction handle".into()));
        }
        {
            let n = self.node.borrow();
            if n.state != State::Constructing {
                return Err(Error::ContextInWrongState(format!("{} is not constructing", n.variant)));
            }
        }
        let validation = crate::resolver::finalize_validate(&self.node);

        let parent = self.node.borrow().parent.clone();
        if let Some(parent_weak) = parent {
            let parent_node = parent_weak
                .upgrade()
                .ok_or_else(|| Error::InvalidContext("parent no longer exists".into()))?;
            attach_to_parent(&parent_node, &self.node)?;
        }

        self.node.borrow_mut().state = State::Finalized;
        match &validation {
            Ok(()) => tracing::debug!(variant = %self.node.borrow().variant, "context finalized"),
            Err(e) => tracing::warn!(variant = %self.node.borrow().variant, error = %e, "context finalized soft-invalid"),
        }

        match validation {
            Ok(()) => Ok(()),
            Err(e) => {
                self.node.borrow_mut().invalid = true;
                let parent_finalized = self
                    .node
                    .borrow()
                    .parent
                    .as_ref()
                    .and_then(|w| w.upgrade())
                    .map(|p| p.borrow().state == State::Finalized)
                    .unwrap_or(true);
                if parent_finalized {
                    Err(e)
                } else {
                    Err(Error::InvalidContext(e.to_string()))
                }
            }
        }
    }

    /// Destroy the context and decrement its refcount. Legal from any state.
    pub fn destroy(self) {
        let variant = self.node.borrow().variant;
        self.node.borrow_mut().state = State::Destroyed;
        tracing::debug!(variant = %variant, "context destroyed");
    }

    /// Release a query handle obtained from `get_elements`/`find_element`/etc.
    pub fn putcontext(self) -> Result<()> {
        if self.kind != HandleKind::Query {
            return Err(Error::ContextInWrongState("putcontext requires a query handle".into()));
        }
        Ok(())
    }

    /// All direct children, in global insertion order.
    pub fn get_elements(&self) -> Result<Vec<Context>> {
        let n = self.node.borrow();
        let elements = n
            .payload_elements()
            .ok_or_else(|| Error::WrongContext(format!("get_elements is not supported on {}", n.variant)))?;
        Ok(elements.get_all().into_iter().map(|node| Context { node, kind: HandleKind::Query }).collect())
    }

    /// All children named `name`, in insertion order.
    pub fn find_elements(&self, name: &str) -> Result<Vec<Context>> {
        let n = self.node.borrow();
        let elements = n
            .payload_elements()
            .ok_or_else(|| Error::WrongContext(format!("find_elements is not supported on {}", n.variant)))?;
        Ok(elements.get(name).into_iter().map(|node| Context { node, kind: HandleKind::Query }).collect())
    }

    /// The *index*-th child named `name`.
    pub fn find_element(&self, name: &str, index: usize) -> Result<Context> {
        let n = self.node.borrow();
        let elements = n
            .payload_elements()
            .ok_or_else(|| Error::WrongContext(format!("find_element is not supported on {}", n.variant)))?;
        elements
            .nth(name, index)
            .map(|node| Context { node, kind: HandleKind::Query })
            .ok_or_else(|| Error::NotExist(format!("{name}[{index}]")))
    }

    /// Resolve a dotted name (optionally with `[index]` suffixes) relative to this context.
    pub fn query_resolve_context(&self, path: &str) -> Result<Context> {
        let mut current = self.clone();
        let mut owned_intermediate: Option<Context> = None;
        for segment in path.split('.') {
            let (name, index) = parse_segment(segment)?;
            let next = current.find_element(name, index)?;
            if let Some(prev) = owned_intermediate.take() {
                let _ = prev.putcontext();
            }
            owned_intermediate = Some(next.clone());
            current = next;
        }
        Ok(current)
    }

    /// Begin, populate and finalize a Default entry on a Mold-side Keyval in one call.
    pub fn add_default(&self, introduced: Version, value: Value) -> Result<()> {
        let default_ctx = Context::begin(self, Variant::Default)?;
        default_ctx.set_introduced(introduced)?;
        {
            let mut n = default_ctx.node.borrow_mut();
            if let Payload::Default(d) = &mut n.payload {
                d.value = Some(value);
            }
        }
        default_ctx.finalize()
    }

    /// The highest-introduced Default applicable at `version` (or the lowest if `version` is
    /// `None`... no: absent means "pick the highest", per §4.4).
    pub fn get_default(&self, version: Option<Version>) -> Result<String> {
        crate::resolver::resolve_default(&self.node, version).map(|v| v.format())
    }

    /// Record which plugin produced this Config, for diagnostics (§6: external collaborators
    /// identify themselves to the core, the core does not know how they're loaded).
    pub fn set_plugin_name(&self, name: impl Into<String>) -> Result<()> {
        let mut n = self.node.borrow_mut();
        let Payload::Config(c) = &mut n.payload else {
            return Err(Error::WrongContext(format!("set_plugin_name is not supported on {}", n.variant)));
        };
        c.plugin_name = Some(name.into());
        Ok(())
    }

    /// The plugin name recorded via [`Context::set_plugin_name`], if any.
    pub fn plugin_name(&self) -> Result<Option<String>> {
        let n = self.node.borrow();
        let Payload::Config(c) = &n.payload else {
            return Err(Error::WrongContext(format!("plugin_name is not supported on {}", n.variant)));
        };
        Ok(c.plugin_name.clone())
    }

    /// Recursively validate this context and its subtree, returning the aggregated verdict
    /// (§4.8). Clears and re-sets the soft-invalid bit on every visited node.
    pub fn validate(&self) -> Result<()> {
        crate::validator::validate(self)
    }

    /// All Default contexts attached to a Mold-side Keyval.
    pub fn get_default_contexts(&self) -> Result<Vec<Context>> {
        let n = self.node.borrow();
        let Payload::Keyval(k) = &n.payload else {
            return Err(Error::WrongContext(format!("get_default_contexts is not supported on {}", n.variant)));
        };
        Ok(k.defaults.iter().map(|node| Context { node: Rc::clone(node), kind: HandleKind::Query }).collect())
    }
}

fn variant_of(payload: &Payload) -> Variant {
    match payload {
        Payload::Config(_) => Variant::Config,
        Payload::Mold(_) => Variant::Mold,
        Payload::Section(_) => Variant::Section,
        Payload::Keyval(_) => Variant::Keyval,
        Payload::Default(_) => Variant::Default,
        Payload::Documentation(_) => Variant::Documentation,
        Payload::Restriction(_) => Variant::Restriction,
        Payload::FreeText(_) => Variant::FreeText,
    }
}

impl Node {
    /// Borrow the element storage for variants that carry one (Config, Mold, Section).
    pub(crate) fn payload_elements(&self) -> Option<&ElementStorage> {
        match &self.payload {
            Payload::Config(c) => Some(&c.elements),
            Payload::Mold(m) => Some(&m.elements),
            Payload::Section(s) => Some(&s.elements),
            _ => None,
        }
    }

    pub(crate) fn payload_elements_mut(&mut self) -> Option<&mut ElementStorage> {
        match &mut self.payload {
            Payload::Config(c) => Some(&mut c.elements),
            Payload::Mold(m) => Some(&mut m.elements),
            Payload::Section(s) => Some(&mut s.elements),
            _ => None,
        }
    }
}

fn mold_equivalent_of(node: &NodeRef) -> Result<NodeRef> {
    let n = node.borrow();
    match &n.payload {
        Payload::Config(c) => Ok(Rc::clone(&c.mold)),
        Payload::Section(s) => s
            .mold_equivalent
            .as_ref()
            .and_then(|w| w.upgrade())
            .ok_or_else(|| Error::MoldMissing("section has no mold equivalent".into())),
        Payload::Mold(_) | Payload::Keyval(_) => Ok(Rc::clone(node)),
        _ => Err(Error::WrongContext("no mold equivalent concept for this variant".into())),
    }
}

fn parse_segment(segment: &str) -> Result<(&str, usize)> {
    if let Some(open) = segment.find('[') {
        if !segment.ends_with(']') {
            return Err(Error::InvalidArgument(format!("malformed path segment: {segment}")));
        }
        let name = &segment[..open];
        let index: usize = segment[open + 1..segment.len() - 1]
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("malformed index in: {segment}")))?;
        Ok((name, index))
    } else {
        Ok((segment, 0))
    }
}

fn attach_to_parent(parent: &NodeRef, child: &NodeRef) -> Result<()> {
    let child_variant = child.borrow().variant;
    match child_variant {
        Variant::Section | Variant::Keyval => {
            let name = match &child.borrow().payload {
                Payload::Section(s) => s.name.clone(),
                Payload::Keyval(k) => k.name.clone(),
                _ => unreachable!(),
            };
            if name.is_empty() {
                return Err(Error::InvalidArgument("name must be set before finalize".into()));
            }
            let mut p = parent.borrow_mut();
            let elements = p
                .payload_elements_mut()
                .ok_or_else(|| Error::WrongContext("parent does not carry children".into()))?;
            elements.add(&name, Rc::clone(child))
        }
        Variant::Default => {
            let mut p = parent.borrow_mut();
            let Payload::Keyval(k) = &mut p.payload else {
                return Err(Error::WrongContext("Default must be attached to a Keyval".into()));
            };
            let introduced = match &child.borrow().payload {
                Payload::Default(d) => d.introduced,
                _ => unreachable!(),
            };
            if k.defaults.iter().any(|d| match &d.borrow().payload {
                Payload::Default(existing) => existing.introduced == introduced,
                _ => false,
            }) {
                return Err(Error::ConflictingSemver(format!(
                    "a default already exists at version {introduced}"
                )));
            }
            let pos = k
                .defaults
                .iter()
                .position(|d| match &d.borrow().payload {
                    Payload::Default(existing) => existing.introduced > introduced,
                    _ => false,
                })
                .unwrap_or(k.defaults.len());
            k.defaults.insert(pos, Rc::clone(child));
            Ok(())
        }
        Variant::Documentation => {
            let mut p = parent.borrow_mut();
            match &mut p.payload {
                Payload::Mold(m) => m.documentation.push(Rc::clone(child)),
                Payload::Section(s) => s.documentation.push(Rc::clone(child)),
                Payload::Keyval(k) => k.documentation.push(Rc::clone(child)),
                _ => return Err(Error::WrongContext("Documentation cannot attach here".into())),
            }
            Ok(())
        }
        Variant::Restriction => {
            let mut p = parent.borrow_mut();
            match &mut p.payload {
                Payload::Section(s) => s.restrictions.push(Rc::clone(child)),
                Payload::Keyval(k) => k.restrictions.push(Rc::clone(child)),
                _ => return Err(Error::WrongContext("Restriction cannot attach here".into())),
            }
            Ok(())
        }
        _ => Err(Error::InternalError(format!("{child_variant} cannot be attached to a parent"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_rejects_illegal_child() {
        let mold = Context::new_mold();
        assert!(Context::begin(&mold, Variant::Default).is_err());
    }

    #[test]
    fn test_set_name_requires_keyval_or_section() {
        let mold = Context::new_mold();
        let child = Context::begin(&mold, Variant::Section).unwrap();
        assert!(child.set_name("db").is_ok());
    }

    #[test]
    fn test_resolve_root_name_builds_dotted_path() {
        let mold = Context::new_mold();
        let section = Context::begin(&mold, Variant::Section).unwrap();
        section.set_name("db").unwrap();
        let keyval = Context::begin(&section, Variant::Keyval).unwrap();
        keyval.set_name("port").unwrap();
        keyval.set_value(Value::Integer(0)).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Integer(0)).unwrap();
        assert_eq!(keyval.resolve_root_name().unwrap(), "db.port");
        keyval.finalize().unwrap();
        section.finalize().unwrap();
    }

    #[test]
    fn test_fatal_error_records_message_and_marks_invalid() {
        let mold = Context::new_mold();
        let section = Context::begin(&mold, Variant::Section).unwrap();
        section.set_name("db").unwrap();
        section.fatal_error("bad thing happened").unwrap();
        assert_eq!(section.context_error(), Some("bad thing happened".to_string()));
        assert!(section.is_invalid());
    }

    #[test]
    fn test_duplicate_default_semver_rejected() {
        let mold = Context::new_mold();
        let keyval = Context::begin(&mold, Variant::Keyval).unwrap();
        keyval.set_name("port").unwrap();
        keyval.set_value(Value::Integer(0)).unwrap();
        keyval.add_default(Version::new(1, 0, 0), Value::Integer(8080)).unwrap();
        let err = keyval.add_default(Version::new(1, 0, 0), Value::Integer(9090)).unwrap_err();
        assert!(matches!(err, Error::ConflictingSemver(_)));
    }
}

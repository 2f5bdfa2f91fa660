//! Configuration modes.
//!
//! A [`ContextTree`] is the registration schema: an arena of named nodes,
//! each optionally carrying a [`Family`] (the mode entered at that path) and
//! a [`Handler`] (the command invoked at that path). A node carrying both is
//! a border command: it is invoked from the outer mode and enters the inner
//! one.
//!
//! A live [`Context`] is one instance of a mode. It holds its mode payload
//! and a reference to the context it was entered from. [`BoundContext`]
//! pairs a schema node with a live context and is what the dispatcher
//! enumerates and invokes.

use core::fmt;
use std::any::Any;
use std::borrow::Cow;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use super::handler::{Handler, InvokeError, Outcome};
use super::token::Value;

/// Index of a node inside one [`ContextTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Mode type instantiated when entering a branch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Family {
    name: Cow<'static, str>,
    prompt: Option<Cow<'static, str>>,
}

impl Family {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Family {
            name: Cow::Borrowed(name),
            prompt: None,
        }
    }

    /// Prompt shown for every context of this family instead of the chain.
    #[must_use]
    pub fn with_prompt(mut self, prompt: &'static str) -> Self {
        self.prompt = Some(Cow::Borrowed(prompt));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}

/// What can be attached at a schema path.
#[derive(Debug)]
pub enum Branch {
    Family(Family),
    Handler(Handler),
}

impl From<Family> for Branch {
    fn from(family: Family) -> Self {
        Branch::Family(family)
    }
}

impl From<Handler> for Branch {
    fn from(handler: Handler) -> Self {
        Branch::Handler(handler)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("no branch `{path}`")]
    UnknownPath { path: String },
    #[error("`{path}` has no command")]
    NoHandler { path: String },
}

#[derive(Debug)]
struct SchemaNode {
    name: String,
    parent: Option<NodeId>,
    family: Option<Family>,
    handler: Option<Handler>,
    children: Vec<(String, NodeId)>,
}

impl SchemaNode {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        SchemaNode {
            name,
            parent,
            family: None,
            handler: None,
            children: Vec::new(),
        }
    }
}

/// A handler reachable from a bound node, with its path relative to that
/// node.
#[derive(Debug)]
pub struct CommandEntry<'a> {
    pub path: Vec<&'a str>,
    pub node: NodeId,
    pub handler: &'a Handler,
}

/// Registration schema for one set of modes.
#[derive(Debug)]
pub struct ContextTree {
    root_family: Family,
    nodes: Vec<SchemaNode>,
}

impl ContextTree {
    const ROOT: NodeId = NodeId(0);

    #[must_use]
    pub fn new(root_family: Family) -> Self {
        ContextTree {
            root_family,
            nodes: vec![SchemaNode::new(String::new(), None)],
        }
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// Attaches a family or handler at `path`, creating intermediate nodes.
    pub fn set_branch<I, S>(&mut self, path: I, branch: impl Into<Branch>) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let node = self.ensure_path(path);
        match branch.into() {
            Branch::Family(family) if node == Self::ROOT => self.root_family = family,
            Branch::Family(family) => self.nodes[node.0].family = Some(family),
            Branch::Handler(handler) => {
                if self.nodes[node.0].handler.is_some() {
                    warn!(path = %self.path(node).join(" "), "replacing registered command");
                }
                self.nodes[node.0].handler = Some(handler);
            }
        }
        node
    }

    pub fn set_family<I, S>(&mut self, path: I, family: Family) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_branch(path, family)
    }

    pub fn set_handler<I, S>(&mut self, path: I, handler: Handler) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_branch(path, handler)
    }

    fn ensure_path<I, S>(&mut self, path: I) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = Self::ROOT;
        for name in path {
            let name = name.as_ref();
            current = if let Some(child) = self.child(current, name) {
                child
            } else {
                let child = NodeId(self.nodes.len());
                self.nodes.push(SchemaNode::new(name.to_owned(), Some(current)));
                self.nodes[current.0].children.push((name.to_owned(), child));
                child
            };
        }
        current
    }

    fn child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, id)| *id)
    }

    /// Looks up a registered path below `from`.
    pub fn find<I, S>(&self, from: NodeId, path: I) -> Option<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        path.into_iter()
            .try_fold(from, |node, name| self.child(node, name.as_ref()))
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Registered branches below `node`, in registration order.
    pub fn children(&self, node: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        self.nodes[node.0]
            .children
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
    }

    pub fn handler(&self, node: NodeId) -> Option<&Handler> {
        self.nodes[node.0].handler.as_ref()
    }

    /// The family of `node`, inherited from the nearest ancestor that sets
    /// one.
    pub fn family(&self, node: NodeId) -> &Family {
        let mut current = node;
        loop {
            let schema = &self.nodes[current.0];
            if let Some(family) = &schema.family {
                return family;
            }
            match schema.parent {
                Some(parent) => current = parent,
                None => return &self.root_family,
            }
        }
    }

    /// True when `node` resolves to a different family than its parent.
    pub fn is_border(&self, node: NodeId) -> bool {
        self.parent(node)
            .is_some_and(|parent| self.family(node) != self.family(parent))
    }

    /// Names from the root down to `node`.
    pub fn path(&self, node: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            names.push(self.name(current));
            current = parent;
        }
        names.reverse();
        names
    }

    /// Handlers invocable while `node` is bound, without crossing into
    /// another family. Border handlers are listed; their subtrees are not.
    pub fn commands(&self, node: NodeId) -> Vec<CommandEntry<'_>> {
        let mut out = Vec::new();
        if let Some(handler) = self.handler(node) {
            if !self.is_border(node) {
                out.push(CommandEntry {
                    path: Vec::new(),
                    node,
                    handler,
                });
            }
        }
        let mut prefix = Vec::new();
        self.collect_commands(node, &mut prefix, &mut out);
        out
    }

    fn collect_commands<'a>(
        &'a self,
        node: NodeId,
        prefix: &mut Vec<&'a str>,
        out: &mut Vec<CommandEntry<'a>>,
    ) {
        for (name, child) in &self.nodes[node.0].children {
            prefix.push(name);
            if let Some(handler) = self.handler(*child) {
                out.push(CommandEntry {
                    path: prefix.clone(),
                    node: *child,
                    handler,
                });
            }
            if !self.is_border(*child) {
                self.collect_commands(*child, prefix, out);
            }
            prefix.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

/// Per-mode arguments supplied when a context is entered.
#[derive(Default)]
pub struct Entry {
    payload: Option<Box<dyn Any>>,
    detail: Option<String>,
    prompt: Option<String>,
}

impl Entry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed mode state, retrievable through [`Context::payload`].
    #[must_use]
    pub fn with_payload<T: Any>(mut self, payload: T) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    /// Human-readable description, e.g. `vlan 10`.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// A live mode instance.
pub struct Context {
    family: Family,
    parent: Option<Rc<Context>>,
    payload: Option<Box<dyn Any>>,
    detail: Option<String>,
    prompt: Option<String>,
}

impl Context {
    fn new(family: Family, parent: Option<Rc<Context>>, entry: Entry) -> Self {
        Context {
            family,
            parent,
            payload: entry.payload,
            detail: entry.detail,
            prompt: entry.prompt,
        }
    }

    pub fn name(&self) -> &str {
        self.family.name()
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    pub fn parent(&self) -> Option<&Rc<Context>> {
        self.parent.as_ref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// This context's own payload, if it is a `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload
            .as_deref()
            .and_then(|payload| payload.downcast_ref::<T>())
    }

    /// The innermost payload of type `T` along the chain.
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.chain().find_map(Context::payload::<T>)
    }

    /// Self followed by every ancestor, innermost first.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.chain().count() - 1
    }

    /// `(name)` for each non-root context, outermost first, unless a custom
    /// prompt is set.
    pub fn prompt(&self) -> String {
        if let Some(prompt) = self.prompt.as_deref().or(self.family.prompt()) {
            return format!("({prompt})");
        }
        let mut names: Vec<&str> = self
            .chain()
            .filter(|context| context.parent.is_some())
            .map(Context::name)
            .collect();
        names.reverse();
        names.iter().map(|name| format!("({name})")).collect()
    }

    /// Family name followed by the detail, if any.
    pub fn describe(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {detail}", self.name()),
            None => self.name().to_owned(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("family", &self.family.name())
            .field("detail", &self.detail)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Iterator over a context chain.
pub struct Chain<'a> {
    next: Option<&'a Context>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Context;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

/// A schema node viewed through a live context.
#[derive(Clone)]
pub struct BoundContext {
    tree: Rc<ContextTree>,
    node: NodeId,
    context: Rc<Context>,
}

impl BoundContext {
    /// Binds the root of `tree` to a fresh parentless context.
    #[must_use]
    pub fn root(tree: Rc<ContextTree>, entry: Entry) -> Self {
        let node = tree.root();
        let context = Rc::new(Context::new(tree.family(node).clone(), None, entry));
        BoundContext {
            tree,
            node,
            context,
        }
    }

    /// Views `node` of `tree` through an existing live context.
    #[must_use]
    pub fn view(tree: Rc<ContextTree>, node: NodeId, context: Rc<Context>) -> Self {
        BoundContext {
            tree,
            node,
            context,
        }
    }

    pub fn tree(&self) -> &Rc<ContextTree> {
        &self.tree
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    /// Instantiates this node's family as a child of the current context.
    #[must_use]
    pub fn bind(&self, entry: Entry) -> BoundContext {
        let family = self.tree.family(self.node).clone();
        debug!(
            family = family.name(),
            parent = self.context.name(),
            "entering context"
        );
        let context = Rc::new(Context::new(family, Some(Rc::clone(&self.context)), entry));
        BoundContext {
            tree: Rc::clone(&self.tree),
            node: self.node,
            context,
        }
    }

    /// The same live context viewed at a registered path below this node.
    pub fn descend<I, S>(&self, path: I) -> Result<BoundContext, ContextError>
    where
        I: IntoIterator<Item = S> + Clone,
        S: AsRef<str>,
    {
        let node = self
            .tree
            .find(self.node, path.clone())
            .ok_or_else(|| ContextError::UnknownPath {
                path: join_path(path),
            })?;
        Ok(BoundContext::view(
            Rc::clone(&self.tree),
            node,
            Rc::clone(&self.context),
        ))
    }

    /// Handlers invocable from this view.
    pub fn commands(&self) -> Vec<CommandEntry<'_>> {
        self.tree.commands(self.node)
    }

    pub fn handler(&self) -> Result<&Handler, ContextError> {
        self.tree
            .handler(self.node)
            .ok_or_else(|| ContextError::NoHandler {
                path: self.tree.path(self.node).join(" "),
            })
    }

    /// Invokes the handler registered at this node.
    pub fn call(&self, negated: bool, options: &[Value]) -> Result<Outcome, InvokeError> {
        self.handler()?.bind(negated).invoke(self, options)
    }

    /// True when both views share the same live context.
    pub fn same_context(&self, other: &BoundContext) -> bool {
        Rc::ptr_eq(&self.context, &other.context)
    }
}

impl fmt::Debug for BoundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundContext")
            .field("path", &self.tree.path(self.node))
            .field("context", &self.context)
            .finish()
    }
}

fn join_path<I, S>(path: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    path.into_iter()
        .map(|name| name.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

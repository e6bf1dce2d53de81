//! In-memory host document
//!
//! A small DOM: an element tree under a window, capture/target/bubble
//! dispatch with propagation control, file lists on `<input type="file">`
//! and child-list mutation records. Used as the reference host and to
//! simulate pages and users in tests.

use super::{
    DispatchOutcome, DispatchPhase, EventContext, HostDocument, Listener, ListenerId,
    MutationCallback, MutationRecord, ObserverId,
};
use crate::error::{MetaSafeError, Result};
use crate::types::{DataTransfer, DomEvent, ElementId, EventKind, FileRecord, NodeRef, Phase};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: HashMap<String, String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    files: Vec<FileRecord>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: HashMap::new(),
            parent: None,
            children: Vec::new(),
            files: Vec::new(),
        }
    }

    fn is_file_input(&self) -> bool {
        self.tag == "input"
            && self
                .attributes
                .get("type")
                .map(|t| t.trim().eq_ignore_ascii_case("file"))
                .unwrap_or(false)
    }
}

struct Registration {
    id: ListenerId,
    node: NodeRef,
    kind: EventKind,
    phase: Phase,
    listener: Listener,
}

struct DocState {
    nodes: HashMap<ElementId, Node>,
    root: ElementId,
    body: ElementId,
    next_element: u64,
    listeners: Vec<Registration>,
    next_listener: u64,
    observers: Vec<(ObserverId, MutationCallback)>,
    next_observer: u64,
}

impl DocState {
    fn observer_callbacks(&self) -> Vec<MutationCallback> {
        self.observers.iter().map(|(_, cb)| cb.clone()).collect()
    }

    fn node(&self, id: ElementId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| MetaSafeError::ElementNotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: ElementId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| MetaSafeError::ElementNotFound(id.to_string()))
    }

    fn alloc(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.next_element);
        self.next_element += 1;
        self.nodes.insert(id, Node::new(tag));
        id
    }

    fn is_connected(&self, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(el) = current {
            if el == self.root {
                return true;
            }
            current = self.nodes.get(&el).and_then(|n| n.parent);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: ElementId, of: ElementId) -> bool {
        let mut current = Some(of);
        while let Some(el) = current {
            if el == ancestor {
                return true;
            }
            current = self.nodes.get(&el).and_then(|n| n.parent);
        }
        false
    }

    fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self
            .nodes
            .get(&id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(el) = stack.pop() {
            out.push(el);
            if let Some(node) = self.nodes.get(&el) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Ancestors from the outermost node down to the parent of `id`
    fn propagation_path(&self, id: ElementId) -> Vec<NodeRef> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(el) = current {
            path.push(NodeRef::Element(el));
            current = self.nodes.get(&el).and_then(|n| n.parent);
        }
        if self.is_connected(id) {
            path.push(NodeRef::Window);
        }
        path.reverse();
        path
    }

    /// Unlink `child` from its current parent; returns that parent
    fn detach(&mut self, child: ElementId) -> Option<ElementId> {
        let parent = self.nodes.get_mut(&child)?.parent.take()?;
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        Some(parent)
    }
}

/// In-memory host document
pub struct MemoryDocument {
    state: RwLock<DocState>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Create a document with `<html>` and `<body>`
    pub fn new() -> Self {
        let mut state = DocState {
            nodes: HashMap::new(),
            root: ElementId(0),
            body: ElementId(0),
            next_element: 0,
            listeners: Vec::new(),
            next_listener: 0,
            observers: Vec::new(),
            next_observer: 0,
        };
        let root = state.alloc("html");
        let body = state.alloc("body");
        if let Some(node) = state.nodes.get_mut(&body) {
            node.parent = Some(root);
        }
        if let Some(node) = state.nodes.get_mut(&root) {
            node.children.push(body);
        }
        state.root = root;
        state.body = body;

        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DocState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DocState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The `<html>` element
    pub fn root(&self) -> ElementId {
        self.read().root
    }

    /// The `<body>` element
    pub fn body(&self) -> ElementId {
        self.read().body
    }

    /// Create a detached element
    pub fn create_element(&self, tag: &str) -> ElementId {
        self.write().alloc(tag)
    }

    /// Create a detached `<input type="file">`
    pub fn create_file_input(&self) -> ElementId {
        let mut state = self.write();
        let id = state.alloc("input");
        if let Some(node) = state.nodes.get_mut(&id) {
            node.attributes.insert("type".to_string(), "file".to_string());
        }
        id
    }

    /// Set an attribute on an element
    pub fn set_attribute(&self, element: ElementId, name: &str, value: &str) -> Result<()> {
        let mut state = self.write();
        let node = state.node_mut(element)?;
        node.attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        if !node.is_file_input() {
            node.files.clear();
        }
        Ok(())
    }

    /// Lowercased tag name of an element
    pub fn tag(&self, element: ElementId) -> Result<String> {
        Ok(self.read().node(element)?.tag.clone())
    }

    /// Parent of an element, if attached to one
    pub fn parent(&self, element: ElementId) -> Result<Option<ElementId>> {
        Ok(self.read().node(element)?.parent)
    }

    /// Direct children of an element
    pub fn children(&self, element: ElementId) -> Result<Vec<ElementId>> {
        Ok(self.read().node(element)?.children.clone())
    }

    /// Whether the element is part of the document tree
    pub fn is_connected(&self, element: ElementId) -> bool {
        self.read().is_connected(element)
    }

    /// Append one element (and its subtree) under `parent`
    pub fn append_child(&self, parent: ElementId, child: ElementId) -> Result<()> {
        self.append_children(parent, &[child])
    }

    /// Append several subtrees under `parent` as a single mutation
    pub fn append_children(&self, parent: ElementId, children: &[ElementId]) -> Result<()> {
        let mut records = Vec::new();
        let observers = {
            let mut state = self.write();
            state.node(parent)?;
            for child in children {
                state.node(*child)?;
                if state.is_inclusive_ancestor(*child, parent) {
                    return Err(MetaSafeError::Host(format!(
                        "Cannot append {} under its own descendant {}",
                        child, parent
                    )));
                }
            }

            let mut added = Vec::new();
            for child in children {
                let was_connected = state.is_connected(*child);
                if let Some(old_parent) = state.detach(*child) {
                    if was_connected {
                        records.push(MutationRecord {
                            target: Some(old_parent),
                            added: Vec::new(),
                            removed: vec![*child],
                        });
                    }
                }
                state.node_mut(*child)?.parent = Some(parent);
                state.node_mut(parent)?.children.push(*child);
                added.push(*child);
            }

            if state.is_connected(parent) && !added.is_empty() {
                records.push(MutationRecord {
                    target: Some(parent),
                    added,
                    removed: Vec::new(),
                });
            }
            state.observer_callbacks()
        };

        notify(&observers, &records);
        Ok(())
    }

    /// Remove an element (and its subtree) from its parent
    pub fn remove(&self, element: ElementId) -> Result<()> {
        let (observers, records) = {
            let mut state = self.write();
            state.node(element)?;
            if element == state.root {
                return Err(MetaSafeError::Host(
                    "Cannot remove the document root".to_string(),
                ));
            }
            let was_connected = state.is_connected(element);
            let parent = state.detach(element);
            let records = match parent {
                Some(parent) if was_connected => vec![MutationRecord {
                    target: Some(parent),
                    added: Vec::new(),
                    removed: vec![element],
                }],
                _ => Vec::new(),
            };
            (state.observer_callbacks(), records)
        };

        notify(&observers, &records);
        Ok(())
    }

    /// Simulate a user picking files: assign them, then fire "change"
    pub fn select_files(
        &self,
        element: ElementId,
        files: Vec<FileRecord>,
    ) -> Result<DispatchOutcome> {
        self.set_files(element, files)?;
        self.dispatch(NodeRef::Element(element), DomEvent::change())
    }

    /// Simulate a user dropping files on a node
    pub fn drop_files(&self, node: NodeRef, files: Vec<FileRecord>) -> Result<DispatchOutcome> {
        self.dispatch(node, DomEvent::drop(DataTransfer::from_files(files)))
    }

    /// Simulate a drag passing over a node
    pub fn drag_over(&self, node: NodeRef) -> Result<DispatchOutcome> {
        self.dispatch(node, DomEvent::drag_over())
    }

    /// Number of registered listeners for a node and event kind
    pub fn listener_count(&self, node: NodeRef, kind: EventKind) -> usize {
        self.read()
            .listeners
            .iter()
            .filter(|r| r.node == node && r.kind == kind)
            .count()
    }

    fn listeners_for(&self, node: NodeRef, kind: EventKind, phase: Phase) -> Vec<Listener> {
        self.read()
            .listeners
            .iter()
            .filter(|r| r.node == node && r.kind == kind && r.phase == phase)
            .map(|r| r.listener.clone())
            .collect()
    }

    /// Run the listeners of one node; returns how many ran
    fn invoke(
        &self,
        ctx: &mut EventContext<'_>,
        node: NodeRef,
        phase: Phase,
        dispatch_phase: DispatchPhase,
    ) -> usize {
        ctx.enter(node, dispatch_phase);
        let mut invoked = 0;
        for listener in self.listeners_for(node, ctx.event().kind, phase) {
            listener(ctx);
            invoked += 1;
            if ctx.is_immediate_stopped() {
                break;
            }
        }
        invoked
    }
}

fn notify(observers: &[MutationCallback], records: &[MutationRecord]) {
    if records.is_empty() {
        return;
    }
    for observer in observers {
        observer(records);
    }
}

impl HostDocument for MemoryDocument {
    fn name(&self) -> &str {
        "memory"
    }

    fn file_inputs(&self) -> Vec<ElementId> {
        let state = self.read();
        let mut all = vec![state.root];
        all.extend(state.descendants(state.root));
        all.into_iter()
            .filter(|id| state.nodes.get(id).map(Node::is_file_input).unwrap_or(false))
            .collect()
    }

    fn is_file_input(&self, element: ElementId) -> bool {
        self.read()
            .nodes
            .get(&element)
            .map(Node::is_file_input)
            .unwrap_or(false)
    }

    fn descendants(&self, element: ElementId) -> Vec<ElementId> {
        self.read().descendants(element)
    }

    fn add_listener(
        &self,
        node: NodeRef,
        kind: EventKind,
        phase: Phase,
        listener: Listener,
    ) -> Result<ListenerId> {
        let mut state = self.write();
        if let NodeRef::Element(id) = node {
            state.node(id)?;
        }
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push(Registration {
            id,
            node,
            kind,
            phase,
            listener,
        });
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.write();
        let before = state.listeners.len();
        state.listeners.retain(|r| r.id != id);
        state.listeners.len() != before
    }

    fn files(&self, element: ElementId) -> Result<Vec<FileRecord>> {
        let state = self.read();
        let node = state.node(element)?;
        if !node.is_file_input() {
            return Err(MetaSafeError::NotFileInput(element.to_string()));
        }
        Ok(node.files.clone())
    }

    fn set_files(&self, element: ElementId, files: Vec<FileRecord>) -> Result<()> {
        let mut state = self.write();
        let node = state.node_mut(element)?;
        if !node.is_file_input() {
            return Err(MetaSafeError::NotFileInput(element.to_string()));
        }
        node.files = files;
        Ok(())
    }

    fn dispatch(&self, node: NodeRef, event: DomEvent) -> Result<DispatchOutcome> {
        let path = match node {
            NodeRef::Window => Vec::new(),
            NodeRef::Element(id) => {
                let state = self.read();
                state.node(id)?;
                state.propagation_path(id)
            }
        };

        let mut ctx = EventContext::new(&event, node);
        let mut invoked = 0;

        for ancestor in &path {
            invoked += self.invoke(&mut ctx, *ancestor, Phase::Capture, DispatchPhase::Capturing);
            if ctx.is_propagation_stopped() {
                break;
            }
        }

        // Target capture and target bubble listeners are separate steps:
        // stopping propagation in the former skips the latter
        for phase in [Phase::Capture, Phase::Bubble] {
            if ctx.is_propagation_stopped() {
                break;
            }
            invoked += self.invoke(&mut ctx, node, phase, DispatchPhase::AtTarget);
        }

        if event.bubbles && !ctx.is_propagation_stopped() {
            for ancestor in path.iter().rev() {
                invoked += self.invoke(&mut ctx, *ancestor, Phase::Bubble, DispatchPhase::Bubbling);
                if ctx.is_propagation_stopped() {
                    break;
                }
            }
        }

        Ok(DispatchOutcome {
            default_prevented: ctx.default_prevented(),
            listeners_invoked: invoked,
        })
    }

    fn observe(&self, callback: MutationCallback) -> ObserverId {
        let mut state = self.write();
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        state.observers.push((id, callback));
        id
    }

    fn unobserve(&self, id: ObserverId) -> bool {
        let mut state = self.write();
        let before = state.observers.len();
        state.observers.retain(|(registered, _)| *registered != id);
        state.observers.len() != before
    }
}

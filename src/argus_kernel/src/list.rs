//! Intrusive doubly linked list.
//!
//! Nodes are embedded in the owning object rather than separately allocated:
//! a [`Link`] is just two `Option<NonNull<Node>>` fields that the node type
//! carries around. A node can be threaded onto several lists at once by
//! embedding one [`Link`] per list it participates in (a thread embeds one
//! for the ready/suspended/sleeping set and another for whatever object's
//! wait set it is currently blocked on, exactly as spec'd).
//!
//! All access happens while the kernel lock is held, so neighbor pointers are
//! plain [`Cell`]s rather than atomics.

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Intrusive link embedded in a list node.
pub(crate) struct Link<T: 'static> {
    prev: Cell<Option<NonNull<T>>>,
    next: Cell<Option<NonNull<T>>>,
    linked: Cell<bool>,
}

impl<T> Link<T> {
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
            linked: Cell::new(false),
        }
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked.get()
    }
}

/// Associates a node type with the [`Link`] field that threads it onto a
/// particular list. Implemented once per (node type, list role) pair, e.g.
/// one `Adapter` for a thread's membership in the ready/sleeping/suspended
/// set and a different one for its membership in a wait set.
pub(crate) trait Adapter {
    type Node: 'static;
    fn link(node: &Self::Node) -> &Link<Self::Node>;
}

/// A list of `A::Node`s linked via `A::link`.
pub(crate) struct IntrusiveList<A: Adapter> {
    head: Cell<Option<NonNull<A::Node>>>,
    tail: Cell<Option<NonNull<A::Node>>>,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Adapter> IntrusiveList<A> {
    pub const fn new() -> Self {
        Self {
            head: Cell::new(None),
            tail: Cell::new(None),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    #[inline]
    pub fn front(&self) -> Option<&'static A::Node> {
        // Safety: every node reachable from this list was inserted as a
        // `&'static A::Node` and is only removed by `remove`/`pop_front`.
        self.head.get().map(|p| unsafe { p.as_ref() })
    }

    /// Insert `node` at the back of the list (used for FIFO wait/ready
    /// queues when no ordering function applies).
    pub fn push_back(&self, node: &'static A::Node) {
        let link = A::link(node);
        debug_assert!(!link.is_linked());
        let node_ptr = NonNull::from(node);

        link.prev.set(self.tail.get());
        link.next.set(None);
        link.linked.set(true);

        if let Some(old_tail) = self.tail.get() {
            A::link(unsafe { old_tail.as_ref() }).next.set(Some(node_ptr));
        } else {
            self.head.set(Some(node_ptr));
        }
        self.tail.set(Some(node_ptr));
    }

    /// Insert `node` keeping the list ordered by `key`. When `descending` is
    /// true (the ready set and a priority-ordered wait set), `node` is
    /// placed after every existing node whose key is `>=` its own, so nodes
    /// with equal keys remain FIFO-ordered. When false (the sleeping set),
    /// `node` is placed after every existing node whose key is `<=` its own.
    pub fn insert_sorted<K: PartialOrd + Copy>(
        &self,
        node: &'static A::Node,
        key: impl Fn(&A::Node) -> K,
        descending: bool,
    ) {
        let link = A::link(node);
        debug_assert!(!link.is_linked());
        let node_key = key(node);

        let mut cursor = self.head.get();
        while let Some(cur) = cursor {
            let cur_ref = unsafe { cur.as_ref() };
            let cur_key = key(cur_ref);
            let keep_going = if descending {
                cur_key >= node_key
            } else {
                cur_key <= node_key
            };
            if !keep_going {
                break;
            }
            cursor = A::link(cur_ref).next.get();
        }

        self.insert_before(node, cursor);
    }

    /// Insert `node` immediately before `before` (or at the back if `before`
    /// is `None`).
    fn insert_before(&self, node: &'static A::Node, before: Option<NonNull<A::Node>>) {
        let link = A::link(node);
        let node_ptr = NonNull::from(node);

        match before {
            None => {
                link.prev.set(self.tail.get());
                link.next.set(None);
                if let Some(old_tail) = self.tail.get() {
                    A::link(unsafe { old_tail.as_ref() }).next.set(Some(node_ptr));
                } else {
                    self.head.set(Some(node_ptr));
                }
                self.tail.set(Some(node_ptr));
            }
            Some(before_ptr) => {
                let before_ref = unsafe { before_ptr.as_ref() };
                let before_link = A::link(before_ref);
                let prev = before_link.prev.get();

                link.prev.set(prev);
                link.next.set(Some(before_ptr));
                before_link.prev.set(Some(node_ptr));

                match prev {
                    Some(prev_ptr) => A::link(unsafe { prev_ptr.as_ref() }).next.set(Some(node_ptr)),
                    None => self.head.set(Some(node_ptr)),
                }
            }
        }
        link.linked.set(true);
    }

    /// Remove `node` from the list. `node` must currently be linked to
    /// `self`; the caller is responsible for that invariant (this module has
    /// no way to check which list a node belongs to).
    pub fn remove(&self, node: &'static A::Node) {
        let link = A::link(node);
        debug_assert!(link.is_linked());
        let node_ptr = NonNull::from(node);

        match link.prev.get() {
            Some(prev_ptr) => A::link(unsafe { prev_ptr.as_ref() }).next.set(link.next.get()),
            None => self.head.set(link.next.get()),
        }
        match link.next.get() {
            Some(next_ptr) => A::link(unsafe { next_ptr.as_ref() }).prev.set(link.prev.get()),
            None => self.tail.set(link.prev.get()),
        }

        let _ = node_ptr;
        link.prev.set(None);
        link.next.set(None);
        link.linked.set(false);
    }

    /// Remove and return the first node, if any.
    pub fn pop_front(&self) -> Option<&'static A::Node> {
        let node = self.front()?;
        self.remove(node);
        Some(node)
    }

    /// Iterate over the list front to back. Intended for debug/introspection
    /// use, not hot paths.
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            cursor: self.head.get(),
            _marker: PhantomData,
        }
    }
}

/// Type-erased handle letting code that only holds a `&'static Thread<P>`
/// (the tick handler walking the sleeping set, or `delete` on an object it
/// does not otherwise know the type of) remove that thread from whichever
/// object wait set it is presently linked into, without knowing the
/// concrete `Adapter`/ordering of that wait set.
pub(crate) trait WaitSetHandle<N: 'static> {
    fn remove_node(&self, node: &'static N);
}

impl<A: Adapter> WaitSetHandle<A::Node> for IntrusiveList<A> {
    fn remove_node(&self, node: &'static A::Node) {
        self.remove(node);
    }
}

pub(crate) struct Iter<'a, A: Adapter> {
    cursor: Option<NonNull<A::Node>>,
    _marker: PhantomData<&'a IntrusiveList<A>>,
}

impl<'a, A: Adapter> Iterator for Iter<'a, A> {
    type Item = &'static A::Node;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.cursor?;
        let cur_ref = unsafe { cur.as_ref() };
        self.cursor = A::link(cur_ref).next.get();
        Some(cur_ref)
    }
}

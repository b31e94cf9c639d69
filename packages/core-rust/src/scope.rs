//! Ambient, nestable tag scopes.
//!
//! Each logical task owns a private stack of scope nodes. A stack lives in one
//! of three places, checked in order:
//!
//! 1. task-local storage established by [`isolated`] or [`fork`];
//! 2. a shared table keyed by the running Tokio task's id, for tasks spawned
//!    without either wrapper;
//! 3. the same table keyed by OS thread id, for code outside any task.
//!
//! In every case a stack follows its task across worker threads and is never
//! shared with unrelated tasks running on the same thread.
//!
//! [`begin`] pushes a node and returns a [`TagScope`] guard; dropping the
//! guard pops it again. Release happens on every exit path: normal return,
//! `?` propagation, panic unwind, and cancellation of the owning future.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::thread::{self, ThreadId};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::{self, JoinHandle};
use tracing::{trace, warn};

use crate::metadata::Metadata;
use crate::tag::Tag;

/// Metadata key written by [`begin`] when an action is supplied.
pub const ACTION_KEY: &str = "Action";

tokio::task_local! {
    static TASK_STACK: Arc<Mutex<ScopeStack>>;
}

/// Stacks of tasks and threads not running under [`isolated`] or [`fork`].
/// Entries are removed as soon as their stack empties.
static OWNED_STACKS: LazyLock<DashMap<Owner, ScopeStack>> = LazyLock::new(DashMap::new);

// ---------------------------------------------------------------------------
// Stack storage
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ScopeNode {
    tag: RwLock<Tag>,
    /// Snapshot handed over by [`fork`]; never written to.
    inherited: bool,
}

impl ScopeNode {
    fn new(tag: Tag, inherited: bool) -> Arc<Self> {
        Arc::new(Self {
            tag: RwLock::new(tag),
            inherited,
        })
    }
}

#[derive(Debug, Default)]
struct ScopeStack {
    frames: Vec<Arc<ScopeNode>>,
}

impl ScopeStack {
    fn seeded(snapshot: Option<Tag>) -> Self {
        Self {
            frames: snapshot
                .map(|tag| vec![ScopeNode::new(tag, true)])
                .unwrap_or_default(),
        }
    }

    fn top(&self) -> Option<&Arc<ScopeNode>> {
        self.frames.last()
    }

    /// Pops `node` and everything pushed above it, returning how many
    /// frames sat above it. `None` when the node is no longer on this stack.
    fn unwind_to(&mut self, depth: usize, node: &Arc<ScopeNode>) -> Option<usize> {
        match self.frames.get(depth) {
            Some(frame) if Arc::ptr_eq(frame, node) => {
                let orphaned = self.frames.len() - depth - 1;
                self.frames.truncate(depth);
                Some(orphaned)
            }
            _ => None,
        }
    }
}

/// Key of a stack in [`OWNED_STACKS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Owner {
    Task(task::Id),
    Thread(ThreadId),
}

impl Owner {
    fn current() -> Self {
        task::try_id().map_or_else(|| Owner::Thread(thread::current().id()), Owner::Task)
    }
}

/// The stack a guard was pushed onto. Release always targets this stack,
/// whichever thread or task the guard is dropped from.
#[derive(Debug)]
enum StackRef {
    Local(Arc<Mutex<ScopeStack>>),
    Owned(Owner),
}

impl StackRef {
    fn active() -> Self {
        TASK_STACK
            .try_with(|stack| StackRef::Local(Arc::clone(stack)))
            .unwrap_or_else(|_| StackRef::Owned(Owner::current()))
    }

    fn read<R>(&self, f: impl FnOnce(&ScopeStack) -> R) -> R {
        match self {
            StackRef::Local(stack) => f(&*stack.lock()),
            StackRef::Owned(owner) => match OWNED_STACKS.get(owner) {
                Some(stack) => f(stack.value()),
                None => f(&ScopeStack::default()),
            },
        }
    }

    /// Runs `f` with exclusive access. An owned stack is created on demand
    /// and dropped from the table once it is empty again.
    fn update<R>(&self, f: impl FnOnce(&mut ScopeStack) -> R) -> R {
        match self {
            StackRef::Local(stack) => f(&mut *stack.lock()),
            StackRef::Owned(owner) => match OWNED_STACKS.entry(*owner) {
                Entry::Occupied(mut entry) => {
                    let result = f(entry.get_mut());
                    if entry.get().frames.is_empty() {
                        entry.remove();
                    }
                    result
                }
                Entry::Vacant(entry) => {
                    let mut stack = ScopeStack::default();
                    let result = f(&mut stack);
                    if !stack.frames.is_empty() {
                        entry.insert(stack);
                    }
                    result
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// TagScope
// ---------------------------------------------------------------------------

/// Guard for one active scope. Dropping it restores the parent scope.
///
/// The guard is `Send`: it can be held across `.await` points on a
/// multi-threaded runtime or handed to another thread, and dropping it there
/// still releases the stack it was begun on.
#[derive(Debug)]
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct TagScope {
    node: Arc<ScopeNode>,
    depth: usize,
    stack: StackRef,
    released: bool,
}

impl TagScope {
    /// Sets `key` on this scope's own tag and returns the guard for chaining.
    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_metadata(key, value);
        self
    }

    /// Sets `key` on this scope's own tag. Parent and sibling scopes are not
    /// affected; children begun afterwards inherit the value.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.node.tag.write().insert(key, value);
        self
    }

    /// Snapshot of this scope's tag. Still readable after the scope ended.
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.node.tag.read().clone()
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.node.tag.read().name.clone()
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.node.tag.read().get(key).map(str::to_string)
    }

    /// Whether this guard has already been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Ends the scope, restoring its parent as current. Calling it again,
    /// or dropping the guard afterwards, does nothing.
    pub fn end(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let node = &self.node;
        let depth = self.depth;
        let orphaned = self.stack.update(|stack| stack.unwind_to(depth, node));

        match orphaned {
            Some(0) => trace!(depth, name = %node.tag.read().name, "tag scope ended"),
            Some(orphaned) => warn!(
                depth,
                orphaned,
                name = %node.tag.read().name,
                "tag scope ended before its children; children ended with it"
            ),
            None => trace!(depth, "tag scope already unwound"),
        }
    }
}

impl Drop for TagScope {
    fn drop(&mut self) {
        self.end();
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Begins a child of the current scope and makes it current.
///
/// The new tag starts with `Action = action` when `action` is non-empty, then
/// takes every parent key it does not already have, so an explicit action
/// always wins over an inherited one. The parent's metadata is copied, not
/// linked.
pub fn begin(name: impl Into<String>, action: Option<&str>) -> TagScope {
    let mut tag = Tag::new(name);
    if let Some(action) = action.filter(|a| !a.is_empty()) {
        tag.insert(ACTION_KEY, action);
    }

    let stack = StackRef::active();
    let (node, depth) = stack.update(|scopes| {
        if let Some(parent) = scopes.top() {
            tag.merge_missing(&parent.tag.read().metadata);
        }
        let node = ScopeNode::new(tag, false);
        scopes.frames.push(Arc::clone(&node));
        (node, scopes.frames.len() - 1)
    });

    trace!(depth, name = %node.tag.read().name, "tag scope begun");

    TagScope {
        node,
        depth,
        stack,
        released: false,
    }
}

/// Returns a snapshot of the innermost active tag for the calling task, or
/// `None` when no scope is active.
#[must_use]
pub fn current() -> Option<Tag> {
    StackRef::active().read(|stack| stack.top().map(|node| node.tag.read().clone()))
}

/// Metadata of the innermost active scope, or an empty mapping.
#[must_use]
pub fn current_metadata() -> Metadata {
    current().map(|tag| tag.metadata).unwrap_or_default()
}

/// Number of scopes on the calling task's stack, including an inherited
/// snapshot.
#[must_use]
pub fn depth() -> usize {
    StackRef::active().read(|stack| stack.frames.len())
}

/// Sets `key` on the innermost scope owned by the calling task.
///
/// Returns `false` when no scope is active or when the innermost entry is a
/// snapshot inherited through [`fork`].
pub fn annotate_current(key: impl Into<String>, value: impl Into<String>) -> bool {
    let (key, value) = (key.into(), value.into());
    StackRef::active().read(|stack| match stack.top() {
        Some(node) if !node.inherited => {
            node.tag.write().insert(key, value);
            true
        }
        _ => false,
    })
}

/// Runs `fut` with a fresh, empty scope stack of its own.
///
/// Scopes begun inside `fut` are invisible to the caller and to every other
/// task, even when they share a worker thread.
pub fn isolated<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    TASK_STACK.scope(Arc::new(Mutex::new(ScopeStack::default())), fut)
}

/// Runs `fut` with its own scope stack seeded from the caller's current tag.
///
/// The snapshot is taken now, when `fork` is called. Inside `fut` the
/// snapshot is visible through [`current`] and is inherited by scopes begun
/// there; nothing `fut` does is visible to the caller.
pub fn fork<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    TASK_STACK.scope(Arc::new(Mutex::new(ScopeStack::seeded(current()))), fut)
}

/// Spawns `fut` on the Tokio runtime as a [`fork`] of the calling task.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fork(fut))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;
    use tokio::sync::Barrier;

    use super::*;

    fn current_name() -> Option<String> {
        current().map(|tag| tag.name)
    }

    #[test]
    fn begin_creates_new_scope() {
        let _scope = begin("Orders", Some("GetById"));

        let tag = current().expect("scope should be active");
        assert_eq!(tag.name, "Orders");
        assert_eq!(tag.get("Action"), Some("GetById"));
    }

    #[test]
    fn empty_action_is_ignored() {
        let scope = begin("Orders", Some(""));
        assert!(scope.metadata(ACTION_KEY).is_none());
    }

    #[test]
    fn dropping_child_restores_parent() {
        let _parent = begin("Parent", None);
        {
            let _child = begin("Child", None);
            assert_eq!(current_name().as_deref(), Some("Child"));
        }
        assert_eq!(current_name().as_deref(), Some("Parent"));
    }

    #[test]
    fn dropping_root_restores_none() {
        {
            let _scope = begin("Test", None);
            assert!(current().is_some());
        }
        assert!(current().is_none());
        assert_eq!(depth(), 0);
    }

    #[test]
    fn end_is_idempotent() {
        let _parent = begin("Parent", None);
        let mut child = begin("Child", None);

        child.end();
        assert!(child.is_released());
        assert_eq!(current_name().as_deref(), Some("Parent"));

        child.end();
        drop(child);
        assert_eq!(current_name().as_deref(), Some("Parent"));
    }

    #[test]
    fn set_metadata_is_visible_through_current() {
        let scope = begin("Test", None);
        scope.set_metadata("UserId", "123");
        assert_eq!(current().unwrap().get("UserId"), Some("123"));
    }

    #[test]
    fn with_metadata_chains() {
        let scope = begin("Test", None)
            .with_metadata("Key1", "Value1")
            .with_metadata("Key2", "Value2");
        scope.set_metadata("Key3", "Value3").set_metadata("Key4", "Value4");

        assert_eq!(current_name().as_deref(), Some("Test"));
        assert_eq!(scope.metadata("Key1").as_deref(), Some("Value1"));
        assert_eq!(scope.metadata("Key2").as_deref(), Some("Value2"));
        assert_eq!(scope.metadata("Key4").as_deref(), Some("Value4"));
        assert_eq!(depth(), 1, "moving the guard must not end the scope");
    }

    #[test]
    fn child_inherits_parent_metadata() {
        let _parent = begin("Parent", None).with_metadata("CorrelationId", "abc123");
        let child = begin("Child", None);
        assert_eq!(child.metadata("CorrelationId").as_deref(), Some("abc123"));
    }

    #[test]
    fn child_override_does_not_touch_parent() {
        let parent = begin("Parent", None).with_metadata("Key", "ParentValue");
        {
            let child = begin("Child", None);
            child.set_metadata("Key", "ChildValue");
            assert_eq!(child.metadata("Key").as_deref(), Some("ChildValue"));
            assert_eq!(parent.metadata("Key").as_deref(), Some("ParentValue"));
        }
        assert_eq!(parent.metadata("Key").as_deref(), Some("ParentValue"));
        assert_eq!(current().unwrap().get("Key"), Some("ParentValue"));
    }

    #[test]
    fn parent_writes_after_child_creation_are_not_seen_by_child() {
        let parent = begin("Parent", None);
        let child = begin("Child", None);
        parent.set_metadata("Late", "value");
        assert!(child.metadata("Late").is_none());
    }

    #[test]
    fn explicit_action_wins_over_inherited_action() {
        let _parent = begin("Orders", Some("List"));
        let child = begin("Orders", Some("GetById"));
        assert_eq!(child.metadata("Action").as_deref(), Some("GetById"));

        let grandchild = begin("Lines", None);
        assert_eq!(grandchild.metadata("Action").as_deref(), Some("GetById"));
    }

    #[test]
    fn ended_scope_remains_readable() {
        let mut scope = begin("Done", None).with_metadata("K", "V");
        scope.end();
        assert_eq!(scope.tag(), Tag::with_metadata("Done", [("K", "V")]));
        assert!(current().is_none());
    }

    #[test]
    fn ending_parent_first_releases_children() {
        let mut parent = begin("Parent", None);
        let child = begin("Child", None);

        parent.end();
        assert!(current().is_none());

        // The orphaned child's release must not disturb newer scopes.
        let _next = begin("Next", None);
        drop(child);
        assert_eq!(current_name().as_deref(), Some("Next"));
    }

    #[test]
    fn annotate_current_writes_innermost_scope() {
        assert!(!annotate_current("K", "V"));

        let scope = begin("Products", Some("GetById"));
        assert!(annotate_current("ProductId", "7"));
        assert_eq!(scope.metadata("ProductId").as_deref(), Some("7"));
    }

    fn early_exit(fail: bool) -> Result<(), &'static str> {
        let _scope = begin("Inner", None);
        if fail {
            return Err("boom");
        }
        Ok(())
    }

    #[test]
    fn scope_released_on_error_path() {
        let _outer = begin("Outer", None);
        assert!(early_exit(true).is_err());
        assert_eq!(current_name().as_deref(), Some("Outer"));
        assert!(early_exit(false).is_ok());
        assert_eq!(current_name().as_deref(), Some("Outer"));
    }

    #[test]
    fn scope_released_on_panic() {
        let _outer = begin("Outer", None);
        let result = std::panic::catch_unwind(|| {
            let _inner = begin("Inner", None);
            panic!("handler failed");
        });
        assert!(result.is_err());
        assert_eq!(current_name().as_deref(), Some("Outer"));
    }

    #[test]
    fn threads_do_not_share_stacks() {
        let _scope = begin("Main", None);
        let seen = std::thread::spawn(current_name).join().unwrap();
        assert!(seen.is_none());
    }

    #[test]
    fn guard_dropped_on_another_thread_releases_its_own_stack() {
        let _outer = begin("Outer", None);
        let moved = begin("Moved", None);

        let seen_there = std::thread::spawn(move || {
            let _local = begin("Local", None);
            drop(moved);
            current_name()
        })
        .join()
        .unwrap();

        assert_eq!(seen_there.as_deref(), Some("Local"));
        assert_eq!(current_name().as_deref(), Some("Outer"));
        assert_eq!(depth(), 1);
    }

    #[test]
    fn guard_moved_to_another_thread_leaves_origin_clean() {
        let moved = begin("Moved", None);
        std::thread::spawn(move || drop(moved)).join().unwrap();

        assert!(current().is_none());
        assert_eq!(depth(), 0);
        let _next = begin("Next", None);
        assert!(current().unwrap().get("Moved").is_none());
        assert_eq!(depth(), 1);
    }

    #[tokio::test]
    async fn plain_spawned_tasks_on_one_worker_keep_separate_stacks() {
        let a = tokio::spawn(async {
            let _scope = begin("TaskA", None).with_metadata("Owner", "A");
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            current_name()
        });
        let b = tokio::spawn(async {
            let scope = begin("TaskB", None);
            let inherited = scope.metadata("Owner");
            tokio::task::yield_now().await;
            (inherited, current_name())
        });

        assert_eq!(a.await.unwrap().as_deref(), Some("TaskA"));
        let (inherited, seen_b) = b.await.unwrap();
        assert!(inherited.is_none());
        assert_eq!(seen_b.as_deref(), Some("TaskB"));
        assert!(current().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn plain_tasks_keep_scopes_across_awaits_on_worker_threads() {
        let barrier = Arc::new(Barrier::new(2));

        let run = |name: &'static str, barrier: Arc<Barrier>| {
            tokio::spawn(async move {
                let root = begin(name, None).with_metadata("Task", name);
                for round in 0..20 {
                    barrier.wait().await;
                    let _inner = begin(format!("{name}-{round}"), None);
                    tokio::time::sleep(Duration::from_millis(1)).await;

                    let tag = current().unwrap();
                    assert_eq!(tag.name, format!("{name}-{round}"));
                    assert_eq!(tag.get("Task"), Some(name));
                    barrier.wait().await;
                }
                let seen = current_name();
                drop(root);
                (seen, current())
            })
        };

        let a = run("TaskA", Arc::clone(&barrier));
        let b = run("TaskB", Arc::clone(&barrier));
        let ids = [a.id(), b.id()];

        let (seen_a, after_a) = a.await.unwrap();
        let (seen_b, after_b) = b.await.unwrap();
        assert_eq!(seen_a.as_deref(), Some("TaskA"));
        assert_eq!(seen_b.as_deref(), Some("TaskB"));
        assert!(after_a.is_none());
        assert!(after_b.is_none());
        for id in ids {
            assert!(!OWNED_STACKS.contains_key(&Owner::Task(id)));
        }
    }

    #[tokio::test]
    async fn aborted_plain_task_releases_its_stack() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            let _scope = begin("Doomed", None);
            let _ = started_tx.send(());
            std::future::pending::<()>().await;
        });
        started_rx.await.unwrap();

        let id = handle.id();
        assert!(OWNED_STACKS.contains_key(&Owner::Task(id)));

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!OWNED_STACKS.contains_key(&Owner::Task(id)));
    }

    #[tokio::test]
    async fn isolated_future_starts_empty_and_leaks_nothing() {
        let _outer = begin("Outer", None);

        let inner = isolated(async {
            assert!(current().is_none());
            let _scope = begin("Inner", None);
            tokio::task::yield_now().await;
            current_name()
        })
        .await;

        assert_eq!(inner.as_deref(), Some("Inner"));
        assert_eq!(current_name().as_deref(), Some("Outer"));
    }

    #[tokio::test]
    async fn scope_survives_await_points() {
        isolated(async {
            let scope = begin("Orders", Some("Create"));
            tokio::time::sleep(Duration::from_millis(1)).await;
            scope.set_metadata("CustomerName", "Ada");
            tokio::task::yield_now().await;

            let tag = current().unwrap();
            assert_eq!(tag.name, "Orders");
            assert_eq!(tag.get("CustomerName"), Some("Ada"));
            drop(scope);
            assert!(current().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn fork_inherits_snapshot_at_fork_time() {
        isolated(async {
            let parent = begin("Request", Some("List")).with_metadata("CorrelationId", "c0ffee01");
            let child = fork(async {
                let inherited = current().unwrap();
                let _own = begin("Background", None).with_metadata("CorrelationId", "other");
                (inherited, current().unwrap())
            });

            // Written after the fork was created: not part of the snapshot.
            parent.set_metadata("Late", "yes");

            let (inherited, own) = child.await;
            assert_eq!(inherited.name, "Request");
            assert_eq!(inherited.get("CorrelationId"), Some("c0ffee01"));
            assert!(inherited.get("Late").is_none());
            assert_eq!(own.get("Action"), Some("List"));
            assert_eq!(own.get("CorrelationId"), Some("other"));

            assert_eq!(parent.metadata("CorrelationId").as_deref(), Some("c0ffee01"));
            assert_eq!(current_name().as_deref(), Some("Request"));
            assert_eq!(depth(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn forked_snapshot_is_read_only() {
        isolated(async {
            let _parent = begin("Request", None);
            fork(async {
                assert!(!annotate_current("K", "V"));
                assert!(current().unwrap().get("K").is_none());
            })
            .await;
        })
        .await;
    }

    #[tokio::test]
    async fn fork_without_scope_starts_empty() {
        let seen = fork(async { current() }).await;
        assert!(seen.is_none());
    }

    #[tokio::test]
    async fn spawned_task_sees_parent_tag() {
        let handle = isolated(async {
            let _scope = begin("Orders", None).with_metadata("OrderId", "9");
            spawn(async {
                tokio::task::yield_now().await;
                current()
            })
        })
        .await;

        let seen = handle.await.unwrap().expect("snapshot inherited");
        assert_eq!(seen.name, "Orders");
        assert_eq!(seen.get("OrderId"), Some("9"));
    }

    #[tokio::test]
    async fn cancelled_task_does_not_leak_scopes() {
        let outer = isolated(async {
            let _scope = begin("Doomed", None);
            std::future::pending::<()>().await;
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(5), outer).await;
        assert!(timed_out.is_err());
        assert!(current().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_tasks_observe_only_their_own_scopes() {
        let barrier = Arc::new(Barrier::new(2));

        let run = |name: &'static str, barrier: Arc<Barrier>| {
            tokio::spawn(isolated(async move {
                let _root = begin(name, None).with_metadata("Task", name);
                for round in 0..20 {
                    barrier.wait().await;
                    let _inner = begin(format!("{name}-{round}"), None);
                    tokio::task::yield_now().await;

                    let tag = current().unwrap();
                    assert_eq!(tag.name, format!("{name}-{round}"));
                    assert_eq!(tag.get("Task"), Some(name));
                    barrier.wait().await;
                }
                current_name()
            }))
        };

        let a = run("TaskA", Arc::clone(&barrier));
        let b = run("TaskB", Arc::clone(&barrier));

        assert_eq!(a.await.unwrap().as_deref(), Some("TaskA"));
        assert_eq!(b.await.unwrap().as_deref(), Some("TaskB"));
    }

    proptest! {
        /// Any nesting depth unwinds back through every level to `None`.
        #[test]
        fn release_restores_previous_current(names in proptest::collection::vec("[A-Za-z]{0,6}", 1..12)) {
            let mut guards = Vec::new();
            let mut expected = vec![None];
            for name in &names {
                guards.push(begin(name.clone(), None));
                expected.push(Some(name.clone()));
            }
            prop_assert_eq!(current_name(), expected.pop().unwrap());
            while let Some(guard) = guards.pop() {
                drop(guard);
                prop_assert_eq!(current_name(), expected.pop().unwrap());
            }
            prop_assert!(current().is_none());
        }
    }
}

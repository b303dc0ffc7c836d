//! # Ambient Transaction Context
//!
//! A unit of work scoped to the processing of one inbound message or one
//! ad-hoc outbound send.
//!
//! ## Scoping
//!
//! The context is always passed explicitly to the pipeline and its steps.
//! In addition, [`TransactionContext::scope`] makes it the *ambient* context
//! for the duration of one future, so code that was not handed the context
//! (e.g. `Bus::send` called from deep inside a handler) can still find it
//! with [`TransactionContext::current`]. The ambient slot is task-local:
//! it survives `.await` suspension but is not inherited by `tokio::spawn`ed
//! tasks, so it never leaks into an unrelated concurrent operation.
//!
//! ## Completion
//!
//! A context completes exactly once, by `commit()` or `abort()`. A second
//! completion attempt is rejected with [`ContextError::AlreadyCompleted`]
//! and runs no actions. `dispose()` aborts a still-pending context and then
//! runs the disposed actions; it is idempotent and also runs on drop of the
//! last handle.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use courier_types::TransportMessage;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ContextError;

/// Key under which the worker stores the received [`TransportMessage`].
pub const INBOUND_MESSAGE_KEY: &str = "courier.inbound-message";

/// Key under which the deserialize step stores the `LogicalMessage`.
pub const LOGICAL_MESSAGE_KEY: &str = "courier.logical-message";

tokio::task_local! {
    static CURRENT: TransactionContext;
}

type Action = Box<dyn FnOnce() + Send>;
type Item = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Pending,
    Committed,
    Aborted,
}

struct Lifecycle {
    completion: Completion,
    disposed: bool,
    on_committed: Vec<Action>,
    on_aborted: Vec<Action>,
    on_disposed: Vec<Action>,
}

struct Inner {
    id: Uuid,
    items: Mutex<HashMap<String, Item>>,
    lifecycle: Mutex<Lifecycle>,
}

/// Handle to a transaction context. Cloning shares the same unit of work.
#[derive(Clone)]
pub struct TransactionContext {
    inner: Arc<Inner>,
}

impl TransactionContext {
    /// Create a fresh, pending context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                items: Mutex::new(HashMap::new()),
                lifecycle: Mutex::new(Lifecycle {
                    completion: Completion::Pending,
                    disposed: false,
                    on_committed: Vec::new(),
                    on_aborted: Vec::new(),
                    on_disposed: Vec::new(),
                }),
            }),
        }
    }

    /// The context active for the current task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Self::clone).ok()
    }

    /// Run `future` with this context as the ambient context.
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        CURRENT.scope(self.clone(), future).await
    }

    /// Unique id of this unit of work.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Store an item, replacing any previous value under `key`.
    pub fn set_item<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner.items.lock().insert(key.into(), Arc::new(value));
    }

    /// Fetch an item.
    ///
    /// # Errors
    ///
    /// - [`ContextError::MissingKey`] if nothing is stored under `key`
    /// - [`ContextError::TypeMismatch`] if the stored item is not a `T`
    pub fn get_item<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ContextError> {
        let item = self
            .inner
            .items
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| ContextError::MissingKey {
                key: key.to_string(),
            })?;

        item.downcast::<T>().map_err(|_| ContextError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Whether an item is stored under `key`.
    #[must_use]
    pub fn contains_item(&self, key: &str) -> bool {
        self.inner.items.lock().contains_key(key)
    }

    /// The inbound transport message, when this context belongs to a worker.
    pub fn inbound_message(&self) -> Result<Arc<TransportMessage>, ContextError> {
        self.get_item::<TransportMessage>(INBOUND_MESSAGE_KEY)
    }

    /// Register an action to run when the context commits.
    ///
    /// Actions registered after completion are discarded.
    pub fn on_committed(&self, action: impl FnOnce() + Send + 'static) {
        self.register(|l| &mut l.on_committed, Box::new(action), "committed");
    }

    /// Register an action to run when the context aborts.
    pub fn on_aborted(&self, action: impl FnOnce() + Send + 'static) {
        self.register(|l| &mut l.on_aborted, Box::new(action), "aborted");
    }

    /// Register an action to run when the context is disposed.
    pub fn on_disposed(&self, action: impl FnOnce() + Send + 'static) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.disposed {
            warn!(context = %self.inner.id, "Ignoring disposed action on disposed context");
            return;
        }
        lifecycle.on_disposed.push(Box::new(action));
    }

    fn register(
        &self,
        slot: fn(&mut Lifecycle) -> &mut Vec<Action>,
        action: Action,
        kind: &'static str,
    ) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.completion != Completion::Pending {
            warn!(
                context = %self.inner.id,
                kind,
                "Ignoring completion action on already completed context"
            );
            return;
        }
        slot(&mut *lifecycle).push(action);
    }

    /// Commit: run the committed actions and mark the context committed.
    ///
    /// # Errors
    ///
    /// [`ContextError::AlreadyCompleted`] if the context was already
    /// committed or aborted. No actions run in that case.
    pub fn commit(&self) -> Result<(), ContextError> {
        let actions = self.complete(Completion::Committed)?;
        debug!(context = %self.inner.id, actions = actions.len(), "Committing transaction context");
        actions.into_iter().for_each(|action| action());
        Ok(())
    }

    /// Abort: run the aborted actions and mark the context aborted.
    ///
    /// # Errors
    ///
    /// [`ContextError::AlreadyCompleted`] if the context was already
    /// committed or aborted.
    pub fn abort(&self) -> Result<(), ContextError> {
        let actions = self.complete(Completion::Aborted)?;
        debug!(context = %self.inner.id, actions = actions.len(), "Aborting transaction context");
        actions.into_iter().for_each(|action| action());
        Ok(())
    }

    fn complete(&self, outcome: Completion) -> Result<Vec<Action>, ContextError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.completion != Completion::Pending {
            return Err(ContextError::AlreadyCompleted { id: self.inner.id });
        }
        lifecycle.completion = outcome;

        let committed = std::mem::take(&mut lifecycle.on_committed);
        let aborted = std::mem::take(&mut lifecycle.on_aborted);
        Ok(match outcome {
            Completion::Committed => committed,
            _ => aborted,
        })
    }

    /// End the unit of work.
    ///
    /// Aborts the context if it is still pending, then runs the disposed
    /// actions. Later calls do nothing.
    pub fn dispose(&self) {
        if self.abort().is_ok() {
            debug!(context = %self.inner.id, "Disposed transaction context without commit");
        }

        let actions = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.disposed {
                return;
            }
            lifecycle.disposed = true;
            std::mem::take(&mut lifecycle.on_disposed)
        };
        actions.into_iter().for_each(|action| action());
    }

    /// Whether `commit()` succeeded.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.lifecycle.lock().completion == Completion::Committed
    }

    /// Whether the context was committed or aborted.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.lifecycle.lock().completion != Completion::Pending
    }

    /// Whether `dispose()` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.lock().disposed
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.inner.lifecycle.lock();
        f.debug_struct("TransactionContext")
            .field("id", &self.inner.id)
            .field("completion", &lifecycle.completion)
            .field("disposed", &lifecycle.disposed)
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if lifecycle.disposed {
            return;
        }
        lifecycle.disposed = true;

        if lifecycle.completion == Completion::Pending {
            lifecycle.completion = Completion::Aborted;
            std::mem::take(&mut lifecycle.on_aborted)
                .into_iter()
                .for_each(|action| action());
        }
        std::mem::take(&mut lifecycle.on_disposed)
            .into_iter()
            .for_each(|action| action());
    }
}

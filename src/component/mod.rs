//! # Component Runtime
//!
//! Per-session capability container. Each capability type occupies at most one
//! slot, keyed by its `TypeId`; lookups never walk an inheritance chain.
//!
//! ## Lifecycle
//! ```text
//! add:    awake(owner) -> start()
//! remove: on_destroy() -> dispose() -> dropped
//! ```
//! A session tears its set down exactly once when it reaches a terminal state;
//! after that the set is sealed and refuses new components.

pub mod builtin;

use crate::error::{FrameworkError, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};
use uuid::Uuid;

pub use builtin::{ActivityTracker, Heartbeat, PermissionGroup, PermissionLevel};

/// Upcast helper so components can be downcast to their concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An attachable capability with lifecycle hooks.
///
/// All hooks default to no-ops.
pub trait Component: AsAny + Send + Sync {
    /// Called first on attach, with the id of the owning session
    fn awake(&mut self, _owner: Uuid) {}

    /// Called right after `awake`
    fn start(&mut self) {}

    /// Called before the component is detached
    fn on_destroy(&mut self) {}

    /// Release held resources; runs after `on_destroy`
    fn dispose(&mut self) {}
}

/// One slot per capability type
pub struct ComponentSet {
    owner: Uuid,
    slots: HashMap<TypeId, (&'static str, Box<dyn Component>)>,
    order: Vec<TypeId>,
    sealed: bool,
}

impl ComponentSet {
    pub fn new(owner: Uuid) -> Self {
        Self {
            owner,
            slots: HashMap::new(),
            order: Vec::new(),
            sealed: false,
        }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Attach `component`, running `awake` then `start`.
    ///
    /// Fails with `DuplicateComponent` when the capability is already present.
    pub fn add<T: Component>(&mut self, mut component: T) -> Result<&mut T> {
        let id = TypeId::of::<T>();
        let name = short_name::<T>();
        if self.sealed {
            return Err(FrameworkError::ConnectionClosed);
        }
        if self.slots.contains_key(&id) {
            return Err(FrameworkError::DuplicateComponent(name));
        }

        component.awake(self.owner);
        component.start();
        trace!(owner = %self.owner, component = name, "Component attached");

        self.order.push(id);
        let slot = self
            .slots
            .entry(id)
            .or_insert_with(|| (name, Box::new(component)));
        let boxed: &mut dyn Component = &mut *slot.1;
        boxed
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(FrameworkError::ComponentNotFound(name))
    }

    /// Attach a default-constructed component
    pub fn add_default<T: Component + Default>(&mut self) -> Result<&mut T> {
        self.add(T::default())
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.slots.get(&TypeId::of::<T>()).and_then(|(_, c)| {
            let c: &dyn Component = &**c;
            c.as_any().downcast_ref::<T>()
        })
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.slots.get_mut(&TypeId::of::<T>()).and_then(|(_, c)| {
            let c: &mut dyn Component = &mut **c;
            c.as_any_mut().downcast_mut::<T>()
        })
    }

    pub fn has<T: Component>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Detach `T`, running `on_destroy` then `dispose`. Returns whether it was present.
    pub fn remove<T: Component>(&mut self) -> bool {
        let id = TypeId::of::<T>();
        match self.slots.remove(&id) {
            Some((name, component)) => {
                self.order.retain(|t| *t != id);
                destroy(self.owner, name, component);
                true
            }
            None => false,
        }
    }

    /// Detach everything in reverse attach order. Safe on an empty set.
    pub fn remove_all(&mut self) -> usize {
        let mut removed = 0;
        while let Some(id) = self.order.pop() {
            if let Some((name, component)) = self.slots.remove(&id) {
                destroy(self.owner, name, component);
                removed += 1;
            }
        }
        removed
    }

    /// Remove everything and refuse further attachments
    pub fn teardown(&mut self) -> usize {
        self.sealed = true;
        let removed = self.remove_all();
        if removed > 0 {
            debug!(owner = %self.owner, removed, "Components torn down");
        }
        removed
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names of attached components in attach order
    pub fn names(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id).map(|(name, _)| *name))
            .collect()
    }
}

fn destroy(owner: Uuid, name: &'static str, mut component: Box<dyn Component>) {
    component.on_destroy();
    component.dispose();
    trace!(%owner, component = name, "Component detached");
}

fn short_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Mutex-guarded component set, the shape sessions and executers expose.
///
/// Every mutation goes through one lock, so teardown is serialized against
/// add and remove.
pub struct Components {
    inner: Mutex<ComponentSet>,
}

impl Components {
    pub fn new(owner: Uuid) -> Self {
        Self {
            inner: Mutex::new(ComponentSet::new(owner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ComponentSet> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add<T: Component>(&self, component: T) -> Result<()> {
        self.lock().add(component).map(|_| ())
    }

    pub fn add_default<T: Component + Default>(&self) -> Result<()> {
        self.add(T::default())
    }

    /// Run `f` against `T` if attached
    pub fn with<T: Component, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().get::<T>().map(f)
    }

    /// Run `f` against `T` mutably if attached
    pub fn with_mut<T: Component, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.lock().get_mut::<T>().map(f)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.lock().has::<T>()
    }

    pub fn remove<T: Component>(&self) -> bool {
        self.lock().remove::<T>()
    }

    pub fn remove_all(&self) -> usize {
        self.lock().remove_all()
    }

    pub fn teardown(&self) -> usize {
        self.lock().teardown()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.lock().names()
    }
}

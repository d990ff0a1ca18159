//! Completion handles for deferred operations.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use crate::{Error, Scheduler};

type Callback<T> = Box<dyn FnOnce(Result<T, Error>)>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Settled(Result<T, Error>),
}

struct Shared<T> {
    state: RefCell<State<T>>,
    /// Runs if the last handle goes away before settlement.
    on_abandoned: RefCell<Option<Box<dyn FnOnce()>>>,
    /// A completion this one is derived from, kept alive by it.
    upstream: RefCell<Option<Box<dyn Any>>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if matches!(self.state.get_mut(), State::Pending(_)) {
            if let Some(abandoned) = self.on_abandoned.get_mut().take() {
                abandoned();
            }
        }
    }
}

/// The eventual outcome of a deferred operation.
///
/// A completion settles at most once. Callbacks registered with
/// [`Completion::on_settled`] are themselves deferred onto the scheduler, so
/// they never run inside the call that settles the completion.
pub struct Completion<T> {
    shared: Rc<Shared<T>>,
    scheduler: Scheduler,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

/// A handle that does not keep its completion alive.
pub struct WeakCompletion<T> {
    shared: Weak<Shared<T>>,
    scheduler: Scheduler,
}

impl<T> Clone for WeakCompletion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T> WeakCompletion<T> {
    /// `None` once every strong handle is gone.
    pub fn upgrade(&self) -> Option<Completion<T>> {
        Some(Completion {
            shared: self.shared.upgrade()?,
            scheduler: self.scheduler.clone(),
        })
    }
}

impl<T: Clone + 'static> Completion<T> {
    fn with_state(scheduler: &Scheduler, state: State<T>) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(state),
                on_abandoned: RefCell::new(None),
                upstream: RefCell::new(None),
            }),
            scheduler: scheduler.clone(),
        }
    }

    /// A pending completion driven by `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self::with_state(scheduler, State::Pending(Vec::new()))
    }

    /// A completion that is already settled with `result`.
    pub fn settled(scheduler: &Scheduler, result: Result<T, Error>) -> Self {
        Self::with_state(scheduler, State::Settled(result))
    }

    pub fn downgrade(&self) -> WeakCompletion<T> {
        WeakCompletion {
            shared: Rc::downgrade(&self.shared),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Run `release` if every handle is dropped while still pending.
    ///
    /// Producers that hold only a [`WeakCompletion`] use this to tear down
    /// work nobody is waiting for.
    pub fn on_abandoned(&self, release: impl FnOnce() + 'static) {
        *self.shared.on_abandoned.borrow_mut() = Some(Box::new(release));
    }

    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&self, error: Error) {
        self.settle(Err(error));
    }

    /// Settle with `result`. Later calls are ignored.
    pub fn settle(&self, result: Result<T, Error>) {
        let callbacks = {
            let mut state = self.shared.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => return,
                State::Pending(callbacks) => {
                    let callbacks = mem::take(callbacks);
                    *state = State::Settled(result.clone());
                    callbacks
                }
            }
        };
        self.shared.on_abandoned.borrow_mut().take();
        for callback in callbacks {
            let result = result.clone();
            self.scheduler.schedule(move || callback(result));
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.state.borrow(), State::Settled(_))
    }

    /// The settled result, without flushing.
    pub fn result(&self) -> Option<Result<T, Error>> {
        match &*self.shared.state.borrow() {
            State::Settled(result) => Some(result.clone()),
            State::Pending(_) => None,
        }
    }

    /// Flush the scheduler and return the outcome.
    ///
    /// Returns [`Error::Unsettled`] when the queue drained without anything
    /// settling this completion.
    pub fn wait(&self) -> Result<T, Error> {
        self.scheduler.flush();
        self.result().unwrap_or(Err(Error::Unsettled))
    }

    /// Run `callback` with the outcome once settled.
    pub fn on_settled(&self, callback: impl FnOnce(Result<T, Error>) + 'static) {
        let mut state = self.shared.state.borrow_mut();
        match &mut *state {
            State::Pending(callbacks) => callbacks.push(Box::new(callback)),
            State::Settled(result) => {
                let result = result.clone();
                self.scheduler.schedule(move || callback(result));
            }
        }
    }

    /// A completion settling with `f` applied to this one's value.
    ///
    /// The mapped completion keeps this one alive, not the other way round.
    pub fn map<U, F>(&self, f: F) -> Completion<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        let mapped = Completion::new(&self.scheduler);
        *mapped.shared.upstream.borrow_mut() = Some(Box::new(self.clone()));
        let target = mapped.downgrade();
        self.on_settled(move |result| {
            if let Some(target) = target.upgrade() {
                target.settle(result.map(f));
            }
        });
        mapped
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = matches!(*self.shared.state.borrow(), State::Settled(_));
        f.debug_struct("Completion")
            .field("settled", &settled)
            .finish()
    }
}

//! Deferred task execution.
//!
//! Nothing observable happens inside a mutating call: writes, listener
//! deliveries and completion callbacks are queued on a [`Scheduler`] and run
//! when somebody flushes it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// A FIFO of deferred tasks, shared by every handle of one app.
///
/// Cloning a `Scheduler` yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run on a later flush.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.tasks.borrow_mut().push_back(Box::new(task));
    }

    /// Run tasks until the queue is empty, including tasks queued by the
    /// tasks themselves.
    ///
    /// Flushing from inside a task is allowed; the inner flush simply keeps
    /// popping from the same queue.
    pub fn flush(&self) {
        let mut ran = 0usize;
        loop {
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        if ran > 0 {
            log::trace!("scheduler flushed {} task(s)", ran);
        }
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// True if both handles drive the same queue.
    pub fn same(&self, other: &Scheduler) -> bool {
        Rc::ptr_eq(&self.tasks, &other.tasks)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

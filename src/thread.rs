// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Thread groups.

use std::fmt;
use std::io;
use std::mem::drop;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use log::error;

/// A group of threads managed together.
///
/// The listener and every connection session run as one-shot threads
/// in a `ThreadGroup` (see [`ThreadGroup::start_oneshot`]). The group
/// counts its live threads and logs any that panic.
///
/// A `ThreadGroup` may be shut down through [`ThreadGroup::shut_down`].
/// New threads cannot be started in a `ThreadGroup` once shutdown is
/// initiated. [`ThreadGroup::await_shutdown`] can be used to wait for
/// shutdown to complete, which requires all threads to have exited.
/// Long-running tasks should therefore hold an [`Arc`] reference to the
/// group and check [`ThreadGroup::is_shutting_down`] at convenient
/// points so they can exit early.
pub struct ThreadGroup {
    records: Mutex<GroupRecords>,

    /// Allows threads to wait for group shutdown events. This is used
    /// with the `records` mutex. All waiting threads are notified when
    /// (1) shutdown is initiated and (2) shutdown is complete.
    shutdown_wakeup: Condvar,
}

/// The internal records of a [`ThreadGroup`].
#[derive(Default)]
struct GroupRecords {
    thread_count: usize,
    shutting_down: bool,
}

impl ThreadGroup {
    /// Creates a new thread group.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(GroupRecords::default()),
            shutdown_wakeup: Condvar::new(),
        })
    }

    /// Starts a one-shot thread in the `ThreadGroup`. This thread will
    /// execute `task` once. The task will not be restarted, even if the
    /// thread panics.
    pub fn start_oneshot<F>(self: &Arc<Self>, name: Option<String>, task: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut records = self.records.lock().unwrap();
        if records.shutting_down {
            Err(Error::ShuttingDown)
        } else {
            start_oneshot(self.clone(), &mut records, name, task).map_err(Into::into)
        }
    }

    /// Shuts down the `ThreadGroup`.
    pub fn shut_down(&self) {
        let mut records = self.records.lock().unwrap();
        records.shutting_down = true;
        self.shutdown_wakeup.notify_all();
    }

    /// Waits for the `ThreadGroup` to shut down. This is defined as (1)
    /// shutdown having been initiated ([`ThreadGroup::shut_down`]) and
    /// (2) the thread count having dropped to zero. Note that if this
    /// is called from a thread within the group, a deadlock will occur
    /// (since the thread count will never become zero).
    pub fn await_shutdown(&self) {
        let records = self.records.lock().unwrap();
        let _guard = self
            .shutdown_wakeup
            .wait_while(records, |r| !r.shutting_down || r.thread_count > 0)
            .unwrap();
    }

    /// Returns whether the `ThreadGroup` is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.records.lock().unwrap().shutting_down
    }

    /// Returns the number of live threads in the group.
    pub fn thread_count(&self) -> usize {
        self.records.lock().unwrap().thread_count
    }
}

/// A handle to be owned by a one-shot thread. When dropped (when the
/// thread exits or panics), it will perform necessary clean-up actions.
struct OneshotHandle {
    group: Arc<ThreadGroup>,
    parent: ThreadId,
}

/// The implementation of one-shot thread creation.
fn start_oneshot<F>(
    group: Arc<ThreadGroup>,
    records: &mut MutexGuard<GroupRecords>,
    name: Option<String>,
    task: F,
) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    records.thread_count += 1;
    let handle = OneshotHandle {
        group,
        parent: thread::current().id(),
    };
    let result = thread::Builder::new()
        .name(name.unwrap_or_else(|| "anonymous".to_owned()))
        .spawn(move || {
            task();
            drop(handle);
        });
    if result.is_err() {
        records.thread_count -= 1;
    }
    result.and(Ok(()))
}

impl Drop for OneshotHandle {
    fn drop(&mut self) {
        let current_thread = thread::current();

        // If we are being dropped in the parent thread, then the new
        // thread failed to start (on the OS level). In this case,
        // start_oneshot handles any necessary clean-up. This is
        // important, since otherwise we would be locking the records
        // mutex twice from the same thread!
        if current_thread.id() == self.parent {
            return;
        }

        if thread::panicking() {
            let thread_name = current_thread.name().unwrap_or("anonymous");
            error!("Thread {} panicked", thread_name);
        }

        let mut records = self.group.records.lock().unwrap();
        records.thread_count -= 1;
        if records.shutting_down && records.thread_count == 0 {
            self.group.shutdown_wakeup.notify_all();
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error type for [`ThreadGroup`] operations.
#[derive(Debug)]
pub enum Error {
    /// An OS-level error occurred during the creation of a thread.
    Io(io::Error),

    /// The [`ThreadGroup`] is shutting down.
    ShuttingDown,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::ShuttingDown => f.write_str("thread group is shutting down"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

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

//! The backend handle shared by all connection sessions.

use std::sync::{Arc, Mutex, PoisonError};

use log::error;

use crate::backend::{self, Backend, BackendFactory};

/// A single [`Backend`] handle used by every session for ordinary
/// queries, behind one mutex.
///
/// Only one backend call is ever in flight through the handle. When a
/// call fails, the handle is dropped; the next caller of
/// [`SharedBackend::with`] opens a fresh one through the factory.
pub struct SharedBackend {
    factory: Arc<dyn BackendFactory>,
    handle: Mutex<Option<Box<dyn Backend>>>,
}

impl SharedBackend {
    /// Creates a `SharedBackend` without opening a handle yet.
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            handle: Mutex::new(None),
        }
    }

    /// Opens the handle now rather than on first use. Does nothing if
    /// it is already open.
    pub fn launch(&self) -> Result<(), backend::Error> {
        let mut handle = self.lock();
        if handle.is_none() {
            *handle = Some(self.factory.make()?);
        }
        Ok(())
    }

    /// Returns whether a handle is currently open.
    pub fn is_launched(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs `f` with exclusive access to the handle, opening one first
    /// if necessary. If `f` fails, the handle is discarded.
    pub fn with<T, F>(&self, f: F) -> Result<T, backend::Error>
    where
        F: FnOnce(&mut dyn Backend) -> Result<T, backend::Error>,
    {
        let mut handle = self.lock();
        let mut backend = match handle.take() {
            Some(backend) => backend,
            None => {
                error!("TCP server is without backend connections, launching");
                self.factory.make()?
            }
        };
        let result = f(backend.as_mut());
        if result.is_ok() {
            *handle = Some(backend);
        }
        result
    }

    /// Returns the factory handles are made with, for callers that need
    /// a dedicated handle of their own.
    pub fn factory(&self) -> &dyn BackendFactory {
        self.factory.as_ref()
    }

    // A panic while the lock is held happens between take() and the
    // put-back, so a poisoned mutex always holds None.
    fn lock(&self) -> std::sync::MutexGuard<Option<Box<dyn Backend>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::name::Name;
    use crate::rr::{Record, SoaData};

    /// A factory of empty backends that counts how many it made.
    #[derive(Default)]
    struct CountingFactory {
        made: AtomicUsize,
    }

    struct NullBackend;

    impl Backend for NullBackend {
        fn get_soa(&mut self, _: &Name) -> Result<Option<SoaData>, backend::Error> {
            Ok(None)
        }

        fn list(&mut self, _: &Name, _: u32) -> Result<bool, backend::Error> {
            Ok(false)
        }

        fn get(&mut self) -> Result<Option<Record>, backend::Error> {
            Err(backend::Error::NotListing)
        }

        fn check_acl(&mut self, _: &str, _: &Name, _: IpAddr) -> Result<bool, backend::Error> {
            Ok(false)
        }

        fn lookup(&mut self, _: &Name) -> Result<Vec<Record>, backend::Error> {
            Ok(Vec::new())
        }
    }

    impl BackendFactory for CountingFactory {
        fn make(&self) -> Result<Box<dyn Backend>, backend::Error> {
            self.made.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullBackend))
        }
    }

    struct BrokenFactory;

    impl BackendFactory for BrokenFactory {
        fn make(&self) -> Result<Box<dyn Backend>, backend::Error> {
            Err(backend::Error::Unavailable("no database".to_owned()))
        }
    }

    #[test]
    fn handle_is_reused_after_success() {
        let factory = Arc::new(CountingFactory::default());
        let shared = SharedBackend::new(factory.clone());
        assert!(!shared.is_launched());
        for _ in 0..3 {
            let soa = shared.with(|b| b.get_soa(&Name::root())).unwrap();
            assert!(soa.is_none());
        }
        assert!(shared.is_launched());
        assert_eq!(factory.made.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_is_discarded_after_failure() {
        let factory = Arc::new(CountingFactory::default());
        let shared = SharedBackend::new(factory.clone());
        shared.launch().unwrap();
        let err = shared.with(|b| b.get()).unwrap_err();
        assert_eq!(err, backend::Error::NotListing);
        assert!(!shared.is_launched());
        shared.with(|b| b.lookup(&Name::root())).unwrap();
        assert_eq!(factory.made.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn factory_failures_are_reported() {
        let shared = SharedBackend::new(Arc::new(BrokenFactory));
        assert!(shared.launch().is_err());
        assert!(matches!(
            shared.with(|b| b.get_soa(&Name::root())),
            Err(backend::Error::Unavailable(_))
        ));
        assert!(!shared.is_launched());
    }
}

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

use std::io;
use std::net::{self, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use super::TcpListenerApi;

/// How long to sleep between sweeps over the listeners.
const SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// A TCP listener implementation using the Rust standard library. Since
/// readiness cannot be waited on, every listener is reported ready
/// after a short sleep and the non-blocking `accept` sorts it out.
pub struct TcpListener(net::TcpListener);

impl TcpListenerApi for TcpListener {
    fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self(listener))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }

    fn poll_accept(listeners: &[Self], timeout: Duration) -> io::Result<Vec<bool>> {
        thread::sleep(SWEEP_INTERVAL.min(timeout));
        Ok(vec![true; listeners.len()])
    }

    fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.0.accept()
    }

    fn is_out_of_descriptors(_err: &io::Error) -> bool {
        false
    }
}

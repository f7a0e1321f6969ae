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

//! Forwarding of recursive queries to a recursor over TCP.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use super::{Error, ErrorKind, Result};
use crate::io::framing::{read_frame, write_frame};
use crate::message::MAX_MESSAGE_SIZE;

/// Sends `query` to `recursor` over a fresh connection and returns its
/// answer unchanged. Connecting, writing and reading are each bounded
/// by `timeout`.
pub fn forward(recursor: SocketAddr, query: &[u8], timeout: Duration) -> Result<Vec<u8>> {
    let mut upstream = TcpStream::connect_timeout(&recursor, timeout).map_err(|e| {
        Error::transport(format!("unable to connect to recursor {}", recursor), e)
    })?;
    write_frame(&mut upstream, query, timeout)?;
    read_frame(&mut upstream, timeout, MAX_MESSAGE_SIZE)?.ok_or_else(|| {
        Error::new(
            ErrorKind::Transport,
            format!("recursor {} closed the connection without answering", recursor),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn answers_are_relayed_verbatim() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let recursor = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let query = read_frame(&mut conn, TIMEOUT, MAX_MESSAGE_SIZE)
                .unwrap()
                .unwrap();
            let mut answer = query.clone();
            answer.extend_from_slice(b"answer");
            write_frame(&mut conn, &answer, TIMEOUT).unwrap();
        });
        let answer = forward(addr, b"question", TIMEOUT).unwrap();
        assert_eq!(answer, b"questionanswer");
        recursor.join().unwrap();
    }

    #[test]
    fn silent_recursors_are_transport_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let recursor = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            drop(conn);
        });
        let err = forward(addr, b"question", TIMEOUT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        recursor.join().unwrap();
    }

    #[test]
    fn unreachable_recursors_are_transport_errors() {
        // Bind and drop a listener to find a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = forward(addr, b"question", TIMEOUT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}

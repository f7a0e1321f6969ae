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

//! Length-prefixed DNS message framing over TCP ([RFC 1035 § 4.2.2]).
//!
//! Every read and write is bounded by a deadline, so a peer that
//! stalls cannot hold a connection (and its admission slot) forever.
//!
//! [RFC 1035 § 4.2.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.2.2

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::message::MAX_MESSAGE_SIZE;
use crate::server::{Error, ErrorKind, Result};

/// The largest query we accept over TCP. Longer frames are dropped by
/// closing the connection.
pub const MAX_QUERY_LEN: usize = 511;

/// Reads one length-prefixed message from `stream`.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before
/// sending anything. The whole frame must arrive within `timeout`, and
/// frames declaring more than `max_len` octets are rejected without
/// reading their bodies.
pub fn read_frame(
    stream: &mut TcpStream,
    timeout: Duration,
    max_len: usize,
) -> Result<Option<Vec<u8>>> {
    let deadline = Instant::now() + timeout;

    let mut prefix = [0; 2];
    match read_full(stream, &mut prefix, deadline)? {
        0 => return Ok(None),
        2 => (),
        _ => {
            return Err(Error::new(
                ErrorKind::Transport,
                "connection closed in the middle of a length prefix",
            ))
        }
    }

    let len = u16::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(Error::new(
            ErrorKind::Transport,
            format!("overly large message ({} octets), dropping", len),
        ));
    }

    let mut message = vec![0; len];
    if read_full(stream, &mut message, deadline)? < len {
        return Err(Error::new(
            ErrorKind::Transport,
            "connection closed in the middle of a message",
        ));
    }
    Ok(Some(message))
}

/// Writes `message` to `stream` with its length prefix, all within
/// `timeout`.
pub fn write_frame(stream: &mut TcpStream, message: &[u8], timeout: Duration) -> Result<()> {
    if message.len() > MAX_MESSAGE_SIZE {
        return Err(Error::new(
            ErrorKind::Protocol,
            format!("message of {} octets is too long to frame", message.len()),
        ));
    }

    // The prefix and message go out in one buffer so that they are not
    // split into separate segments.
    let mut frame = Vec::with_capacity(2 + message.len());
    frame.extend_from_slice(&(message.len() as u16).to_be_bytes());
    frame.extend_from_slice(message);

    let deadline = Instant::now() + timeout;
    let mut written = 0;
    while written < frame.len() {
        let remaining = compute_timeout(deadline).ok_or_else(timed_out)?;
        stream
            .set_write_timeout(Some(remaining))
            .map_err(|e| Error::transport("failed to set the write timeout", e))?;
        match stream.write(&frame[written..]) {
            Ok(0) => {
                return Err(Error::new(
                    ErrorKind::Transport,
                    "connection closed while writing",
                ))
            }
            Ok(n) => written += n,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(Error::transport("failed to write", e)),
        }
    }
    Ok(())
}

/// Reads until `buf` is full, the peer closes the connection, or the
/// deadline passes (which is an error). Returns the number of octets
/// read.
fn read_full(stream: &mut TcpStream, buf: &mut [u8], deadline: Instant) -> Result<usize> {
    let mut n_read = 0;
    while n_read < buf.len() {
        let remaining = compute_timeout(deadline).ok_or_else(timed_out)?;
        stream
            .set_read_timeout(Some(remaining))
            .map_err(|e| Error::transport("failed to set the read timeout", e))?;
        match stream.read(&mut buf[n_read..]) {
            Ok(0) => break,
            Ok(n) => n_read += n,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(Error::transport("failed to read", e)),
        }
    }
    Ok(n_read)
}

/// Computes the time until the deadline. Returns [`None`] if the
/// deadline has been reached.
fn compute_timeout(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|t| !t.is_zero())
}

/// Whether an I/O error just means "try again". Socket timeouts surface
/// as [`io::ErrorKind::WouldBlock`] or [`io::ErrorKind::TimedOut`]
/// depending on the platform; the deadline check at the top of the
/// loops turns them into a timeout once it has really passed.
fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn timed_out() -> Error {
    Error::new(ErrorKind::Transport, "timed out")
}

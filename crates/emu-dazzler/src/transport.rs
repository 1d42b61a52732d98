//! TCP transport for the Dazzler wire protocol.
//!
//! The host emulator connects over TCP and streams packets; we stream
//! replies and device reports back on the same socket. A dedicated reader
//! thread pushes inbound bytes into a capped queue drained by the frame
//! loop, so slow frames never stall the socket; on overflow the oldest
//! bytes are shed (the stream resynchronizes on packet headers) and a
//! counter records the loss. One connection at a time; on disconnect the
//! listener goes back to accepting.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Inbound queue capacity in bytes. A full 2 KB frame upload fits with room
/// for control traffic.
const QUEUE_CAPACITY: usize = 4096;

pub struct Transport {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    writer: Arc<Mutex<Option<TcpStream>>>,
    dropped: Arc<AtomicU64>,
    local_addr: std::net::SocketAddr,
}

impl Transport {
    /// Bind `addr` and start the accept/reader thread.
    pub fn listen(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        eprintln!("Listening on {local_addr}");

        let inbound = Arc::new(Mutex::new(VecDeque::new()));
        let writer = Arc::new(Mutex::new(None::<TcpStream>));
        let dropped = Arc::new(AtomicU64::new(0));

        let inbound_handle = Arc::clone(&inbound);
        let writer_handle = Arc::clone(&writer);
        let dropped_handle = Arc::clone(&dropped);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let peer = stream
                    .peer_addr()
                    .map_or_else(|_| String::from("unknown"), |a| a.to_string());
                eprintln!("Host connected from {peer}");

                if let Ok(clone) = stream.try_clone()
                    && let Ok(mut guard) = writer_handle.lock()
                {
                    *guard = Some(clone);
                }

                let mut buf = [0u8; 512];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let Ok(mut queue) = inbound_handle.lock() else {
                                return;
                            };
                            queue.extend(&buf[..n]);
                            // Frame loop fell behind: shed the oldest bytes
                            while queue.len() > QUEUE_CAPACITY {
                                queue.pop_front();
                                dropped_handle.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }

                eprintln!("Host disconnected");
                if let Ok(mut guard) = writer_handle.lock() {
                    *guard = None;
                }
            }
        });

        Ok(Self {
            inbound,
            writer,
            dropped,
            local_addr,
        })
    }

    /// The address actually bound (resolves port 0 to the assigned port).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Pop up to `buf.len()` inbound bytes. Returns the count.
    pub fn recv(&mut self, buf: &mut [u8]) -> usize {
        let Ok(mut queue) = self.inbound.lock() else {
            return 0;
        };
        let mut count = 0;
        while count < buf.len() {
            let Some(byte) = queue.pop_front() else { break };
            buf[count] = byte;
            count += 1;
        }
        count
    }

    /// Write reply/report bytes to the connected host. Bytes are discarded
    /// when no host is connected; a write error tears the connection down
    /// (the reader thread notices via its own EOF).
    pub fn send(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if let Some(stream) = guard.as_mut()
            && stream.write_all(bytes).is_err()
        {
            *guard = None;
        }
    }

    /// Whether a host is currently connected.
    pub fn connected(&self) -> bool {
        self.writer.lock().is_ok_and(|guard| guard.is_some())
    }

    /// Inbound bytes shed because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

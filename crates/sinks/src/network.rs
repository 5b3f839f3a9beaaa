//! Network sink
//!
//! Ships records to a remote collector over TCP, each framed with a 4-byte
//! big-endian length prefix so the receiver can split the stream without
//! knowing record boundaries. The connection is dialed lazily on the first
//! write; a failed write drops the connection and retries once on a fresh
//! one before surfacing the error.

use std::io::{self, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use timber_core::Sink;

/// Default socket write buffer
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Length-delimited TCP shipper
pub struct NetworkSink {
    addr: String,
    conn: Mutex<Option<BufWriter<TcpStream>>>,
    buffer_size: AtomicUsize,
}

impl NetworkSink {
    /// Sink shipping to `addr` (`host:port`); no connection is made until
    /// the first write.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
            buffer_size: AtomicUsize::new(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Whether a connection is currently established
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn dial(&self) -> io::Result<BufWriter<TcpStream>> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true)?;
        Ok(BufWriter::with_capacity(
            self.buffer_size.load(Ordering::Relaxed),
            stream,
        ))
    }

    fn write_framed(conn: &mut BufWriter<TcpStream>, record: &[u8]) -> io::Result<()> {
        let len = u32::try_from(record.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record exceeds u32 length"))?;
        conn.write_all(&len.to_be_bytes())?;
        conn.write_all(record)?;
        Ok(())
    }
}

impl Sink for NetworkSink {
    fn write(&self, record: &[u8]) -> io::Result<()> {
        let mut slot = self.conn.lock();
        if slot.is_none() {
            *slot = Some(self.dial()?);
        }

        if let Some(conn) = slot.as_mut() {
            match Self::write_framed(conn, record) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(addr = %self.addr, error = %e, "network write failed, reconnecting");
                    *slot = None;
                }
            }
        }

        // One reconnect attempt; a second failure surfaces to the caller.
        let mut conn = self.dial()?;
        Self::write_framed(&mut conn, record)?;
        *slot = Some(conn);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        let mut slot = self.conn.lock();
        match slot.as_mut() {
            Some(conn) => conn.flush(),
            None => Ok(()),
        }
    }

    fn close(&self) -> io::Result<()> {
        let mut slot = self.conn.lock();
        if let Some(mut conn) = slot.take() {
            conn.flush()?;
            conn.get_ref().shutdown(Shutdown::Both)?;
        }
        Ok(())
    }

    fn set_buffer_size(&self, bytes: usize) {
        // Applies from the next (re)connect.
        self.buffer_size.store(bytes.max(1), Ordering::Relaxed);
    }
}

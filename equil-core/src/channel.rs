//! Serialization channels.
//!
//! Entities, equation systems and solvers persist and move between partitions
//! by writing their state as a flat, ordered sequence of integer and double
//! arrays through a [`Channel`], and reading the same sequence back in the
//! same order. The protocol is not self-describing: the receiver must already
//! know the concrete type (see [`crate::broker`]) and the array lengths.
//!
//! # Channels
//!
//! - [`MemoryChannel`]: in-process FIFO, used for checkpoints held in memory.
//! - [`PartitionChannel`]: one end of a synchronous point-to-point link between
//!   partitions running on different threads.
//! - [`StreamChannel`]: bincode frames over any byte stream (files, sockets,
//!   `Cursor<Vec<u8>>`).

use crate::broker::ObjectBroker;
use crate::error::{Error, Result};
use crate::types::ClassTag;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};

/// Transport for serialized state.
///
/// Every receive names the array length agreed on out of band; a message of
/// any other length, kind or tag is a [`Error::Channel`]. The owned receives
/// hand back the message's own storage, so no buffer is ever sized from a
/// count read off the wire.
pub trait Channel {
    /// Send an integer array.
    fn send_id(&mut self, db_tag: i32, commit_tag: i32, data: &[i32]) -> Result<()>;

    /// Send a double array.
    fn send_vector(&mut self, db_tag: i32, commit_tag: i32, data: &[f64]) -> Result<()>;

    /// Receive an integer array that must hold exactly `len` values.
    fn recv_ids(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<i32>>;

    /// Receive a double array that must hold exactly `len` values.
    fn recv_values(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<f64>>;

    /// Receive an integer array into `data`.
    fn recv_id(&mut self, db_tag: i32, commit_tag: i32, data: &mut [i32]) -> Result<()> {
        let values = self.recv_ids(db_tag, commit_tag, data.len())?;
        data.copy_from_slice(&values);
        Ok(())
    }

    /// Receive a double array into `data`.
    fn recv_vector(&mut self, db_tag: i32, commit_tag: i32, data: &mut [f64]) -> Result<()> {
        let values = self.recv_values(db_tag, commit_tag, data.len())?;
        data.copy_from_slice(&values);
        Ok(())
    }

    /// Send a dense matrix (column-major values; shape agreed out of band).
    fn send_matrix(&mut self, db_tag: i32, commit_tag: i32, data: &DMatrix<f64>) -> Result<()> {
        self.send_vector(db_tag, commit_tag, data.as_slice())
    }

    /// Receive a dense matrix into a pre-shaped `data`.
    fn recv_matrix(&mut self, db_tag: i32, commit_tag: i32, data: &mut DMatrix<f64>) -> Result<()> {
        self.recv_vector(db_tag, commit_tag, data.as_mut_slice())
    }
}

/// State that can be written to and rebuilt from a [`Channel`].
///
/// `recv_self(send_self(e))` must reproduce every observable field of `e`.
pub trait Movable {
    /// Concrete type identifier sent ahead of the object.
    fn class_tag(&self) -> ClassTag;

    /// Database tag used to key messages for this object.
    fn db_tag(&self) -> i32 {
        0
    }

    /// Write the full reconstructable state.
    fn send_self(&self, commit_tag: i32, channel: &mut dyn Channel) -> Result<()>;

    /// Rebuild state from the channel.
    ///
    /// Implementations read into local buffers and validate before assigning,
    /// so an error leaves the receiver unchanged.
    fn recv_self(
        &mut self,
        commit_tag: i32,
        channel: &mut dyn Channel,
        broker: &dyn ObjectBroker,
    ) -> Result<()>;
}

/// Payload of a single channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Integer array.
    Id(Vec<i32>),
    /// Double array.
    Vector(Vec<f64>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Id(_) => "id",
            Payload::Vector(_) => "vector",
        }
    }

    fn len(&self) -> usize {
        match self {
            Payload::Id(v) => v.len(),
            Payload::Vector(v) => v.len(),
        }
    }
}

/// A tagged message as stored or transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub db_tag: i32,
    pub commit_tag: i32,
    pub payload: Payload,
}

impl Message {
    /// Check the message against what the receiver expects.
    fn check(&self, db_tag: i32, commit_tag: i32, kind: &str, len: usize) -> Result<()> {
        if self.db_tag != db_tag || self.commit_tag != commit_tag {
            return Err(Error::Channel(format!(
                "expected message ({db_tag}, {commit_tag}), found ({}, {})",
                self.db_tag, self.commit_tag
            )));
        }
        if self.payload.kind() != kind {
            return Err(Error::Channel(format!(
                "expected {kind} message, found {}",
                self.payload.kind()
            )));
        }
        if self.payload.len() != len {
            return Err(Error::Channel(format!(
                "expected {kind} of length {len}, found {}",
                self.payload.len()
            )));
        }
        Ok(())
    }

    fn into_ids(self) -> Vec<i32> {
        match self.payload {
            Payload::Id(values) => values,
            Payload::Vector(_) => Vec::new(),
        }
    }

    fn into_values(self) -> Vec<f64> {
        match self.payload {
            Payload::Vector(values) => values,
            Payload::Id(_) => Vec::new(),
        }
    }
}

/// In-process FIFO channel.
///
/// Messages are consumed in the order they were sent. A message that does not
/// match the receiver's expectation stays at the front of the queue.
#[derive(Debug, Default, Clone)]
pub struct MemoryChannel {
    queue: VecDeque<Message>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drop all pending messages.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    fn push(&mut self, db_tag: i32, commit_tag: i32, payload: Payload) {
        self.queue.push_back(Message {
            db_tag,
            commit_tag,
            payload,
        });
    }

    fn pop_checked(&mut self, db_tag: i32, commit_tag: i32, kind: &str, len: usize) -> Result<Message> {
        let front = self
            .queue
            .front()
            .ok_or_else(|| Error::Channel("no message pending".into()))?;
        front.check(db_tag, commit_tag, kind, len)?;
        self.queue
            .pop_front()
            .ok_or_else(|| Error::Channel("no message pending".into()))
    }
}

impl Channel for MemoryChannel {
    fn send_id(&mut self, db_tag: i32, commit_tag: i32, data: &[i32]) -> Result<()> {
        self.push(db_tag, commit_tag, Payload::Id(data.to_vec()));
        Ok(())
    }

    fn send_vector(&mut self, db_tag: i32, commit_tag: i32, data: &[f64]) -> Result<()> {
        self.push(db_tag, commit_tag, Payload::Vector(data.to_vec()));
        Ok(())
    }

    fn recv_ids(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<i32>> {
        Ok(self.pop_checked(db_tag, commit_tag, "id", len)?.into_ids())
    }

    fn recv_values(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<f64>> {
        Ok(self.pop_checked(db_tag, commit_tag, "vector", len)?.into_values())
    }
}

/// One end of a point-to-point link between two partitions.
///
/// Sends never block; receives block until the peer sends or hangs up. A
/// hung-up peer is reported as [`Error::Channel`].
#[derive(Debug)]
pub struct PartitionChannel {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl PartitionChannel {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel();
        let (tx_b, rx_a) = mpsc::channel();
        (
            Self { tx: tx_a, rx: rx_a },
            Self { tx: tx_b, rx: rx_b },
        )
    }

    fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Channel("peer partition hung up".into()))
    }

    fn recv_checked(&self, db_tag: i32, commit_tag: i32, kind: &str, len: usize) -> Result<Message> {
        let message = self
            .rx
            .recv()
            .map_err(|_| Error::Channel("peer partition hung up".into()))?;
        message.check(db_tag, commit_tag, kind, len)?;
        Ok(message)
    }
}

impl Channel for PartitionChannel {
    fn send_id(&mut self, db_tag: i32, commit_tag: i32, data: &[i32]) -> Result<()> {
        self.send(Message {
            db_tag,
            commit_tag,
            payload: Payload::Id(data.to_vec()),
        })
    }

    fn send_vector(&mut self, db_tag: i32, commit_tag: i32, data: &[f64]) -> Result<()> {
        self.send(Message {
            db_tag,
            commit_tag,
            payload: Payload::Vector(data.to_vec()),
        })
    }

    fn recv_ids(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<i32>> {
        Ok(self.recv_checked(db_tag, commit_tag, "id", len)?.into_ids())
    }

    fn recv_values(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<f64>> {
        Ok(self.recv_checked(db_tag, commit_tag, "vector", len)?.into_values())
    }
}

fn map_bincode_error(e: bincode::Error) -> Error {
    match *e {
        bincode::ErrorKind::Io(io) => Error::Io(io),
        other => Error::Channel(format!("malformed frame: {other}")),
    }
}

/// Binary channel over a byte stream.
///
/// Each message is one bincode-encoded [`Message`] frame. A frame that does
/// not match the receiver's expectation is consumed and reported as
/// [`Error::Channel`].
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
}

impl<S> StreamChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Mutable access to the underlying stream (e.g. to rewind a cursor).
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the channel and return the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> StreamChannel<S> {
    fn write_frame(&mut self, message: &Message) -> Result<()> {
        bincode::serialize_into(&mut self.stream, message).map_err(map_bincode_error)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_frame(&mut self, db_tag: i32, commit_tag: i32, kind: &str, len: usize) -> Result<Message> {
        let message: Message =
            bincode::deserialize_from(&mut self.stream).map_err(map_bincode_error)?;
        message.check(db_tag, commit_tag, kind, len)?;
        Ok(message)
    }
}

impl<S: Read + Write> Channel for StreamChannel<S> {
    fn send_id(&mut self, db_tag: i32, commit_tag: i32, data: &[i32]) -> Result<()> {
        self.write_frame(&Message {
            db_tag,
            commit_tag,
            payload: Payload::Id(data.to_vec()),
        })
    }

    fn send_vector(&mut self, db_tag: i32, commit_tag: i32, data: &[f64]) -> Result<()> {
        self.write_frame(&Message {
            db_tag,
            commit_tag,
            payload: Payload::Vector(data.to_vec()),
        })
    }

    fn recv_ids(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<i32>> {
        Ok(self.read_frame(db_tag, commit_tag, "id", len)?.into_ids())
    }

    fn recv_values(&mut self, db_tag: i32, commit_tag: i32, len: usize) -> Result<Vec<f64>> {
        Ok(self.read_frame(db_tag, commit_tag, "vector", len)?.into_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_memory_channel_fifo() {
        let mut channel = MemoryChannel::new();
        channel.send_id(0, 7, &[1, 2, 3]).unwrap();
        channel.send_vector(0, 7, &[0.5, -1.5]).unwrap();
        assert_eq!(channel.pending(), 2);

        let mut ids = [0; 3];
        channel.recv_id(0, 7, &mut ids).unwrap();
        assert_eq!(ids, [1, 2, 3]);

        let mut values = [0.0; 2];
        channel.recv_vector(0, 7, &mut values).unwrap();
        assert_eq!(values, [0.5, -1.5]);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_memory_channel_mismatch_keeps_message() {
        let mut channel = MemoryChannel::new();
        channel.send_vector(0, 1, &[1.0, 2.0]).unwrap();

        // Wrong length: error, message not consumed, buffer untouched
        let mut short = [9.0; 1];
        assert!(channel.recv_vector(0, 1, &mut short).is_err());
        assert_eq!(short, [9.0]);
        assert_eq!(channel.pending(), 1);

        // Wrong kind
        let mut ids = [0; 2];
        assert!(channel.recv_id(0, 1, &mut ids).is_err());

        // Wrong commit tag
        let mut values = [0.0; 2];
        assert!(channel.recv_vector(0, 2, &mut values).is_err());

        channel.recv_vector(0, 1, &mut values).unwrap();
        assert_eq!(values, [1.0, 2.0]);
    }

    #[test]
    fn test_memory_channel_empty() {
        let mut channel = MemoryChannel::new();
        let mut ids = [0; 1];
        let err = channel.recv_id(0, 0, &mut ids).unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
        assert!(err.status() < 0);
    }

    #[test]
    fn test_matrix_roundtrip_shape_agreed() {
        let mut channel = MemoryChannel::new();
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        channel.send_matrix(0, 0, &m).unwrap();

        let mut received = DMatrix::zeros(2, 3);
        channel.recv_matrix(0, 0, &mut received).unwrap();
        assert_eq!(received, m);
    }

    #[test]
    fn test_partition_channel_across_threads() {
        let (mut a, mut b) = PartitionChannel::pair();

        let handle = std::thread::spawn(move || {
            let mut buf = [0.0; 3];
            b.recv_vector(0, 4, &mut buf).unwrap();
            let doubled: Vec<f64> = buf.iter().map(|v| v * 2.0).collect();
            b.send_vector(0, 4, &doubled).unwrap();
        });

        a.send_vector(0, 4, &[1.0, 2.0, 3.0]).unwrap();
        let mut reply = [0.0; 3];
        a.recv_vector(0, 4, &mut reply).unwrap();
        handle.join().unwrap();

        assert_eq!(reply, [2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_partition_channel_hung_up_peer() {
        let (mut a, b) = PartitionChannel::pair();
        drop(b);
        assert!(a.send_id(0, 0, &[1]).is_err());
        let mut buf = [0; 1];
        assert!(matches!(a.recv_id(0, 0, &mut buf), Err(Error::Channel(_))));
    }

    #[test]
    fn test_stream_channel_roundtrip() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::new()));
        channel.send_id(3, 11, &[-1, 0, 42]).unwrap();
        channel.send_vector(3, 11, &[f64::MIN_POSITIVE, -0.0, 1e300]).unwrap();

        channel.get_mut().set_position(0);

        let mut ids = [0; 3];
        channel.recv_id(3, 11, &mut ids).unwrap();
        assert_eq!(ids, [-1, 0, 42]);

        let mut values = [0.0; 3];
        channel.recv_vector(3, 11, &mut values).unwrap();
        assert_eq!(values[0], f64::MIN_POSITIVE);
        assert_eq!(values[1].to_bits(), (-0.0f64).to_bits());
        assert_eq!(values[2], 1e300);
    }

    #[test]
    fn test_stream_channel_truncated() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::new()));
        channel.send_vector(0, 0, &[1.0, 2.0]).unwrap();

        let mut bytes = channel.into_inner().into_inner();
        bytes.truncate(bytes.len() - 3);

        let mut channel = StreamChannel::new(Cursor::new(bytes));
        let mut values = [0.0; 2];
        assert!(matches!(
            channel.recv_vector(0, 0, &mut values),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_stream_channel_oversized_length_prefix() {
        // db_tag, commit_tag, Payload::Id variant, then a 2^40 element count
        // with no data behind it.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());

        let mut channel = StreamChannel::new(Cursor::new(bytes));
        assert!(channel.recv_ids(0, 0, 2).is_err());
    }

    #[test]
    fn test_owned_receive_checks_length() {
        let mut channel = MemoryChannel::new();
        channel.send_id(0, 0, &[4, 5]).unwrap();
        assert!(matches!(channel.recv_ids(0, 0, 1 << 40), Err(Error::Channel(_))));
        assert_eq!(channel.recv_ids(0, 0, 2).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_stream_channel_wrong_kind() {
        let mut channel = StreamChannel::new(Cursor::new(Vec::new()));
        channel.send_id(0, 0, &[1, 2]).unwrap();
        channel.get_mut().set_position(0);

        let mut values = [0.0; 2];
        assert!(matches!(
            channel.recv_vector(0, 0, &mut values),
            Err(Error::Channel(_))
        ));
    }
}

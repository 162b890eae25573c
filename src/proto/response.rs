use super::request::OpCode;
use crate::{KeeperState, Stat, WatchedEvent, WatchedEventType};
use byteorder::{BigEndian, ReadBytesExt};
use failure::format_err;
use std::io;

#[derive(Debug)]
pub(crate) enum Response {
    Connect {
        protocol_version: i32,
        timeout: i32,
        session_id: i64,
        password: Vec<u8>,
        read_only: bool,
    },
    Stat(Stat),
    GetData {
        bytes: Vec<u8>,
        stat: Stat,
    },
    Empty,
    Strings(Vec<String>),
    String(String),
}

pub(crate) trait ReadFrom: Sized {
    fn read_from(read: &mut &[u8]) -> io::Result<Self>;
}

impl ReadFrom for Stat {
    fn read_from(read: &mut &[u8]) -> io::Result<Stat> {
        Ok(Stat {
            czxid: read.read_i64::<BigEndian>()?,
            mzxid: read.read_i64::<BigEndian>()?,
            ctime: read.read_i64::<BigEndian>()?,
            mtime: read.read_i64::<BigEndian>()?,
            version: read.read_i32::<BigEndian>()?,
            cversion: read.read_i32::<BigEndian>()?,
            aversion: read.read_i32::<BigEndian>()?,
            ephemeral_owner: read.read_i64::<BigEndian>()?,
            data_length: read.read_i32::<BigEndian>()?,
            num_children: read.read_i32::<BigEndian>()?,
            pzxid: read.read_i64::<BigEndian>()?,
        })
    }
}

impl ReadFrom for WatchedEvent {
    fn read_from(read: &mut &[u8]) -> io::Result<WatchedEvent> {
        let wtype = read.read_i32::<BigEndian>()?;
        let state = read.read_i32::<BigEndian>()?;
        let path = read.read_string()?;
        let event_type = WatchedEventType::from_code(wtype).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown event type {}", wtype),
            )
        })?;
        let keeper_state = KeeperState::from_code(state).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown keeper state {}", state),
            )
        })?;
        Ok(WatchedEvent {
            event_type,
            keeper_state,
            path: if path.is_empty() { None } else { Some(path) },
        })
    }
}

/// Length-prefixed reads out of a received frame.
///
/// A length is checked against what is left of the frame before anything is allocated.
pub(crate) trait BufferReader {
    fn read_buffer(&mut self) -> io::Result<Vec<u8>>;
    fn read_string(&mut self) -> io::Result<String>;
}

impl<'a> BufferReader for &'a [u8] {
    fn read_buffer(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_i32::<BigEndian>()?;
        // -1 encodes a null buffer
        let len = usize::try_from(len).unwrap_or(0);
        let frame: &'a [u8] = *self;
        if len > frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("buffer of {} bytes overruns the frame ({} left)", len, frame.len()),
            ));
        }
        let (buf, rest) = frame.split_at(len);
        *self = rest;
        Ok(buf.to_vec())
    }

    fn read_string(&mut self) -> io::Result<String> {
        let raw = self.read_buffer()?;
        String::from_utf8(raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn read_string_list(reader: &mut &[u8]) -> io::Result<Vec<String>> {
    let len = reader.read_i32::<BigEndian>()?;
    let len = usize::try_from(len).unwrap_or(0);
    // every entry takes at least its four byte length
    if len > reader.len() / 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("list of {} entries overruns the frame", len),
        ));
    }
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(reader.read_string()?);
    }
    Ok(items)
}

impl Response {
    pub(super) fn parse(opcode: OpCode, reader: &mut &[u8]) -> Result<Self, failure::Error> {
        match opcode {
            OpCode::CreateSession => Ok(Response::Connect {
                protocol_version: reader.read_i32::<BigEndian>()?,
                timeout: reader.read_i32::<BigEndian>()?,
                session_id: reader.read_i64::<BigEndian>()?,
                password: reader.read_buffer()?,
                // servers predating read-only mode leave this byte off
                read_only: if reader.is_empty() {
                    false
                } else {
                    reader.read_u8()? != 0
                },
            }),
            OpCode::Exists | OpCode::SetData => Ok(Response::Stat(Stat::read_from(reader)?)),
            OpCode::GetData => Ok(Response::GetData {
                bytes: reader.read_buffer()?,
                stat: Stat::read_from(reader)?,
            }),
            OpCode::GetChildren => Ok(Response::Strings(read_string_list(reader)?)),
            // the stat that follows the path of a TTL create is not surfaced
            OpCode::Create | OpCode::CreateTtl | OpCode::Synchronize => {
                Ok(Response::String(reader.read_string()?))
            }
            OpCode::Delete | OpCode::SetWatches | OpCode::CloseSession => Ok(Response::Empty),
            OpCode::Ping => Err(format_err!("pings are not matched to a response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn write_str(buf: &mut Vec<u8>, s: &str) {
        buf.write_i32::<BigEndian>(s.len() as i32).unwrap();
        buf.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn connect_without_read_only_byte() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(0).unwrap();
        buf.write_i32::<BigEndian>(4000).unwrap();
        buf.write_i64::<BigEndian>(0xabc).unwrap();
        write_str(&mut buf, "secret");

        match Response::parse(OpCode::CreateSession, &mut &buf[..]).unwrap() {
            Response::Connect {
                timeout,
                session_id,
                password,
                read_only,
                ..
            } => {
                assert_eq!(timeout, 4000);
                assert_eq!(session_id, 0xabc);
                assert_eq!(password, b"secret".to_vec());
                assert!(!read_only);
            }
            r => panic!("unexpected response {:?}", r),
        }
    }

    #[test]
    fn children_list() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(2).unwrap();
        write_str(&mut buf, "b-0000000000");
        write_str(&mut buf, "b-0000000001");

        match Response::parse(OpCode::GetChildren, &mut &buf[..]).unwrap() {
            Response::Strings(children) => {
                assert_eq!(children, vec!["b-0000000000", "b-0000000001"])
            }
            r => panic!("unexpected response {:?}", r),
        }
    }

    #[test]
    fn session_event_has_no_path() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(-1).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        write_str(&mut buf, "");

        let e = WatchedEvent::read_from(&mut &buf[..]).unwrap();
        assert_eq!(e.event_type, WatchedEventType::None);
        assert_eq!(e.keeper_state, KeeperState::Disconnected);
        assert_eq!(e.path, None);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(10).unwrap();
        buf.extend_from_slice(b"abc");
        assert!((&buf[..]).read_buffer().is_err());
    }

    #[test]
    fn oversized_lengths_are_refused_before_allocating() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(i32::MAX).unwrap();
        buf.extend_from_slice(b"abc");
        let mut frame = &buf[..];
        let e = frame.read_buffer().unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);

        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(1 << 30).unwrap();
        write_str(&mut buf, "only-one");
        assert!(Response::parse(OpCode::GetChildren, &mut &buf[..]).is_err());
    }

    #[test]
    fn null_buffer_reads_as_empty() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(-1).unwrap();
        buf.push(7);
        let mut frame = &buf[..];
        assert_eq!(frame.read_buffer().unwrap(), Vec::<u8>::new());
        assert_eq!(frame, &[7][..]);
    }
}

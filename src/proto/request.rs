use super::Watch;
use crate::{Acl, CreateMode};
use byteorder::{BigEndian, WriteBytesExt};
use std::borrow::Cow;
use std::io::{self, Write};

#[derive(Debug)]
pub(crate) enum Request {
    Connect {
        protocol_version: i32,
        last_zxid_seen: i64,
        timeout: i32,
        session_id: i64,
        passwd: Vec<u8>,
        read_only: bool,
    },
    Exists {
        path: String,
        watch: Watch,
    },
    Delete {
        path: String,
        version: i32,
    },
    SetData {
        path: String,
        data: Cow<'static, [u8]>,
        version: i32,
    },
    Create {
        path: String,
        data: Cow<'static, [u8]>,
        acl: Cow<'static, [Acl]>,
        mode: CreateMode,
        /// Time-to-live in milliseconds, only for the TTL create modes.
        ttl: Option<i64>,
    },
    GetChildren {
        path: String,
        watch: Watch,
    },
    GetData {
        path: String,
        watch: Watch,
    },
    Sync {
        path: String,
    },
    SetWatches {
        relative_zxid: i64,
        data_watches: Vec<String>,
        exist_watches: Vec<String>,
        child_watches: Vec<String>,
    },
    CloseSession,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(i32)]
pub(crate) enum OpCode {
    Create = 1,
    Delete = 2,
    Exists = 3,
    GetData = 4,
    SetData = 5,
    GetChildren = 8,
    Synchronize = 9,
    Ping = 11,
    CreateTtl = 21,
    SetWatches = 101,
    CreateSession = -10,
    CloseSession = -11,
}

pub(crate) trait WriteTo {
    fn write_to<W: Write>(&self, writer: W) -> io::Result<()>;
}

impl WriteTo for Acl {
    fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.perms.code())?;
        self.scheme.write_to(&mut writer)?;
        self.id.write_to(writer)
    }
}

impl WriteTo for str {
    fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<BigEndian>(self.len() as i32)?;
        writer.write_all(self.as_ref())
    }
}

impl WriteTo for String {
    fn write_to<W: Write>(&self, writer: W) -> io::Result<()> {
        self.as_str().write_to(writer)
    }
}

impl WriteTo for [u8] {
    fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<BigEndian>(self.len() as i32)?;
        writer.write_all(self.as_ref())
    }
}

fn write_list<W, T>(mut writer: W, ts: &[T]) -> io::Result<()>
where
    T: WriteTo,
    W: Write,
{
    writer.write_i32::<BigEndian>(ts.len() as i32)?;
    for elem in ts {
        elem.write_to(&mut writer)?;
    }
    Ok(())
}

impl Request {
    /// Writes the request body; the caller frames it.
    pub(super) fn serialize_into(&self, buffer: &mut Vec<u8>) -> Result<(), io::Error> {
        match self {
            Request::Connect {
                protocol_version,
                last_zxid_seen,
                timeout,
                session_id,
                passwd,
                read_only,
            } => {
                buffer.write_i32::<BigEndian>(*protocol_version)?;
                buffer.write_i64::<BigEndian>(*last_zxid_seen)?;
                buffer.write_i32::<BigEndian>(*timeout)?;
                buffer.write_i64::<BigEndian>(*session_id)?;
                passwd.as_slice().write_to(&mut *buffer)?;
                buffer.write_u8(u8::from(*read_only))
            }
            Request::Exists { path, watch }
            | Request::GetData { path, watch }
            | Request::GetChildren { path, watch } => {
                path.write_to(&mut *buffer)?;
                buffer.write_u8(watch.to_u8())
            }
            Request::Delete { path, version } => {
                path.write_to(&mut *buffer)?;
                buffer.write_i32::<BigEndian>(*version)
            }
            Request::SetData {
                path,
                data,
                version,
            } => {
                path.write_to(&mut *buffer)?;
                data.write_to(&mut *buffer)?;
                buffer.write_i32::<BigEndian>(*version)
            }
            Request::Create {
                path,
                data,
                acl,
                mode,
                ttl,
            } => {
                path.write_to(&mut *buffer)?;
                data.write_to(&mut *buffer)?;
                write_list(&mut *buffer, acl)?;
                buffer.write_i32::<BigEndian>(*mode as i32)?;
                match ttl {
                    Some(ttl) => buffer.write_i64::<BigEndian>(*ttl),
                    None => Ok(()),
                }
            }
            Request::Sync { path } => path.write_to(&mut *buffer),
            Request::SetWatches {
                relative_zxid,
                data_watches,
                exist_watches,
                child_watches,
            } => {
                buffer.write_i64::<BigEndian>(*relative_zxid)?;
                [data_watches, exist_watches, child_watches]
                    .into_iter()
                    .try_for_each(|paths| write_list(&mut *buffer, paths))
            }
            Request::CloseSession => Ok(()),
        }
    }

    pub(super) fn opcode(&self) -> OpCode {
        match self {
            Request::Connect { .. } => OpCode::CreateSession,
            Request::Exists { .. } => OpCode::Exists,
            Request::Delete { .. } => OpCode::Delete,
            Request::Create { ttl: None, .. } => OpCode::Create,
            Request::Create { ttl: Some(_), .. } => OpCode::CreateTtl,
            Request::GetChildren { .. } => OpCode::GetChildren,
            Request::SetData { .. } => OpCode::SetData,
            Request::GetData { .. } => OpCode::GetData,
            Request::Sync { .. } => OpCode::Synchronize,
            Request::SetWatches { .. } => OpCode::SetWatches,
            Request::CloseSession => OpCode::CloseSession,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;

    #[test]
    fn create_ttl_appends_ttl_and_switches_opcode() {
        let req = Request::Create {
            path: "/t".to_string(),
            data: Cow::Borrowed(&b"x"[..]),
            acl: Cow::Borrowed(Acl::open_unsafe()),
            mode: CreateMode::PersistentWithTTL,
            ttl: Some(5_000),
        };
        assert_eq!(req.opcode(), OpCode::CreateTtl);

        let mut buf = Vec::new();
        req.serialize_into(&mut buf).unwrap();
        // path, data, one acl ("world"/"anyone"), mode, ttl
        let expected_len = (4 + 2) + (4 + 1) + 4 + (4 + 4 + 5 + 4 + 6) + 4 + 8;
        assert_eq!(buf.len(), expected_len);

        let mut tail = &buf[buf.len() - 12..];
        assert_eq!(tail.read_i32::<BigEndian>().unwrap(), 5);
        assert_eq!(tail.read_i64::<BigEndian>().unwrap(), 5_000);
    }

    #[test]
    fn watch_flag_is_serialized() {
        let mut buf = Vec::new();
        Request::Exists {
            path: "/a".to_string(),
            watch: Watch::Global,
        }
        .serialize_into(&mut buf)
        .unwrap();
        assert_eq!(buf, vec![0, 0, 0, 2, b'/', b'a', 1]);

        let mut buf = Vec::new();
        Request::GetData {
            path: "/a".to_string(),
            watch: Watch::None,
        }
        .serialize_into(&mut buf)
        .unwrap();
        assert_eq!(buf.last(), Some(&0));
    }

    #[test]
    fn set_watches_layout() {
        let mut buf = Vec::new();
        Request::SetWatches {
            relative_zxid: 7,
            data_watches: vec!["/d".to_string()],
            exist_watches: vec![],
            child_watches: vec!["/c".to_string(), "/e".to_string()],
        }
        .serialize_into(&mut buf)
        .unwrap();

        let mut r = &buf[..];
        assert_eq!(r.read_i64::<BigEndian>().unwrap(), 7);
        assert_eq!(r.read_i32::<BigEndian>().unwrap(), 1);
        r = &r[4 + 2..];
        assert_eq!(r.read_i32::<BigEndian>().unwrap(), 0);
        assert_eq!(r.read_i32::<BigEndian>().unwrap(), 2);
        assert_eq!(r.len(), 2 * (4 + 2));
    }
}

//! An in-process coordination service speaking the wire protocol over TCP, enough of it to drive
//! the client through sessions, watches and node operations.
#![allow(dead_code)]

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use futures::{Stream, StreamExt};
use slog::{o, Drain};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_zkcore::{KeeperState, WatchedEvent, WatchedEventType, ZooKeeper, ZooKeeperBuilder};

const NO_NODE: i32 = -101;
const BAD_VERSION: i32 = -103;
const NO_CHILDREN_FOR_EPHEMERALS: i32 = -108;
const NODE_EXISTS: i32 = -110;
const NOT_EMPTY: i32 = -111;
const INVALID_ACL: i32 = -114;
const UNIMPLEMENTED: i32 = -6;

const NODE_CREATED: i32 = 1;
const NODE_DELETED: i32 = 2;
const NODE_DATA_CHANGED: i32 = 3;
const NODE_CHILDREN_CHANGED: i32 = 4;

const SYNC_CONNECTED: i32 = 3;

pub fn logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}

/// A builder with a short session timeout and terminal logging.
pub fn builder() -> ZooKeeperBuilder {
    let mut builder = ZooKeeperBuilder::default();
    builder
        .set_timeout(Duration::from_secs(2))
        .set_logger(logger());
    builder
}

pub async fn connect(server: &FakeServer) -> (ZooKeeper, impl Stream<Item = WatchedEvent> + Unpin) {
    builder().connect(&server.addr()).await.unwrap()
}

/// Skips events on the default watcher until the session reports `state`.
pub async fn next_state<S>(watcher: &mut S, state: KeeperState)
where
    S: Stream<Item = WatchedEvent> + Unpin,
{
    let wait = async {
        while let Some(e) = watcher.next().await {
            if e.event_type == WatchedEventType::None && e.keeper_state == state {
                return;
            }
        }
        panic!("default watcher ended before {:?}", state);
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for a session event");
}

/// Asserts that nothing arrives on the default watcher for a little while.
pub async fn assert_quiet<S>(watcher: &mut S)
where
    S: Stream<Item = WatchedEvent> + Unpin,
{
    if let Ok(e) = tokio::time::timeout(Duration::from_millis(150), watcher.next()).await {
        panic!("unexpected event on the default watcher: {:?}", e);
    }
}

#[derive(Clone, Debug, Default)]
struct Node {
    data: Vec<u8>,
    czxid: i64,
    mzxid: i64,
    pzxid: i64,
    ctime: i64,
    mtime: i64,
    version: i32,
    cversion: i32,
    ephemeral_owner: i64,
    children: HashSet<String>,
}

struct Session {
    password: Vec<u8>,
    timeout: i32,
}

struct Conn {
    session_id: i64,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    kill: Option<oneshot::Sender<()>>,
    data_watches: HashSet<String>,
    child_watches: HashSet<String>,
}

struct State {
    nodes: BTreeMap<String, Node>,
    zxid: i64,
    sessions: HashMap<i64, Session>,
    next_session: i64,
    connections: HashMap<u64, Conn>,
    next_conn: u64,
    handshakes: usize,
    pings: usize,
    stalled: bool,
}

/// Handle to a running fake service. The service stops accepting connections when this is
/// dropped.
pub struct FakeServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    acceptor: tokio::task::JoinHandle<()>,
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

impl FakeServer {
    pub async fn start() -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::default());
        let state = Arc::new(Mutex::new(State {
            nodes,
            zxid: 0,
            sessions: HashMap::new(),
            next_session: 0x100,
            connections: HashMap::new(),
            next_conn: 0,
            handshakes: 0,
            pings: 0,
            stalled: false,
        }));

        let shared = state.clone();
        let acceptor = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(connection(stream, shared.clone()));
            }
        });

        FakeServer {
            addr,
            state,
            acceptor,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Expire a session the way the service does when it stops hearing from a client: its
    /// ephemeral nodes go, and its connections are cut.
    pub fn expire(&self, session_id: i64) {
        self.state.lock().unwrap().end_session(session_id);
    }

    /// Cut every connection. Sessions stay alive and can be resumed.
    pub fn drop_connections(&self) {
        let mut state = self.state.lock().unwrap();
        for conn in state.connections.values_mut() {
            if let Some(kill) = conn.kill.take() {
                let _ = kill.send(());
            }
        }
    }

    /// Stop answering requests, heartbeats and handshakes. Connections stay open.
    pub fn stall(&self, stalled: bool) {
        self.state.lock().unwrap().stalled = stalled;
    }

    pub fn has_session(&self, session_id: i64) -> bool {
        self.state.lock().unwrap().sessions.contains_key(&session_id)
    }

    pub fn handshakes(&self) -> usize {
        self.state.lock().unwrap().handshakes
    }

    /// Heartbeats received, answered or not.
    pub fn pings(&self) -> usize {
        self.state.lock().unwrap().pings
    }

    fn is_stalled(state: &Mutex<State>) -> bool {
        state.lock().unwrap().stalled
    }

    pub fn node_exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(path)
    }

    /// Delete a node behind the client's back, as another client would.
    pub fn remove_node(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.remove(path);
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;
    let len = reader.read_i32().await?;
    let mut frame = vec![0; len.max(0) as usize];
    reader.read_exact(&mut frame).await?;
    Ok(frame)
}

fn framed(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.write_i32::<BigEndian>(body.len() as i32).unwrap();
    out.extend(body);
    out
}

async fn connection(stream: TcpStream, state: Arc<Mutex<State>>) {
    use tokio::io::AsyncWriteExt;
    let (mut reader, mut writer) = stream.into_split();
    let frame = match read_frame(&mut reader).await {
        Ok(frame) => frame,
        Err(_) => return,
    };
    while FakeServer::is_stalled(&state) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (kill, mut killed) = oneshot::channel();
    let accepted = state.lock().unwrap().handshake(&frame, tx, kill);
    let (conn_id, refused) = match accepted {
        Ok(conn_id) => (conn_id, None),
        Err(reply) => (0, Some(reply)),
    };
    if let Some(reply) = refused {
        let _ = writer.write_all(&reply).await;
        return;
    }

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader) => match frame {
                Ok(frame) => frame,
                Err(_) => break,
            },
            _ = &mut killed => break,
        };
        if state.lock().unwrap().handle(conn_id, &frame) {
            break;
        }
    }

    // dropping the sender lets the writer flush what is queued and close the socket
    state.lock().unwrap().connections.remove(&conn_id);
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn get_str(buf: &mut &[u8]) -> String {
    String::from_utf8(get_buf(buf)).unwrap()
}

fn get_buf(buf: &mut &[u8]) -> Vec<u8> {
    let len = buf.read_i32::<BigEndian>().unwrap();
    if len < 0 {
        return Vec::new();
    }
    let rest: &[u8] = *buf;
    let (head, tail) = rest.split_at(len as usize);
    *buf = tail;
    head.to_vec()
}

fn get_str_list(buf: &mut &[u8]) -> Vec<String> {
    let n = buf.read_i32::<BigEndian>().unwrap();
    (0..n).map(|_| get_str(buf)).collect()
}

fn put_buf(out: &mut Vec<u8>, bytes: &[u8]) {
    out.write_i32::<BigEndian>(bytes.len() as i32).unwrap();
    out.extend_from_slice(bytes);
}

fn put_stat(out: &mut Vec<u8>, node: &Node) {
    out.write_i64::<BigEndian>(node.czxid).unwrap();
    out.write_i64::<BigEndian>(node.mzxid).unwrap();
    out.write_i64::<BigEndian>(node.ctime).unwrap();
    out.write_i64::<BigEndian>(node.mtime).unwrap();
    out.write_i32::<BigEndian>(node.version).unwrap();
    out.write_i32::<BigEndian>(node.cversion).unwrap();
    out.write_i32::<BigEndian>(0).unwrap();
    out.write_i64::<BigEndian>(node.ephemeral_owner).unwrap();
    out.write_i32::<BigEndian>(node.data.len() as i32).unwrap();
    out.write_i32::<BigEndian>(node.children.len() as i32).unwrap();
    out.write_i64::<BigEndian>(node.pzxid).unwrap();
}

fn parent_of(path: &str) -> (String, String) {
    let i = path.rfind('/').unwrap();
    let parent = if i == 0 { "/" } else { &path[..i] };
    (parent.to_string(), path[i + 1..].to_string())
}

impl State {
    /// Accepts or refuses a connect request. A refusal is answered with a zero timeout.
    fn handshake(
        &mut self,
        frame: &[u8],
        tx: mpsc::UnboundedSender<Vec<u8>>,
        kill: oneshot::Sender<()>,
    ) -> Result<u64, Vec<u8>> {
        self.handshakes += 1;
        let mut buf = frame;
        let _protocol_version = buf.read_i32::<BigEndian>().unwrap();
        let _last_zxid = buf.read_i64::<BigEndian>().unwrap();
        let timeout = buf.read_i32::<BigEndian>().unwrap();
        let session_id = buf.read_i64::<BigEndian>().unwrap();
        let password = get_buf(&mut buf);

        let accepted = if session_id == 0 {
            let id = self.next_session;
            self.next_session += 1;
            let password = id.to_be_bytes().repeat(2);
            self.sessions.insert(
                id,
                Session {
                    password: password.clone(),
                    timeout,
                },
            );
            Some((id, password, timeout))
        } else {
            match self.sessions.get(&session_id) {
                Some(session) if session.password == password => {
                    Some((session_id, password, session.timeout))
                }
                _ => None,
            }
        };

        let mut body = Vec::new();
        body.write_i32::<BigEndian>(0).unwrap();
        match accepted {
            Some((id, password, timeout)) => {
                body.write_i32::<BigEndian>(timeout).unwrap();
                body.write_i64::<BigEndian>(id).unwrap();
                put_buf(&mut body, &password);
                body.write_u8(0).unwrap();

                let conn_id = self.next_conn;
                self.next_conn += 1;
                tx.send(framed(body)).unwrap();
                self.connections.insert(
                    conn_id,
                    Conn {
                        session_id: id,
                        tx,
                        kill: Some(kill),
                        data_watches: HashSet::new(),
                        child_watches: HashSet::new(),
                    },
                );
                Ok(conn_id)
            }
            None => {
                body.write_i32::<BigEndian>(0).unwrap();
                body.write_i64::<BigEndian>(0).unwrap();
                put_buf(&mut body, &[]);
                body.write_u8(0).unwrap();
                Err(framed(body))
            }
        }
    }

    fn send(&self, conn_id: u64, frame: Vec<u8>) {
        if let Some(conn) = self.connections.get(&conn_id) {
            let _ = conn.tx.send(frame);
        }
    }

    fn notify(&mut self, path: &str, event_type: i32) {
        let mut body = Vec::new();
        body.write_i32::<BigEndian>(-1).unwrap();
        body.write_i64::<BigEndian>(-1).unwrap();
        body.write_i32::<BigEndian>(0).unwrap();
        body.write_i32::<BigEndian>(event_type).unwrap();
        body.write_i32::<BigEndian>(SYNC_CONNECTED).unwrap();
        put_buf(&mut body, path.as_bytes());
        let frame = framed(body);

        for conn in self.connections.values_mut() {
            let fired = match event_type {
                NODE_CREATED | NODE_DATA_CHANGED => conn.data_watches.remove(path),
                NODE_CHILDREN_CHANGED => conn.child_watches.remove(path),
                _ => {
                    let data = conn.data_watches.remove(path);
                    let child = conn.child_watches.remove(path);
                    data || child
                }
            };
            if fired {
                let _ = conn.tx.send(frame.clone());
            }
        }
    }

    /// Removes a childless node and fires its watches.
    fn remove(&mut self, path: &str) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        self.zxid += 1;
        let (parent, name) = parent_of(path);
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.remove(&name);
            parent.cversion += 1;
            parent.pzxid = self.zxid;
        }
        self.notify(path, NODE_DELETED);
        self.notify(&parent, NODE_CHILDREN_CHANGED);
    }

    fn end_session(&mut self, session_id: i64) {
        self.sessions.remove(&session_id);
        let ephemerals: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ephemerals {
            self.remove(&path);
        }
        for conn in self.connections.values_mut() {
            if conn.session_id == session_id {
                if let Some(kill) = conn.kill.take() {
                    let _ = kill.send(());
                }
            }
        }
    }

    /// Answers one request. Returns `true` once the connection should be closed.
    fn handle(&mut self, conn_id: u64, frame: &[u8]) -> bool {
        let mut buf = frame;
        let xid = buf.read_i32::<BigEndian>().unwrap();
        let opcode = buf.read_i32::<BigEndian>().unwrap();
        if opcode == 11 {
            self.pings += 1;
        }

        if self.stalled {
            return false;
        }
        let session_id = match self.connections.get(&conn_id) {
            Some(conn) => conn.session_id,
            None => return true,
        };

        let mut body = Vec::new();
        let mut closing = false;
        let result = match opcode {
            1 | 21 => self.create(session_id, opcode == 21, &mut buf, &mut body),
            2 => self.delete(&mut buf),
            3 => self.read(conn_id, opcode, &mut buf, &mut body),
            4 => self.read(conn_id, opcode, &mut buf, &mut body),
            5 => self.set_data(&mut buf, &mut body),
            8 => self.read(conn_id, opcode, &mut buf, &mut body),
            9 => {
                put_buf(&mut body, get_str(&mut buf).as_bytes());
                Ok(())
            }
            11 => Ok(()),
            101 => {
                self.set_watches(conn_id, &mut buf);
                Ok(())
            }
            -11 => {
                closing = true;
                self.end_session(session_id);
                Ok(())
            }
            _ => Err(UNIMPLEMENTED),
        };

        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(xid).unwrap();
        reply.write_i64::<BigEndian>(self.zxid).unwrap();
        match result {
            Ok(()) => {
                reply.write_i32::<BigEndian>(0).unwrap();
                reply.extend(body);
            }
            Err(code) => reply.write_i32::<BigEndian>(code).unwrap(),
        }
        self.send(conn_id, framed(reply));
        closing
    }

    fn create(
        &mut self,
        session_id: i64,
        with_ttl: bool,
        buf: &mut &[u8],
        body: &mut Vec<u8>,
    ) -> Result<(), i32> {
        let path = get_str(buf);
        let data = get_buf(buf);
        let acl_count = buf.read_i32::<BigEndian>().unwrap();
        for _ in 0..acl_count {
            let _perms = buf.read_i32::<BigEndian>().unwrap();
            let _scheme = get_str(buf);
            let _id = get_str(buf);
        }
        let flags = buf.read_i32::<BigEndian>().unwrap();
        if with_ttl {
            let _ttl = buf.read_i64::<BigEndian>().unwrap();
        }

        if acl_count <= 0 {
            return Err(INVALID_ACL);
        }
        let (parent_path, _) = parent_of(&path);
        let parent = self.nodes.get(&parent_path).ok_or(NO_NODE)?;
        if parent.ephemeral_owner != 0 {
            return Err(NO_CHILDREN_FOR_EPHEMERALS);
        }
        let path = if matches!(flags, 2 | 3 | 6) {
            format!("{}{:010}", path, parent.cversion)
        } else {
            path
        };
        if self.nodes.contains_key(&path) {
            return Err(NODE_EXISTS);
        }

        self.zxid += 1;
        let now = now_ms();
        let node = Node {
            data,
            czxid: self.zxid,
            mzxid: self.zxid,
            pzxid: self.zxid,
            ctime: now,
            mtime: now,
            ephemeral_owner: if matches!(flags, 1 | 3) { session_id } else { 0 },
            ..Node::default()
        };
        put_buf(body, path.as_bytes());
        if with_ttl {
            put_stat(body, &node);
        }
        self.nodes.insert(path.clone(), node);

        let (parent_path, name) = parent_of(&path);
        let parent = self.nodes.get_mut(&parent_path).unwrap();
        parent.children.insert(name);
        parent.cversion += 1;
        parent.pzxid = self.zxid;

        self.notify(&path, NODE_CREATED);
        self.notify(&parent_path, NODE_CHILDREN_CHANGED);
        Ok(())
    }

    fn delete(&mut self, buf: &mut &[u8]) -> Result<(), i32> {
        let path = get_str(buf);
        let version = buf.read_i32::<BigEndian>().unwrap();
        let node = self.nodes.get(&path).ok_or(NO_NODE)?;
        if version != -1 && version != node.version {
            return Err(BAD_VERSION);
        }
        if !node.children.is_empty() {
            return Err(NOT_EMPTY);
        }
        self.remove(&path);
        Ok(())
    }

    fn set_data(&mut self, buf: &mut &[u8], body: &mut Vec<u8>) -> Result<(), i32> {
        let path = get_str(buf);
        let data = get_buf(buf);
        let version = buf.read_i32::<BigEndian>().unwrap();
        self.zxid += 1;
        let zxid = self.zxid;
        let node = self.nodes.get_mut(&path).ok_or(NO_NODE)?;
        if version != -1 && version != node.version {
            return Err(BAD_VERSION);
        }
        node.data = data;
        node.version += 1;
        node.mzxid = zxid;
        node.mtime = now_ms();
        put_stat(body, node);
        self.notify(&path, NODE_DATA_CHANGED);
        Ok(())
    }

    /// exists, get_data and get_children, which differ only in what they return and which watch
    /// they leave.
    fn read(
        &mut self,
        conn_id: u64,
        opcode: i32,
        buf: &mut &[u8],
        body: &mut Vec<u8>,
    ) -> Result<(), i32> {
        let path = get_str(buf);
        let watch = buf.read_u8().unwrap() != 0;

        let node = match self.nodes.get(&path) {
            Some(node) => node,
            None => {
                // an exists watch may wait for the node to appear
                if opcode == 3 && watch {
                    if let Some(conn) = self.connections.get_mut(&conn_id) {
                        conn.data_watches.insert(path);
                    }
                }
                return Err(NO_NODE);
            }
        };

        match opcode {
            3 => put_stat(body, node),
            4 => {
                put_buf(body, &node.data);
                put_stat(body, node);
            }
            _ => {
                body.write_i32::<BigEndian>(node.children.len() as i32)
                    .unwrap();
                for child in &node.children {
                    put_buf(body, child.as_bytes());
                }
            }
        }

        if watch {
            if let Some(conn) = self.connections.get_mut(&conn_id) {
                if opcode == 8 {
                    conn.child_watches.insert(path);
                } else {
                    conn.data_watches.insert(path);
                }
            }
        }
        Ok(())
    }

    /// Re-registers watches of a resumed session, firing right away those whose node changed
    /// since `relative_zxid`.
    fn set_watches(&mut self, conn_id: u64, buf: &mut &[u8]) {
        let relative_zxid = buf.read_i64::<BigEndian>().unwrap();
        let data = get_str_list(buf);
        let exist = get_str_list(buf);
        let child = get_str_list(buf);

        let mut fire = Vec::new();
        let mut data_watches = Vec::new();
        let mut child_watches = Vec::new();
        for path in data {
            match self.nodes.get(&path) {
                None => fire.push((path, NODE_DELETED)),
                Some(node) if node.mzxid > relative_zxid => fire.push((path, NODE_DATA_CHANGED)),
                Some(_) => data_watches.push(path),
            }
        }
        for path in exist {
            match self.nodes.get(&path) {
                Some(node) if node.czxid > relative_zxid => fire.push((path, NODE_CREATED)),
                _ => data_watches.push(path),
            }
        }
        for path in child {
            match self.nodes.get(&path) {
                None => fire.push((path, NODE_DELETED)),
                Some(node) if node.pzxid > relative_zxid => {
                    fire.push((path, NODE_CHILDREN_CHANGED))
                }
                Some(_) => child_watches.push(path),
            }
        }

        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.data_watches.extend(data_watches);
            conn.child_watches.extend(child_watches);
        }

        for (path, event_type) in fire {
            let mut body = Vec::new();
            body.write_i32::<BigEndian>(-1).unwrap();
            body.write_i64::<BigEndian>(-1).unwrap();
            body.write_i32::<BigEndian>(0).unwrap();
            body.write_i32::<BigEndian>(event_type).unwrap();
            body.write_i32::<BigEndian>(SYNC_CONNECTED).unwrap();
            put_buf(&mut body, path.as_bytes());
            self.send(conn_id, framed(body));
        }
    }
}

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::protocol::{FrameBuffer, MAX_FRAME_BYTES, RpcRequest, RpcResponse, encode_line};
use crate::registry::MethodRegistry;

struct Shared {
    registry: Arc<MethodRegistry>,
    running: AtomicBool,
    next_connection: AtomicU64,
    connections: Mutex<HashMap<u64, TcpStream>>,
}

/// Loopback line-JSON RPC server. One thread accepts, one thread serves
/// each connection for as long as the peer keeps it open.
pub struct RpcServer {
    port: u16,
    shared: Arc<Shared>,
    accept: Option<JoinHandle<()>>,
}

impl RpcServer {
    /// Binds an ephemeral loopback port.
    pub fn start(registry: Arc<MethodRegistry>) -> io::Result<Self> {
        Self::start_on(registry, 0)
    }

    pub fn start_on(registry: Arc<MethodRegistry>, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))?;
        let port = listener.local_addr()?.port();
        let shared = Arc::new(Shared {
            registry,
            running: AtomicBool::new(true),
            next_connection: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        });

        let accept_shared = Arc::clone(&shared);
        let accept = thread::Builder::new()
            .name("deskflow-rpc-accept".into())
            .spawn(move || accept_loop(&listener, &accept_shared))?;

        log::info!("rpc server listening on 127.0.0.1:{port}");
        Ok(Self {
            port,
            shared,
            accept: Some(accept),
        })
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Stops accepting and closes every open connection. Idempotent.
    pub fn stop(&mut self) {
        let Some(accept) = self.accept.take() else {
            return;
        };
        self.shared.running.store(false, Ordering::SeqCst);
        // Unblock the accept call.
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port));
        let _ = accept.join();

        for (_, stream) in self.shared.connections.lock().drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        log::info!("rpc server on port {} stopped", self.port);
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>) {
    for stream in listener.incoming() {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("rpc accept failed: {e}");
                continue;
            }
        };

        let id = shared.next_connection.fetch_add(1, Ordering::SeqCst);
        match stream.try_clone() {
            Ok(clone) => {
                shared.connections.lock().insert(id, clone);
            }
            Err(e) => {
                log::warn!("rpc connection dropped: {e}");
                continue;
            }
        }

        let conn_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("deskflow-rpc-{id}"))
            .spawn(move || {
                if let Err(e) = serve_connection(stream, &conn_shared.registry) {
                    log::debug!("rpc connection {id} ended: {e}");
                }
                conn_shared.connections.lock().remove(&id);
            });
        if let Err(e) = spawned {
            log::warn!("rpc connection thread failed to start: {e}");
            shared.connections.lock().remove(&id);
        }
    }
}

/// Answers requests in arrival order until the peer disconnects.
fn serve_connection(mut stream: TcpStream, registry: &MethodRegistry) -> io::Result<()> {
    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        let fits = frames.extend(&chunk[..read]);

        while let Some(line) = frames.next_line() {
            let response = match serde_json::from_slice::<RpcRequest>(&line) {
                Ok(request) => registry.dispatch(request),
                Err(_) => RpcResponse::invalid_json(),
            };
            let bytes = encode_line(&response).map_err(io::Error::other)?;
            stream.write_all(&bytes)?;
        }
        if !fits {
            log::warn!("rpc: dropping request line over {MAX_FRAME_BYTES} bytes");
            stream.write_all(&encode_line(&RpcResponse::invalid_json()).map_err(io::Error::other)?)?;
        }
    }
}

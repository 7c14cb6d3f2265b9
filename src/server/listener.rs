use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::http::message::{Body, Message};
use crate::http::parser::{ParseLimits, Parser};
use crate::http::writer::ResponseWriter;
use crate::server::registry::Registry;

/// What to do with a connection after servicing it.
enum Outcome {
    Keep,
    Close,
}

/// Single-threaded HTTP server driven by a readiness query.
///
/// Every iteration accepts at most one new connection, then reads once from
/// each ready client, parses, calls the handler and writes the response.
pub struct Server {
    registry: Registry<TcpListener, TcpStream>,
    parser: Parser,
    buffer: Vec<u8>,
    local_addr: SocketAddr,
}

impl Server {
    /// Creates, binds and starts listening on the configured address.
    pub fn bind(cfg: &ServerConfig) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(bind_ip(&cfg.address, cfg.ipv6), cfg.port);
        let domain = if cfg.ipv6 { Domain::IPV6 } else { Domain::IPV4 };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .context("Failed to create listening socket")?;
        socket
            .set_reuse_address(true)
            .context("Failed to set SO_REUSEADDR")?;
        if cfg.ipv6 {
            socket
                .set_only_v6(true)
                .context("Failed to set IPV6_V6ONLY")?;
        }
        socket
            .bind(&addr.into())
            .with_context(|| format!("Failed to bind {addr}"))?;
        socket
            .listen(cfg.backlog)
            .with_context(|| format!("Failed to listen on {addr}"))?;
        // a readable listener may have nothing to accept by the time we call
        // accept, which must not stall the loop
        socket
            .set_nonblocking(true)
            .context("Failed to make listening socket non-blocking")?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr().context("Failed to read bound address")?;

        let mut registry = Registry::new(cfg.clients_max);
        registry.register(listener);

        info!(
            address = %local_addr,
            clients_max = registry.capacity(),
            backlog = cfg.backlog,
            "HTTP server listening"
        );

        Ok(Self {
            registry,
            parser: Parser::new(ParseLimits::from(cfg)),
            buffer: vec![0; cfg.buffer_size.max(1)],
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the event loop forever. Returns only on a fatal readiness failure.
    pub fn listen<C, H>(&mut self, mut handler: H, context: &C) -> anyhow::Result<()>
    where
        C: ?Sized,
        H: FnMut(&Message, &C) -> Option<Message>,
    {
        loop {
            self.turn(&mut handler, context)?;
        }
    }

    /// One loop iteration: sync, wait, accept phase, service phase.
    pub fn turn<C, H>(&mut self, handler: &mut H, context: &C) -> anyhow::Result<()>
    where
        C: ?Sized,
        H: FnMut(&Message, &C) -> Option<Message>,
    {
        self.registry.sync();
        self.registry.poll().context("Event loop stopped")?;

        if self.registry.is_listener_ready() {
            self.accept();
        }

        for index in 0..self.registry.capacity() {
            if !self.registry.is_ready(index) {
                continue;
            }

            if let Outcome::Close = self.service(index, handler, context) {
                self.registry.free(index);
            }
        }

        Ok(())
    }

    fn accept(&mut self) {
        let Some(listener) = self.registry.listener() else {
            return;
        };

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!("No pending connection to accept");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Accept failed, continuing");
                return;
            }
        };

        // clients are serviced with plain blocking reads and writes
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(peer = %peer, error = %e, "Failed to make connection blocking, dropping it");
            return;
        }

        match self.registry.add(stream) {
            Ok(index) => debug!(
                peer = %peer,
                slot = index,
                connections = self.registry.len(),
                "Accepted connection"
            ),
            Err(stream) => {
                warn!(
                    peer = %peer,
                    clients_max = self.registry.capacity(),
                    "All client slots taken, dropping connection"
                );
                drop(stream);
            }
        }
    }

    fn service<C, H>(&mut self, index: usize, handler: &mut H, context: &C) -> Outcome
    where
        C: ?Sized,
        H: FnMut(&Message, &C) -> Option<Message>,
    {
        let Some(stream) = self.registry.get_mut(index) else {
            return Outcome::Close;
        };

        let read = match stream.read(&mut self.buffer) {
            Ok(0) => {
                debug!(slot = index, "Client closed the connection");
                return Outcome::Close;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Outcome::Keep,
            Err(e) => {
                warn!(slot = index, error = %e, "Read failed, closing connection");
                return Outcome::Close;
            }
        };

        debug!(slot = index, bytes = read, "Read request");

        let mut request = match self.parser.parse(&self.buffer[..read]) {
            Ok(request) => request,
            Err(e) => {
                warn!(slot = index, error = %e, "Failed to parse request");
                return Outcome::Close;
            }
        };

        match stream.peer_addr() {
            Ok(peer) => request.set_peer(peer),
            Err(e) => debug!(slot = index, error = %e, "Could not resolve peer address"),
        }

        request.debug_dump();

        let response = handler(&request, context).unwrap_or_else(|| {
            warn!(
                method = request.method.as_deref().unwrap_or("-"),
                target = request.target.as_deref().unwrap_or("-"),
                "Handler returned no response, answering 500. Handlers must always return a response"
            );
            internal_error()
        });

        let outcome = match ResponseWriter::new(&response).write_to_stream(stream) {
            Ok(()) => Outcome::Keep,
            Err(e) => {
                warn!(slot = index, error = %e, "Write failed, closing connection");
                Outcome::Close
            }
        };

        response.release();
        request.release();

        outcome
    }
}

fn internal_error() -> Message {
    Message::response(
        500,
        Some("text/plain"),
        Body::from_static(b"500 Internal Server Error\n"),
    )
}

/// Parses the textual bind address, falling back to the unspecified address
/// of the selected family.
fn bind_ip(address: &str, ipv6: bool) -> IpAddr {
    let parsed = if ipv6 {
        address.parse::<Ipv6Addr>().map(IpAddr::V6).ok()
    } else {
        address.parse::<Ipv4Addr>().map(IpAddr::V4).ok()
    };

    parsed.unwrap_or_else(|| {
        let fallback = if ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        warn!(address, fallback = %fallback, "Invalid bind address, listening on any");
        fallback
    })
}

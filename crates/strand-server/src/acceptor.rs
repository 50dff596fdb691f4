use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use mio::{Events, Interest, Poll, Token};
use strand_utils::ThreadPriority;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::error::Error;
use crate::handler::HandlerFactory;
use crate::shared::Shared;
use crate::state::{Handback, HandlerOutcome, SockState, WorkUnit};
use crate::worker;

const LISTENER_TOKEN: Token = Token(0);

/// Set kernel SO_SNDBUF/SO_RCVBUF and SO_SNDTIMEO/SO_RCVTIMEO on an accepted
/// socket before handing it to a worker, so a worker's blocking read/write
/// never stalls indefinitely.
fn configure_accepted(stream: &std::net::TcpStream, config: &ListenerConfig) {
    let fd = stream.as_raw_fd();
    let sndbuf = config.send_buf_size as libc::c_int;
    let rcvbuf = config.recv_buf_size as libc::c_int;
    let send_timeout = to_timeval(config.send_timeout);
    let recv_timeout = to_timeval(config.recv_timeout);
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &sndbuf as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &rcvbuf as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDTIMEO,
            &send_timeout as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::timeval>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &recv_timeout as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::timeval>() as libc::socklen_t,
        );
    }
}

fn to_timeval(d: std::time::Duration) -> libc::timeval {
    libc::timeval { tv_sec: d.as_secs() as libc::time_t, tv_usec: d.subsec_micros() as libc::suseconds_t }
}

/// mio's `TcpStream` doesn't expose a safe conversion back to
/// `std::net::TcpStream`; both wrap the same underlying fd, so recovering
/// one from the other is a raw-fd handoff.
fn to_std_stream(stream: mio::net::TcpStream) -> std::net::TcpStream {
    unsafe { std::net::TcpStream::from_raw_fd(stream.into_raw_fd()) }
}

/// Single-threaded accept/event loop feeding a pool of blocking worker
/// threads. Each accepted connection is owned, at any moment, by exactly
/// one of: this acceptor's mio registry (awaiting an event), the shared
/// work queue (awaiting a worker), or a worker thread (being serviced).
pub struct Acceptor {
    listener: mio::net::TcpListener,
    poll: Poll,
    events: Events,
    registered: HashMap<Token, mio::net::TcpStream>,
    next_token: usize,
    shared: Arc<Shared>,
    handback_tx: Sender<Handback>,
    handback_rx: Receiver<Handback>,
    config: ListenerConfig,
    workers: Vec<JoinHandle<()>>,
    spawn_worker: Option<Box<dyn Fn(Option<usize>) -> JoinHandle<()> + Send + Sync>>,
    core_base: Option<usize>,
    next_worker_index: usize,
}

impl Acceptor {
    pub fn bind(addr: SocketAddr, config: ListenerConfig) -> Result<Self, Error> {
        let std_listener = std::net::TcpListener::bind(addr).map_err(Error::Bind)?;
        std_listener.set_nonblocking(true).map_err(Error::Bind)?;
        let mut listener = mio::net::TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(Error::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(Error::Poll)?;

        let (handback_tx, handback_rx) = mpsc::channel();
        let shared = Arc::new(Shared::new(config.min_servers));

        Ok(Self {
            listener,
            poll,
            events: Events::with_capacity(config.poll_batch),
            registered: HashMap::new(),
            next_token: 1,
            shared,
            handback_tx,
            handback_rx,
            config,
            workers: Vec::new(),
            spawn_worker: None,
            core_base: None,
            next_worker_index: 0,
        })
    }

    /// Spawn the initial `min_servers` worker threads and remember how to
    /// spawn more, up to `max_servers`, if the queue backs up. Must be
    /// called before [`Acceptor::run`].
    pub fn start<F>(&mut self, factory: Arc<F>, core_base: Option<usize>, priority: ThreadPriority)
    where
        F: HandlerFactory + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let handback_tx = self.handback_tx.clone();
        let idle_ttl = self.config.server_idle_ttl;
        self.spawn_worker = Some(Box::new(move |core: Option<usize>| {
            worker::spawn(Arc::clone(&shared), handback_tx.clone(), Arc::clone(&factory), idle_ttl, core, priority)
        }));
        self.core_base = core_base;

        for _ in 0..self.config.min_servers {
            self.spawn_one_worker();
        }
    }

    fn spawn_one_worker(&mut self) {
        let Some(spawn) = self.spawn_worker.as_ref() else { return };
        let core = self.core_base.map(|base| base + self.next_worker_index);
        self.workers.push(spawn(core));
        self.next_worker_index += 1;
    }

    /// Request the loop in [`Acceptor::run`] to stop after its current
    /// iteration and wake every worker so they can exit.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Drive accept/dispatch until [`Acceptor::stop`] is called. Blocks the
    /// calling thread.
    pub fn run(&mut self) {
        let mut last_stat_log = Instant::now();
        while !self.shared.stop.load(Ordering::SeqCst) {
            self.drain_handbacks();

            let active = self.shared.active_workers.load(Ordering::SeqCst);
            if self.shared.queue_depth() > active && active < self.config.max_servers {
                self.spawn_one_worker();
            }
            self.workers.retain(|w| !w.is_finished());

            match self.poll.poll(&mut self.events, Some(self.config.listener_sleep)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(%e, "poll failed");
                    continue;
                }
            }

            for event in self.events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_all();
                    continue;
                }
                // A single wakeup can report readiness and hangup/error
                // together; fold both into one state set so the worker
                // doesn't miss whichever hook would otherwise lose the race.
                let mut state = SockState::empty();
                if event.is_readable() {
                    state |= SockState::READ;
                }
                if event.is_read_closed() || event.is_write_closed() || event.is_error() {
                    state |= SockState::SHUT;
                }
                if !state.is_empty() {
                    self.dispatch_event(event.token(), state);
                }
            }

            if last_stat_log.elapsed() >= self.config.stat_log_interval {
                self.log_stats();
                last_stat_log = Instant::now();
            }
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.shared.connections.load(Ordering::Relaxed) >= self.config.max_connections {
                        warn!(?addr, "max_connections reached, refusing connection");
                        drop(stream);
                        continue;
                    }
                    self.throttle_if_needed();
                    let token = self.next_token();
                    let std_stream = to_std_stream(stream);
                    let _ = std_stream.set_nonblocking(false);
                    configure_accepted(&std_stream, &self.config);
                    self.shared.connections.fetch_add(1, Ordering::Relaxed);
                    debug!(?addr, ?token, "accepted connection");
                    self.shared.push(WorkUnit { token, stream: std_stream, state: SockState::NEW });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(%e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Sleep in small steps while the queue is over depth, capped at
    /// `cycle_max_throttles` so one cycle can't block the acceptor forever.
    fn throttle_if_needed(&self) {
        let mut throttled = 0;
        while self.shared.queue_depth() > self.config.max_queue_depth
            && throttled < self.config.cycle_max_throttles
        {
            std::thread::sleep(self.config.throttle_sleep);
            self.shared.throttles.fetch_add(1, Ordering::Relaxed);
            throttled += 1;
        }
    }

    fn dispatch_event(&mut self, token: Token, state: SockState) {
        let Some(mut stream) = self.registered.remove(&token) else {
            return;
        };
        let _ = self.poll.registry().deregister(&mut stream);
        let std_stream = to_std_stream(stream);
        let _ = std_stream.set_nonblocking(false);
        self.shared.push(WorkUnit { token, stream: std_stream, state });
    }

    fn drain_handbacks(&mut self) {
        while let Ok(handback) = self.handback_rx.try_recv() {
            match handback.outcome {
                HandlerOutcome::Shut => {
                    let _ = handback.stream.shutdown(std::net::Shutdown::Both);
                    self.shared.connections.fetch_sub(1, Ordering::Relaxed);
                }
                HandlerOutcome::Continue => {
                    let _ = handback.stream.set_nonblocking(true);
                    let mut mio_stream = mio::net::TcpStream::from_std(handback.stream);
                    if let Err(e) =
                        self.poll.registry().register(&mut mio_stream, handback.token, Interest::READABLE)
                    {
                        warn!(%e, "couldn't re-register connection, closing");
                        self.shared.connections.fetch_sub(1, Ordering::Relaxed);
                        continue;
                    }
                    self.registered.insert(handback.token, mio_stream);
                }
            }
        }
    }

    fn log_stats(&self) {
        info!(
            connections = self.shared.connections.load(Ordering::Relaxed),
            requests = self.shared.requests.load(Ordering::Relaxed),
            throttles = self.shared.throttles.load(Ordering::Relaxed),
            workers = self.shared.active_workers.load(Ordering::Relaxed),
            "listener stats"
        );
    }
}

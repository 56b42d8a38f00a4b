//! the single-connection multiplexer: background driver, stream bookkeeping, back-pressure
//! predicate, and the `post` request dispatcher.

use core::future::{pending, poll_fn};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use h2::client::SendRequest;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::Error;
use crate::flow::OutboundBudget;
use crate::request::Request;
use crate::response::Response;
use crate::stream_table::StreamTable;
use crate::tls;

/// connection-wide state touched by both the background driver and any number of concurrent
/// `post` callers. All fields are atomics or internally synchronized, and none of them is
/// ever held across an `.await`, so no caller-visible lock contention is possible even though
/// this runs on a multi-threaded executor.
struct Shared {
    streams: Arc<StreamTable>,
    budget: OutboundBudget,
    max_concurrent_streams: AtomicU32,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    fn mark_closed(&self) {
        self.closing.store(true, Ordering::Release);
        self.closed.store(true, Ordering::Release);
    }
}

/// a live, mutually-authenticated HTTP/2 connection multiplexing many [`post`](Connection::post)
/// calls over one transport. Create with [`Connection::open`]; tear down with
/// [`Connection::close`] or simply drop it.
pub struct Connection {
    config: Config,
    shared: Arc<Shared>,
    send_request: SendRequest<Bytes>,
    driver: Option<JoinHandle<()>>,
}

impl Connection {
    /// resolve the configured base url, perform the TLS handshake (ALPN must negotiate "h2"),
    /// exchange HTTP/2 settings, and start the background driver.
    pub async fn open(config: Config) -> Result<Self, Error> {
        let io = tls::connect(&config).await?;

        let (send_request, h2_connection) = h2::client::Builder::new()
            .enable_push(false)
            .max_concurrent_streams(u32::MAX)
            .max_header_list_size(65_535)
            .initial_window_size(1 << 16)
            .initial_connection_window_size(1 << 24)
            .handshake::<_, Bytes>(io)
            .await?;

        let shared = Arc::new(Shared {
            streams: Arc::new(StreamTable::new()),
            budget: OutboundBudget::new(crate::flow::DEFAULT_CONNECTION_WINDOW),
            max_concurrent_streams: AtomicU32::new(config.max_concurrent_streams),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let driver_shared = shared.clone();
        let driver = tokio::spawn(async move {
            // drives the connection's reads and writes from one poll loop; see DESIGN.md for
            // why this crate doesn't split that into separate reader/writer tasks.
            if let Err(e) = h2_connection.await {
                tracing::warn!(error = %e, "http/2 connection driver exited with an error");
            } else {
                tracing::debug!("http/2 connection driver exited");
            }
            driver_shared.mark_closed();
        });

        Ok(Self {
            config,
            shared,
            send_request,
            driver: Some(driver),
        })
    }

    /// advisory back-pressure predicate. True when this connection should not be asked to carry
    /// more work right now: closing/closed, outbound window nearly exhausted, or at the
    /// stream-concurrency cap. Callers select a different connection rather than block on this.
    pub fn blocked(&self) -> bool {
        self.shared.is_closing()
            || self.shared.is_closed()
            || self.shared.budget.remaining() <= self.config.required_free_space
            || self.shared.streams.open_count() as u32 >= self.shared.max_concurrent_streams.load(Ordering::Acquire)
    }

    /// true once the connection has fully torn down (driver exited, transport closed).
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// the configuration this connection was opened with, for building requests against it.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// send `request` and wait for the full response, honoring its deadline.
    ///
    /// Pre-checks, in order: deadline already elapsed -> `Timeout`; `blocked()` -> `Blocked`;
    /// otherwise a stream is allocated and the request sent.
    pub async fn post(&self, request: Request) -> Result<Response, Error> {
        debug_assert!(
            request.body_len() <= self.config.max_payload_size(),
            "caller must enforce max_payload_size before calling post"
        );

        if deadline_elapsed(request.deadline()) {
            return Err(Error::Timeout);
        }
        if self.blocked() {
            return Err(Error::Blocked);
        }

        let mut send_request = self.send_request.clone();
        poll_fn(|cx| send_request.poll_ready(cx)).await.map_err(|e| {
            tracing::debug!(error = %e, "connection refused a new stream, likely closing");
            self.protocol_failure(e)
        })?;

        let deadline = request.deadline();
        let body_len = request.body_len();

        let wire_request = request.pseudo_and_headers(&self.config);
        let (response_fut, mut send_stream) = send_request
            .send_request(wire_request, false)
            .map_err(|e| self.protocol_failure(e))?;

        let _stream_guard = self.shared.streams.insert(next_correlation_id());

        self.shared.budget.debit(body_len);
        let _budget_guard = BudgetCredit {
            budget: &self.shared.budget,
            len: body_len,
        };

        self.send_body(&mut send_stream, request.into_body()).await?;

        let response = match wait_for(deadline_sleep(deadline), response_fut).await {
            Wait::Ready(res) => res.map_err(|e| self.protocol_failure(e))?,
            Wait::TimedOut => return Err(Error::Timeout),
        };

        let (parts, mut body) = response.into_parts();
        let mut collected = BytesMut::new();
        loop {
            if self.shared.is_closing() {
                return Err(Error::Closed);
            }
            match wait_for(deadline_sleep(deadline), body.data()).await {
                Wait::Ready(Some(chunk)) => {
                    let chunk = chunk.map_err(|e| self.protocol_failure(e))?;
                    let _ = body.flow_control().release_capacity(chunk.len());
                    collected.extend_from_slice(&chunk);
                }
                Wait::Ready(None) => break,
                Wait::TimedOut => return Err(Error::Timeout),
            }
        }

        Response::from_parts(parts, collected.freeze())
    }

    /// an `h2::Error` surfacing while a stream is already committed (send, awaiting response,
    /// reading body) means the connection is no longer trustworthy for this or any other
    /// in-flight stream. Mark `closing` and surface `Closed` to the caller rather than leaking
    /// the raw protocol error, per spec.md section 7's "ProtocolFailure ... mapped to Closed"
    /// rule.
    fn protocol_failure(&self, e: h2::Error) -> Error {
        tracing::warn!(error = %e, "http/2 protocol error, connection is closing");
        self.shared.mark_closing();
        Error::Closed
    }

    /// reserve capacity and push `body` to the peer in `h2`-sized chunks, ending the stream.
    /// Any failure here means the stream (or connection) is no longer usable; mapped to
    /// `Closed` the same way as every other post-commit `h2::Error`.
    async fn send_body(&self, send_stream: &mut h2::SendStream<Bytes>, mut body: Bytes) -> Result<(), Error> {
        if body.is_empty() {
            return send_stream.send_data(Bytes::new(), true).map_err(|e| self.protocol_failure(e));
        }

        while !body.is_empty() {
            send_stream.reserve_capacity(body.len());
            let cap = match poll_fn(|cx| send_stream.poll_capacity(cx)).await {
                Some(cap) => cap.map_err(|e| self.protocol_failure(e))?,
                // the capacity channel closed without yielding a size: the stream will never
                // accept more data, same outcome as any other mid-send protocol failure.
                None => {
                    self.shared.mark_closing();
                    return Err(Error::Closed);
                }
            };
            let chunk = body.split_to(cap.min(body.len()));
            send_stream.send_data(chunk, false).map_err(|e| self.protocol_failure(e))?;
        }
        send_stream.send_data(Bytes::new(), true).map_err(|e| self.protocol_failure(e))
    }

    /// set `closing`, cancel the background driver, and mark the connection `closed`. Any
    /// `post` calls still in flight observe the driver's disappearance as a protocol error,
    /// mapped to [`Error::Closed`].
    pub async fn close(mut self) {
        self.shared.mark_closing();
        if let Some(driver) = self.driver.take() {
            driver.abort();
            let _ = driver.await;
        }
        self.shared.mark_closed();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.mark_closing();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.shared.mark_closed();
    }
}

fn deadline_elapsed(deadline: Option<Instant>) -> bool {
    matches!(deadline, Some(d) if Instant::now() >= d)
}

fn next_correlation_id() -> u32 {
    use core::sync::atomic::AtomicU32 as Counter;
    static NEXT: Counter = Counter::new(1);
    NEXT.fetch_add(2, Ordering::Relaxed)
}

struct BudgetCredit<'a> {
    budget: &'a OutboundBudget,
    len: usize,
}

impl Drop for BudgetCredit<'_> {
    fn drop(&mut self) {
        self.budget.credit(self.len);
    }
}

enum Wait<T> {
    Ready(T),
    TimedOut,
}

async fn wait_for<F>(deadline: impl core::future::Future<Output = ()>, fut: F) -> Wait<F::Output>
where
    F: core::future::Future,
{
    tokio::select! {
        biased;
        out = fut => Wait::Ready(out),
        _ = deadline => Wait::TimedOut,
    }
}

fn deadline_sleep(deadline: Option<Instant>) -> impl core::future::Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => {
                let now = Instant::now();
                if at > now {
                    sleep(at - now).await;
                } else {
                    // already elapsed: resolve immediately instead of underflowing the duration.
                }
            }
            None => pending::<()>().await,
        }
    }
}

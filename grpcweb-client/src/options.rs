//! Per-call options and cancellation.

use std::time::Duration;

use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::watch;

/// Options for a single RPC call.
///
/// # Example
///
/// ```ignore
/// use grpcweb_client::CallOptions;
/// use std::time::Duration;
///
/// let (handle, signal) = CancelHandle::new();
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .header("authorization", "Bearer token123")
///     .cancel(signal);
///
/// // later, from anywhere:
/// handle.cancel();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Deadline for this call, overriding the client default.
    pub(crate) timeout: Option<Duration>,
    /// Extra request headers; merged after the protocol headers.
    pub(crate) headers: HeaderMap,
    /// Cancellation signal for this call.
    pub(crate) cancel: Option<CancelSignal>,
}

impl CallOptions {
    /// Create empty call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline for this call.
    ///
    /// The deadline is also propagated to the server through the
    /// `grpc-timeout` request header. Expiry surfaces as
    /// `DeadlineExceeded`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The configured deadline, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attach a cancellation signal.
    ///
    /// Firing the matching [`CancelHandle`] aborts the in-flight exchange
    /// and fails pending and subsequent operations with `Canceled`.
    pub fn cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Add a request header.
    ///
    /// Names the protocol owns (`grpc-*`, `content-type`, `te`,
    /// `x-grpc-web`) are ignored at send time.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        let value = value.try_into().expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// Try to add a request header; `None` if the name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    /// Replace all custom headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// The custom headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the custom headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// The firing side of a cancellation pair.
///
/// Cloneable; any clone can cancel. Dropping every handle without firing
/// leaves the call running to completion.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a connected handle/signal pair.
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether the signal has fired.
    pub fn is_canceled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The observing side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether the signal has fired.
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the signal fires; never resolves if every handle is
    /// dropped unfired.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// The signal as an owned future, for poll-based call sites.
    pub(crate) fn into_future(self) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.cancelled().await })
    }
}

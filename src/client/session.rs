//! Stream sessions: one producer task per streaming call, handing decoded events to the
//! consumer through a capacity-1 channel.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::interceptors::{ErrorSite, InterceptorChain};
use crate::lenient;
use crate::transport::{Frame, FrameStream, OutboundCall, StreamFailure, TransportError};
use crate::types::{ErrorEnvelope, SkippableEvent};
use crate::{Error, ErrorContext, Result};

/// A handle that can be used to request cancellation of a [`StreamSession`].
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Request cancellation. The producer stops at its next suspension point and drops
    /// the upstream connection.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Live, cancellable sequence of decoded events from one streaming call.
///
/// Yields `Ok(event)` in wire order. A decode failure is yielded as `Err` and the
/// session continues; any other `Err` is the last item. A panic in the producer
/// (for example inside an interceptor hook) is yielded as one `Error::Runtime`.
/// After cancellation the session yields nothing more, including events already
/// handed off.
///
/// Dropping the session cancels it.
pub struct StreamSession<E> {
    id: Uuid,
    rx: mpsc::Receiver<Result<E>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

impl<E> StreamSession<E>
where
    E: DeserializeOwned + SkippableEvent + Send + 'static,
{
    pub(crate) fn spawn(call: OutboundCall, frames: FrameStream, interceptors: InterceptorChain) -> Self {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);

        let producer = Producer {
            id,
            call,
            interceptors,
            tx,
            token: token.clone(),
        };
        let task = tokio::spawn(producer.run(frames));

        Self {
            id,
            rx,
            token,
            task: Some(task),
            finished: false,
        }
    }
}

impl<E> StreamSession<E> {
    /// Session id, also recorded on every log line of the producer.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait until the producer has released the connection.
    pub async fn close(mut self) {
        self.token.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(session = %self.id, "stream producer panicked");
                }
            }
        }
    }
}

impl<E> Unpin for StreamSession<E> {}

impl<E> Stream for StreamSession<E> {
    type Item = Result<E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.token.is_cancelled() {
            this.finished = true;
            this.rx.close();
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            Poll::Ready(None) => this.poll_producer_exit(cx),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E> StreamSession<E> {
    /// The channel is closed: the producer has ended or is unwinding. A clean exit
    /// ends the session; a panic becomes its last item.
    fn poll_producer_exit(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<E>>> {
        let Some(task) = self.task.as_mut() else {
            self.finished = true;
            return Poll::Ready(None);
        };
        let outcome = match Pin::new(task).poll(cx) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => return Poll::Pending,
        };

        self.task = None;
        self.finished = true;
        match outcome {
            Err(e) if e.is_panic() => {
                warn!(session = %self.id, "stream producer panicked");
                Poll::Ready(Some(Err(producer_panic(self.id, e))))
            }
            _ => Poll::Ready(None),
        }
    }
}

fn producer_panic(id: Uuid, err: JoinError) -> Error {
    let payload = err.into_panic();
    Error::runtime_with_context(
        format!("stream producer panicked: {}", panic_message(payload.as_ref())),
        ErrorContext::new()
            .with_source("stream_session")
            .with_details(format!("session {}", id)),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<E> Drop for StreamSession<E> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<E> std::fmt::Debug for StreamSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.finished)
            .finish()
    }
}

enum Step<E> {
    Skip,
    Yield(Result<E>),
    Stop(Error),
}

struct Producer<E> {
    id: Uuid,
    call: OutboundCall,
    interceptors: InterceptorChain,
    tx: mpsc::Sender<Result<E>>,
    token: CancellationToken,
}

impl<E> Producer<E>
where
    E: DeserializeOwned + SkippableEvent + Send + 'static,
{
    async fn run(self, mut frames: FrameStream) {
        let mut delivered = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(session = %self.id, delivered, "stream cancelled");
                    break;
                }
                next = frames.next() => next,
            };

            let Some(frame) = next else {
                debug!(session = %self.id, delivered, "stream finished");
                break;
            };

            match self.step(frame) {
                Step::Skip => continue,
                Step::Yield(item) => {
                    if !self.deliver(item).await {
                        break;
                    }
                    delivered += 1;
                }
                Step::Stop(err) => {
                    debug!(session = %self.id, delivered, error = %err, "stream failed");
                    self.deliver(Err(err)).await;
                    break;
                }
            }
        }

        // Dropping the frame stream closes the upstream connection.
        drop(frames);
    }

    /// Hand one item to the consumer. Returns false when the session is gone.
    async fn deliver(&self, item: Result<E>) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!(session = %self.id, "stream cancelled while waiting on consumer");
                false
            }
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    fn step(&self, frame: Frame) -> Step<E> {
        match frame {
            Frame::Error(failure) => Step::Stop(self.fail(failure)),
            Frame::Event(event) => match event.data {
                Some(data) if !data.is_empty() => self.decode(data),
                _ => {
                    trace!(session = %self.id, event = ?event.event, "skipping frame without data");
                    Step::Skip
                }
            },
        }
    }

    fn decode(&self, data: String) -> Step<E> {
        let chunk = match self
            .interceptors
            .apply_stream_chunk(&self.call, Bytes::from(data.clone()))
        {
            Ok(chunk) => chunk,
            Err(e) => return self.hook_failed(e),
        };
        if let Err(e) = self.interceptors.observe_stream_event(&self.call, data) {
            return self.hook_failed(e);
        }

        match lenient::decode::<E>(&chunk) {
            Ok(event) if event.is_skippable() => {
                trace!(session = %self.id, "skipping unrecognized event");
                Step::Skip
            }
            Ok(event) => Step::Yield(Ok(event)),
            Err(e) => {
                debug!(session = %self.id, error = %e, "failed to decode stream event");
                Step::Yield(Err(e))
            }
        }
    }

    fn hook_failed(&self, err: Error) -> Step<E> {
        let message = err.to_string();
        self.interceptors.notify_error(&ErrorSite {
            call: &self.call,
            status: None,
            body: None,
            message: &message,
        });
        Step::Stop(err)
    }

    fn fail(&self, failure: StreamFailure) -> Error {
        self.interceptors.notify_error(&ErrorSite {
            call: &self.call,
            status: failure.status,
            body: failure.body.as_deref(),
            message: &failure.message,
        });

        let typed = failure
            .body
            .as_deref()
            .and_then(|body| lenient::decode::<ErrorEnvelope>(body).ok());
        match typed {
            Some(envelope) => Error::Api(envelope.error),
            None => {
                warn!(session = %self.id, http_status = ?failure.status, message = %failure.message, "stream transport failure");
                Error::Transport(TransportError::from(failure))
            }
        }
    }
}

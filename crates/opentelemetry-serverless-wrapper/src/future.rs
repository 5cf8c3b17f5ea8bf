//! Future that closes an invocation when the wrapped handler completes.

use crate::context::ExecutionContext;
use crate::event::AsResponseView;
use crate::executor::{Failure, Invocation, failure_response};
use pin_project::{pin_project, pinned_drop};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

const CANCELLED_DESCRIPTION: &str = "invocation cancelled";

struct Active {
    context: Arc<ExecutionContext>,
    invocation: Invocation,
}

/// Future returned by [`ObservableService`](crate::ObservableService).
///
/// Polls the handler future with the invocation span current. On completion
/// it runs the response side of every profile, marks the span failed if the
/// handler returned an error, commits attributes and ends the span.
///
/// Dropping the future before completion closes the invocation as a failure
/// with status 500, so the active-requests counter and duration histogram
/// still receive their closing update.
#[pin_project(PinnedDrop)]
pub struct ObservableFuture<F> {
    #[pin]
    inner: F,
    active: Option<Active>,
    flush_on_end: bool,
}

impl<F> ObservableFuture<F> {
    pub(crate) fn new(
        inner: F,
        context: Arc<ExecutionContext>,
        invocation: Invocation,
        flush_on_end: bool,
    ) -> Self {
        Self {
            inner,
            active: Some(Active {
                context,
                invocation,
            }),
            flush_on_end,
        }
    }

    pub(crate) fn passthrough(inner: F) -> Self {
        Self {
            inner,
            active: None,
            flush_on_end: false,
        }
    }
}

impl<F, R, E> Future for ObservableFuture<F>
where
    F: Future<Output = Result<R, E>>,
    R: AsResponseView,
    E: Display,
{
    type Output = Result<R, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let poll_result = match this.active.as_ref() {
            Some(active) => {
                let _guard = active.invocation.attach();
                this.inner.poll(cx)
            }
            None => this.inner.poll(cx),
        };

        let Poll::Ready(result) = poll_result else {
            return Poll::Pending;
        };

        if let Some(Active {
            context,
            mut invocation,
        }) = this.active.take()
        {
            match &result {
                Ok(response) => {
                    invocation.record_response(&context, &response.as_response_view());
                    invocation.finish("", None);
                }
                Err(error) => {
                    let response = failure_response();
                    invocation.record_response(&context, &response.as_response_view());

                    let failure = Failure::from_error(error);
                    let description = failure.message.clone();
                    invocation.finish(&description, Some(failure));
                }
            }

            if *this.flush_on_end {
                context.flush();
            }
        }

        Poll::Ready(result)
    }
}

#[pinned_drop]
impl<F> PinnedDrop for ObservableFuture<F> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();

        if let Some(Active {
            context,
            mut invocation,
        }) = this.active.take()
        {
            let response = failure_response();
            invocation.record_response(&context, &response.as_response_view());
            invocation.finish(
                CANCELLED_DESCRIPTION,
                Some(Failure {
                    message: CANCELLED_DESCRIPTION.to_string(),
                    kind: "cancelled",
                }),
            );
        }
    }
}

//! Interception wrapper.
//!
//! [`Intercepted`] pairs a [`Target`] with the [`DebugSession`] that governs
//! it. Successful calls pass through unchanged. A failure (an `Err` or a
//! panic) is captured and analyzed when the session is active; an analyzed
//! failure is swallowed and the call yields `Ok(None)`, otherwise the
//! original failure is returned or its panic resumed.

use std::any::Any;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use tracing::debug;

use crate::capture::{InvocationContext, PanicCaptureGuard, Target};
use crate::session::{DebugSession, Disposition};

const NO_KEYWORD_ARGUMENTS: &str = "{}";

/// Callables invocable with their positional arguments packed in a tuple.
///
/// Implemented for every `Fn` of up to six arguments, so `divide(a, b)` is
/// called as `invoke((a, b))` and a one-argument function as `invoke((a,))`.
pub trait Invoke<Args> {
    type Output;

    fn invoke(&self, args: Args) -> Self::Output;
}

macro_rules! impl_invoke {
    ($($arg:ident),*) => {
        impl<Func, Out, $($arg,)*> Invoke<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Out,
        {
            type Output = Out;

            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> Out {
                self($($arg),*)
            }
        }
    };
}

impl_invoke!();
impl_invoke!(A1);
impl_invoke!(A1, A2);
impl_invoke!(A1, A2, A3);
impl_invoke!(A1, A2, A3, A4);
impl_invoke!(A1, A2, A3, A4, A5);
impl_invoke!(A1, A2, A3, A4, A5, A6);

/// A target wrapped by a session. Created by [`DebugSession::intercept`].
///
/// The calls must be awaited inside a Tokio runtime: analysis goes through
/// `reqwest`, and the interactive fix prompt reads stdin on the blocking pool.
///
/// # Examples
///
/// ```
/// use self_debug_core::{Console, DebugSession, target};
///
/// fn half(n: u32) -> Result<u32, String> {
///     if n % 2 == 0 { Ok(n / 2) } else { Err(format!("{n} is odd")) }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let session = DebugSession::builder().console(Console::buffered().0).build();
/// let half = session.intercept(target!(half));
/// assert_eq!(half.call((8,)).await, Ok(Some(4)));
/// assert_eq!(half.call((3,)).await, Err("3 is odd".to_owned()));
/// # }
/// ```
#[derive(Debug)]
pub struct Intercepted<'a, F> {
    session: &'a DebugSession,
    target: Target<F>,
}

impl<'a, F> Intercepted<'a, F> {
    pub(crate) fn new(session: &'a DebugSession, target: Target<F>) -> Self {
        Self { session, target }
    }

    pub fn target(&self) -> &Target<F> {
        &self.target
    }

    /// Call the target with positional arguments.
    ///
    /// Returns `Ok(Some(value))` on success, `Ok(None)` when a failure was
    /// analyzed and swallowed, and the original `Err` otherwise. A panic that
    /// is not analyzed resumes unwinding with its original payload.
    pub async fn call<A, T, E>(&self, args: A) -> Result<Option<T>, E>
    where
        F: Invoke<A, Output = Result<T, E>>,
        A: Debug,
        E: Display + Debug,
    {
        if !self.session.is_active() {
            return self.target.func().invoke(args).map(Some);
        }
        let arguments = format!("{args:?}");
        let func = self.target.func();
        self.run_guarded(arguments, NO_KEYWORD_ARGUMENTS.to_owned(), move || {
            func.invoke(args)
        })
        .await
    }

    /// Call a target taking positional arguments plus a keyword-style
    /// options value, rendered separately in the analysis.
    pub async fn call_with<A, K, T, E>(&self, args: A, kwargs: K) -> Result<Option<T>, E>
    where
        F: Fn(A, K) -> Result<T, E>,
        A: Debug,
        K: Debug,
        E: Display + Debug,
    {
        if !self.session.is_active() {
            return (self.target.func())(args, kwargs).map(Some);
        }
        let arguments = format!("{args:?}");
        let keyword_arguments = format!("{kwargs:?}");
        let func = self.target.func();
        self.run_guarded(arguments, keyword_arguments, move || func(args, kwargs))
            .await
    }

    /// Call an async target with positional arguments.
    ///
    /// Same contract as [`call`](Self::call); panics raised while creating
    /// or polling the future are intercepted too.
    pub async fn call_async<A, Fut, T, E>(&self, args: A) -> Result<Option<T>, E>
    where
        F: Invoke<A, Output = Fut>,
        Fut: Future<Output = Result<T, E>>,
        A: Debug,
        E: Display + Debug,
    {
        if !self.session.is_active() {
            return self.target.func().invoke(args).await.map(Some);
        }
        let arguments = format!("{args:?}");
        let outcome = {
            let _guard = PanicCaptureGuard::enter();
            match panic::catch_unwind(AssertUnwindSafe(|| self.target.func().invoke(args))) {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(payload) => Err(payload),
            }
        };
        self.settle(outcome, arguments, NO_KEYWORD_ARGUMENTS.to_owned())
            .await
    }

    async fn run_guarded<T, E>(
        &self,
        arguments: String,
        keyword_arguments: String,
        invoke: impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<T>, E>
    where
        E: Display + Debug,
    {
        let outcome = {
            let _guard = PanicCaptureGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(invoke))
        };
        self.settle(outcome, arguments, keyword_arguments).await
    }

    async fn settle<T, E>(
        &self,
        outcome: std::thread::Result<Result<T, E>>,
        arguments: String,
        keyword_arguments: String,
    ) -> Result<Option<T>, E>
    where
        E: Display + Debug,
    {
        match outcome {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(error)) => {
                let ctx =
                    InvocationContext::capture(&error, &self.target, arguments, keyword_arguments);
                match self.session.handle(&ctx).await {
                    Disposition::Handled => Ok(None),
                    Disposition::Unhandled => {
                        debug!(function = self.target.name(), "re-raising original error");
                        Err(error)
                    }
                }
            }
            Err(payload) => self.settle_panic(payload, arguments, keyword_arguments).await,
        }
    }

    async fn settle_panic<T, E>(
        &self,
        payload: Box<dyn Any + Send>,
        arguments: String,
        keyword_arguments: String,
    ) -> Result<Option<T>, E> {
        let ctx = InvocationContext::capture_panic(
            payload.as_ref(),
            &self.target,
            arguments,
            keyword_arguments,
        );
        match self.session.handle(&ctx).await {
            Disposition::Handled => Ok(None),
            Disposition::Unhandled => {
                debug!(function = self.target.name(), "resuming original panic");
                panic::resume_unwind(payload)
            }
        }
    }
}

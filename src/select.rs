//! Disjunctive waiting: fire the first of several futures and cancel the
//! rest.
//!
//! [`select2`]/[`select3`]/[`select4`] await whichever arm resolves first;
//! dropping the select future drops the losing arms, which removes their
//! subscriptions in O(1). The [`choose!`] macro layers arm bodies on top
//! and rethrows an arm's error into the enclosing actor.
//!
//! When an arm is already ready at subscription time the select still
//! suspends once and is rescheduled on the next ready-queue drain. Ties
//! are then broken in lexical arm order. This is what keeps
//! `loop { choose! { .. } }` over a perpetually-ready arm from starving a
//! timer arm.

use crate::runtime;
use std::pin::Pin;
use std::task::{Context, Poll};

/// An arm that can report, without side effects, whether polling it now
/// would complete.
pub trait Selectable: std::future::Future + Unpin {
    /// True if a poll would return `Ready` immediately.
    fn ready_now(&self) -> bool;
}

/// Outcome of [`select2`].
#[derive(Debug)]
pub enum Choice2<A, B> {
    /// The first arm fired.
    First(A),
    /// The second arm fired.
    Second(B),
}

/// Outcome of [`select3`].
#[derive(Debug)]
pub enum Choice3<A, B, C> {
    /// The first arm fired.
    First(A),
    /// The second arm fired.
    Second(B),
    /// The third arm fired.
    Third(C),
}

/// Outcome of [`select4`].
#[derive(Debug)]
pub enum Choice4<A, B, C, D> {
    /// The first arm fired.
    First(A),
    /// The second arm fired.
    Second(B),
    /// The third arm fired.
    Third(C),
    /// The fourth arm fired.
    Fourth(D),
}

/// Defers completion to the next ready-queue drain when an arm was ready
/// at subscription time. Returns true exactly once per select.
fn defer_if_ready(primed: &mut bool, any_ready: bool, cx: &mut Context<'_>) -> bool {
    if *primed {
        return false;
    }
    *primed = true;
    if any_ready {
        runtime::schedule_wake(cx.waker().clone());
        return true;
    }
    false
}

/// Awaits the first of two arms.
pub fn select2<A, B>(a: A, b: B) -> Select2<A, B>
where
    A: Selectable,
    B: Selectable,
{
    Select2 {
        a,
        b,
        primed: false,
    }
}

/// Future returned by [`select2`].
pub struct Select2<A, B> {
    a: A,
    b: B,
    primed: bool,
}

impl<A, B> Unpin for Select2<A, B> {}

impl<A, B> std::future::Future for Select2<A, B>
where
    A: Selectable,
    B: Selectable,
{
    type Output = Choice2<A::Output, B::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let any = this.a.ready_now() || this.b.ready_now();
        if defer_if_ready(&mut this.primed, any, cx) {
            return Poll::Pending;
        }
        if let Poll::Ready(out) = Pin::new(&mut this.a).poll(cx) {
            return Poll::Ready(Choice2::First(out));
        }
        if let Poll::Ready(out) = Pin::new(&mut this.b).poll(cx) {
            return Poll::Ready(Choice2::Second(out));
        }
        Poll::Pending
    }
}

/// Awaits the first of three arms.
pub fn select3<A, B, C>(a: A, b: B, c: C) -> Select3<A, B, C>
where
    A: Selectable,
    B: Selectable,
    C: Selectable,
{
    Select3 {
        a,
        b,
        c,
        primed: false,
    }
}

/// Future returned by [`select3`].
pub struct Select3<A, B, C> {
    a: A,
    b: B,
    c: C,
    primed: bool,
}

impl<A, B, C> Unpin for Select3<A, B, C> {}

impl<A, B, C> std::future::Future for Select3<A, B, C>
where
    A: Selectable,
    B: Selectable,
    C: Selectable,
{
    type Output = Choice3<A::Output, B::Output, C::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let any = this.a.ready_now() || this.b.ready_now() || this.c.ready_now();
        if defer_if_ready(&mut this.primed, any, cx) {
            return Poll::Pending;
        }
        if let Poll::Ready(out) = Pin::new(&mut this.a).poll(cx) {
            return Poll::Ready(Choice3::First(out));
        }
        if let Poll::Ready(out) = Pin::new(&mut this.b).poll(cx) {
            return Poll::Ready(Choice3::Second(out));
        }
        if let Poll::Ready(out) = Pin::new(&mut this.c).poll(cx) {
            return Poll::Ready(Choice3::Third(out));
        }
        Poll::Pending
    }
}

/// Awaits the first of four arms.
pub fn select4<A, B, C, D>(a: A, b: B, c: C, d: D) -> Select4<A, B, C, D>
where
    A: Selectable,
    B: Selectable,
    C: Selectable,
    D: Selectable,
{
    Select4 {
        a,
        b,
        c,
        d,
        primed: false,
    }
}

/// Future returned by [`select4`].
pub struct Select4<A, B, C, D> {
    a: A,
    b: B,
    c: C,
    d: D,
    primed: bool,
}

impl<A, B, C, D> Unpin for Select4<A, B, C, D> {}

impl<A, B, C, D> std::future::Future for Select4<A, B, C, D>
where
    A: Selectable,
    B: Selectable,
    C: Selectable,
    D: Selectable,
{
    type Output = Choice4<A::Output, B::Output, C::Output, D::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let any = this.a.ready_now()
            || this.b.ready_now()
            || this.c.ready_now()
            || this.d.ready_now();
        if defer_if_ready(&mut this.primed, any, cx) {
            return Poll::Pending;
        }
        if let Poll::Ready(out) = Pin::new(&mut this.a).poll(cx) {
            return Poll::Ready(Choice4::First(out));
        }
        if let Poll::Ready(out) = Pin::new(&mut this.b).poll(cx) {
            return Poll::Ready(Choice4::Second(out));
        }
        if let Poll::Ready(out) = Pin::new(&mut this.c).poll(cx) {
            return Poll::Ready(Choice4::Third(out));
        }
        if let Poll::Ready(out) = Pin::new(&mut this.d).poll(cx) {
            return Poll::Ready(Choice4::Fourth(out));
        }
        Poll::Pending
    }
}

/// Waits on several arms, runs the body of whichever fires first, and
/// cancels the rest.
///
/// Each arm is `pattern = future => body`. An arm resolving with an error
/// rethrows it at the arm (`?`), so the enclosing function must return
/// [`crate::error::Result`]. `break` and `continue` inside a body target
/// the loop enclosing the `choose!`.
///
/// ```ignore
/// loop {
///     choose! {
///         _ = net.delay(0.01) => { break; },
///         v = ticks.wait_next() => { count += v; },
///     }
/// }
/// ```
#[macro_export]
macro_rules! choose {
    ($p1:pat = $f1:expr => $b1:expr, $p2:pat = $f2:expr => $b2:expr $(,)?) => {
        match $crate::select::select2($f1, $f2).await {
            $crate::select::Choice2::First(__arm) => {
                let $p1 = __arm?;
                $b1
            }
            $crate::select::Choice2::Second(__arm) => {
                let $p2 = __arm?;
                $b2
            }
        }
    };
    ($p1:pat = $f1:expr => $b1:expr, $p2:pat = $f2:expr => $b2:expr,
     $p3:pat = $f3:expr => $b3:expr $(,)?) => {
        match $crate::select::select3($f1, $f2, $f3).await {
            $crate::select::Choice3::First(__arm) => {
                let $p1 = __arm?;
                $b1
            }
            $crate::select::Choice3::Second(__arm) => {
                let $p2 = __arm?;
                $b2
            }
            $crate::select::Choice3::Third(__arm) => {
                let $p3 = __arm?;
                $b3
            }
        }
    };
    ($p1:pat = $f1:expr => $b1:expr, $p2:pat = $f2:expr => $b2:expr,
     $p3:pat = $f3:expr => $b3:expr, $p4:pat = $f4:expr => $b4:expr $(,)?) => {
        match $crate::select::select4($f1, $f2, $f3, $f4).await {
            $crate::select::Choice4::First(__arm) => {
                let $p1 = __arm?;
                $b1
            }
            $crate::select::Choice4::Second(__arm) => {
                let $p2 = __arm?;
                $b2
            }
            $crate::select::Choice4::Third(__arm) => {
                let $p3 = __arm?;
                $b3
            }
            $crate::select::Choice4::Fourth(__arm) => {
                let $p4 = __arm?;
                $b4
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{Future, Promise, Void};
    use std::future::Future as _;

    fn noop_cx(run: impl FnOnce(&mut Context<'_>)) {
        use std::sync::Arc;
        use std::task::Wake;
        struct Noop;
        impl Wake for Noop {
            fn wake(self: Arc<Self>) {}
        }
        let waker = std::task::Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);
        run(&mut cx);
    }

    #[test]
    fn pending_arms_leave_select_pending() {
        let p1: Promise<i32> = Promise::new();
        let p2: Promise<i32> = Promise::new();
        let mut sel = select2(p1.get_future(), p2.get_future());
        noop_cx(|cx| {
            assert!(Pin::new(&mut sel).poll(cx).is_pending());
            assert!(Pin::new(&mut sel).poll(cx).is_pending());
        });
    }

    #[test]
    fn first_resolution_wins() {
        let p1: Promise<i32> = Promise::new();
        let p2: Promise<i32> = Promise::new();
        let mut sel = select2(p1.get_future(), p2.get_future());
        noop_cx(|cx| {
            assert!(Pin::new(&mut sel).poll(cx).is_pending());
            p2.send(7);
            match Pin::new(&mut sel).poll(cx) {
                Poll::Ready(Choice2::Second(Ok(7))) => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn ready_arm_defers_once_then_wins_lexically() {
        // Both arms ready at subscription: one deferral, then arm one.
        let a = Future::ready(1);
        let b = Future::ready(2);
        let mut sel = select2(a, b);
        noop_cx(|cx| {
            assert!(Pin::new(&mut sel).poll(cx).is_pending());
            match Pin::new(&mut sel).poll(cx) {
                Poll::Ready(Choice2::First(Ok(1))) => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn losing_subscription_is_cancelled_on_drop() {
        let p1: Promise<Void> = Promise::new();
        let p2: Promise<Void> = Promise::new();
        let f1 = p1.get_future();
        let f2 = p2.get_future();
        {
            let mut sel = select2(f1.clone(), f2.clone());
            noop_cx(|cx| {
                assert!(Pin::new(&mut sel).poll(cx).is_pending());
            });
            // Both arms registered a callback; dropping the select drops
            // the arm handles and removes them.
        }
        assert_eq!(f1.cell().live_callbacks(), 0);
        assert_eq!(f2.cell().live_callbacks(), 0);
    }

    #[test]
    fn error_arm_is_selected() {
        let p1: Promise<i32> = Promise::new();
        let f_err: Future<i32> =
            Future::from_error(crate::error::Error::new(crate::error::ErrorKind::ValueTooLarge));
        let mut sel = select2(p1.get_future(), f_err);
        noop_cx(|cx| {
            assert!(Pin::new(&mut sel).poll(cx).is_pending());
            match Pin::new(&mut sel).poll(cx) {
                Poll::Ready(Choice2::Second(Err(e))) => {
                    assert_eq!(e.kind(), crate::error::ErrorKind::ValueTooLarge);
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }
}

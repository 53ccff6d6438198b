//! Provide the rewrite machinery behind the parser tree.
//!
//! Everything here keeps the tree in its canonical reduced form after each
//! rewrite: pending transformations are merged rather than nested, failed
//! branches are dropped, committed results drift to the left of choices, and
//! lookahead continuations are pushed inward until they reach a node that
//! genuinely has to wait for input.

use std::rc::Rc;

use super::Parser::{self, Choice, CommittedChoice, Done, Failure, LookAhead, LookAheadIgnore, More, Partial};
use super::{any_token, Cont, Peek, Step, Transform};

// ----------- Pending transformations ------------

/// Attach a pending transformation to a parser without nesting.
///
/// A `Done` underneath absorbs the transformation immediately, and two
/// pending transformations compose into one, so a chain of partial results
/// always stays one node deep.
pub(crate) fn result_part<S, R>(f: Transform<R>, p: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    match p {
        Failure => Failure,
        Done(tail, r) => Done(tail, f(r)),
        Partial(g, q) => {
            let composed: Transform<R> = Rc::new(move |r| f(g(r)));
            Partial(composed, q)
        }
        p => Partial(f, Box::new(p)),
    }
}

/// Push a pending transformation into a finalized tree.
///
/// Used by `feed_eof` to flush the head of a partial-result chain into every
/// surviving committed leaf. Covers every variant: choices recurse, a node
/// still waiting for input becomes `Failure`, and lookahead variants compose
/// the transformation onto their continuations.
pub(crate) fn prepend<S, R>(f: Transform<R>, p: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    match p {
        Failure => Failure,
        Done(tail, r) => Done(tail, f(r)),
        Partial(g, q) => {
            let composed: Transform<R> = Rc::new(move |r| f(g(r)));
            Partial(composed, q)
        }
        Choice(a, b) => Choice(
            Box::new(prepend(f.clone(), *a)),
            Box::new(prepend(f, *b)),
        ),
        CommittedChoice(a, b) => CommittedChoice(
            Box::new(prepend(f.clone(), *a)),
            Box::new(prepend(f, *b)),
        ),
        More(_) => Failure,
        LookAhead(q, k) => LookAhead(
            q,
            Rc::new(move |fin| prepend(f.clone(), k(fin))),
        ),
        LookAheadIgnore(b) => {
            let around: Cont<S, R> = Rc::new(move |out| prepend(f.clone(), out));
            b.map_cont(around)
        }
    }
}

// ----------- Opaque-variant fallback ------------

/// Rewrite `p` through `trans` without pattern-matching it.
///
/// Builds a choice between a branch that waits for one more token and applies
/// `trans` after feeding it, and a branch that applies `trans` to the
/// end-of-input form of `p`. The second branch is guarded so it cannot
/// surface results while more input is still possible. A committed `p` keeps
/// its commitment: the two branches are joined with a committed choice.
pub(crate) fn resolve<S, R, R2>(
    trans: Rc<dyn Fn(Parser<S, R>) -> Parser<S, R2>>,
    p: Parser<S, R>,
) -> Parser<S, R2>
where
    S: Clone + 'static,
    R: Clone + 'static,
    R2: Clone + 'static,
{
    let committed = matches!(p, CommittedChoice(..));
    let at_eof = guard_eof(trans(p.clone().feed_eof()));
    let trans2 = trans;
    let step: Step<S, R2> = Rc::new(move |x: S| trans2(p.clone().feed(x)));
    let on_token = More(step);
    if committed {
        on_token.or_commit(at_eof)
    } else {
        on_token.or(at_eof)
    }
}

/// Restrict `q` to the end of input: the returned parser behaves like `q`
/// once the input is finalized, and fails as soon as another token arrives.
pub(crate) fn guard_eof<S, R>(q: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    if q.is_failure() {
        return Failure;
    }
    let accept: Rc<dyn Fn(Parser<S, S>) -> Parser<S, R>> = Rc::new(move |scout| {
        if scout.has_result() {
            Failure
        } else {
            q.clone()
        }
    });
    look_ahead_ignore(any_token::<S>(), accept)
}

// ----------- Lookahead plumbing ------------

/// Run `p` speculatively and continue with `k` applied to its settled form.
///
/// The continuation is pushed inward through partial results and both kinds
/// of choice, and nested lookaheads compose their continuations, so the
/// wrapping node only ever sits directly on a parser that is waiting for a
/// token.
pub(crate) fn look_ahead_into<S, R>(p: Parser<S, R>, k: Cont<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    match p {
        Failure => Failure,
        p @ Done(..) => k(p),
        Partial(f, q) => {
            let k2 = k;
            look_ahead_into(
                *q,
                Rc::new(move |fin| k2(result_part(f.clone(), fin))),
            )
        }
        Choice(a, b) => look_ahead_into(*a, k.clone()).or(look_ahead_into(*b, k)),
        CommittedChoice(a, b) => {
            look_ahead_into(*a, k.clone()).or_commit(look_ahead_into(*b, k))
        }
        p @ More(_) => LookAhead(Box::new(p), k),
        LookAhead(q, j) => LookAhead(
            q,
            Rc::new(move |fin| look_ahead_into(j(fin), k.clone())),
        ),
        LookAheadIgnore(b) => b.map_cont(k),
    }
}

/// Run `scout` speculatively, keeping only whether it can succeed.
///
/// Unlike [`look_ahead_into`] this must not distribute over the scout's
/// choices: a negative lookahead has to see the scout as a whole, because one
/// failing branch says nothing while another branch is still live. The node
/// collapses as soon as the scout either shows a committed result or fails
/// outright.
pub(crate) fn look_ahead_ignore<S, A, R>(
    scout: Parser<S, A>,
    accept: Rc<dyn Fn(Parser<S, A>) -> Parser<S, R>>,
) -> Parser<S, R>
where
    S: Clone + 'static,
    A: Clone + 'static,
    R: Clone + 'static,
{
    match scout {
        Failure => accept(Failure),
        s if s.has_result() => accept(s),
        s => LookAheadIgnore(Box::new(PeekState { scout: s, accept })),
    }
}

/// The erased state behind [`Parser::LookAheadIgnore`]: a scout parser whose
/// result type is hidden, and the continuation that consumes its settled
/// form. Only the outer result type leaks out of the box.
pub(crate) struct PeekState<S, A, R> {
    scout: Parser<S, A>,
    accept: Rc<dyn Fn(Parser<S, A>) -> Parser<S, R>>,
}

impl<S, A, R> Peek<S, R> for PeekState<S, A, R>
where
    S: Clone + 'static,
    A: Clone + 'static,
    R: Clone + 'static,
{
    fn feed_box(self: Box<Self>, x: S) -> Parser<S, R> {
        let PeekState { scout, accept } = *self;
        let x2 = x.clone();
        let fed: Rc<dyn Fn(Parser<S, A>) -> Parser<S, R>> =
            Rc::new(move |fin| accept(fin).feed(x2.clone()));
        look_ahead_ignore(scout.feed(x), fed)
    }

    fn feed_eof_box(self: Box<Self>) -> Parser<S, R> {
        let PeekState { scout, accept } = *self;
        accept(scout.feed_eof()).feed_eof()
    }

    fn map_cont(self: Box<Self>, around: Cont<S, R>) -> Parser<S, R> {
        let PeekState { scout, accept } = *self;
        let wrapped: Rc<dyn Fn(Parser<S, A>) -> Parser<S, R>> =
            Rc::new(move |fin| around(accept(fin)));
        LookAheadIgnore(Box::new(PeekState { scout, accept: wrapped }))
    }

    fn clone_box(&self) -> Box<dyn Peek<S, R>> {
        Box::new(PeekState {
            scout: self.scout.clone(),
            accept: self.accept.clone(),
        })
    }

    fn show_scout(&self, probe: &S, depth: usize) -> String {
        self.scout.show_depth(probe, depth)
    }
}

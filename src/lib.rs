//! Trickle: incremental parser combinators for Rust
//!
//! The goal of this library is to provide parser combinators that:
//!
//! * treat a parser as a first-class value,
//! * accept their input one token at a time, as it arrives,
//! * stream partial results out before the input has ended, and
//! * stay pure: feeding a parser returns a new parser, nothing is shared.
//!
//! It is based on:
//!
//! * [Derivatives of Regular Expressions](https://doi.org/10.1145/321239.321249)
//!   by J. Brzozowski, JACM 11(4) pp. 481-494,
//! * [Parsing with Derivatives](https://doi.org/10.1145/2034773.2034801)
//!   by M. Might, D. Darais and D. Spiewak, ICFP 2011.
//!
//! A parser over tokens `S` producing `R` is a tree of [`Parser`] nodes.
//! Feeding a token rewrites the tree into the parser of the remaining input;
//! feeding end-of-input settles it into its committed results:
//!
//! ~~~text
//! use trickle::{string, Parser};
//! let p = string("abc".chars().collect());
//! let p = p.feed_all("abcd".chars()).feed_eof();
//! assert_eq!(p.results(), vec![(vec!['a', 'b', 'c'], vec!['d'])]);
//! ~~~
//!
//! Results accumulate monoidally, so long outputs stream out while the input
//! is still arriving: [`Parser::result_prefix`] peels off whatever prefix of
//! the final result is already committed, and [`Parser::partial_results`]
//! enumerates the speculative ones.
//!
//! Tree depth tracks the size of the grammar, not the length of the input:
//! pending transformations compose instead of nesting and failed branches are
//! dropped on every rewrite, so feeding long inputs does not grow the stack.

use std::rc::Rc;

use self::impls::{guard_eof, look_ahead_ignore, look_ahead_into, prepend, resolve, result_part};
use self::Parser::{Choice, CommittedChoice, Done, Failure, LookAhead, LookAheadIgnore, More, Partial};

pub mod impls;

// ----------- Monoids ------------

/// An identity element and an associative combine.
///
/// Every operation that concatenates or streams results is parameterized over
/// a monoid on the result type: `concat`, `concat_overlap`, `map_parts`, the
/// repetition combinators, `and`, `and_then`, `eof`, `skip` and `optional`.
/// Parsers over non-monoidal results simply do not admit those operations.
pub trait Monoid {
    fn empty() -> Self;
    fn combine(self, other: Self) -> Self;
}

impl Monoid for () {
    fn empty() -> Self {}
    fn combine(self, _other: Self) -> Self {}
}

impl Monoid for String {
    fn empty() -> Self {
        String::new()
    }
    fn combine(mut self, other: Self) -> Self {
        self.push_str(&other);
        self
    }
}

impl<T> Monoid for Vec<T> {
    fn empty() -> Self {
        Vec::new()
    }
    fn combine(mut self, mut other: Self) -> Self {
        self.append(&mut other);
        self
    }
}

impl<A: Monoid, B: Monoid> Monoid for (A, B) {
    fn empty() -> Self {
        (A::empty(), B::empty())
    }
    fn combine(self, other: Self) -> Self {
        (self.0.combine(other.0), self.1.combine(other.1))
    }
}

// ----------- Types for parsers ------------

/// A pending transformation on a not-yet-complete result.
pub type Transform<R> = Rc<dyn Fn(R) -> R>;

/// What a parser does with its next token.
pub type Step<S, R> = Rc<dyn Fn(S) -> Parser<S, R>>;

/// A continuation applied to the settled form of a speculative sub-parse.
pub type Cont<S, R> = Rc<dyn Fn(Parser<S, R>) -> Parser<S, R>>;

/// A deferred parser, materialized when a sequencing combinator needs it.
/// Recursive grammars tie the knot here: the closure rebuilds the parser
/// from a reusable handle instead of embedding a copy of it in every node.
pub type Thunk<S, R> = Rc<dyn Fn() -> Parser<S, R>>;

/// A speculative sub-parse whose result type has been erased.
///
/// `LookAheadIgnore` only needs to know whether its scout could still
/// succeed, so the scout's result type stays hidden behind this object-safe
/// trait and only the outer result type `R` crosses the boundary. The
/// methods mirror the tree rewrites: `feed_box` and `feed_eof_box` are the
/// virtual derivation dispatch, `map_cont` composes an outer rewrite onto
/// the stored continuation.
pub trait Peek<S, R> {
    fn feed_box(self: Box<Self>, x: S) -> Parser<S, R>;
    fn feed_eof_box(self: Box<Self>) -> Parser<S, R>;
    fn map_cont(self: Box<Self>, around: Cont<S, R>) -> Parser<S, R>;
    fn clone_box(&self) -> Box<dyn Peek<S, R>>;
    fn show_scout(&self, probe: &S, depth: usize) -> String;
}

/// A parser over tokens `S` producing results `R`.
///
/// Every value of this type is one node of a parser tree. Feeding a token
/// with [`Parser::feed`] rewrites the whole tree; the variants are the
/// normal forms that survive between tokens:
///
/// * `Failure`: no success is possible.
/// * `Done(tail, r)`: the parse committed to `r`; `tail` holds the tokens
///   fed after the commit point, to be replayed when this result is
///   sequenced with another parser.
/// * `Partial(f, p)`: a prefix of the final result is already known, held
///   as the pending transformation `f` (typically `combine(prefix, _)`),
///   while `p` parses the rest.
/// * `Choice(a, b)`: both alternatives are live. The left operand is the
///   one with a committed result, if either has one.
/// * `CommittedChoice(a, b)`: alternation that discards `b` as soon as `a`
///   shows a result.
/// * `More(step)`: waits for exactly one more token.
/// * `LookAhead(p, k)`: runs `p` without consuming input, then continues
///   with `k` applied to `p`'s settled form.
/// * `LookAheadIgnore(peek)`: as `LookAhead`, but the sub-parse's result is
///   ignored; only its success or failure matters, so its result type is
///   erased.
pub enum Parser<S, R> {
    Failure,
    Done(Vec<S>, R),
    Partial(Transform<R>, Box<Parser<S, R>>),
    Choice(Box<Parser<S, R>>, Box<Parser<S, R>>),
    CommittedChoice(Box<Parser<S, R>>, Box<Parser<S, R>>),
    More(Step<S, R>),
    LookAhead(Box<Parser<S, R>>, Cont<S, R>),
    LookAheadIgnore(Box<dyn Peek<S, R>>),
}

impl<S: Clone, R: Clone> Clone for Parser<S, R> {
    fn clone(&self) -> Self {
        match self {
            Failure => Failure,
            Done(tail, r) => Done(tail.clone(), r.clone()),
            Partial(f, p) => Partial(f.clone(), p.clone()),
            Choice(a, b) => Choice(a.clone(), b.clone()),
            CommittedChoice(a, b) => CommittedChoice(a.clone(), b.clone()),
            More(step) => More(step.clone()),
            LookAhead(p, k) => LookAhead(p.clone(), k.clone()),
            LookAheadIgnore(peek) => LookAheadIgnore(peek.clone_box()),
        }
    }
}

impl<S, R> Parser<S, R> {
    /// A committed result is discoverable without feeding further input.
    ///
    /// `CommittedChoice` deliberately hides its branches here: until it is
    /// finalized or pruned, its right branch is a fallback rather than a
    /// result, and a greedy repetition must not publish the empty match it
    /// keeps in reserve.
    pub fn has_result(&self) -> bool {
        match self {
            Done(..) => true,
            Partial(_, p) => p.has_result(),
            Choice(a, b) => a.has_result() || b.has_result(),
            _ => false,
        }
    }

    /// No success is possible any more.
    pub fn is_failure(&self) -> bool {
        matches!(self, Failure)
    }

    /// The parse has settled: either failed, or fully committed with no
    /// alternatives left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Failure | Done(..))
    }
}

impl<S, R> Parser<S, R>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    // ----------- Feeding ------------

    /// Consume one token, yielding the parser of the remaining input.
    ///
    /// This is the derivative: each variant rewrites locally, and the
    /// lookahead variants propagate the token into both their inner parser
    /// and their continuation, so a lookahead that later commits continues
    /// from a parser that has already seen the same tokens.
    pub fn feed(self, x: S) -> Self {
        match self {
            Failure => Failure,
            Done(mut tail, r) => {
                tail.push(x);
                Done(tail, r)
            }
            Partial(f, p) => result_part(f, p.feed(x)),
            Choice(a, b) => a.feed(x.clone()).or(b.feed(x)),
            CommittedChoice(a, b) => a.feed(x.clone()).or_commit(b.feed(x)),
            More(step) => step(x),
            LookAhead(p, k) => {
                let x2 = x.clone();
                look_ahead_into(
                    p.feed(x),
                    Rc::new(move |fin| k(fin).feed(x2.clone())),
                )
            }
            LookAheadIgnore(peek) => peek.feed_box(x),
        }
    }

    /// Signal that no more tokens will arrive.
    ///
    /// A node still waiting for input becomes `Failure`; pending
    /// transformations are flushed into every surviving committed leaf;
    /// lookaheads settle both their inner parser and their continuation.
    pub fn feed_eof(self) -> Self {
        match self {
            Failure => Failure,
            done @ Done(..) => done,
            Partial(f, p) => prepend(f, p.feed_eof()),
            Choice(a, b) => a.feed_eof().or(b.feed_eof()),
            CommittedChoice(a, b) => a.feed_eof().or_commit(b.feed_eof()),
            More(_) => Failure,
            LookAhead(p, k) => look_ahead_into(
                p.feed_eof(),
                Rc::new(move |fin| k(fin).feed_eof()),
            ),
            LookAheadIgnore(peek) => peek.feed_eof_box(),
        }
    }

    /// Feed every token of `input`, in order.
    pub fn feed_all<I: IntoIterator<Item = S>>(self, input: I) -> Self {
        input.into_iter().fold(self, Parser::feed)
    }

    /// Feed tokens from `chunk` until the parse fully commits.
    ///
    /// Once the parser settles into a bare committed result, feeding stops
    /// and the leftover is returned: the result's pushback tail followed by
    /// the unfed remainder of `chunk`. The returned parser's own tail is
    /// emptied, since its tokens have been handed back.
    pub fn feed_prefix(mut self, chunk: &[S]) -> (Self, Vec<S>) {
        let mut rest = chunk.iter();
        loop {
            match self {
                Done(tail, r) => {
                    let mut leftover = tail;
                    leftover.extend(rest.cloned());
                    return (Done(Vec::new(), r), leftover);
                }
                p => match rest.next() {
                    Some(x) => self = p.feed(x.clone()),
                    None => return (p, Vec::new()),
                },
            }
        }
    }

    /// Feed tokens until the parser first has any committed result, then
    /// hand back the rest of the input unconsumed.
    pub fn feed_shortest_prefix<I: IntoIterator<Item = S>>(mut self, input: I) -> (Self, Vec<S>) {
        let mut rest = input.into_iter();
        loop {
            if self.has_result() {
                return (self, rest.collect());
            }
            match rest.next() {
                Some(x) => self = self.feed(x),
                None => return (self, Vec::new()),
            }
        }
    }

    /// Feed the whole input, finalize, and keep the result that consumed the
    /// most of it.
    ///
    /// Returns the winning result together with the tokens it left over, or
    /// the entire input on failure.
    pub fn feed_longest_prefix<I: IntoIterator<Item = S>>(
        self,
        input: I,
    ) -> Result<(R, Vec<S>), Vec<S>>
    where
        R: Monoid,
    {
        let input: Vec<S> = input.into_iter().collect();
        let settled = self.feed_all(input.iter().cloned()).feed_eof();
        let mut best: Option<(R, Vec<S>)> = None;
        for (r, tail) in settled.results() {
            let better = match &best {
                None => true,
                Some((_, shortest)) => tail.len() < shortest.len(),
            };
            if better {
                best = Some((r, tail));
            }
        }
        best.ok_or(input)
    }

    // ----------- Result extraction ------------

    /// Every committed result, paired with its unconsumed pushback tail.
    ///
    /// A plain left-leaning walk over `Done`, `Partial` (applying the
    /// pending transformation) and `Choice`; everything else holds no
    /// committed result yet.
    pub fn results(&self) -> Vec<(R, Vec<S>)> {
        match self {
            Done(tail, r) => vec![(r.clone(), tail.clone())],
            Partial(f, p) => p.results().into_iter().map(|(r, t)| (f(r), t)).collect(),
            Choice(a, b) => {
                let mut out = a.results();
                out.extend(b.results());
                out
            }
            _ => Vec::new(),
        }
    }

    /// Split the pending partial result off the head of the tree.
    ///
    /// If the head is a `Partial`, returns its accumulated prefix together
    /// with the parser of the remainder; otherwise returns the parser
    /// untouched. Repeated calls stream a long result out as it commits.
    pub fn result_prefix(self) -> (Option<R>, Self)
    where
        R: Monoid,
    {
        match self {
            Partial(f, p) => (Some(f(R::empty())), *p),
            p => (None, p),
        }
    }

    /// Every reachable partial result, paired with the parser that would
    /// produce the rest.
    ///
    /// Walks through `CommittedChoice` preferring the left branch whenever
    /// it yields anything, so a greedy repetition reports its speculative
    /// longest match rather than the empty fallback.
    pub fn partial_results(&self) -> Vec<(R, Self)>
    where
        R: Monoid,
    {
        match self {
            Done(tail, r) => vec![(r.clone(), Done(tail.clone(), R::empty()))],
            Partial(f, p) => {
                let inner = p.partial_results();
                if inner.is_empty() {
                    vec![(f(R::empty()), (**p).clone())]
                } else {
                    inner.into_iter().map(|(r, cont)| (f(r), cont)).collect()
                }
            }
            Choice(a, b) => {
                let mut out = a.partial_results();
                out.extend(b.partial_results());
                out
            }
            CommittedChoice(a, b) => {
                let preferred = a.partial_results();
                if preferred.is_empty() {
                    b.partial_results()
                } else {
                    preferred
                }
            }
            _ => Vec::new(),
        }
    }

    // ----------- Choice ------------

    /// Alternation: both branches stay live.
    ///
    /// `Failure` is the identity, two waiting parsers merge into one, and a
    /// committed result on the right is pulled leftward so that [`results`]
    /// stays a cheap prefix walk.
    ///
    /// [`results`]: Parser::results
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Failure, q) => q,
            (p, Failure) => p,
            (More(f), More(g)) => More(Rc::new(move |x: S| f(x.clone()).or(g(x)))),
            (p, q) => {
                if p.has_result() || !q.has_result() {
                    Choice(Box::new(p), Box::new(q))
                } else {
                    match q {
                        Choice(qa, qb) if qa.has_result() => Choice(qa, Box::new(p.or(*qb))),
                        q => Choice(Box::new(q), Box::new(p)),
                    }
                }
            }
        }
    }

    /// Committed alternation: the right branch is a fallback, discarded as
    /// soon as the left shows any result.
    pub fn or_commit(self, other: Self) -> Self {
        match (self, other) {
            (Failure, q) => q,
            (p, Failure) => p,
            (p, _) if p.has_result() => p,
            (CommittedChoice(a, b), q) => CommittedChoice(a, Box::new(b.or_commit(q))),
            (More(f), More(g)) => More(Rc::new(move |x: S| f(x.clone()).or_commit(g(x)))),
            (p, q) => CommittedChoice(Box::new(p), Box::new(q)),
        }
    }

    // ----------- Mapping ------------

    /// Apply `f` to every committed result.
    ///
    /// Structural where the tree allows it; a pending partial result or a
    /// lookahead carries `R` in its payload, so those fall back to the
    /// opaque rewrite, which re-applies the map after the next token.
    pub fn map<R2>(self, f: impl Fn(R) -> R2 + 'static) -> Parser<S, R2>
    where
        R2: Clone + 'static,
    {
        self.map_rc(Rc::new(f))
    }

    pub(crate) fn map_rc<R2>(self, f: Rc<dyn Fn(R) -> R2>) -> Parser<S, R2>
    where
        R2: Clone + 'static,
    {
        match self {
            Failure => Failure,
            Done(tail, r) => Done(tail, f(r)),
            Choice(a, b) => a.map_rc(f.clone()).or(b.map_rc(f)),
            CommittedChoice(a, b) => a.map_rc(f.clone()).or_commit(b.map_rc(f)),
            More(step) => More(Rc::new(move |x| step(x).map_rc(f.clone()))),
            p @ (Partial(..) | LookAhead(..) | LookAheadIgnore(..)) => {
                let f2 = f;
                resolve(Rc::new(move |q: Parser<S, R>| q.map_rc(f2.clone())), p)
            }
        }
    }

    /// Apply a monoid homomorphism to results and pending prefixes alike.
    ///
    /// `f` must satisfy `f(a.combine(b)) == f(a).combine(f(b))`. Unlike
    /// [`map`](Parser::map) this keeps streaming intact: the pending prefix
    /// of a partial result is translated directly, via `f` applied to the
    /// prefix accumulated so far.
    pub fn map_parts<R2>(self, f: impl Fn(R) -> R2 + 'static) -> Parser<S, R2>
    where
        R: Monoid,
        R2: Monoid + Clone + 'static,
    {
        self.map_parts_rc(Rc::new(f))
    }

    fn map_parts_rc<R2>(self, f: Rc<dyn Fn(R) -> R2>) -> Parser<S, R2>
    where
        R: Monoid,
        R2: Monoid + Clone + 'static,
    {
        match self {
            Failure => Failure,
            Done(tail, r) => Done(tail, f(r)),
            Partial(g, p) => {
                let prefix = f(g(R::empty()));
                result_part(
                    Rc::new(move |b: R2| prefix.clone().combine(b)),
                    p.map_parts_rc(f),
                )
            }
            Choice(a, b) => a.map_parts_rc(f.clone()).or(b.map_parts_rc(f)),
            CommittedChoice(a, b) => a.map_parts_rc(f.clone()).or_commit(b.map_parts_rc(f)),
            More(step) => More(Rc::new(move |x| step(x).map_parts_rc(f.clone()))),
            p @ (LookAhead(..) | LookAheadIgnore(..)) => {
                let f2 = f;
                resolve(
                    Rc::new(move |q: Parser<S, R>| q.map_parts_rc(f2.clone())),
                    p,
                )
            }
        }
    }

    // ----------- Sequencing ------------

    /// Monadic bind: once a result commits, hand it to `k` and replay the
    /// pushback tail into the parser `k` returns.
    pub fn bind<R2>(self, k: impl Fn(R) -> Parser<S, R2> + 'static) -> Parser<S, R2>
    where
        R2: Clone + 'static,
    {
        self.bind_rc(Rc::new(k))
    }

    fn bind_rc<R2>(self, k: Rc<dyn Fn(R) -> Parser<S, R2>>) -> Parser<S, R2>
    where
        R2: Clone + 'static,
    {
        match self {
            Failure => Failure,
            Done(tail, r) => k(r).feed_all(tail),
            Partial(f, p) => {
                let k2 = k;
                p.bind_rc(Rc::new(move |r| k2(f(r))))
            }
            Choice(a, b) => a.bind_rc(k.clone()).or(b.bind_rc(k)),
            CommittedChoice(a, b) => a.bind_rc(k.clone()).or_commit(b.bind_rc(k)),
            More(step) => More(Rc::new(move |x| step(x).bind_rc(k.clone()))),
            p @ (LookAhead(..) | LookAheadIgnore(..)) => {
                let k2 = k;
                resolve(Rc::new(move |q: Parser<S, R>| q.bind_rc(k2.clone())), p)
            }
        }
    }

    /// Sequence, discarding the left result.
    ///
    /// A pending transformation on the left collapses outright (its value is
    /// thrown away), and a lookahead on the left keeps only its success or
    /// failure.
    pub fn then<R2>(self, other: Parser<S, R2>) -> Parser<S, R2>
    where
        R2: Clone + 'static,
    {
        let other2 = other;
        self.then_thunk(Rc::new(move || other2.clone()))
    }

    pub(crate) fn then_thunk<R2>(self, q: Thunk<S, R2>) -> Parser<S, R2>
    where
        R2: Clone + 'static,
    {
        match self {
            Failure => Failure,
            Done(tail, _) => q().feed_all(tail),
            Partial(_, p) => p.then_thunk(q),
            Choice(a, b) => a.then_thunk(q.clone()).or(b.then_thunk(q)),
            CommittedChoice(a, b) => a.then_thunk(q.clone()).or_commit(b.then_thunk(q)),
            More(step) => More(Rc::new(move |x| step(x).then_thunk(q.clone()))),
            LookAhead(p, k) => {
                let accept: Rc<dyn Fn(Parser<S, R>) -> Parser<S, R2>> =
                    Rc::new(move |fin| k(fin).then_thunk(q.clone()));
                look_ahead_ignore(*p, accept)
            }
            p @ LookAheadIgnore(..) => {
                let q2 = q;
                resolve(
                    Rc::new(move |pp: Parser<S, R>| pp.then_thunk(q2.clone())),
                    p,
                )
            }
        }
    }

    /// Greedy monoidal sequencing.
    ///
    /// Once the left side commits with `r`, the composite becomes a partial
    /// result with prefix `r` over the right side, with the left's pushback
    /// tail replayed into it first.
    pub fn concat(self, other: Parser<S, R>) -> Parser<S, R>
    where
        R: Monoid,
    {
        let other2 = other;
        self.concat_thunk(Rc::new(move || other2.clone()))
    }

    pub(crate) fn concat_thunk(self, q: Thunk<S, R>) -> Parser<S, R>
    where
        R: Monoid,
    {
        match self {
            Failure => Failure,
            Done(tail, r) => result_part(
                Rc::new(move |b: R| r.clone().combine(b)),
                q().feed_all(tail),
            ),
            Partial(f, p) => result_part(f, p.concat_thunk(q)),
            Choice(a, b) => a.concat_thunk(q.clone()).or(b.concat_thunk(q)),
            CommittedChoice(a, b) => a.concat_thunk(q.clone()).or_commit(b.concat_thunk(q)),
            More(step) => More(Rc::new(move |x| step(x).concat_thunk(q.clone()))),
            LookAhead(p, k) => LookAhead(
                p,
                Rc::new(move |fin| k(fin).concat_thunk(q.clone())),
            ),
            LookAheadIgnore(peek) => {
                let q2 = q;
                peek.map_cont(Rc::new(move |out| out.concat_thunk(q2.clone())))
            }
        }
    }

    /// Monoidal sequencing that lets the right side overlap the left's end.
    ///
    /// Behaves like [`concat`](Parser::concat), except that a committed
    /// choice on the left races its two futures: on each token, keep
    /// committing the left, or settle the left at its end-of-input form and
    /// let the right side take the token instead. Repetition is built on
    /// this; it is what keeps `many0(p).concat(q)`-like grammars incremental
    /// when `p` could stop at several places.
    pub fn concat_overlap(self, other: Parser<S, R>) -> Parser<S, R>
    where
        R: Monoid,
    {
        let other2 = other;
        self.concat_overlap_thunk(Rc::new(move || other2.clone()))
    }

    pub(crate) fn concat_overlap_thunk(self, q: Thunk<S, R>) -> Parser<S, R>
    where
        R: Monoid,
    {
        match self {
            left @ CommittedChoice(..) => {
                // the end-of-input branch stays deferred behind the guard, so
                // a nullable left operand does not unfold at construction
                let left_eof = left.clone();
                let q_eof = q.clone();
                let settle: Rc<dyn Fn(Parser<S, S>) -> Parser<S, R>> = Rc::new(move |scout| {
                    if scout.has_result() {
                        Failure
                    } else {
                        left_eof.clone().feed_eof().concat_overlap_thunk(q_eof.clone())
                    }
                });
                let at_eof = look_ahead_ignore(any_token::<S>(), settle);
                let step: Step<S, R> = Rc::new(move |x: S| {
                    let committed = left
                        .clone()
                        .feed(x.clone())
                        .concat_overlap_thunk(q.clone());
                    let advanced_q = q().feed(x.clone());
                    let advanced = left
                        .clone()
                        .feed_eof()
                        .concat_overlap_thunk(Rc::new(move || advanced_q.clone()));
                    committed.or_commit(advanced)
                });
                More(step).or_commit(at_eof)
            }
            Failure => Failure,
            Done(tail, r) => result_part(
                Rc::new(move |b: R| r.clone().combine(b)),
                q().feed_all(tail),
            ),
            Partial(f, p) => result_part(f, p.concat_overlap_thunk(q)),
            Choice(a, b) => a
                .concat_overlap_thunk(q.clone())
                .or(b.concat_overlap_thunk(q)),
            More(step) => More(Rc::new(move |x| step(x).concat_overlap_thunk(q.clone()))),
            LookAhead(p, k) => LookAhead(
                p,
                Rc::new(move |fin| k(fin).concat_overlap_thunk(q.clone())),
            ),
            LookAheadIgnore(peek) => {
                let q2 = q;
                peek.map_cont(Rc::new(move |out| out.concat_overlap_thunk(q2.clone())))
            }
        }
    }

    // ----------- Conjunction ------------

    /// Parallel conjunction: both parsers see every token, and the composite
    /// succeeds only where both succeed.
    ///
    /// Partial results combine component-wise; the composite's unconsumed
    /// tail is the shorter of the two sides' tails, since the side that
    /// consumed more decides how much the conjunction consumed.
    pub fn and<R2>(self, other: Parser<S, R2>) -> Parser<S, (R, R2)>
    where
        R: Monoid,
        R2: Monoid + Clone + 'static,
    {
        match (self, other) {
            (Failure, _) | (_, Failure) => Failure,
            (Choice(a, b), q) => a.and(q.clone()).or(b.and(q)),
            (p, Choice(a, b)) => p.clone().and(*a).or(p.and(*b)),
            (CommittedChoice(a, b), q) => a.and(q.clone()).or_commit(b.and(q)),
            (p, CommittedChoice(a, b)) => p.clone().and(*a).or_commit(p.and(*b)),
            (Partial(f, p), q) => result_part(
                Rc::new(move |(a, b): (R, R2)| (f(a), b)),
                p.and(q),
            ),
            (p, Partial(f, q)) => result_part(
                Rc::new(move |(a, b): (R, R2)| (a, f(b))),
                p.and(*q),
            ),
            (Done(t1, r1), Done(t2, r2)) => {
                let tail = if t1.len() <= t2.len() { t1 } else { t2 };
                Done(tail, (r1, r2))
            }
            (Done(_, r1), q) => q.map(move |r2| (r1.clone(), r2)),
            (p, Done(_, r2)) => p.map(move |r1| (r1, r2.clone())),
            (More(f), More(g)) => More(Rc::new(move |x: S| f(x.clone()).and(g(x)))),
            (p, q) => {
                // lookahead-shaped operand: step both sides in lockstep
                let p2 = p.clone();
                let q2 = q.clone();
                let step: Step<S, (R, R2)> =
                    Rc::new(move |x: S| p2.clone().feed(x.clone()).and(q2.clone().feed(x)));
                More(step).or(guard_eof(p.feed_eof().and(q.feed_eof())))
            }
        }
    }

    /// Ordered conjunction into a pair.
    ///
    /// The left result fills the first slot the moment it commits, with the
    /// second slot still empty; the right parser's results then stream into
    /// the second slot.
    pub fn and_then<R2>(self, other: Parser<S, R2>) -> Parser<S, (R, R2)>
    where
        R: Monoid,
        R2: Monoid + Clone + 'static,
    {
        let other2 = other;
        self.and_then_thunk(Rc::new(move || other2.clone()))
    }

    fn and_then_thunk<R2>(self, q: Thunk<S, R2>) -> Parser<S, (R, R2)>
    where
        R: Monoid,
        R2: Monoid + Clone + 'static,
    {
        match self {
            Failure => Failure,
            Done(tail, r1) => {
                let rhs = q().feed_all(tail).map_parts(|r2| (R::empty(), r2));
                result_part(
                    Rc::new(move |(a, b): (R, R2)| (r1.clone().combine(a), b)),
                    rhs,
                )
            }
            Partial(f, p) => result_part(
                Rc::new(move |(a, b): (R, R2)| (f(a), b)),
                p.and_then_thunk(q),
            ),
            Choice(a, b) => a.and_then_thunk(q.clone()).or(b.and_then_thunk(q)),
            CommittedChoice(a, b) => a
                .and_then_thunk(q.clone())
                .or_commit(b.and_then_thunk(q)),
            More(step) => More(Rc::new(move |x| step(x).and_then_thunk(q.clone()))),
            p @ (LookAhead(..) | LookAheadIgnore(..)) => {
                let q2 = q;
                resolve(
                    Rc::new(move |pp: Parser<S, R>| pp.and_then_thunk(q2.clone())),
                    p,
                )
            }
        }
    }

    // ----------- Longest match ------------

    /// Prefer the alternative that consumes more input.
    ///
    /// A choice between a committed result (or a lookahead) and a branch
    /// that would keep consuming becomes a committed choice the other way
    /// round: take the token if one is available and the consuming branch
    /// stays live, fall back to the settled branch otherwise.
    pub fn longest(self) -> Self {
        match self {
            Choice(a, b) => match (*a, *b) {
                (a @ Done(..), b @ Done(..)) => Choice(Box::new(a), Box::new(b)),
                (a @ Done(..), b) => b.longest().or_commit(a),
                (a, b @ Done(..)) => a.longest().or_commit(b),
                (a @ LookAhead(..), b) => b.longest().or_commit(a),
                (a, b @ LookAhead(..)) => a.longest().or_commit(b),
                (a, b) => a.longest().or(b.longest()),
            },
            CommittedChoice(a, b) => a.longest().or_commit(b.longest()),
            Partial(f, p) => result_part(f, p.longest()),
            More(step) => More(Rc::new(move |x| step(x).longest())),
            p => p,
        }
    }

    // ----------- Diagnostics ------------

    /// Render the tree for inspection, probing waiting nodes with `probe`.
    ///
    /// A `More` node holds a closure, so the only way to look inside is to
    /// hypothetically feed it the supplied default token. Output is for
    /// diagnostics only and prints structure, not values.
    pub fn show(&self, probe: &S) -> String {
        self.show_depth(probe, 12)
    }

    pub(crate) fn show_depth(&self, probe: &S, depth: usize) -> String {
        if depth == 0 {
            return String::from("...");
        }
        match self {
            Failure => String::from("Failure"),
            Done(tail, _) => format!("Done([{} buffered], _)", tail.len()),
            Partial(_, p) => format!("Partial(_, {})", p.show_depth(probe, depth - 1)),
            Choice(a, b) => format!(
                "Choice({}, {})",
                a.show_depth(probe, depth - 1),
                b.show_depth(probe, depth - 1)
            ),
            CommittedChoice(a, b) => format!(
                "CommittedChoice({}, {})",
                a.show_depth(probe, depth - 1),
                b.show_depth(probe, depth - 1)
            ),
            More(step) => format!(
                "More(-> {})",
                step(probe.clone()).show_depth(probe, depth - 1)
            ),
            LookAhead(p, _) => format!("LookAhead({}, _)", p.show_depth(probe, depth - 1)),
            LookAheadIgnore(peek) => format!(
                "LookAheadIgnore({}, _)",
                peek.show_scout(probe, depth - 1)
            ),
        }
    }
}

// ----------- Primitive parsers ------------

/// The parser that always fails.
pub fn failure<S, R>() -> Parser<S, R> {
    Failure
}

/// Succeed immediately with `r`, consuming nothing.
pub fn pure<S, R>(r: R) -> Parser<S, R> {
    Done(Vec::new(), r)
}

/// Consume one token; the result is that token.
pub fn any_token<S>() -> Parser<S, S>
where
    S: Clone + 'static,
{
    More(Rc::new(|x| Done(Vec::new(), x)))
}

/// Consume one token satisfying `pred`.
pub fn satisfy<S>(pred: impl Fn(&S) -> bool + 'static) -> Parser<S, S>
where
    S: Clone + 'static,
{
    More(Rc::new(move |x| {
        if pred(&x) {
            Done(Vec::new(), x)
        } else {
            Failure
        }
    }))
}

/// Consume one token equal to `expected`.
pub fn token<S>(expected: S) -> Parser<S, S>
where
    S: Clone + PartialEq + 'static,
{
    satisfy(move |x| *x == expected)
}

/// Consume exactly `n` tokens into a sequence. `count(0)` succeeds
/// immediately with an empty sequence.
pub fn count<S>(n: usize) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    count_from(n, Vec::new())
}

fn count_from<S>(n: usize, acc: Vec<S>) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    if n == 0 {
        return Done(Vec::new(), acc);
    }
    More(Rc::new(move |x| {
        let mut taken = acc.clone();
        taken.push(x);
        count_from(n - 1, taken)
    }))
}

/// Consume exactly the sequence `word`; fail on the first mismatch. The
/// committed result is `word` itself.
pub fn string<S>(word: Vec<S>) -> Parser<S, Vec<S>>
where
    S: Clone + PartialEq + 'static,
{
    string_from(Rc::new(word), 0)
}

fn string_from<S>(word: Rc<Vec<S>>, at: usize) -> Parser<S, Vec<S>>
where
    S: Clone + PartialEq + 'static,
{
    if at == word.len() {
        return Done(Vec::new(), (*word).clone());
    }
    More(Rc::new(move |x: S| {
        if x == word[at] {
            string_from(word.clone(), at + 1)
        } else {
            Failure
        }
    }))
}

/// Consume the longest input prefix that is also a prefix of `word`.
pub fn prefix_of<S>(word: Vec<S>) -> Parser<S, Vec<S>>
where
    S: Clone + PartialEq + 'static,
{
    prefix_from(Rc::new(word), 0)
}

fn prefix_from<S>(word: Rc<Vec<S>>, at: usize) -> Parser<S, Vec<S>>
where
    S: Clone + PartialEq + 'static,
{
    let matched = Done(Vec::new(), word[..at].to_vec());
    if at == word.len() {
        return matched;
    }
    let step: Step<S, Vec<S>> = Rc::new(move |x: S| {
        if x == word[at] {
            prefix_from(word.clone(), at + 1)
        } else {
            Failure
        }
    });
    More(step).or_commit(matched)
}

/// Like [`prefix_of`], with one predicate per position; the match length is
/// capped at the number of predicates.
pub fn while_prefix_of<S>(preds: Vec<Box<dyn Fn(&S) -> bool>>) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    while_prefix_from(Rc::new(preds), 0, Vec::new())
}

fn while_prefix_from<S>(
    preds: Rc<Vec<Box<dyn Fn(&S) -> bool>>>,
    at: usize,
    acc: Vec<S>,
) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    let stop = Done(Vec::new(), acc.clone());
    if at == preds.len() {
        return stop;
    }
    let step: Step<S, Vec<S>> = Rc::new(move |x: S| {
        if preds[at](&x) {
            let mut taken = acc.clone();
            taken.push(x);
            while_prefix_from(preds.clone(), at + 1, taken)
        } else {
            Failure
        }
    });
    More(step).or_commit(stop)
}

/// Consume every leading token satisfying `pred`; may succeed empty.
pub fn take_while<S>(pred: impl Fn(&S) -> bool + 'static) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    take_while_rc(Rc::new(pred))
}

/// As [`take_while`], but at least one token must match.
pub fn take_while1<S>(pred: impl Fn(&S) -> bool + 'static) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    take_while1_rc(Rc::new(pred))
}

fn take_while_rc<S>(pred: Rc<dyn Fn(&S) -> bool>) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    take_while1_rc(pred).or_commit(pure(Vec::new()))
}

fn take_while1_rc<S>(pred: Rc<dyn Fn(&S) -> bool>) -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    More(Rc::new(move |x: S| {
        if pred(&x) {
            let rest = take_while_rc(pred.clone());
            result_part(
                Rc::new(move |mut tail: Vec<S>| {
                    let mut out = vec![x.clone()];
                    out.append(&mut tail);
                    out
                }),
                rest,
            )
        } else {
            Failure
        }
    }))
}

/// `p`, or an empty success. Both alternatives stay live.
pub fn optional<S, R>(p: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
{
    p.or(pure(R::empty()))
}

/// `Some` of `p`'s result, committing to `None` only if `p` cannot match.
pub fn option_maybe<S, R>(p: Parser<S, R>) -> Parser<S, Option<R>>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    p.map(Some).or_commit(pure(None))
}

/// Run `p` for its consumption only; the result is the empty monoid value.
pub fn skip<S, R, R2>(p: Parser<S, R>) -> Parser<S, R2>
where
    S: Clone + 'static,
    R: Clone + 'static,
    R2: Monoid + Clone + 'static,
{
    p.then(pure(R2::empty()))
}

// ----------- Repetition ------------

/// Zero or more `p`, results concatenated. Greedy: the empty match is only
/// a fallback, committed when `p` cannot continue.
pub fn many0<S, R>(p: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
{
    many1(p).or_commit(pure(R::empty()))
}

/// One or more `p`, results concatenated.
pub fn many1<S, R>(p: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
{
    let rest = p.clone();
    p.concat_overlap_thunk(Rc::new(move || many0(rest.clone())))
}

/// Repeat `p` until `end` matches; `end`'s result is discarded.
pub fn many_till<S, R, R2>(p: Parser<S, R>, end: Parser<S, R2>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
    R2: Clone + 'static,
{
    let again_p = p.clone();
    let again_end = end.clone();
    end.then(pure(R::empty())).or_commit(
        p.concat_overlap_thunk(Rc::new(move || {
            many_till(again_p.clone(), again_end.clone())
        })),
    )
}

/// One or more `p` separated by `sep`; the separators' results are
/// discarded.
pub fn sep_by1<S, R, R2>(p: Parser<S, R>, sep: Parser<S, R2>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
    R2: Clone + 'static,
{
    let again = p.clone();
    p.concat_overlap_thunk(Rc::new(move || many0(sep.clone().then(again.clone()))))
}

/// Zero or more `p` separated by `sep`.
pub fn sep_by0<S, R, R2>(p: Parser<S, R>, sep: Parser<S, R2>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
    R2: Clone + 'static,
{
    sep_by1(p, sep).or_commit(pure(R::empty()))
}

/// Commit every token; there is always a growing partial result.
pub fn accept_all<S>() -> Parser<S, Vec<S>>
where
    S: Clone + 'static,
{
    let step: Step<S, Vec<S>> = Rc::new(|x: S| {
        result_part(
            Rc::new(move |mut rest: Vec<S>| {
                let mut out = vec![x.clone()];
                out.append(&mut rest);
                out
            }),
            accept_all(),
        )
    });
    More(step).or_commit(pure(Vec::new()))
}

// ----------- Lookahead ------------

/// Peek: succeed with the empty result, consuming nothing, as soon as `p`
/// could succeed on the input seen so far.
pub fn look_ahead<S, R>(p: Parser<S, R>) -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
{
    look_ahead_into(
        p,
        Rc::new(|fin: Parser<S, R>| {
            if fin.has_result() {
                pure(R::empty())
            } else {
                Failure
            }
        }),
    )
}

/// Negative peek: succeed with the empty result, consuming nothing, exactly
/// when `p` fails. The inner result type is unconstrained.
pub fn look_ahead_not<S, A, R>(p: Parser<S, A>) -> Parser<S, R>
where
    S: Clone + 'static,
    A: Clone + 'static,
    R: Monoid + Clone + 'static,
{
    look_ahead_ignore(
        p,
        Rc::new(|fin: Parser<S, A>| {
            if fin.has_result() {
                Failure
            } else {
                pure(R::empty())
            }
        }),
    )
}

/// Succeed with the empty result only at the end of the input.
pub fn eof<S, R>() -> Parser<S, R>
where
    S: Clone + 'static,
    R: Monoid + Clone + 'static,
{
    look_ahead_not(any_token::<S>())
}

// ----------- Tests -------------

impl<S, R> Parser<S, R> {
    /// Destructure a parse that is known to have fully committed into its
    /// pushback tail and result. Panics on any other state; test support.
    pub fn into_result(self) -> (Vec<S>, R) {
        match self {
            Done(tail, r) => (tail, r),
            _ => panic!("Not done"),
        }
    }
}

#[cfg(test)]
fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

#[test]
fn test_pair_monoid() {
    let combined = (chars("a"), String::from("x")).combine((chars("b"), String::from("y")));
    assert_eq!(combined, (chars("ab"), String::from("xy")));
    let unit: (Vec<char>, String) = Monoid::empty();
    assert_eq!(unit, (vec![], String::new()));
}

#[test]
fn test_any_token() {
    let p = any_token::<char>();
    assert_eq!(p.feed('x').feed_eof().results(), vec![('x', vec![])]);
    let p = any_token::<char>();
    assert_eq!(p.feed_eof().feed('x').results(), vec![]);
}

#[test]
fn test_satisfy() {
    let digit = || satisfy(char::is_ascii_digit);
    assert_eq!(digit().feed('7').feed_eof().results(), vec![('7', vec![])]);
    assert!(digit().feed('x').is_failure());
}

#[test]
fn test_token() {
    assert_eq!(
        token('a').feed('a').feed('b').feed_eof().results(),
        vec![('a', vec!['b'])]
    );
    assert!(token('a').feed('b').is_failure());
}

#[test]
fn test_count() {
    let p = count::<char>(2).feed_all(chars("xyz")).feed_eof();
    assert_eq!(p.results(), vec![(chars("xy"), chars("z"))]);
    let trivial = count::<char>(0);
    assert_eq!(trivial.feed_eof().results(), vec![(vec![], vec![])]);
}

#[test]
fn test_string() {
    let p = string(chars("abc")).feed_all(chars("abcd")).feed_eof();
    let (tail, word) = p.into_result();
    assert_eq!(word, chars("abc"));
    assert_eq!(tail, chars("d"));
    assert!(string(chars("abc")).feed_all(chars("abx")).is_failure());
}

#[test]
fn test_prefix_of() {
    let p = prefix_of(chars("abc")).feed_all(chars("abx")).feed_eof();
    assert_eq!(p.results(), vec![(chars("ab"), chars("x"))]);
    let whole = prefix_of(chars("ab")).feed_all(chars("ab")).feed_eof();
    assert_eq!(whole.results(), vec![(chars("ab"), vec![])]);
}

#[test]
fn test_while_prefix_of() {
    let preds: Vec<Box<dyn Fn(&char) -> bool>> = vec![
        Box::new(|c: &char| c.is_ascii_alphabetic()),
        Box::new(|c: &char| c.is_ascii_digit()),
    ];
    let p = while_prefix_of(preds).feed_all(chars("a1b")).feed_eof();
    assert_eq!(p.results(), vec![(chars("a1"), chars("b"))]);
}

#[test]
fn test_take_while() {
    let p = take_while(char::is_ascii_digit)
        .feed_all(chars("123x"))
        .feed_eof();
    assert_eq!(p.results(), vec![(chars("123"), chars("x"))]);
    assert!(take_while1(char::is_ascii_digit).feed('x').is_failure());
}

#[test]
fn test_or_pulls_results_left() {
    // a committed result on the right of an alternation surfaces first
    let p = token('a').map(|c| vec![c]).or(pure(vec![]));
    let fed = p.feed('a').feed_eof();
    assert_eq!(fed.results(), vec![(vec![], vec!['a']), (vec!['a'], vec![])]);
}

#[test]
fn test_or_commit_prunes() {
    let p = pure::<char, char>('x').or_commit(token('y'));
    assert_eq!(p.feed_eof().results(), vec![('x', vec![])]);
}

#[test]
fn test_eof_parser() {
    let at_end = eof::<char, String>().feed_eof();
    assert_eq!(at_end.results(), vec![(String::new(), vec![])]);
    assert!(eof::<char, String>().feed('x').is_failure());
}

#[test]
fn test_feed_prefix() {
    let input = chars("abcd");
    let (p, leftover) = string(chars("ab")).feed_prefix(&input);
    assert_eq!(leftover, chars("cd"));
    let (tail, word) = p.into_result();
    assert_eq!(word, chars("ab"));
    assert_eq!(tail, vec![]);
}

#[test]
fn test_result_prefix() {
    let p = token('a').map(|c| vec![c]).concat(accept_all());
    let fed = p.feed_all(chars("ab"));
    let (prefix, rest) = fed.result_prefix();
    assert_eq!(prefix, Some(vec!['a']));
    let (next, _) = rest.feed_eof().result_prefix();
    assert_eq!(next, None);
}

#[test]
fn test_partial_results_grow() {
    let p = accept_all::<char>().feed_all(chars("ab"));
    let partials = p.partial_results();
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].0, chars("ab"));
}

#[test]
fn test_show_probes_more() {
    assert_eq!(token('a').show(&'a'), "More(-> Done([0 buffered], _))");
    assert_eq!(token('a').show(&'b'), "More(-> Failure)");
}

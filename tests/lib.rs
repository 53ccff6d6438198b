//! End-to-end checks of the combinator algebra over character input.

use trickle::{
    accept_all, any_token, count, eof, failure, look_ahead, look_ahead_not, many0, many1,
    many_till, option_maybe, pure, satisfy, sep_by1, skip, string, take_while, take_while1, token,
    Parser,
};

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn digit() -> Parser<char, Vec<char>> {
    satisfy(char::is_ascii_digit).map(|c| vec![c])
}

// ----------- Scenarios -------------

#[test]
fn string_with_leftover() {
    let p = string(chars("abc")).feed_all(chars("abcd")).feed_eof();
    let (tail, word) = p.into_result();
    assert_eq!(word, chars("abc"));
    assert_eq!(tail, chars("d"));
}

#[test]
fn choice_of_tokens() {
    let p = token('a').or(token('b')).feed_all(chars("b")).feed_eof();
    assert_eq!(p.results(), vec![('b', vec![])]);
}

#[test]
fn many_digits_stop_at_nondigit() {
    let p = many0(digit()).feed_all(chars("123x")).feed_eof();
    assert_eq!(p.results(), vec![(chars("123"), chars("x"))]);
}

#[test]
fn lookahead_then_longer_match() {
    let p = look_ahead(string(chars("ab"))).concat(string(chars("abc")));
    let p = p.feed_all(chars("abc")).feed_eof();
    assert_eq!(p.results(), vec![(chars("abc"), vec![])]);
}

#[test]
fn ambiguous_counts_keep_both_results() {
    let p = count::<char>(2).or(count::<char>(3));
    let p = p.feed_all(chars("xyz")).feed_eof();
    assert_eq!(
        p.results(),
        vec![(chars("xy"), chars("z")), (chars("xyz"), vec![])]
    );
}

#[test]
fn longest_prefix_of_repeated_token() {
    let p = many0(token('a').map(|c| vec![c]));
    assert_eq!(
        p.feed_longest_prefix(chars("aaab")),
        Ok((chars("aaa"), chars("b")))
    );
}

#[test]
fn longest_prefix_failure_returns_input() {
    let p = many1(token('a').map(|c| vec![c]));
    assert_eq!(p.feed_longest_prefix(chars("xyz")), Err(chars("xyz")));
}

// ----------- Algebra laws -------------

#[test]
fn failure_is_identity_of_or() {
    let lhs = token('a').or(failure()).feed('a').feed_eof();
    let rhs = failure().or(token('a')).feed('a').feed_eof();
    let plain = token('a').feed('a').feed_eof();
    assert_eq!(lhs.results(), plain.results());
    assert_eq!(rhs.results(), plain.results());
}

#[test]
fn or_is_associative_up_to_result_multiset() {
    let run = |p: Parser<char, char>| {
        let mut out = p.feed('b').feed_eof().results();
        out.sort();
        out
    };
    let left = run(token('a').or(token('b')).or(any_token()));
    let right = run(token('a').or(token('b').or(any_token())));
    assert_eq!(left, right);
}

#[test]
fn empty_result_is_identity_of_concat() {
    let plain = string(chars("ab")).feed_all(chars("abc")).feed_eof();
    let lhs = pure(vec![])
        .concat(string(chars("ab")))
        .feed_all(chars("abc"))
        .feed_eof();
    let rhs = string(chars("ab"))
        .concat(pure(vec![]))
        .feed_all(chars("abc"))
        .feed_eof();
    assert_eq!(lhs.results(), plain.results());
    assert_eq!(rhs.results(), plain.results());
}

#[test]
fn feeding_a_committed_result_only_buffers() {
    let p = pure('r').feed_all(chars("xs")).feed_eof();
    assert_eq!(p.results(), vec![('r', chars("xs"))]);
}

#[test]
fn count_consumes_exactly_n() {
    let p = count::<char>(3).feed_all(chars("hello")).feed_eof();
    assert_eq!(p.results(), vec![(chars("hel"), chars("lo"))]);
}

#[test]
fn many0_is_many1_with_empty_fallback() {
    for input in ["", "1", "12", "12x"] {
        let built = many0(digit()).feed_all(chars(input)).feed_eof();
        let spelled = many1(digit())
            .or_commit(pure(vec![]))
            .feed_all(chars(input))
            .feed_eof();
        assert_eq!(built.results(), spelled.results(), "input {:?}", input);
    }
}

#[test]
fn committed_choice_prunes_when_left_has_result() {
    let p = pure('x').or_commit(token('y'));
    assert_eq!(p.feed_eof().results(), vec![('x', vec![])]);
}

#[test]
fn lookahead_does_not_consume() {
    let alone = string(chars("abc")).feed_all(chars("abcd")).feed_eof();
    let peeked = look_ahead(string(chars("ab")))
        .concat(string(chars("abc")))
        .feed_all(chars("abcd"))
        .feed_eof();
    assert_eq!(peeked.results(), alone.results());
}

#[test]
fn and_succeeds_only_when_both_do() {
    let both = string(chars("ab"))
        .and(take_while(char::is_ascii_alphabetic))
        .feed_all(chars("ab"))
        .feed_eof();
    assert_eq!(both.results(), vec![((chars("ab"), chars("ab")), vec![])]);

    let one_short = token('a')
        .map(|c| vec![c])
        .and(token('b').map(|c| vec![c]))
        .feed_all(chars("a"))
        .feed_eof();
    assert_eq!(one_short.results(), vec![]);
}

// ----------- Sequencing -------------

#[test]
fn bind_feeds_pushback_into_continuation() {
    let doubled = any_token::<char>().bind(token);
    assert_eq!(
        doubled.clone().feed_all(chars("aa")).feed_eof().results(),
        vec![('a', vec![])]
    );
    assert!(doubled.feed_all(chars("ab")).is_failure());
}

#[test]
fn then_discards_left_result() {
    let p = string(chars("ab")).then(string(chars("cd")));
    let p = p.feed_all(chars("abcd")).feed_eof();
    assert_eq!(p.results(), vec![(chars("cd"), vec![])]);
}

#[test]
fn then_replays_buffered_tokens() {
    let fed = pure(()).feed_all(chars("ab"));
    let (tail, taken) = fed.then(count::<char>(2)).feed_eof().into_result();
    assert_eq!(taken, chars("ab"));
    assert_eq!(tail, vec![]);
}

#[test]
fn and_then_fills_first_slot_immediately() {
    let p = string(chars("ab")).and_then(string(chars("cd")));
    let fed = p.feed_all(chars("ab"));
    let partials = fed.partial_results();
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].0, (chars("ab"), vec![]));

    let done = fed.feed_all(chars("cd")).feed_eof();
    assert_eq!(done.results(), vec![((chars("ab"), chars("cd")), vec![])]);
}

#[test]
fn pair_results_concatenate_componentwise() {
    // sequencing two pair-producing parses leans on the pair monoid
    let ab = || string(chars("a")).and_then(string(chars("b")));
    let p = ab().concat(ab());
    let fed = p.feed_all(chars("ab"));
    let partials = fed.partial_results();
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].0, (chars("a"), chars("b")));

    let (tail, pair) = fed.feed_all(chars("ab")).feed_eof().into_result();
    assert_eq!(pair, (chars("aa"), chars("bb")));
    assert_eq!(tail, vec![]);
}

// ----------- Mapping -------------

#[test]
fn map_applies_to_streaming_parser() {
    let p = accept_all::<char>().map(|v| v.len());
    let p = p.feed_all(chars("ab")).feed_eof();
    assert_eq!(p.results(), vec![(2, vec![])]);
}

#[test]
fn map_parts_translates_prefixes() {
    let p = accept_all::<char>().map_parts(|v: Vec<char>| v.into_iter().collect::<String>());
    let fed = p.feed_all(chars("ab"));
    let partials = fed.partial_results();
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].0, "ab".to_string());
    assert_eq!(fed.feed_eof().results(), vec![("ab".to_string(), vec![])]);
}

#[test]
fn skip_keeps_consumption_drops_value() {
    let p = skip::<char, Vec<char>, String>(string(chars("ab")));
    let p = p.feed_all(chars("abc")).feed_eof();
    assert_eq!(p.results(), vec![(String::new(), chars("c"))]);
}

// ----------- Repetition -------------

#[test]
fn take_while1_requires_one_match() {
    assert!(take_while1(char::is_ascii_digit).feed('x').is_failure());
    let p = take_while1(char::is_ascii_digit)
        .feed_all(chars("7x"))
        .feed_eof();
    assert_eq!(p.results(), vec![(chars("7"), chars("x"))]);
}

#[test]
fn many_till_stops_at_terminator() {
    let p = many_till(any_token::<char>().map(|c| vec![c]), token(';'));
    assert_eq!(
        p.clone().feed_all(chars("ab;")).feed_eof().results(),
        vec![(chars("ab"), vec![])]
    );
    // no terminator, no match
    assert_eq!(p.feed_all(chars("ab")).feed_eof().results(), vec![]);
}

#[test]
fn sep_by_discards_separators() {
    let p = sep_by1(digit(), token(','));
    let p = p.feed_all(chars("1,2,3")).feed_eof();
    assert_eq!(p.results(), vec![(chars("123"), vec![])]);
}

#[test]
fn longest_prefers_the_consuming_branch() {
    let two = count::<char>(1).or(count::<char>(2)).longest();
    let fed = two.clone().feed_all(chars("xy")).feed_eof();
    assert_eq!(fed.results(), vec![(chars("xy"), vec![])]);
    let short = two.feed_all(chars("x")).feed_eof();
    assert_eq!(short.results(), vec![(chars("x"), vec![])]);
}

// ----------- Lookahead -------------

#[test]
fn negative_lookahead_consumes_nothing() {
    let p = look_ahead_not::<char, char, Vec<char>>(token('a'));
    let missed = p.clone().feed_all(chars("b")).feed_eof();
    assert_eq!(missed.results(), vec![(vec![], chars("b"))]);
    assert!(p.feed('a').is_failure());
}

#[test]
fn eof_only_matches_at_end() {
    let p = digit().concat(eof());
    assert_eq!(
        p.clone().feed_all(chars("7")).feed_eof().results(),
        vec![(chars("7"), vec![])]
    );
    assert_eq!(p.feed_all(chars("78")).feed_eof().results(), vec![]);
}

// ----------- Feeding drivers -------------

#[test]
fn shortest_prefix_stops_at_first_result() {
    let (p, leftover) = count::<char>(2).feed_shortest_prefix(chars("abcd"));
    assert_eq!(leftover, chars("cd"));
    assert_eq!(p.feed_eof().results(), vec![(chars("ab"), vec![])]);
}

#[test]
fn parsers_are_values_and_clone_independently() {
    let started = count::<char>(2).feed('x');
    let one_way = started.clone().feed('y').feed_eof();
    let other_way = started.feed('z').feed_eof();
    assert_eq!(one_way.results(), vec![(chars("xy"), vec![])]);
    assert_eq!(other_way.results(), vec![(chars("xz"), vec![])]);
}

#[test]
fn option_maybe_commits_to_none_only_on_mismatch() {
    let p = option_maybe(token('a'));
    assert_eq!(
        p.clone().feed('a').feed_eof().results(),
        vec![(Some('a'), vec![])]
    );
    assert_eq!(p.feed('b').feed_eof().results(), vec![(None, chars("b"))]);
}

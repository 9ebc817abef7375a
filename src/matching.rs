use std::collections::HashSet;

use log::trace;

use crate::{
    fsm::{RegexNFA, StateId, Symbol},
    utils::RegexFlags,
};

/// The symbol read at `pos`: the input byte inside the input, a sentinel
/// outside of it.
pub fn symbol_at(input: &[u8], pos: isize) -> Symbol {
    if pos < 0 {
        Symbol::StartOfText
    } else {
        match input.get(pos as usize) {
            Some(c) => Symbol::Byte(*c),
            None => Symbol::EndOfText,
        }
    }
}

type Position = (StateId, isize);

#[derive(Debug)]
struct Frame {
    position: Position,
    children: Vec<Position>,
    next: usize,
}

/// Depth-first backtracking over the automaton with an explicit stack.
///
/// From a state the search tries, in order: the first destination of the
/// transition on the current symbol (one step further), then every epsilon
/// destination at the same offset, and, while still before the start of the
/// text, that destination one step further as well. A position that is
/// already on the current path is a dead end, which is what keeps epsilon
/// cycles such as `(a*)*` from looping forever. With
/// [`RegexFlags::OPTIMIZE`] every explored position stays dead.
#[derive(Debug)]
struct Search<'a> {
    nfa: &'a RegexNFA,
    input: &'a [u8],
    stack: Vec<Frame>,
    seen: HashSet<Position>,
    memoize: bool,
    frames: usize,
}

impl<'a> Search<'a> {
    fn new(nfa: &'a RegexNFA, input: &'a [u8]) -> Search<'a> {
        Search {
            nfa,
            input,
            stack: Vec::new(),
            seen: HashSet::new(),
            memoize: nfa.get_flags().contains(RegexFlags::OPTIMIZE),
            frames: 0,
        }
    }

    fn accepts(&self, (state, pos): Position) -> bool {
        symbol_at(self.input, pos) == Symbol::EndOfText
            && self.nfa.state(state).map_or(false, |state| state.is_end())
    }

    fn children(&self, (state, pos): Position) -> Vec<Position> {
        let symbol = symbol_at(self.input, pos);
        let mut children = Vec::new();
        if let Some(next) = self.nfa.targets(state, symbol).first() {
            children.push((*next, pos + 1));
        }
        for next in self.nfa.targets(state, Symbol::Epsilon) {
            children.push((*next, pos));
            if symbol == Symbol::StartOfText {
                children.push((*next, pos + 1));
            }
        }
        children
    }

    fn enter(&mut self, position: Position) {
        self.seen.insert(position);
        self.stack.push(Frame {
            position,
            children: self.children(position),
            next: 0,
        });
        self.frames += 1;
    }

    fn leave(&mut self) {
        if let Some(frame) = self.stack.pop() {
            if !self.memoize {
                self.seen.remove(&frame.position);
            }
        }
    }

    fn run(&mut self, position: Position) -> bool {
        if self.accepts(position) {
            return true;
        }
        self.enter(position);

        while let Some(frame) = self.stack.last_mut() {
            let child = frame.children.get(frame.next).copied();
            frame.next += 1;
            match child {
                Some(child) if self.seen.contains(&child) => continue,
                Some(child) => {
                    if self.accepts(child) {
                        return true;
                    }
                    self.enter(child);
                }
                None => self.leave(),
            }
        }
        false
    }
}

impl RegexNFA {
    /// Whether a path from `state` at offset `pos` reaches the accepting state
    /// exactly when the whole remaining input has been read. A negative `pos`
    /// starts before the text, on the start-of-text sentinel.
    pub fn matches<I: AsRef<[u8]>>(&self, state: StateId, input: I, pos: isize) -> bool {
        let mut search = Search::new(self, input.as_ref());
        let matched = search.run((state, pos));
        trace!(
            "{:?} from state {} at {}: {} after {} frames",
            self.pattern(),
            state,
            pos,
            matched,
            search.frames
        );
        matched
    }

    /// Whether the whole input matches the pattern.
    pub fn is_match<I: AsRef<[u8]>>(&self, input: I) -> bool {
        self.matches(self.start(), input, 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{fsm::RegexNFA, utils::RegexFlags};

    use super::*;

    fn check(pattern: &str, accepted: &[&str], rejected: &[&str]) {
        for flags in [RegexFlags::NO_FLAG, RegexFlags::OPTIMIZE] {
            let regex = RegexNFA::with_flags(pattern, flags).unwrap();
            for input in accepted {
                assert!(regex.is_match(input), "{} should match {:?}", pattern, input);
            }
            for input in rejected {
                assert!(!regex.is_match(input), "{} should not match {:?}", pattern, input);
            }
        }
    }

    #[test]
    fn test_symbol_at() {
        assert_eq!(symbol_at(b"ab", -1), Symbol::StartOfText);
        assert_eq!(symbol_at(b"ab", 0), Symbol::Byte(b'a'));
        assert_eq!(symbol_at(b"ab", 1), Symbol::Byte(b'b'));
        assert_eq!(symbol_at(b"ab", 2), Symbol::EndOfText);
        assert_eq!(symbol_at(b"", 5), Symbol::EndOfText);
    }

    #[test]
    fn test_literal_patterns_match_exactly() {
        check("abc", &["abc"], &["", "ab", "abcd", "xabc", "abd"]);
        check("a", &["a"], &["", "aa", "b"]);
    }

    #[test]
    fn test_quantifiers() {
        check("x*", &["", "x", "xx", "xxxxxxx"], &["y", "xy"]);
        check("x+", &["x", "xx", "xxxxxxx"], &["", "y", "xxy"]);
        check("x?", &["", "x"], &["xx", "y"]);
    }

    #[test]
    fn test_range_quantifiers() {
        check("x{2,4}", &["xx", "xxx", "xxxx"], &["", "x", "xxxxx"]);
        check("x{2,}", &["xx", "xxx", "xxxxxxxxxx"], &["", "x"]);
        check("x{3}", &["xxx"], &["xx", "xxxx"]);
        check("x{0,2}", &["", "x", "xx"], &["xxx"]);
        // at least one copy is always compiled, so this is x{0,1}
        check("x{0}", &["", "x"], &["xx"]);
    }

    #[test]
    fn test_alternation() {
        check("a|b", &["a", "b"], &["c", "ab", ""]);
        check("a|b|c", &["a", "b", "c"], &["d", "bc"]);
        check("ab|cd", &["ab", "cd"], &["ad", "abcd"]);
    }

    #[test]
    fn test_bracket() {
        check("[a-c]", &["a", "b", "c"], &["d", "", "ab"]);
        check("[a-c]+z", &["az", "cabz"], &["z", "dz"]);
    }

    #[test]
    fn test_groups() {
        check("(ab)+", &["ab", "abab", "ababab"], &["", "a", "aba"]);
        check("(a|b)c", &["ac", "bc"], &["a", "c", "abc"]);
        check("x(a|bc){2}y", &["xaay", "xbcay", "xbcbcy"], &["xay", "xaaay"]);
    }

    #[test]
    fn test_end_to_end() {
        check("ab*c", &["ac", "abc", "abbbbc"], &["ab", "a c"]);
    }

    #[test]
    fn test_epsilon_cycles_terminate() {
        check("(a*)*", &["", "a", "aaa"], &["b", "ab"]);
        check("(a?)*b", &["b", "ab", "aab"], &["a", "ba"]);
        check("((a|b*)*)+c", &["c", "abbac"], &["abba"]);
    }

    #[test]
    fn test_sentinel_bytes_are_plain_input() {
        let regex = RegexNFA::new("a").unwrap();
        assert!(!regex.is_match(b"\x00a"));
        assert!(!regex.is_match(b"a\x02"));
        let regex = RegexNFA::new(b"\x01\x02").unwrap();
        assert!(regex.is_match(b"\x01\x02"));
    }

    #[test]
    fn test_match_before_start_of_text() {
        // starting on the start-of-text sentinel may take one zero-width step
        let regex = RegexNFA::new("ab*c").unwrap();
        for input in ["ac", "abc", "abbbbc", "ab", "a c", ""] {
            assert_eq!(
                regex.matches(regex.start(), input, -1),
                regex.matches(regex.start(), input, 0),
                "{:?}",
                input
            );
        }
        assert!(regex.matches(regex.start(), "abc", -1));
        assert!(!regex.matches(regex.start(), "abc", -2));

        let regex = RegexNFA::new("x*").unwrap();
        assert!(regex.matches(regex.start(), "", -1));
        assert!(regex.matches(regex.start(), "xx", -1));
    }

    #[test]
    fn test_match_from_inner_offsets() {
        let regex = RegexNFA::new("b+").unwrap();
        assert!(regex.matches(regex.start(), "aabb", 2));
        assert!(!regex.matches(regex.start(), "aabb", 1));
        // at or past the end only the empty remainder is left
        let regex = RegexNFA::new("b*").unwrap();
        assert!(regex.matches(regex.start(), "aa", 2));
        assert!(regex.matches(regex.start(), "aa", 7));
    }

    #[test]
    fn test_match_from_any_state() {
        let regex = RegexNFA::new("ab").unwrap();
        assert!(regex.matches(regex.accept(), "", 0));
        assert!(!regex.matches(regex.accept(), "b", 0));
        // state 2 is the entry of the `b` fragment
        assert!(regex.matches(2, "b", 0));
        assert!(!regex.matches(usize::MAX, "", 0));
    }

    #[test]
    fn test_recompiling_agrees() {
        let inputs = ["", "a", "ab", "abab", "aab", "b", "abba"];
        for pattern in ["(ab)+", "a*b?", "(a|b){1,3}", "[ab]{2,}"] {
            let first = RegexNFA::new(pattern).unwrap();
            let second = RegexNFA::new(pattern).unwrap();
            for input in inputs {
                assert_eq!(first.is_match(input), second.is_match(input));
            }
        }
    }

    #[test]
    fn test_optimize_agrees_with_backtracking() {
        let inputs = ["", "a", "aa", "aaaaaaaaaaaa", "aaaaaaaaaaab", "ab", "ba"];
        for pattern in ["(a|a)*", "(a*)*b", "a{2,5}a*", "(a|ab)(c|bcd)?"] {
            let plain = RegexNFA::new(pattern).unwrap();
            let optimized = RegexNFA::with_flags(pattern, RegexFlags::OPTIMIZE).unwrap();
            for input in inputs {
                assert_eq!(plain.is_match(input), optimized.is_match(input));
            }
        }
    }

    #[test]
    fn test_long_input_does_not_overflow() {
        let regex = RegexNFA::new("(ab)*c").unwrap();
        let mut input = "ab".repeat(50_000);
        assert!(!regex.is_match(&input));
        input.push('c');
        assert!(regex.is_match(&input));
    }

    #[test]
    fn test_shared_across_threads() {
        let regex = RegexNFA::new("(a|b)*c").unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = ["abc", "c", "abab", "bbbbc"]
                .into_iter()
                .map(|input| {
                    let regex = &regex;
                    scope.spawn(move || regex.is_match(input))
                })
                .collect();
            let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results, vec![true, true, false, true]);
        });
    }
}

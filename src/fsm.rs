use std::{
    collections::{BTreeSet, HashMap},
    error::Error,
    fmt::Display,
};

use itertools::Itertools;
use log::debug;

use crate::{
    parser::{run_parse, visitor::Visitor, Data, ParserError, Token, UpperBound},
    utils::RegexFlags,
};

/// Index of a state in the automaton's arena.
pub type StateId = usize;

/// The key of a transition. Sentinels and epsilon live outside the byte
/// alphabet, so no input byte can be mistaken for one of them.
#[derive(Hash, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Symbol {
    Byte(u8),
    StartOfText,
    EndOfText,
    Epsilon,
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Byte(c) => write!(f, "{}", std::ascii::escape_default(*c)),
            Self::StartOfText => write!(f, "SOT"),
            Self::EndOfText => write!(f, "EOT"),
            Self::Epsilon => write!(f, "{}", 'ε'),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct State {
    start: bool,
    end: bool,
    transitions: HashMap<Symbol, Vec<StateId>>,
}

impl State {
    pub fn is_start(&self) -> bool {
        self.start
    }

    pub fn is_end(&self) -> bool {
        self.end
    }

    /// Destinations for `symbol`, in insertion order.
    pub fn targets(&self, symbol: Symbol) -> &[StateId] {
        match self.transitions.get(&symbol) {
            Some(targets) => targets,
            None => &[],
        }
    }

    /// All outgoing edges, ordered by symbol.
    pub fn transitions(&self) -> impl Iterator<Item = (Symbol, &[StateId])> + '_ {
        self.transitions
            .iter()
            .sorted_by_key(|(symbol, _)| **symbol)
            .map(|(symbol, targets)| (*symbol, targets.as_slice()))
    }
}

#[derive(Debug)]
pub enum ReError {
    ParsingFailed(ParserError),
}

impl Display for ReError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParsingFailed(err) => write!(f, "{}", err),
        }
    }
}

impl Error for ReError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ParsingFailed(err) => Some(err),
        }
    }
}

impl From<ParserError> for ReError {
    fn from(err: ParserError) -> Self {
        ReError::ParsingFailed(err)
    }
}

type Fragment = (StateId, StateId);

/// Grows the state arena while a token tree is compiled. Only this type ever
/// mutates a transition table; [`RegexNFA`] takes the arena once it is done.
#[derive(Debug, Default)]
struct NfaBuilder {
    states: Vec<State>,
}

impl NfaBuilder {
    fn gen_state(&mut self) -> StateId {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn fragment(&mut self) -> Fragment {
        (self.gen_state(), self.gen_state())
    }

    fn add_transition(&mut self, start: StateId, end: StateId, symbol: Symbol) {
        self.states[start]
            .transitions
            .entry(symbol)
            .or_default()
            .push(end);
    }

    fn epsilon(&mut self, start: StateId, end: StateId) {
        self.add_transition(start, end, Symbol::Epsilon)
    }

    fn symbol_transition(&mut self, c: u8) -> Fragment {
        let (start, end) = self.fragment();
        self.add_transition(start, end, Symbol::Byte(c));
        (start, end)
    }

    fn alternation(&mut self, left: &Fragment, right: &Fragment) -> Fragment {
        let fragment = self.fragment();
        self.epsilon(fragment.0, left.0);
        self.epsilon(fragment.0, right.0);
        self.epsilon(left.1, fragment.1);
        self.epsilon(right.1, fragment.1);

        fragment
    }

    fn concatenation(&mut self, fragments: &[Fragment]) -> Fragment {
        for (a, b) in fragments.iter().tuple_windows() {
            self.epsilon(a.1, b.0);
        }
        match (fragments.first(), fragments.last()) {
            (Some(first), Some(last)) => (first.0, last.1),
            // the tokenizer never hands over an empty sequence
            _ => {
                let (start, end) = self.fragment();
                self.epsilon(start, end);
                (start, end)
            }
        }
    }

    /// Wraps the compiled pattern between a global start and a global end
    /// state and hands the arena over.
    fn finish(mut self, root: Fragment) -> (Vec<State>, StateId, StateId) {
        let start = self.gen_state();
        let accept = self.gen_state();
        self.states[start].start = true;
        self.states[accept].end = true;
        self.epsilon(start, root.0);
        self.epsilon(root.1, accept);
        (self.states, start, accept)
    }
}

impl Visitor for NfaBuilder {
    type Result = Fragment;

    fn visit_literal(&mut self, literal: u8) -> Self::Result {
        self.symbol_transition(literal)
    }

    fn visit_bracket(&mut self, set: &BTreeSet<u8>) -> Self::Result {
        let (start, end) = self.fragment();
        for c in set {
            self.add_transition(start, end, Symbol::Byte(*c));
        }
        (start, end)
    }

    fn visit_or(&mut self, left: &Token, right: &Token) -> Self::Result {
        let left = left.accept(self);
        let right = right.accept(self);
        self.alternation(&left, &right)
    }

    /// Unrolls the repetition into `max` copies (or `max(1, min)` when
    /// unbounded). Copies past the minimum may jump straight to the exit and an
    /// unbounded repeat loops from the exit back to the last copy.
    fn visit_repeat(&mut self, min: usize, max: UpperBound, token: &Token) -> Self::Result {
        let (start, end) = self.fragment();
        if min == 0 {
            self.epsilon(start, end);
        }

        let copies = match max {
            UpperBound::Bounded(max) => max,
            UpperBound::Unbounded => min.max(1),
        };

        let (mut from, mut to) = token.accept(self);
        self.epsilon(start, from);

        for i in 2..=copies {
            let (s, e) = token.accept(self);
            self.epsilon(to, s);
            from = s;
            to = e;
            if i > min {
                self.epsilon(s, end);
            }
        }
        self.epsilon(to, end);

        if max == UpperBound::Unbounded {
            self.epsilon(end, from);
        }
        (start, end)
    }

    fn visit_group(&mut self, tokens: &[Token]) -> Self::Result {
        let fragments: Vec<Fragment> = tokens.iter().map(|token| token.accept(self)).collect();
        self.concatenation(&fragments)
    }
}

/// A compiled pattern. The automaton is frozen once built: states are only
/// reachable through shared references, so one `RegexNFA` can serve any
/// number of concurrent matches.
#[derive(Debug, Clone)]
pub struct RegexNFA {
    pattern: String,
    flags: RegexFlags,
    states: Vec<State>,
    start: StateId,
    accept: StateId,
}

impl RegexNFA {
    pub fn new<P: AsRef<[u8]>>(pattern: P) -> Result<RegexNFA, ReError> {
        Self::with_flags(pattern, RegexFlags::NO_FLAG)
    }

    pub fn with_flags<P: AsRef<[u8]>>(pattern: P, flags: RegexFlags) -> Result<RegexNFA, ReError> {
        let pattern = pattern.as_ref();
        let tokens = run_parse(pattern)?;

        let mut builder = NfaBuilder::default();
        let root = builder.visit_group(&tokens);
        let (states, start, accept) = builder.finish(root);

        let nfa = RegexNFA {
            pattern: String::from_utf8_lossy(pattern).into_owned(),
            flags,
            states,
            start,
            accept,
        };
        debug!(
            "compiled {:?} into {} states",
            nfa.pattern,
            nfa.states.len()
        );
        if flags.contains(RegexFlags::DEBUG) {
            debug!("token tree: {}", tokens.iter().join(""));
            debug!("{}", nfa.render());
        }
        Ok(nfa)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn get_flags(&self) -> RegexFlags {
        self.flags
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn accept(&self) -> StateId {
        self.accept
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id)
    }

    pub(crate) fn targets(&self, id: StateId, symbol: Symbol) -> &[StateId] {
        match self.state(id) {
            Some(state) => state.targets(symbol),
            None => &[],
        }
    }

    /// Convert the automaton to GraphViz Dot code for debugging purposes.
    pub fn render(&self) -> String {
        let opts = "[fillcolor=\"#EEEEEE\" fontcolor=\"#888888\"]";
        let mut out = String::new();
        for (id, state) in self.states.iter().enumerate() {
            if state.is_start() {
                out += &format!("node_{}[label=\"{}\"][fillcolor=green]\n", id, id);
            } else if state.is_end() {
                out += &format!("node_{}[label=\"{}\" shape=doublecircle]\n", id, id);
            } else {
                out += &format!("node_{}[label=\"{}\"]{}\n", id, id, opts);
            }
            for (symbol, targets) in state.transitions() {
                for target in targets {
                    if let Symbol::Epsilon = symbol {
                        out += &format!("node_{} -> node_{}[style=dashed]\n", id, target);
                    } else {
                        out += &format!(
                            "node_{} -> node_{}[label=\"{}\"]\n",
                            id, target, symbol
                        );
                    }
                }
            }
        }
        let opts = "node [shape=circle style=filled fillcolor=\"#4385f5\" fontcolor=\"#FFFFFF\" \
        color=white penwidth=5.0 margin=0.1 width=0.5 height=0.5 fixedsize=true]";
        format!(
            "digraph G {{  rankdir=\"LR\" graph [fontname = \"Courier New\"];
                node [fontname = \"verdana\", style = rounded];
                edge [fontname = \"verdana\"];
                {{\n{}\n{}\n}}}}",
            opts, out
        )
    }
}

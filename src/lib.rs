//! A small regular-expression engine: patterns are tokenized into a token
//! tree, compiled into a Thompson NFA and matched by backtracking over the
//! automaton.
//!
//! ```
//! use reg_nfa::RegexNFA;
//!
//! let regex = RegexNFA::new("ab*c").unwrap();
//! assert!(regex.is_match("abbbc"));
//! assert!(!regex.is_match("ab"));
//! ```

pub mod fsm;
pub mod matching;
pub mod parser;
pub mod utils;

pub use crate::fsm::{ReError, RegexNFA, State, StateId, Symbol};
pub use crate::parser::{ParserError, Token, UpperBound, REPEAT_MAX};
pub use crate::utils::RegexFlags;

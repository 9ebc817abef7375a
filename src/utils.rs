use bitflags::bitflags;

bitflags! {
    /// Options fixed at compile time and carried by the compiled automaton.
    pub struct RegexFlags: u32 {
        const NO_FLAG = 0;
        /// Never explore the same `(state, offset)` pair twice while matching.
        const OPTIMIZE = 1 << 6;
        /// Log the token tree and the rendered automaton after compilation.
        const DEBUG = 1 << 7;
    }
}

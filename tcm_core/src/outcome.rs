pub mod outcome {
    /// What a single engine step did; the run loop stops on `Halted` or `Finished`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum StepOutcome {
        Executed,
        /// instruction suppressed by a false conditional.
        Skipped,
        Halted,
        /// instruction pointer is past the end of the program.
        Finished,
    }

    /// One-instruction lookahead left behind by a relational opcode.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub enum PendingConditional {
        #[default]
        Idle,
        PendingFalse,
        PendingTrue,
    }
}

//! Internal job and completion records.

/// A unit of admitted work, tagged with everything needed to account for it
/// later: the sequence id for result reassembly and the admission-ticket
/// slot to return when done. Keeping the input item in the struct makes
/// orphan recovery after a forced shutdown a plain field access.
pub(crate) struct Job<I> {
    pub(crate) item: I,
    pub(crate) sequence: u64,
    pub(crate) slot: usize,
}

/// The outcome of one job. `output` is `None` when the processor panicked.
pub(crate) struct Completion<O> {
    pub(crate) sequence: u64,
    pub(crate) output: Option<O>,
}

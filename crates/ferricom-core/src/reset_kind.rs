/// Distinguishes a cold boot from a front-panel reset.
///
/// Power-on clears CPU RAM and fully reinitializes every component. A soft
/// reset preserves CPU RAM contents, which reset-sensitive games (and test
/// ROMs) observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    PowerOn,
    Soft,
}

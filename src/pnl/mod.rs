/// Realized-PnL pipeline over append-only JSON-lines ledgers.
///
/// - `ledger`: record types and file helpers for the executions, funding
///   and trades ledgers
/// - `reconciler`: FIFO lot matching that folds executions into trade
///   events, idempotent across repeated runs
/// - `report`: windowed and all-time sums over the ledgers
pub mod ledger;
pub mod reconciler;
pub mod report;

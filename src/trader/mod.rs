/// Paper-trading side of the harness.
///
/// - `strategy`: the imbalance-taker signal state machine
/// - `paper`: order intents, the paper execution engine and its virtual
///   wallet
pub mod paper;
pub mod strategy;

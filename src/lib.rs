pub mod amount;
pub mod csv;
pub mod ledger;
pub mod model;
pub mod settlement;
pub mod split;
pub mod storage;

pub use amount::{Amount, AmountError};
pub use ledger::Ledger;
pub use model::{ExpenseRecord, GroupId, ParseMode, Split, UserId};
pub use settlement::{
    Balances, PaymentPlan, SettlementConfig, SettlementSnapshot, Settler, calculate_balances,
    calculate_optimal_payments, create_settlement_data,
};
pub use storage::{ExpenseStore, InMemoryStore};

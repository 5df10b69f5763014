//! Bytecoin wallet.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::{arg_number, method_key, HostService};
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

/// Transactions kept for display.
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub balance: i64,
    pub delta: i64,
}

impl EmitArgs for BalanceChange {
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::Number(self.balance), Value::Number(self.delta)]
    }
}

struct WalletState {
    balance: i64,
    history: VecDeque<Transaction>,
}

pub struct WalletService {
    state: Mutex<WalletState>,
    balance_changed: Arc<EventChannel<BalanceChange>>,
}

impl WalletService {
    pub fn new(initial_balance: i64) -> Self {
        Self {
            state: Mutex::new(WalletState {
                balance: initial_balance,
                history: VecDeque::new(),
            }),
            balance_changed: Arc::new(EventChannel::new("onBalanceChanged")),
        }
    }

    pub fn balance(&self) -> i64 {
        self.lock().balance
    }

    /// Credit coins. Non-positive amounts are rejected and return false.
    pub fn add_coins(&self, amount: i64) -> bool {
        if amount <= 0 {
            warn!("wallet: refusing to add non-positive amount {}", amount);
            return false;
        }
        self.apply(amount);
        true
    }

    /// Debit coins. Fails without change when the balance is insufficient.
    pub fn deduct_coins(&self, amount: i64) -> bool {
        if amount <= 0 || self.balance() < amount {
            return false;
        }
        self.apply(-amount);
        true
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn on_balance_changed(&self) -> &EventChannel<BalanceChange> {
        &self.balance_changed
    }

    fn apply(&self, delta: i64) {
        let change = {
            let mut state = self.lock();
            state.balance += delta;
            state.history.push_back(Transaction {
                amount: delta,
                timestamp: Utc::now(),
            });
            while state.history.len() > MAX_HISTORY {
                state.history.pop_front();
            }
            BalanceChange {
                balance: state.balance,
                delta,
            }
        };
        debug!("wallet: {:+} -> balance {}", delta, change.balance);
        self.balance_changed.invoke(&change);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HostService for WalletService {
    fn short_name(&self) -> &'static str {
        "service.wallet"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onbalancechanged" => Some(self.balance_changed.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        match method_key(method).as_str() {
            "getbalance" | "balance" => Ok(Value::Number(self.balance())),
            "addcoins" => Ok(Value::Boolean(
                self.add_coins(arg_number(self.short_name(), method, args, 0)?),
            )),
            _ => Err(MissionError::MethodNotFound {
                service: self.short_name().to_string(),
                method: method.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

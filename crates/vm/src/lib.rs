//! EVM execution engine (C6): a thin wrapper around `revm` exposing exactly
//! the interface spec §4.6 asks of the "external collaborator" — create,
//! prefund, execute, inspect state, call, estimate gas, reset. The chain
//! engine (coc-blockchain) owns re-entrancy; this crate only refuses to
//! nest two live executions on the same instance.

pub mod error;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use revm::db::{CacheDB, EmptyDB};
use revm::primitives::{
    AccountInfo as RevmAccountInfo, Address as RevmAddress, Bytecode, ExecutionResult as RevmExecResult,
    Output, TransactTo, TxEnv, B256, U256 as RevmU256,
};
use revm::{Database, DatabaseCommit, Evm};

use coc_common::{logs_bloom, Address, Log, RawTransaction, Receipt, H256, U256};
pub use error::EvmError;

/// Parameters for a read-only `eth_call`/`eth_estimateGas` (§4.6 `callRaw`).
#[derive(Debug, Clone, Default)]
pub struct CallParams {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub data: Option<Vec<u8>>,
    pub value: Option<U256>,
    pub gas: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CallResult {
    pub return_value: Vec<u8>,
    pub gas_used: u64,
}

#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub tx_hash: H256,
    pub gas_used: u64,
    pub success: bool,
}

/// One account to credit at genesis / on `resetExecution` (§4.6 `prefund`).
#[derive(Debug, Clone)]
pub struct PrefundAccount {
    pub address: Address,
    pub balance: U256,
}

pub struct ExecutionEngine {
    chain_id: u64,
    db: Mutex<CacheDB<EmptyDB>>,
    receipts: Mutex<HashMap<H256, Receipt>>,
    transactions: Mutex<HashMap<H256, RawTransaction>>,
    prefund: Mutex<Vec<PrefundAccount>>,
    /// Re-entrancy guard: the chain engine serializes writes via its own
    /// apply lock (§4.7/§5), but a second writer reaching this instance
    /// directly (a bug, not a normal code path) must fail loudly rather
    /// than corrupt state.
    executing: AtomicBool,
}

impl ExecutionEngine {
    pub fn create(chain_id: u64) -> Self {
        Self {
            chain_id,
            db: Mutex::new(CacheDB::new(EmptyDB::default())),
            receipts: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            prefund: Mutex::new(Vec::new()),
            executing: AtomicBool::new(false),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn prefund(&self, accounts: Vec<PrefundAccount>) {
        let mut db = self.db.lock();
        for account in &accounts {
            insert_balance(&mut db, account.address, account.balance);
        }
        self.prefund.lock().extend(accounts);
    }

    /// Rebuilds the VM from the configured prefund set (§4.6 `resetExecution`).
    pub fn reset_execution(&self) {
        let mut db = self.db.lock();
        *db = CacheDB::new(EmptyDB::default());
        for account in self.prefund.lock().iter() {
            insert_balance(&mut db, account.address, account.balance);
        }
        self.receipts.lock().clear();
        self.transactions.lock().clear();
    }

    pub fn execute_raw_tx(
        &self,
        raw_tx: &RawTransaction,
        block_number: u64,
        tx_index: u32,
        block_hash: H256,
        base_fee: U256,
    ) -> Result<ExecuteResult, EvmError> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EvmError::ReentrantCall);
        }
        let result = self.execute_raw_tx_inner(raw_tx, block_number, tx_index, block_hash, base_fee);
        self.executing.store(false, Ordering::SeqCst);
        result
    }

    fn execute_raw_tx_inner(
        &self,
        raw_tx: &RawTransaction,
        block_number: u64,
        tx_index: u32,
        block_hash: H256,
        base_fee: U256,
    ) -> Result<ExecuteResult, EvmError> {
        let effective_gas_price = raw_tx.effective_gas_price(base_fee);
        let mut db = self.db.lock();

        let tx_env = build_tx_env(raw_tx, effective_gas_price);
        let result_and_state = {
            let mut evm = Evm::builder().with_db(&mut *db).with_tx_env(tx_env).build();
            evm.transact().map_err(|e| EvmError::Backend(e.to_string()))?
        };
        let exec_result = result_and_state.result;
        db.commit(result_and_state.state);
        drop(db);

        let success = exec_result.is_success();
        let gas_used = exec_result.gas_used();
        let logs: Vec<Log> = match &exec_result {
            RevmExecResult::Success { logs, .. } => logs
                .iter()
                .enumerate()
                .map(|(log_index, log)| Log {
                    address: Address::from_slice(log.address.as_slice()),
                    topics: log.data.topics().iter().map(|t| H256::from_slice(t.as_slice())).collect(),
                    data: log.data.data().to_vec(),
                    block_number,
                    block_hash,
                    tx_hash: raw_tx.hash,
                    log_index: log_index as u32,
                    tx_index,
                })
                .collect(),
            _ => Vec::new(),
        };
        let bloom = logs_bloom(&logs);

        let receipt = Receipt {
            tx_hash: raw_tx.hash,
            block_number,
            block_hash,
            status: success,
            gas_used,
            logs,
            logs_bloom: bloom,
            effective_gas_price,
        };
        self.receipts.lock().insert(raw_tx.hash, receipt);
        self.transactions.lock().insert(raw_tx.hash, raw_tx.clone());

        Ok(ExecuteResult {
            tx_hash: raw_tx.hash,
            gas_used,
            success,
        })
    }

    pub fn get_receipt(&self, tx_hash: H256) -> Option<Receipt> {
        self.receipts.lock().get(&tx_hash).cloned()
    }

    pub fn get_transaction(&self, tx_hash: H256) -> Option<RawTransaction> {
        self.transactions.lock().get(&tx_hash).cloned()
    }

    pub fn get_balance(&self, address: Address) -> U256 {
        let mut db = self.db.lock();
        db.basic(to_revm_address(address))
            .ok()
            .flatten()
            .map(|info| from_revm_u256(info.balance))
            .unwrap_or_default()
    }

    pub fn get_nonce(&self, address: Address) -> u64 {
        let mut db = self.db.lock();
        db.basic(to_revm_address(address))
            .ok()
            .flatten()
            .map(|info| info.nonce)
            .unwrap_or_default()
    }

    pub fn get_code(&self, address: Address) -> Vec<u8> {
        let mut db = self.db.lock();
        db.basic(to_revm_address(address))
            .ok()
            .flatten()
            .and_then(|info| info.code)
            .map(|code| code.original_bytes().to_vec())
            .unwrap_or_default()
    }

    pub fn get_storage_at(&self, address: Address, slot: H256) -> H256 {
        let mut db = self.db.lock();
        let key = RevmU256::from_be_bytes(slot.0);
        let value = db
            .storage(to_revm_address(address), key)
            .unwrap_or_default();
        H256::from(value.to_be_bytes())
    }

    /// Read-only call; never commits state, regardless of success.
    pub fn call_raw(&self, params: &CallParams) -> Result<CallResult, EvmError> {
        let mut db = self.db.lock();
        let tx_env = build_call_tx_env(params);
        let exec_result = {
            let mut evm = Evm::builder().with_db(&mut *db).with_tx_env(tx_env).build();
            evm.transact()
                .map_err(|e| EvmError::Backend(e.to_string()))?
                .result
        };
        Ok(CallResult {
            return_value: extract_output(&exec_result),
            gas_used: exec_result.gas_used(),
        })
    }

    /// 10% margin over measured `gasUsed`, floored at 21,000 (§4.6).
    pub fn estimate_gas(&self, params: &CallParams) -> Result<U256, EvmError> {
        let measured = self.call_raw(params)?.gas_used;
        let with_margin = measured + measured / 10;
        Ok(U256::from(with_margin.max(21_000)))
    }
}

fn insert_balance(db: &mut CacheDB<EmptyDB>, address: Address, balance: U256) {
    let revm_address = to_revm_address(address);
    let mut info = db.basic(revm_address).ok().flatten().unwrap_or_default();
    info.balance = to_revm_u256(balance);
    db.insert_account_info(revm_address, info);
}

fn to_revm_address(address: Address) -> RevmAddress {
    RevmAddress::from_slice(address.as_bytes())
}

fn to_revm_u256(value: U256) -> RevmU256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    RevmU256::from_be_bytes(buf)
}

fn from_revm_u256(value: RevmU256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

fn build_tx_env(raw_tx: &RawTransaction, effective_gas_price: U256) -> TxEnv {
    TxEnv {
        caller: to_revm_address(raw_tx.from),
        gas_limit: raw_tx.gas_limit,
        gas_price: to_revm_u256(effective_gas_price),
        transact_to: match raw_tx.to {
            Some(to) => TransactTo::Call(to_revm_address(to)),
            None => TransactTo::Create,
        },
        value: to_revm_u256(raw_tx.value),
        data: raw_tx.raw.clone().into(),
        nonce: Some(raw_tx.nonce),
        chain_id: Some(raw_tx.chain_id),
        ..Default::default()
    }
}

fn build_call_tx_env(params: &CallParams) -> TxEnv {
    TxEnv {
        caller: params
            .from
            .map(to_revm_address)
            .unwrap_or(RevmAddress::ZERO),
        gas_limit: params.gas.unwrap_or(30_000_000),
        transact_to: match params.to {
            Some(to) => TransactTo::Call(to_revm_address(to)),
            None => TransactTo::Create,
        },
        value: params.value.map(to_revm_u256).unwrap_or_default(),
        data: params.data.clone().unwrap_or_default().into(),
        ..Default::default()
    }
}

fn extract_output(result: &RevmExecResult) -> Vec<u8> {
    match result {
        RevmExecResult::Success { output, .. } => match output {
            Output::Call(bytes) => bytes.to_vec(),
            Output::Create(bytes, _) => bytes.to_vec(),
        },
        RevmExecResult::Revert { output, .. } => output.to_vec(),
        RevmExecResult::Halt { .. } => vec![],
    }
}

#![allow(dead_code)]

use alloy_primitives::{Address, B256, Bytes, U256, address};
use async_trait::async_trait;
use session_keys::bundler::{Bundler, GasEstimate, GasFees, Sponsorship};
use session_keys::clock::FixedClock;
use session_keys::user_op::{TransactionSummary, UserOperation, UserOperationReceipt};
use session_keys::{
    ArgCondition, BundlerError, ParamOperator, Permission, ProviderContext, SessionConfig,
    SessionKeyData, SponsorConstraint, abi,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const USDC: Address = address!("7F5c764cBc14f9669B88837ca1490cCa17c31607");
pub const ACCOUNT: Address = address!("fD7D4BFa21276acf6ceA29E041AbD8E1a887A6ae");
pub const DESTINATION: Address = address!("C13B7CDa9B08A4Fb1026E479A2079029cd30BfaD");
pub const PAYMASTER: Address = address!("e93eca6595fe94091dc1af46aac2a8b5d7990770");
pub const CAP: u64 = 100_000_000;
pub const NOW: u64 = 1_700_000_000;

/// How the mock answers sponsorship requests.
#[derive(Debug, Clone, Copy)]
pub enum SponsorMode {
    Pay(Address),
    Refuse,
    Unreachable,
}

/// How the mock answers submission.
#[derive(Debug, Clone, Copy)]
pub enum SendMode {
    Accept,
    Reject,
    Unreachable,
}

/// In-memory bundler that counts every call it receives.
pub struct MockBundler {
    pub chain_id: u64,
    pub reachable: bool,
    pub sponsor_mode: Mutex<SponsorMode>,
    pub send_mode: Mutex<SendMode>,
    pub receipts: Mutex<VecDeque<Option<UserOperationReceipt>>>,
    pub sent: Mutex<Vec<UserOperation>>,
    pub sponsor_ids: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockBundler {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            reachable: true,
            sponsor_mode: Mutex::new(SponsorMode::Pay(PAYMASTER)),
            send_mode: Mutex::new(SendMode::Accept),
            receipts: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            sponsor_ids: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable(chain_id: u64) -> Self {
        Self {
            reachable: false,
            ..Self::new(chain_id)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_sponsor(&self, mode: SponsorMode) {
        *self.sponsor_mode.lock().unwrap() = mode;
    }

    pub fn set_send(&self, mode: SendMode) {
        *self.send_mode.lock().unwrap() = mode;
    }

    pub fn push_receipt(&self, receipt: Option<UserOperationReceipt>) {
        self.receipts.lock().unwrap().push_back(receipt);
    }

    pub fn last_sent(&self) -> Option<UserOperation> {
        self.sent.lock().unwrap().last().cloned()
    }

    fn hit(&self) -> Result<(), BundlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(())
        } else {
            Err(BundlerError::Transport("connection refused".into()))
        }
    }
}

#[async_trait]
impl Bundler for MockBundler {
    async fn chain_id(&self) -> Result<u64, BundlerError> {
        self.hit()?;
        Ok(self.chain_id)
    }

    async fn nonce(&self, _entry_point: Address, _sender: Address) -> Result<U256, BundlerError> {
        self.hit()?;
        Ok(U256::from(3))
    }

    async fn gas_fees(&self) -> Result<GasFees, BundlerError> {
        self.hit()?;
        Ok(GasFees {
            max_fee_per_gas: U256::from(1_000_000u64),
            max_priority_fee_per_gas: U256::from(100_000u64),
        })
    }

    async fn estimate_gas(
        &self,
        _op: &UserOperation,
        _entry_point: Address,
    ) -> Result<GasEstimate, BundlerError> {
        self.hit()?;
        Ok(GasEstimate {
            call_gas_limit: U256::from(80_000u64),
            verification_gas_limit: U256::from(250_000u64),
            pre_verification_gas: U256::from(50_000u64),
        })
    }

    async fn sponsor(
        &self,
        _op: &UserOperation,
        _entry_point: Address,
        sponsor_id: &str,
    ) -> Result<Sponsorship, BundlerError> {
        self.hit()?;
        self.sponsor_ids.lock().unwrap().push(sponsor_id.to_string());
        let mode = *self.sponsor_mode.lock().unwrap();
        match mode {
            SponsorMode::Pay(paymaster) => {
                let mut paymaster_and_data = paymaster.to_vec();
                paymaster_and_data.extend_from_slice(&[0xaa; 8]);
                Ok(Sponsorship {
                    paymaster_and_data: Bytes::from(paymaster_and_data),
                    call_gas_limit: U256::from(80_000u64),
                    verification_gas_limit: U256::from(300_000u64),
                    pre_verification_gas: U256::from(50_000u64),
                })
            }
            SponsorMode::Refuse => Err(BundlerError::Rpc {
                code: -32602,
                message: "sponsorship policy rejected operation".into(),
            }),
            SponsorMode::Unreachable => {
                Err(BundlerError::Transport("paymaster timed out".into()))
            }
        }
    }

    async fn send(&self, op: &UserOperation, entry_point: Address) -> Result<B256, BundlerError> {
        self.hit()?;
        let mode = *self.send_mode.lock().unwrap();
        match mode {
            SendMode::Accept => {
                self.sent.lock().unwrap().push(op.clone());
                Ok(op.hash(entry_point, self.chain_id))
            }
            SendMode::Reject => Err(BundlerError::Rpc {
                code: -32507,
                message: "AA24 signature error".into(),
            }),
            SendMode::Unreachable => Err(BundlerError::Transport("connection reset".into())),
        }
    }

    async fn receipt(&self, _hash: B256) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.hit()?;
        Ok(self.receipts.lock().unwrap().pop_front().flatten())
    }
}

pub fn receipt(hash: B256, success: bool) -> UserOperationReceipt {
    UserOperationReceipt {
        user_op_hash: hash,
        sender: ACCOUNT,
        actual_gas_cost: U256::from(21_000u64),
        actual_gas_used: U256::from(120_000u64),
        success,
        reason: (!success).then(|| "ERC20: transfer amount exceeds balance".to_string()),
        receipt: TransactionSummary {
            transaction_hash: B256::repeat_byte(0x77),
            block_number: U256::from(115_000_000u64),
        },
    }
}

pub fn context(bundler: &Arc<MockBundler>, clock: &Arc<FixedClock>) -> ProviderContext {
    let config = SessionConfig {
        chain_id: bundler.chain_id,
        ..SessionConfig::default()
    };
    ProviderContext::new(config, bundler.clone()).with_clock(clock.clone())
}

/// USDC `transfer` only to [`DESTINATION`] and below [`CAP`].
pub fn usdc_permission() -> Permission {
    Permission::from_abi(
        USDC,
        &abi::erc20_abi(),
        "transfer",
        U256::ZERO,
        &[
            ArgCondition::new(0, ParamOperator::Equal, DESTINATION),
            ArgCondition::new(1, ParamOperator::LessThan, U256::from(CAP)),
        ],
    )
    .expect("valid permission")
}

pub fn session_data(
    valid_after: u64,
    valid_until: u64,
    paymaster: SponsorConstraint,
) -> SessionKeyData {
    SessionKeyData {
        valid_after,
        valid_until,
        permissions: vec![usdc_permission()],
        paymaster,
    }
}

pub fn usdc_transfer(to: Address, amount: u64) -> session_keys::CallRequest {
    session_keys::CallRequest::new(USDC, abi::erc20_transfer(to, U256::from(amount)))
}

//! Smart-contract backend. Each mutation becomes one signed transaction:
//! encode the call, estimate gas, fetch gas price and nonce, sign, broadcast
//! and wait for the receipt.

use std::time::Duration;

use ethers_contract::BaseContract;
use ethers_core::abi::{parse_abi, Detokenize, Tokenize};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{
    Address, BlockId, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, U256, U64,
};
use ethers_providers::{Http, JsonRpcClient, Middleware, Provider};
use futures::future::try_join_all;
use shared::{Candidate, CandidateId, ElectionState, LedgerError, Tally, VoterId};
use tracing::{debug, info, instrument, warn};

use super::{BackendKind, Committed, Operation, Signer, SignerPolicy, TransactionCommitter};

/// The election contract's external interface.
pub const ELECTION_ABI: &[&str] = &[
    "function candidatesCount() external view returns (uint256)",
    "function candidates(uint256) external view returns (uint256, string, uint256)",
    "function resultsDeclared() external view returns (bool)",
    "function voters(address) external view returns (bool)",
    "function addCandidate(string) external",
    "function vote(uint256) external",
    "function castVoteFor(address, uint256) external",
    "function declareResults() external",
    "function resetElection() external",
];

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub contract: Address,
    pub chain_id: Option<u64>,
    pub policy: SignerPolicy,
    pub receipt_timeout: Duration,
    pub confirmations: usize,
}

#[derive(Debug, Clone)]
struct ContractCall {
    method: &'static str,
    data: Bytes,
}

pub fn election_contract() -> Result<BaseContract, LedgerError> {
    parse_abi(ELECTION_ABI)
        .map(BaseContract::from)
        .map_err(|e| LedgerError::unavailable(format!("invalid election ABI: {}", e)))
}

/// Generic over the JSON-RPC transport; production uses HTTP.
pub struct ChainCommitter<P = Http> {
    provider: Provider<P>,
    contract: BaseContract,
    address: Address,
    chain_id: u64,
    policy: SignerPolicy,
    receipt_timeout: Duration,
    confirmations: usize,
}

impl ChainCommitter {
    pub async fn connect(settings: &ChainSettings) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .map_err(|e| LedgerError::unavailable(format!("invalid RPC url: {}", e)))?;

        let chain_id = match settings.chain_id {
            Some(id) => id,
            None => provider.get_chainid().await.map_err(transport)?.low_u64(),
        };

        info!(chain_id, contract = ?settings.contract, "Connected to election contract");
        Self::new(provider, settings, chain_id)
    }
}

impl<P: JsonRpcClient + 'static> ChainCommitter<P> {
    pub fn new(provider: Provider<P>, settings: &ChainSettings, chain_id: u64) -> Result<Self, LedgerError> {
        Ok(Self {
            provider,
            contract: election_contract()?,
            address: settings.contract,
            chain_id,
            policy: settings.policy,
            receipt_timeout: settings.receipt_timeout,
            confirmations: settings.confirmations,
        })
    }

    fn encode_call(&self, op: &Operation) -> Result<ContractCall, LedgerError> {
        let (method, data) = match op {
            Operation::AddCandidate { name } => {
                ("addCandidate", self.contract.encode("addCandidate", name.clone()))
            }
            Operation::CastVote { voter, candidate } => match self.policy {
                SignerPolicy::PerVoter => ("vote", self.contract.encode("vote", U256::from(candidate.0))),
                SignerPolicy::Shared => (
                    "castVoteFor",
                    self.contract.encode("castVoteFor", (parse_voter(voter)?, U256::from(candidate.0))),
                ),
            },
            Operation::DeclareResults => ("declareResults", self.contract.encode("declareResults", ())),
            Operation::Reset => ("resetElection", self.contract.encode("resetElection", ())),
        };

        let data = data.map_err(|e| LedgerError::invalid(format!("could not encode {}: {}", method, e)))?;
        Ok(ContractCall { method, data })
    }

    async fn read<A: Tokenize, D: Detokenize>(
        &self,
        method: &str,
        args: A,
        block: Option<BlockId>,
    ) -> Result<D, LedgerError> {
        let data = self.contract.encode(method, args)
            .map_err(|e| LedgerError::unavailable(format!("could not encode {}: {}", method, e)))?;
        let call: TypedTransaction = TransactionRequest::new().to(self.address).data(data).into();

        let output = self.provider.call(&call, block).await.map_err(transport)?;
        self.contract.decode_output(method, output)
            .map_err(|e| LedgerError::unavailable(format!("unexpected {} output: {}", method, e)))
    }

    async fn state_at(&self, block: Option<BlockId>) -> Result<ElectionState, LedgerError> {
        let declared: bool = self.read("resultsDeclared", (), block).await?;
        Ok(ElectionState::from_declared(declared))
    }

    async fn candidate_count(&self, block: Option<BlockId>) -> Result<u64, LedgerError> {
        let count: U256 = self.read("candidatesCount", (), block).await?;
        to_u64(count)
    }

    /// Reads the preconditions the contract enforces, so a doomed call is
    /// rejected with a typed error before anything is signed.
    async fn preflight(&self, op: &Operation) -> Result<(), LedgerError> {
        match op {
            Operation::AddCandidate { .. } => self.state_at(None).await?.ensure_open(),
            Operation::CastVote { voter, candidate } => {
                self.state_at(None).await?.ensure_open()?;
                if self.has_voted(voter).await? {
                    return Err(LedgerError::AlreadyVoted);
                }
                let count = self.candidate_count(None).await?;
                if candidate.0 == 0 || candidate.0 > count {
                    return Err(LedgerError::CandidateNotFound(*candidate));
                }
                Ok(())
            }
            Operation::DeclareResults => self.state_at(None).await?.declare().map(|_| ()),
            Operation::Reset => Ok(()),
        }
    }

    /// Never resubmits: once broadcast, a missing receipt is reported with the
    /// transaction hash so the caller can check whether it landed.
    #[instrument(skip(self, call, signer, op), fields(method = call.method))]
    async fn submit(&self, op: &Operation, call: ContractCall, signer: &Signer) -> Result<TransactionReceipt, LedgerError> {
        let from = signer.address();
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.address)
            .data(call.data)
            .chain_id(self.chain_id)
            .into();

        let gas = self.provider.estimate_gas(&tx, None).await
            .map_err(|e| classify_rejection(op, &e.to_string()))?;
        let gas_price = self.provider.get_gas_price().await.map_err(transport)?;
        let nonce = self.provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(transport)?;

        tx.set_gas(gas);
        tx.set_gas_price(gas_price);
        tx.set_nonce(nonce);
        debug!(%gas, %gas_price, %nonce, "Transaction prepared");

        let signature = signer.sign(&tx)?;
        let raw = tx.rlp_signed(&signature);

        let pending = self.provider.send_raw_transaction(raw).await.map_err(transport)?;
        let hash = pending.tx_hash();
        info!(tx = ?hash, "Transaction broadcast");

        let receipt = tokio::time::timeout(self.receipt_timeout, pending.confirmations(self.confirmations))
            .await
            .map_err(|_| LedgerError::unavailable(format!(
                "transaction {:?} not confirmed within {}s; re-query before retrying",
                hash,
                self.receipt_timeout.as_secs()
            )))?
            .map_err(|e| LedgerError::unavailable(format!(
                "transaction {:?} broadcast but receipt unavailable: {}", hash, e
            )))?
            .ok_or_else(|| LedgerError::unavailable(format!("transaction {:?} was dropped", hash)))?;

        if receipt.status != Some(U64::from(1)) {
            warn!(tx = ?hash, "Transaction reverted");
            return Err(LedgerError::conflict(format!("transaction {:?} reverted on chain", hash)));
        }
        Ok(receipt)
    }
}

#[rocket::async_trait]
impl<P: JsonRpcClient + 'static> TransactionCommitter for ChainCommitter<P> {
    fn kind(&self) -> BackendKind {
        BackendKind::Chain
    }

    async fn commit(&self, op: Operation, signer: Option<Signer>) -> Result<Committed, LedgerError> {
        let signer = signer.ok_or_else(|| LedgerError::invalid("a signing key is required for chain transactions"))?;
        let call = self.encode_call(&op)?;

        self.preflight(&op).await?;
        let receipt = self.submit(&op, call, &signer).await?;
        drop(signer);

        let candidate_id = match op {
            Operation::AddCandidate { .. } => {
                let block = receipt.block_number.map(|n| BlockId::Number(BlockNumber::Number(n)));
                Some(CandidateId(self.candidate_count(block).await?))
            }
            _ => None,
        };

        Ok(Committed {
            candidate_id,
            transaction: Some(format!("{:?}", receipt.transaction_hash)),
        })
    }

    /// Every read is pinned to the same block.
    async fn snapshot(&self) -> Result<Tally, LedgerError> {
        let number = self.provider.get_block_number().await.map_err(transport)?;
        let block = Some(BlockId::Number(BlockNumber::Number(number)));

        let state = self.state_at(block).await?;
        let count = self.candidate_count(block).await?;

        let rows: Vec<(U256, String, U256)> = try_join_all(
            (1..=count).map(|i| self.read("candidates", U256::from(i), block))
        )
        .await?;

        let candidates = rows.into_iter()
            .map(|(id, name, votes)| Ok(Candidate {
                id: CandidateId(to_u64(id)?),
                name,
                vote_count: to_u64(votes)?,
            }))
            .collect::<Result<Vec<_>, LedgerError>>()?;

        Ok(Tally {
            candidates,
            results_declared: state.is_declared(),
            recorded_voters: None,
        })
    }

    async fn has_voted(&self, voter: &VoterId) -> Result<bool, LedgerError> {
        self.read("voters", parse_voter(voter)?, None).await
    }
}

fn parse_voter(voter: &VoterId) -> Result<Address, LedgerError> {
    voter.as_str().parse::<Address>()
        .map_err(|_| LedgerError::invalid(format!("voter identity {} is not an address", voter)))
}

fn to_u64(value: U256) -> Result<u64, LedgerError> {
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::unavailable(format!("contract value {} out of range", value)));
    }
    Ok(value.low_u64())
}

fn transport<E: std::fmt::Display>(err: E) -> LedgerError {
    LedgerError::unavailable(err.to_string())
}

/// Maps a failed gas estimation to the domain error behind the revert. Any
/// other failure means the node could not be asked.
pub fn classify_rejection(op: &Operation, message: &str) -> LedgerError {
    let reason = message.to_ascii_lowercase();

    if !reason.contains("revert") {
        return LedgerError::unavailable(message.to_owned());
    }
    if reason.contains("already voted") {
        LedgerError::AlreadyVoted
    } else if reason.contains("already declared") {
        LedgerError::AlreadyDeclared
    } else if reason.contains("voting has ended")
        || reason.contains("election closed")
        || reason.contains("results declared")
    {
        LedgerError::ElectionClosed
    } else if reason.contains("invalid candidate") || reason.contains("candidate not found") {
        match op {
            Operation::CastVote { candidate, .. } => LedgerError::CandidateNotFound(*candidate),
            _ => LedgerError::invalid(message.to_owned()),
        }
    } else {
        LedgerError::invalid(format!("contract rejected {}: {}", op.name(), message))
    }
}

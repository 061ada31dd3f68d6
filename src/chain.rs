use anyhow::{anyhow, Context, Result};
use starknet::{
    accounts::{Account, ConnectedAccount, ExecutionEncoding, SingleOwnerAccount},
    core::{
        types::{Call, Felt},
        utils::get_selector_from_name,
    },
    providers::{jsonrpc::HttpTransport, JsonRpcClient, Provider, Url},
    signers::{LocalWallet, SigningKey},
};
use tracing::{debug, error, info};

use crate::metrics;

/// A single contract entrypoint invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub contract_address: String,
    pub entrypoint: String,
    pub calldata: Vec<String>,
}

impl ContractCall {
    pub fn new(contract_address: &str, entrypoint: &str, calldata: Vec<String>) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            entrypoint: entrypoint.to_string(),
            calldata,
        }
    }

    fn to_call(&self) -> Result<Call> {
        let to = parse_felt(&self.contract_address)
            .with_context(|| format!("Invalid contract address {}", self.contract_address))?;
        let selector = get_selector_from_name(&self.entrypoint)
            .map_err(|e| anyhow!("Invalid entrypoint {}: {}", self.entrypoint, e))?;
        let calldata = self
            .calldata
            .iter()
            .map(|value| parse_felt(value))
            .collect::<Result<Vec<_>>>()?;

        Ok(Call {
            to,
            selector,
            calldata,
        })
    }
}

/// Submits contract calls from the service account.
#[trait_variant::make(ContractInvoker: Send)]
pub trait LocalContractInvoker {
    /// Returns the transaction hash as a `0x`-prefixed hex string.
    async fn execute(&self, call: &ContractCall) -> Result<String>;
}

pub struct StarknetInvoker {
    account: SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>,
}

impl StarknetInvoker {
    pub async fn connect(rpc_url: &str, address: &str, private_key: &str) -> Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC_URL {}", rpc_url))?;
        let provider = JsonRpcClient::new(HttpTransport::new(url));

        let chain_id = provider
            .chain_id()
            .await
            .map_err(|e| anyhow!("Failed to fetch chain id from {}: {}", rpc_url, e))?;

        let signer = LocalWallet::from(SigningKey::from_secret_scalar(
            parse_felt(private_key).context("Invalid PRIVATE_KEY")?,
        ));
        let address = parse_felt(address).context("Invalid ADDRESS")?;

        let account =
            SingleOwnerAccount::new(provider, signer, address, chain_id, ExecutionEncoding::New);

        info!(address = %format!("{:#x}", address), "Starknet account ready");
        Ok(Self { account })
    }
}

impl ContractInvoker for StarknetInvoker {
    async fn execute(&self, call: &ContractCall) -> Result<String> {
        let starknet_call = call.to_call()?;

        let nonce = self
            .account
            .get_nonce()
            .await
            .map_err(|e| anyhow!("Failed to fetch account nonce: {}", e))?;
        debug!(nonce = %format!("{:#x}", nonce), entrypoint = %call.entrypoint, "Submitting invoke");

        let result = self
            .account
            .execute_v3(vec![starknet_call])
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to execute {}: {}", call.entrypoint, e))?;

        Ok(format!("{:#x}", result.transaction_hash))
    }
}

/// Accepts `0x`-prefixed hex or plain decimal.
pub fn parse_felt(value: &str) -> Result<Felt> {
    let value = value.trim();
    if value.starts_with("0x") || value.starts_with("0X") {
        Felt::from_hex(value).map_err(|e| anyhow!("Invalid hex felt {}: {}", value, e))
    } else {
        Felt::from_dec_str(value).map_err(|e| anyhow!("Invalid decimal felt {}: {}", value, e))
    }
}

pub fn explorer_url(base: &str, transaction_hash: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), transaction_hash)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub transaction_hash: String,
    pub tx_url: String,
}

/// Executes `call` and logs the explorer link. Both outcomes are counted.
pub async fn submit<C>(invoker: &C, call: &ContractCall, explorer_base: &str) -> Result<Submitted>
where
    C: ContractInvoker + Sync,
{
    info!(
        contract = %call.contract_address,
        entrypoint = %call.entrypoint,
        calldata = ?call.calldata,
        "Executing contract call"
    );

    match invoker.execute(call).await {
        Ok(transaction_hash) => {
            metrics::TRANSACTIONS_SUBMITTED.inc();
            let tx_url = explorer_url(explorer_base, &transaction_hash);
            info!(
                entrypoint = %call.entrypoint,
                transaction_hash = %transaction_hash,
                tx_url = %tx_url,
                "Transaction submitted"
            );
            Ok(Submitted {
                transaction_hash,
                tx_url,
            })
        }
        Err(e) => {
            metrics::TRANSACTION_FAILURES.inc();
            error!(entrypoint = %call.entrypoint, error = %e, "Contract call failed");
            Err(e)
        }
    }
}

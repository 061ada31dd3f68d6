use anyhow::{Context, Result};
use tracing::info;

use crate::chain::{self, ContractCall, ContractInvoker};

pub async fn run_contract_task<C>(
    task: &str,
    invoker: &C,
    call: &ContractCall,
    explorer_base: &str,
) -> Result<()>
where
    C: ContractInvoker + Sync,
{
    let submitted = chain::submit(invoker, call, explorer_base)
        .await
        .with_context(|| format!("{} failed calling {}", task, call.entrypoint))?;

    info!(task = %task, tx_url = %submitted.tx_url, "Contract task completed");
    Ok(())
}

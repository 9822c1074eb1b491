/// UI command functions
///
/// Queries backing a store slice write their result into it on success.
/// Swap and wallet actions only return the response; their effects reach the
/// store through pushed events. Before a bridge is attached every command
/// fails with `BridgeError::ContextUnavailable`.

use crate::core::requests::{
    BalanceArgs, BalanceResponse, BuyXmrArgs, BuyXmrResponse, CancelAndRefundArgs,
    GetHistoryArgs, GetHistoryResponse, GetMoneroAddressesArgs, GetMoneroAddressesResponse,
    GetSwapInfoArgs, GetSwapInfoResponse, GetSwapInfosAllArgs, ListSellersArgs,
    ListSellersResponse, ResumeSwapArgs, ResumeSwapResponse, SuspendCurrentSwapArgs,
    SuspendCurrentSwapResponse, WithdrawBtcArgs, WithdrawBtcResponse,
};
use crate::core::store::slices;
use crate::error::Result;
use crate::ui::state::AppState;
use serde_json::Value;
use tracing::{debug, info};

/// Fetch the Bitcoin balance into the `balance` slice
pub async fn get_balance(state: &AppState, args: BalanceArgs) -> Result<BalanceResponse> {
    debug!("get_balance (force_refresh: {})", args.force_refresh);

    let bridge = state.try_get_bridge()?;
    bridge
        .request_and_update(&args, slices::BALANCE, |r: &BalanceResponse| r.balance)
        .await
}

/// Fetch swap history into the `history` slice
pub async fn get_history(state: &AppState) -> Result<GetHistoryResponse> {
    let bridge = state.try_get_bridge()?;
    let history = bridge
        .request_and_update(&GetHistoryArgs {}, slices::HISTORY, |r: &GetHistoryResponse| {
            r.swaps.clone()
        })
        .await?;

    info!("Loaded {} swaps from history", history.swaps.len());
    Ok(history)
}

/// Fetch details of every swap into the `swap_infos` slice
pub async fn get_swap_infos_all(state: &AppState) -> Result<Vec<GetSwapInfoResponse>> {
    let bridge = state.try_get_bridge()?;
    bridge
        .request_and_update(&GetSwapInfosAllArgs {}, slices::SWAP_INFOS, |r: &Vec<GetSwapInfoResponse>| {
            r.clone()
        })
        .await
}

/// Fetch details of a single swap
pub async fn get_swap_info(state: &AppState, args: GetSwapInfoArgs) -> Result<GetSwapInfoResponse> {
    let bridge = state.try_get_bridge()?;
    bridge.request(&args).await
}

/// Start buying Monero from a seller
pub async fn buy_xmr(state: &AppState, args: BuyXmrArgs) -> Result<BuyXmrResponse> {
    info!("Requesting swap with {}", args.seller);

    let bridge = state.try_get_bridge()?;
    let response = bridge.request(&args).await?;

    info!(
        "Swap {} started at {} sat/XMR",
        response.swap_id, response.quote.price
    );
    Ok(response)
}

pub async fn resume_swap(state: &AppState, args: ResumeSwapArgs) -> Result<ResumeSwapResponse> {
    info!("Resuming swap {}", args.swap_id);

    let bridge = state.try_get_bridge()?;
    bridge.request(&args).await
}

/// Cancel an expired swap and refund the locked Bitcoin
pub async fn cancel_and_refund(state: &AppState, args: CancelAndRefundArgs) -> Result<Value> {
    info!("Cancelling and refunding swap {}", args.swap_id);

    let bridge = state.try_get_bridge()?;
    bridge.request(&args).await
}

/// Withdraw Bitcoin from the internal wallet
///
/// The new balance arrives as a `balance-change` event.
pub async fn withdraw_btc(state: &AppState, args: WithdrawBtcArgs) -> Result<WithdrawBtcResponse> {
    let bridge = state.try_get_bridge()?;
    let response = bridge.request(&args).await?;

    info!("Withdrew {} sat in {}", response.amount, response.txid);
    Ok(response)
}

pub async fn get_monero_addresses(state: &AppState) -> Result<GetMoneroAddressesResponse> {
    let bridge = state.try_get_bridge()?;
    bridge.request(&GetMoneroAddressesArgs {}).await
}

/// Ask a rendezvous point for sellers and their quotes
pub async fn list_sellers(state: &AppState, args: ListSellersArgs) -> Result<ListSellersResponse> {
    let bridge = state.try_get_bridge()?;
    let response = bridge.request(&args).await?;

    debug!(
        "{} of {} sellers at {} are online",
        response.online().count(),
        response.sellers.len(),
        args.rendezvous_point
    );
    Ok(response)
}

/// Suspend the running swap
///
/// Nothing is written to the store here; the backend reports the swap's new
/// state through `swap-progress-update` events.
pub async fn suspend_current_swap(state: &AppState) -> Result<SuspendCurrentSwapResponse> {
    let bridge = state.try_get_bridge()?;
    let response = bridge.request(&SuspendCurrentSwapArgs {}).await?;

    info!("Suspended swap {}", response.swap_id);
    Ok(response)
}

/// Whether a bridge is attached and connected
pub fn is_context_available(state: &AppState) -> bool {
    state.is_connected()
}

/// Send an arbitrary command without touching the store
pub async fn send_command(state: &AppState, name: &str, args: Option<Value>) -> Result<Value> {
    let bridge = state.try_get_bridge()?;
    bridge.invoke(name, args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::core::Bridge;
    use crate::error::BridgeError;
    use crate::network::memory::{pair, BackendEndpoint};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn attached_state() -> (AppState, BackendEndpoint) {
        let state = AppState::new();
        let (transport, backend) = pair(16);
        let bridge = Bridge::start(Arc::new(transport), state.store.clone(), BridgeConfig::default())
            .expect("Default config is valid");
        state.set_bridge(Arc::new(bridge));
        (state, backend)
    }

    /// Helper: backend answering the UI commands from fixed data
    fn spawn_stub_backend(mut backend: BackendEndpoint, swap_id: Uuid) {
        tokio::spawn(async move {
            while let Some(cmd) = backend.next_command().await {
                let reply = match cmd.command.as_str() {
                    "get_balance" => json!({ "balance": 500 }),
                    "get_history" => json!({ "swaps": [{ "swap_id": swap_id, "state": "btc is locked" }] }),
                    "get_swap_infos_all" => json!([{
                        "swap_id": swap_id,
                        "completed": false,
                        "start_date": "2024-05-01 12:00:00",
                        "state_name": "btc is locked",
                        "xmr_amount": 1_000_000u64,
                        "btc_amount": 2_000u64,
                        "tx_lock_id": "deadbeef",
                    }]),
                    "suspend_current_swap" => json!({ "swap_id": swap_id }),
                    "get_swap_info" => json!({
                        "swap_id": cmd.args.as_ref().map(|a| a["swap_id"].clone()).unwrap_or_default(),
                        "completed": true,
                        "start_date": "2024-05-01 12:00:00",
                        "state_name": "xmr is redeemed",
                        "xmr_amount": 1_000_000u64,
                        "btc_amount": 2_000u64,
                    }),
                    "buy_xmr" => json!({
                        "swap_id": swap_id,
                        "quote": { "price": 700_000, "min_quantity": 10_000, "max_quantity": 1_000_000 }
                    }),
                    "resume_swap" => json!({ "result": "ok" }),
                    "cancel_and_refund" => json!({ "txid": "cafebabe" }),
                    "withdraw_btc" => json!({
                        "amount": cmd.args.as_ref().and_then(|a| a["amount"].as_u64()).unwrap_or(500),
                        "txid": "beefcafe",
                    }),
                    "get_monero_addresses" => json!({ "addresses": ["4xmrfirst", "4xmrsecond"] }),
                    "list_sellers" => json!({ "sellers": [
                        { "type": "Unreachable", "content": { "peer_id": "12D3KooWB" } }
                    ] }),
                    other => {
                        let _ = backend.respond_err(cmd.id, format!("unknown command {}", other)).await;
                        continue;
                    }
                };
                let _ = backend.respond_ok(cmd.id, reply).await;
            }
        });
    }

    #[tokio::test]
    async fn test_commands_without_bridge_fail() {
        let state = AppState::new();

        assert!(matches!(
            get_balance(&state, BalanceArgs::default()).await,
            Err(BridgeError::ContextUnavailable)
        ));
        assert!(matches!(get_history(&state).await, Err(BridgeError::ContextUnavailable)));
        assert!(!is_context_available(&state));
    }

    #[tokio::test]
    async fn test_get_balance_updates_slice() {
        let (state, backend) = attached_state();
        spawn_stub_backend(backend, Uuid::new_v4());

        let balance = assert_ok!(get_balance(&state, BalanceArgs { force_refresh: true }).await);

        assert_eq!(balance.balance, 500);
        assert_eq!(state.store.get(slices::BALANCE), Some(json!(500)));
        assert!(is_context_available(&state));
    }

    #[tokio::test]
    async fn test_history_and_swap_infos_update_slices() {
        let (state, backend) = attached_state();
        let swap_id = Uuid::new_v4();
        spawn_stub_backend(backend, swap_id);

        let history = assert_ok!(get_history(&state).await);
        assert_eq!(history.swaps.len(), 1);
        assert_eq!(history.swaps[0].swap_id, swap_id);

        let infos = assert_ok!(get_swap_infos_all(&state).await);
        assert_eq!(infos[0].tx_lock_id.as_deref(), Some("deadbeef"));

        let stored: Vec<GetSwapInfoResponse> = state.store.get_as(slices::SWAP_INFOS).unwrap().unwrap();
        assert_eq!(stored, infos);
        assert!(state.store.contains(slices::HISTORY));
    }

    #[tokio::test]
    async fn test_suspend_does_not_touch_store() {
        let (state, backend) = attached_state();
        let swap_id = Uuid::new_v4();
        spawn_stub_backend(backend, swap_id);

        let response = suspend_current_swap(&state).await.unwrap();

        assert_eq!(response.swap_id, swap_id);
        assert_eq!(state.store.version(), 0);
    }

    #[tokio::test]
    async fn test_swap_actions_return_responses_without_store_writes() {
        let (state, backend) = attached_state();
        let swap_id = Uuid::new_v4();
        spawn_stub_backend(backend, swap_id);

        let bought = assert_ok!(
            buy_xmr(
                &state,
                BuyXmrArgs {
                    seller: "/ip4/127.0.0.1/tcp/9939/p2p/12D3KooWA".to_string(),
                    bitcoin_change_address: None,
                    monero_receive_address: "4xmr".to_string(),
                }
            )
            .await
        );
        assert_eq!(bought.swap_id, swap_id);
        assert_eq!(bought.quote.max_quantity, 1_000_000);

        let resumed = assert_ok!(resume_swap(&state, ResumeSwapArgs { swap_id }).await);
        assert_eq!(resumed.result, "ok");

        let refund = assert_ok!(cancel_and_refund(&state, CancelAndRefundArgs { swap_id }).await);
        assert_eq!(refund["txid"], "cafebabe");

        let info = assert_ok!(get_swap_info(&state, GetSwapInfoArgs { swap_id }).await);
        assert_eq!(info.swap_id, swap_id, "Backend echoes the requested swap");
        assert!(info.completed);

        assert_eq!(state.store.version(), 0, "Swap actions leave the store to pushed events");
    }

    #[tokio::test]
    async fn test_wallet_and_seller_queries() {
        let (state, backend) = attached_state();
        spawn_stub_backend(backend, Uuid::new_v4());

        let withdrawal = assert_ok!(
            withdraw_btc(
                &state,
                WithdrawBtcArgs {
                    amount: Some(1_234),
                    address: "bc1qexample".to_string(),
                }
            )
            .await
        );
        assert_eq!(withdrawal.amount, 1_234);
        assert_eq!(withdrawal.txid, "beefcafe");

        let addresses = assert_ok!(get_monero_addresses(&state).await);
        assert_eq!(addresses.addresses, vec!["4xmrfirst", "4xmrsecond"]);

        let sellers = assert_ok!(
            list_sellers(
                &state,
                ListSellersArgs {
                    rendezvous_point: "/dns4/rendezvous.example/tcp/8888".to_string(),
                }
            )
            .await
        );
        assert_eq!(sellers.sellers.len(), 1);
        assert_eq!(sellers.online().count(), 0, "The only seller is unreachable");
    }

    #[tokio::test]
    async fn test_swap_actions_without_bridge_fail() {
        let state = AppState::new();

        assert!(matches!(
            resume_swap(&state, ResumeSwapArgs { swap_id: Uuid::new_v4() }).await,
            Err(BridgeError::ContextUnavailable)
        ));
        assert!(matches!(
            get_monero_addresses(&state).await,
            Err(BridgeError::ContextUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_send_command_passes_errors_through() {
        let (state, backend) = attached_state();
        spawn_stub_backend(backend, Uuid::new_v4());

        let err = assert_err!(send_command(&state, "export_bitcoin_wallet", None).await);

        assert!(err.is_command_failure());
    }
}

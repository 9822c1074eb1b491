/// Typed backend requests
///
/// Each request type knows its command name and the shape of the response,
/// so callers get a decoded value instead of raw JSON.

use crate::core::events::BidQuote;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A command with a statically known name and response type
pub trait Request: Serialize {
    /// Command name on the wire
    const COMMAND: &'static str;

    /// Decoded response
    type Response: DeserializeOwned;
}

// ----------------------------------------------------------------------------
// Balance
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BalanceArgs {
    pub force_refresh: bool,
}

/// Bitcoin balance in satoshis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceResponse {
    pub balance: u64,
}

impl Request for BalanceArgs {
    const COMMAND: &'static str = "get_balance";
    type Response = BalanceResponse;
}

// ----------------------------------------------------------------------------
// History
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GetHistoryArgs {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetHistoryEntry {
    pub swap_id: Uuid,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetHistoryResponse {
    pub swaps: Vec<GetHistoryEntry>,
}

impl Request for GetHistoryArgs {
    const COMMAND: &'static str = "get_history";
    type Response = GetHistoryResponse;
}

// ----------------------------------------------------------------------------
// Swap infos
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GetSwapInfosAllArgs {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetSwapInfoResponse {
    pub swap_id: Uuid,
    pub completed: bool,
    pub start_date: String,
    pub state_name: String,
    /// Piconero
    pub xmr_amount: u64,
    /// Satoshis
    pub btc_amount: u64,
    #[serde(default)]
    pub tx_lock_id: Option<String>,
}

impl Request for GetSwapInfosAllArgs {
    const COMMAND: &'static str = "get_swap_infos_all";
    type Response = Vec<GetSwapInfoResponse>;
}

// ----------------------------------------------------------------------------
// Suspend
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuspendCurrentSwapArgs {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspendCurrentSwapResponse {
    pub swap_id: Uuid,
}

impl Request for SuspendCurrentSwapArgs {
    const COMMAND: &'static str = "suspend_current_swap";
    type Response = SuspendCurrentSwapResponse;
}

// ----------------------------------------------------------------------------
// Swap lifecycle
// ----------------------------------------------------------------------------

/// Start a swap with `seller`, receiving Monero at `monero_receive_address`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuyXmrArgs {
    /// Seller multiaddr
    pub seller: String,
    /// Internal wallet when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitcoin_change_address: Option<String>,
    pub monero_receive_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuyXmrResponse {
    pub swap_id: Uuid,
    pub quote: BidQuote,
}

impl Request for BuyXmrArgs {
    const COMMAND: &'static str = "buy_xmr";
    type Response = BuyXmrResponse;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeSwapArgs {
    pub swap_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeSwapResponse {
    pub result: String,
}

impl Request for ResumeSwapArgs {
    const COMMAND: &'static str = "resume_swap";
    type Response = ResumeSwapResponse;
}

/// Cancel a swap whose timelock expired and refund the locked Bitcoin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelAndRefundArgs {
    pub swap_id: Uuid,
}

impl Request for CancelAndRefundArgs {
    const COMMAND: &'static str = "cancel_and_refund";
    type Response = Value;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetSwapInfoArgs {
    pub swap_id: Uuid,
}

impl Request for GetSwapInfoArgs {
    const COMMAND: &'static str = "get_swap_info";
    type Response = GetSwapInfoResponse;
}

// ----------------------------------------------------------------------------
// Wallets
// ----------------------------------------------------------------------------

/// Withdraw `amount` satoshis to `address`, or the whole balance when absent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawBtcArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawBtcResponse {
    /// Satoshis
    pub amount: u64,
    pub txid: String,
}

impl Request for WithdrawBtcArgs {
    const COMMAND: &'static str = "withdraw_btc";
    type Response = WithdrawBtcResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GetMoneroAddressesArgs {}

/// Monero addresses previously used to receive swap proceeds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetMoneroAddressesResponse {
    pub addresses: Vec<String>,
}

impl Request for GetMoneroAddressesArgs {
    const COMMAND: &'static str = "get_monero_addresses";
    type Response = GetMoneroAddressesResponse;
}

// ----------------------------------------------------------------------------
// Sellers
// ----------------------------------------------------------------------------

/// Discover sellers registered at a rendezvous point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListSellersArgs {
    pub rendezvous_point: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteWithAddress {
    pub multiaddr: String,
    pub peer_id: String,
    pub quote: BidQuote,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnreachableSeller {
    pub peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum SellerStatus {
    Online(QuoteWithAddress),
    Unreachable(UnreachableSeller),
}

impl SellerStatus {
    pub fn peer_id(&self) -> &str {
        match self {
            SellerStatus::Online(seller) => &seller.peer_id,
            SellerStatus::Unreachable(seller) => &seller.peer_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListSellersResponse {
    pub sellers: Vec<SellerStatus>,
}

impl ListSellersResponse {
    /// Sellers that answered with a quote
    pub fn online(&self) -> impl Iterator<Item = &QuoteWithAddress> {
        self.sellers.iter().filter_map(|status| match status {
            SellerStatus::Online(seller) => Some(seller),
            SellerStatus::Unreachable(_) => None,
        })
    }
}

impl Request for ListSellersArgs {
    const COMMAND: &'static str = "list_sellers";
    type Response = ListSellersResponse;
}

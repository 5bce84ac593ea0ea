//! Order-signing and auth-refresh boundary.
//!
//! Signing and token material are opaque to the engine: the order manager
//! supplies the semantic fields (outcome token, price, shares, market
//! parameters) and receives a fully encoded, signed payload it passes
//! through to the trading API untouched.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use predict_common::{Outcome, Side};

/// Errors from the signing/auth collaborator.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("auth token refresh failed: {0}")]
    Refresh(String),
}

/// Semantic order fields handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSigningRequest {
    /// On-chain token identifier for the outcome being bought.
    pub token_id: String,
    pub outcome: Outcome,
    pub side: Side,
    /// Limit price in dollars.
    pub price: Decimal,
    /// Share count.
    pub shares: Decimal,
    /// Fee rate from market metadata, in basis points.
    pub fee_rate_bps: u32,
    /// Risk flags from market metadata, passed through to typed-data
    /// construction.
    pub is_neg_risk: bool,
    pub is_yield_bearing: bool,
}

/// A signed limit order in the exchange's wire schema.
///
/// One explicit camelCase struct; the signer owns all encoding (wei
/// amounts, salts, signature bytes) and the engine never reinterprets the
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrderPayload {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    /// 0 = buy, 1 = sell.
    pub side: u8,
    pub signature_type: u8,
    pub signature: String,
    /// EIP-712 typed-data hash of the order.
    pub hash: String,
    /// Price per share in wei, used in the submission envelope.
    #[serde(rename = "pricePerShare")]
    pub price_per_share: String,
}

/// Signing and auth-refresh capability.
///
/// Implementations live outside this crate (wallet-backed signer, remote
/// signing service, test stub).
#[async_trait]
pub trait Signer: Send + Sync {
    /// Encodes and signs a limit order.
    async fn sign_order(
        &self,
        request: &OrderSigningRequest,
    ) -> Result<SignedOrderPayload, SignerError>;

    /// Obtains a fresh auth token after the current one expired.
    async fn refresh_auth_token(&self) -> Result<String, SignerError>;
}

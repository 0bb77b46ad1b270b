use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Chain, MarketSnapshot, TokenKey};

use super::feeds::{Provider, ProviderPayload, RawProviderRecord};

/// One provider's contribution to a token, projected into canonical shape.
/// Every numeric field is `Option`: missing upstream values stay `None`
/// rather than collapsing to zero.
#[derive(Debug, Clone)]
pub struct PartialListing {
    pub provider: Provider,
    pub key: TokenKey,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub market: MarketSnapshot,
    pub received_at: DateTime<Utc>,
}

/// Chain-specific address shape check. Rejects foreign-chain collisions
/// that share a numeric-looking key with a valid address.
pub fn is_valid_address(chain: Chain, address: &str) -> bool {
    match chain {
        // Solana addresses are base58-encoded 32-byte public keys.
        Chain::Solana => bs58::decode(address)
            .into_vec()
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false),
        Chain::Ethereum | Chain::Bsc | Chain::Base => {
            address.len() == 42
                && address.starts_with("0x")
                && address[2..].chars().all(|c| c.is_ascii_hexdigit())
                && address != "0x0000000000000000000000000000000000000000"
        }
    }
}

fn age_days_from_millis(created_at_ms: i64, now: DateTime<Utc>) -> Option<f64> {
    let elapsed_ms = now.timestamp_millis() - created_at_ms;
    if elapsed_ms < 0 {
        return None;
    }
    Some(elapsed_ms as f64 / 86_400_000.0)
}

fn age_days_from_secs(created_at_secs: i64, now: DateTime<Utc>) -> Option<f64> {
    age_days_from_millis(created_at_secs.checked_mul(1000)?, now)
}

/// Project a raw provider record into a partial canonical listing. Returns
/// `None` when the record cannot be attributed to a valid token address;
/// that rejection affects only this record, never the cycle.
pub fn normalize(record: RawProviderRecord) -> Option<PartialListing> {
    if !is_valid_address(record.chain, &record.address) {
        debug!(
            provider = record.provider.as_str(),
            chain = record.chain.as_str(),
            address = %record.address,
            "rejected record with malformed address"
        );
        return None;
    }

    let key = TokenKey::new(record.chain, record.address);
    let now = record.received_at;

    let (symbol, name, market) = match record.payload {
        ProviderPayload::DexScreener(pair) => {
            let market = MarketSnapshot {
                price_usd: pair.price_usd,
                liquidity_usd: pair.liquidity_usd,
                market_cap: pair.market_cap,
                fdv: pair.fdv,
                volume_24h: pair.volume_h24,
                price_change_m5: pair.price_change_m5,
                price_change_h1: pair.price_change_h1,
                price_change_h6: pair.price_change_h6,
                price_change_h24: pair.price_change_h24,
                tx_h1: pair.txns_h1,
                tx_h24: pair.txns_h24,
                holders: None,
                logo_url: pair.image_url,
                age_days: pair.pair_created_at.and_then(|ms| age_days_from_millis(ms, now)),
            };
            (pair.base_symbol, pair.base_name, market)
        }
        ProviderPayload::Birdeye(overview) => {
            let market = MarketSnapshot {
                price_usd: overview.price,
                liquidity_usd: overview.liquidity,
                market_cap: overview.market_cap,
                fdv: None,
                volume_24h: overview.volume_h24,
                price_change_m5: None,
                price_change_h1: None,
                price_change_h6: None,
                price_change_h24: overview.price_change_h24,
                tx_h1: None,
                tx_h24: None,
                holders: overview.holders,
                logo_url: overview.logo_uri,
                age_days: overview.created_at.and_then(|s| age_days_from_secs(s, now)),
            };
            (overview.symbol, overview.name, market)
        }
        ProviderPayload::GeckoTerminal(pool) => {
            let market = MarketSnapshot {
                price_usd: pool.price_usd,
                liquidity_usd: pool.reserve_usd,
                market_cap: None,
                fdv: pool.fdv_usd,
                volume_24h: pool.volume_h24,
                price_change_m5: None,
                price_change_h1: None,
                price_change_h6: None,
                price_change_h24: pool.price_change_h24,
                tx_h1: None,
                tx_h24: pool.txns_h24,
                holders: pool.holders,
                logo_url: pool.image_url,
                age_days: pool.pool_created_at.and_then(|s| age_days_from_secs(s, now)),
            };
            (pool.symbol, pool.name, market)
        }
    };

    Some(PartialListing {
        provider: record.provider,
        key,
        symbol,
        name,
        market,
        received_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solana_addresses_must_be_base58_32_bytes() {
        assert!(is_valid_address(
            Chain::Solana,
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        ));
        // EVM hex address leaking into a Solana feed
        assert!(!is_valid_address(
            Chain::Solana,
            "0x6b175474e89094c44da98b954eedeac495271d0f"
        ));
        assert!(!is_valid_address(Chain::Solana, "not-base58-0OIl"));
        assert!(!is_valid_address(Chain::Solana, ""));
        // Valid base58 but wrong decoded length
        assert!(!is_valid_address(Chain::Solana, "abc"));
    }

    #[test]
    fn evm_addresses_must_be_checksummable_hex() {
        assert!(is_valid_address(
            Chain::Ethereum,
            "0x6b175474e89094c44da98b954eedeac495271d0f"
        ));
        assert!(!is_valid_address(Chain::Ethereum, "0x1234"));
        assert!(!is_valid_address(
            Chain::Ethereum,
            "0x0000000000000000000000000000000000000000"
        ));
        assert!(!is_valid_address(
            Chain::Bsc,
            "6b175474e89094c44da98b954eedeac495271d0f"
        ));
    }
}

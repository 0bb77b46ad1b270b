use chrono::Utc;

use tokenpulse_backend::listings::reconciler::{passes_completeness_gate, reconcile};
use tokenpulse_backend::listings::{PartialListing, Provider};
use tokenpulse_backend::types::{Chain, MarketSnapshot, TokenKey, TxCount};

const SOL_ADDR: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

fn partial(provider: Provider, market: MarketSnapshot) -> PartialListing {
    PartialListing {
        provider,
        key: TokenKey::new(Chain::Solana, SOL_ADDR),
        symbol: Some("TPX".to_string()),
        name: Some("TokenPulse Example".to_string()),
        market,
        received_at: Utc::now(),
    }
}

#[test]
fn merged_record_combines_fields_from_both_providers() {
    // Provider A (primary aggregator): txns + liquidity. Provider B: holders.
    let a = partial(
        Provider::DexScreener,
        MarketSnapshot {
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            volume_24h: Some(20_000.0),
            tx_h24: Some(TxCount { buys: 5, sells: 3 }),
            ..Default::default()
        },
    );
    let b = partial(
        Provider::Birdeye,
        MarketSnapshot {
            holders: Some(120),
            ..Default::default()
        },
    );

    let outcome = reconcile(vec![a, b]);
    assert_eq!(outcome.gated_out, 0);
    assert_eq!(outcome.candidates.len(), 1);

    let merged = &outcome.candidates[0];
    assert_eq!(merged.market.price_usd, Some(1.0));
    assert_eq!(merged.market.liquidity_usd, Some(50_000.0));
    assert_eq!(merged.market.volume_24h, Some(20_000.0));
    assert_eq!(merged.market.holders, Some(120));
    assert_eq!(merged.market.tx_h24.unwrap().total(), 8);
}

#[test]
fn lower_ranked_source_never_overwrites_primary_tx_counts() {
    let primary = partial(
        Provider::DexScreener,
        MarketSnapshot {
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            volume_24h: Some(20_000.0),
            tx_h24: Some(TxCount { buys: 5, sells: 3 }),
            ..Default::default()
        },
    );
    // GeckoTerminal arrives later with a different tx count; it ranks below
    // the primary aggregator for liquidity/tx evidence.
    let alternate = partial(
        Provider::GeckoTerminal,
        MarketSnapshot {
            tx_h24: Some(TxCount {
                buys: 999,
                sells: 999,
            }),
            ..Default::default()
        },
    );

    let outcome = reconcile(vec![primary, alternate]);
    let merged = &outcome.candidates[0];
    assert_eq!(merged.market.tx_h24, Some(TxCount { buys: 5, sells: 3 }));
}

#[test]
fn candidate_missing_volume_is_gated_out() {
    let incomplete = partial(
        Provider::DexScreener,
        MarketSnapshot {
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            tx_h24: Some(TxCount { buys: 5, sells: 3 }),
            ..Default::default()
        },
    );

    let outcome = reconcile(vec![incomplete]);
    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.gated_out, 1);
}

#[test]
fn primary_evidence_requires_tx_counts() {
    // Liquidity and volume from the primary aggregator but no tx evidence.
    let missing_tx = partial(
        Provider::DexScreener,
        MarketSnapshot {
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            volume_24h: Some(20_000.0),
            ..Default::default()
        },
    );
    let outcome = reconcile(vec![missing_tx]);
    assert_eq!(outcome.gated_out, 1);

    // The same fields sourced from an alternate provider pass without tx.
    let alternate_only = partial(
        Provider::Birdeye,
        MarketSnapshot {
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            volume_24h: Some(20_000.0),
            ..Default::default()
        },
    );
    let outcome = reconcile(vec![alternate_only]);
    assert_eq!(outcome.candidates.len(), 1);
    assert!(passes_completeness_gate(&outcome.candidates[0]));
}

#[test]
fn real_logo_outranks_generated_placeholder() {
    let with_placeholder = partial(
        Provider::DexScreener,
        MarketSnapshot {
            price_usd: Some(1.0),
            liquidity_usd: Some(50_000.0),
            volume_24h: Some(20_000.0),
            tx_h24: Some(TxCount { buys: 5, sells: 3 }),
            logo_url: Some("https://img.example/placeholder/generic.png".to_string()),
            ..Default::default()
        },
    );
    let with_real = partial(
        Provider::GeckoTerminal,
        MarketSnapshot {
            logo_url: Some("https://img.example/tokens/tpx.png".to_string()),
            ..Default::default()
        },
    );

    let outcome = reconcile(vec![with_placeholder, with_real]);
    let merged = &outcome.candidates[0];
    assert_eq!(
        merged.market.logo_url.as_deref(),
        Some("https://img.example/tokens/tpx.png")
    );
}

#[test]
fn reconciliation_is_idempotent_on_identical_inputs() {
    let inputs = || {
        vec![
            partial(
                Provider::DexScreener,
                MarketSnapshot {
                    price_usd: Some(1.0),
                    liquidity_usd: Some(50_000.0),
                    volume_24h: Some(20_000.0),
                    tx_h24: Some(TxCount { buys: 5, sells: 3 }),
                    ..Default::default()
                },
            ),
            partial(
                Provider::Birdeye,
                MarketSnapshot {
                    holders: Some(120),
                    ..Default::default()
                },
            ),
        ]
    };

    let first = reconcile(inputs());
    let second = reconcile(inputs());
    assert_eq!(first.candidates.len(), 1);
    assert_eq!(
        first.candidates[0].market,
        second.candidates[0].market
    );
    assert_eq!(first.candidates[0].symbol, second.candidates[0].symbol);
}

mod common;

use chainpulse::chains::{Chain, ChainClient, ChainClients, ChainError, ParamValue, RawEvent};
use chainpulse::events::{ContractConfig, ContractType, ContractWatcher, DecodedKind};
use common::StubChain;
use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use test_log::test;

const POOL: &str = "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc";

fn watcher_with_feed() -> (ContractWatcher, tokio::sync::mpsc::Sender<RawEvent>) {
    let (chain, feed) = StubChain::new(Chain::Ethereum).with_event_feed();
    let watcher = ContractWatcher::new(Arc::new(ChainClients::from_clients([
        Arc::new(chain) as Arc<dyn ChainClient>
    ])));
    (watcher, feed)
}

fn raw(name: &str, params: Vec<(&str, ParamValue)>) -> RawEvent {
    RawEvent {
        name: name.to_string(),
        params: params
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect(),
        tx_hash: "0xabc123".to_string(),
        block_number: 19_000_001,
    }
}

#[test(tokio::test)]
async fn events_are_decoded_recorded_and_forwarded() {
    let (watcher, feed) = watcher_with_feed();

    let mut watch = watcher
        .watch(ContractConfig {
            address: POOL.to_string(),
            chain: Chain::Ethereum,
            contract_type: Some(ContractType::AmmPool),
            event_signatures: None,
        })
        .await
        .unwrap();

    feed.send(raw(
        "Swap",
        vec![
            ("sender", ParamValue::Address("0xa".to_string())),
            ("amount0In", ParamValue::Uint(U256::from(1000u64))),
            ("amount1In", ParamValue::Uint(U256::zero())),
            ("amount0Out", ParamValue::Uint(U256::zero())),
            ("amount1Out", ParamValue::Uint(U256::from(990u64))),
            ("to", ParamValue::Address("0xb".to_string())),
        ],
    ))
    .await
    .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), watch.events.recv())
        .await
        .expect("event should arrive promptly")
        .expect("channel open");

    assert_eq!(event.event, "Swap");
    assert_eq!(event.contract_name, "AMM Pool");
    assert_eq!(event.chain, Chain::Ethereum);
    match &event.decoded {
        DecodedKind::Swap {
            amount_in,
            amount_out,
            ..
        } => {
            assert_eq!(amount_in, "1000");
            assert_eq!(amount_out, "990");
        }
        other => panic!("expected swap, got {other:?}"),
    }

    // The same event landed in the per-contract history, case-insensitively
    // addressed on EVM chains.
    let history = watcher.history(Chain::Ethereum, &POOL.to_ascii_lowercase(), 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event, "Swap");

    watch.handle.cancel();
}

#[test(tokio::test)]
async fn summary_counts_events_inside_the_window() {
    let (watcher, feed) = watcher_with_feed();

    let mut watch = watcher
        .watch(ContractConfig {
            address: POOL.to_string(),
            chain: Chain::Ethereum,
            contract_type: Some(ContractType::Erc20),
            event_signatures: None,
        })
        .await
        .unwrap();

    for _ in 0..3 {
        feed.send(raw(
            "Transfer",
            vec![
                ("from", ParamValue::Address("0xa".to_string())),
                ("to", ParamValue::Address("0xb".to_string())),
                ("value", ParamValue::Uint(U256::from(7u64))),
            ],
        ))
        .await
        .unwrap();
    }
    feed.send(raw(
        "Approval",
        vec![
            ("owner", ParamValue::Address("0xa".to_string())),
            ("spender", ParamValue::Address("0xb".to_string())),
            ("value", ParamValue::Uint(U256::from(7u64))),
        ],
    ))
    .await
    .unwrap();

    for _ in 0..4 {
        tokio::time::timeout(Duration::from_secs(2), watch.events.recv())
            .await
            .unwrap()
            .unwrap();
    }

    let summary = watcher.event_summary(Chain::Ethereum, POOL, Duration::from_secs(600));
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].event, "Transfer");
    assert_eq!(summary[0].count, 3);
    assert_eq!(summary[1].event, "Approval");
    assert_eq!(summary[1].count, 1);

    watch.handle.cancel();
}

#[test(tokio::test)]
async fn malformed_config_fails_hard() {
    let (watcher, _feed) = watcher_with_feed();

    let result = watcher
        .watch(ContractConfig {
            address: POOL.to_string(),
            chain: Chain::Ethereum,
            contract_type: None,
            event_signatures: None,
        })
        .await;
    assert!(matches!(result, Err(ChainError::InvalidConfig(_))));

    let result = watcher
        .watch(ContractConfig {
            address: "   ".to_string(),
            chain: Chain::Ethereum,
            contract_type: Some(ContractType::Erc20),
            event_signatures: None,
        })
        .await;
    assert!(matches!(result, Err(ChainError::InvalidConfig(_))));
}

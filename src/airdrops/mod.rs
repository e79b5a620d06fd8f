use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::warn;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chains::{Chain, ChainClients};
use crate::constants::ELIGIBILITY_TTL;

/// Chains with a working activity check; campaigns elsewhere can only be
/// derived from catalog status.
const ACTIVITY_CHAINS: &[Chain] = &[
    Chain::Ethereum,
    Chain::Polygon,
    Chain::Arbitrum,
    Chain::Optimism,
    Chain::Base,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Upcoming,
    Completed,
    Claiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AirdropStatus {
    Eligible,
    /// Reserved for catalog-supplied determinations; the on-chain heuristic
    /// below never derives it.
    NotEligible,
    Claimed,
    Pending,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    TransactionCount,
    BridgeVolume,
    LiquidityProvided,
    GovernanceVote,
    SocialTask,
}

#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub threshold: Option<u64>,
    pub description: &'static str,
}

/// One campaign from the static catalog, extendable only by redeploying.
#[derive(Debug, Clone, Copy)]
pub struct AirdropCampaign {
    pub protocol: &'static str,
    pub chain: Chain,
    pub status: CampaignStatus,
    pub requirements: &'static [Requirement],
    pub token_symbol: Option<&'static str>,
    pub claim_deadline: Option<&'static str>,
    pub estimated_value_usd: f64,
}

const LAYERZERO_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(5), description: "Send at least 5 cross-chain messages" },
    Requirement { kind: RequirementKind::BridgeVolume, threshold: Some(1_000), description: "Bridge at least $1,000 in volume" },
];

const SCROLL_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(10), description: "Complete 10 transactions on Scroll" },
];

const LINEA_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(3), description: "Complete 3 transactions on Linea" },
    Requirement { kind: RequirementKind::LiquidityProvided, threshold: Some(100), description: "Provide $100 of liquidity" },
];

const BLAST_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(1), description: "Interact with Blast at least once" },
];

const JUPITER_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(1), description: "Swap at least once through Jupiter" },
];

const EIGENLAYER_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::LiquidityProvided, threshold: Some(500), description: "Restake at least $500 of ETH" },
    Requirement { kind: RequirementKind::GovernanceVote, threshold: None, description: "Participate in a governance vote" },
];

const HYPERLANE_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(25), description: "Relay 25 interchain transactions" },
];

const BASE_SUMMER_REQS: &[Requirement] = &[
    Requirement { kind: RequirementKind::TransactionCount, threshold: Some(10), description: "Complete 10 transactions on Base" },
    Requirement { kind: RequirementKind::SocialTask, threshold: None, description: "Mint an Onchain Summer collectible" },
];

pub const CAMPAIGNS: &[AirdropCampaign] = &[
    AirdropCampaign { protocol: "LayerZero", chain: Chain::Ethereum, status: CampaignStatus::Active, requirements: LAYERZERO_REQS, token_symbol: Some("ZRO"), claim_deadline: None, estimated_value_usd: 120.0 },
    AirdropCampaign { protocol: "Scroll", chain: Chain::Ethereum, status: CampaignStatus::Completed, requirements: SCROLL_REQS, token_symbol: Some("SCR"), claim_deadline: None, estimated_value_usd: 80.0 },
    AirdropCampaign { protocol: "Linea", chain: Chain::Ethereum, status: CampaignStatus::Active, requirements: LINEA_REQS, token_symbol: None, claim_deadline: None, estimated_value_usd: 0.0 },
    AirdropCampaign { protocol: "Blast", chain: Chain::Ethereum, status: CampaignStatus::Claiming, requirements: BLAST_REQS, token_symbol: Some("BLAST"), claim_deadline: Some("2026-09-30"), estimated_value_usd: 60.0 },
    AirdropCampaign { protocol: "Jupiter", chain: Chain::Solana, status: CampaignStatus::Claiming, requirements: JUPITER_REQS, token_symbol: Some("JUP"), claim_deadline: Some("2026-10-31"), estimated_value_usd: 90.0 },
    AirdropCampaign { protocol: "EigenLayer", chain: Chain::Ethereum, status: CampaignStatus::Upcoming, requirements: EIGENLAYER_REQS, token_symbol: Some("EIGEN"), claim_deadline: None, estimated_value_usd: 200.0 },
    AirdropCampaign { protocol: "Hyperlane", chain: Chain::Arbitrum, status: CampaignStatus::Active, requirements: HYPERLANE_REQS, token_symbol: Some("HYPER"), claim_deadline: None, estimated_value_usd: 0.0 },
    AirdropCampaign { protocol: "Onchain Summer", chain: Chain::Base, status: CampaignStatus::Upcoming, requirements: BASE_SUMMER_REQS, token_symbol: None, claim_deadline: None, estimated_value_usd: 0.0 },
];

#[derive(Debug, Clone, Serialize)]
pub struct AirdropInfo {
    pub protocol: String,
    pub chain: Chain,
    pub campaign_status: CampaignStatus,
    pub status: AirdropStatus,
    pub completed_requirements: Vec<String>,
    pub token_symbol: Option<String>,
    pub claim_deadline: Option<String>,
    pub estimated_value_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityCheck {
    pub wallet: String,
    pub results: Vec<AirdropInfo>,
    /// Sum over campaigns currently marked eligible; unestimated campaigns
    /// contribute zero.
    pub total_potential_value: f64,
    pub last_checked: DateTime<Utc>,
}

struct CachedEligibility {
    cached_at: Instant,
    check: EligibilityCheck,
}

fn requirement_met(requirement: &Requirement, tx_count: Option<u64>) -> bool {
    match requirement.kind {
        RequirementKind::TransactionCount => match tx_count {
            Some(count) => count >= requirement.threshold.unwrap_or(1),
            None => false,
        },
        // No on-chain evidence source wired up for these yet.
        _ => false,
    }
}

/// Heuristic status derivation from catalog state and observed activity.
/// Approximate: transaction count is the only on-chain evidence consulted.
fn derive_status(
    campaign: &AirdropCampaign,
    tx_count: Option<u64>,
) -> (AirdropStatus, Vec<String>) {
    let completed: Vec<String> = campaign
        .requirements
        .iter()
        .filter(|r| requirement_met(r, tx_count))
        .map(|r| r.description.to_string())
        .collect();

    let status = match campaign.status {
        CampaignStatus::Completed => AirdropStatus::Claimed,
        CampaignStatus::Claiming => {
            if completed.is_empty() {
                AirdropStatus::Unknown
            } else {
                AirdropStatus::Eligible
            }
        }
        CampaignStatus::Active | CampaignStatus::Upcoming => {
            let tx_requirement_met = campaign
                .requirements
                .iter()
                .any(|r| r.kind == RequirementKind::TransactionCount && requirement_met(r, tx_count));
            if tx_requirement_met || completed.len() >= 2 {
                AirdropStatus::Eligible
            } else if tx_count.map(|c| c > 0).unwrap_or(false) {
                AirdropStatus::Pending
            } else {
                AirdropStatus::Unknown
            }
        }
    };

    (status, completed)
}

/// Evaluates wallet activity against the campaign catalog, memoizing each
/// (wallet, chain-filter, protocol-filter) result for five minutes.
pub struct EligibilityEngine {
    clients: Arc<ChainClients>,
    cache: DashMap<String, CachedEligibility>,
    ttl: Duration,
}

impl EligibilityEngine {
    pub fn new(clients: Arc<ChainClients>) -> Self {
        Self::with_ttl(clients, ELIGIBILITY_TTL)
    }

    pub fn with_ttl(clients: Arc<ChainClients>, ttl: Duration) -> Self {
        Self {
            clients,
            cache: DashMap::new(),
            ttl,
        }
    }

    pub async fn check(
        &self,
        wallet: &str,
        protocols: Option<&[String]>,
        chain: Option<Chain>,
    ) -> EligibilityCheck {
        let key = cache_key(wallet, protocols, chain);
        if let Some(hit) = self.cache.get(&key) {
            if hit.cached_at.elapsed() < self.ttl {
                metrics::increment_counter!("chainpulse_eligibility_cache_hits_total");
                return hit.check.clone();
            }
        }

        let campaigns: Vec<&AirdropCampaign> = CAMPAIGNS
            .iter()
            .filter(|c| chain.map(|wanted| c.chain == wanted).unwrap_or(true))
            .filter(|c| {
                protocols
                    .map(|wanted| {
                        wanted
                            .iter()
                            .any(|p| p.eq_ignore_ascii_case(c.protocol))
                    })
                    .unwrap_or(true)
            })
            .collect();

        // One activity probe per chain, shared across this call's campaigns.
        let mut activity: HashMap<Chain, Option<u64>> = HashMap::new();
        let mut results = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            let tx_count = if ACTIVITY_CHAINS.contains(&campaign.chain) {
                match activity.get(&campaign.chain) {
                    Some(cached) => *cached,
                    None => {
                        let probed = self.probe_activity(campaign.chain, wallet).await;
                        activity.insert(campaign.chain, probed);
                        probed
                    }
                }
            } else {
                None
            };

            let (status, completed_requirements) = derive_status(campaign, tx_count);
            results.push(AirdropInfo {
                protocol: campaign.protocol.to_string(),
                chain: campaign.chain,
                campaign_status: campaign.status,
                status,
                completed_requirements,
                token_symbol: campaign.token_symbol.map(str::to_string),
                claim_deadline: campaign.claim_deadline.map(str::to_string),
                estimated_value_usd: campaign.estimated_value_usd,
            });
        }

        let total_potential_value = results
            .iter()
            .filter(|r| r.status == AirdropStatus::Eligible)
            .map(|r| r.estimated_value_usd)
            .sum();

        let check = EligibilityCheck {
            wallet: wallet.to_string(),
            results,
            total_potential_value,
            last_checked: Utc::now(),
        };
        self.cache.insert(
            key,
            CachedEligibility {
                cached_at: Instant::now(),
                check: check.clone(),
            },
        );
        check
    }

    /// A failed probe degrades the affected campaigns to unknown instead of
    /// aborting the whole evaluation.
    async fn probe_activity(&self, chain: Chain, wallet: &str) -> Option<u64> {
        let client = match self.clients.get(chain) {
            Ok(client) => client,
            Err(_) => return None,
        };
        match client.transaction_count(wallet).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("activity check on {chain} failed for {wallet}: {e}");
                metrics::increment_counter!("chainpulse_rpc_failures_total", "chain" => chain.as_str());
                None
            }
        }
    }
}

fn cache_key(wallet: &str, protocols: Option<&[String]>, chain: Option<Chain>) -> String {
    let mut protos: Vec<String> = protocols
        .map(|list| list.iter().map(|p| p.to_ascii_lowercase()).collect())
        .unwrap_or_default();
    protos.sort();
    format!(
        "{}|{}|{}",
        wallet,
        chain.map(|c| c.as_str()).unwrap_or("*"),
        protos.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ChainClient, ChainError, MockChainClient};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn campaign_by_protocol(protocol: &str) -> &'static AirdropCampaign {
        CAMPAIGNS
            .iter()
            .find(|c| c.protocol == protocol)
            .expect("catalog entry")
    }

    #[test]
    fn test_completed_campaign_derives_claimed() {
        let (status, _) = derive_status(campaign_by_protocol("Scroll"), Some(50));
        assert_eq!(status, AirdropStatus::Claimed);
    }

    #[test]
    fn test_claiming_with_activity_derives_eligible() {
        let (status, completed) = derive_status(campaign_by_protocol("Blast"), Some(3));
        assert_eq!(status, AirdropStatus::Eligible);
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn test_claiming_without_evidence_derives_unknown() {
        // No supported-chain match means no transaction count at all.
        let (status, completed) = derive_status(campaign_by_protocol("Jupiter"), None);
        assert_eq!(status, AirdropStatus::Unknown);
        assert!(completed.is_empty());
    }

    #[test]
    fn test_active_campaign_progress_ladder() {
        let layerzero = campaign_by_protocol("LayerZero");
        assert_eq!(derive_status(layerzero, Some(12)).0, AirdropStatus::Eligible);
        assert_eq!(derive_status(layerzero, Some(2)).0, AirdropStatus::Pending);
        assert_eq!(derive_status(layerzero, Some(0)).0, AirdropStatus::Unknown);
        assert_eq!(derive_status(layerzero, None).0, AirdropStatus::Unknown);
    }

    fn engine_with_eth_count(count: u64, calls: Arc<AtomicUsize>) -> EligibilityEngine {
        let mut client = MockChainClient::new();
        client.expect_chain().return_const(Chain::Ethereum);
        client.expect_transaction_count().returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(count)
        });
        let clients = Arc::new(ChainClients::from_clients([
            Arc::new(client) as Arc<dyn ChainClient>
        ]));
        EligibilityEngine::new(clients)
    }

    #[tokio::test]
    async fn test_cache_hit_returns_identical_last_checked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with_eth_count(12, calls.clone());

        let first = engine
            .check("0xAAA0000000000000000000000000000000000001", None, Some(Chain::Ethereum))
            .await;
        let second = engine
            .check("0xAAA0000000000000000000000000000000000001", None, Some(Chain::Ethereum))
            .await;

        assert_eq!(first.last_checked, second.last_checked);
        // The hit must not re-run activity checks.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_filters_miss_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with_eth_count(12, calls.clone());

        engine
            .check("0xAAA0000000000000000000000000000000000001", None, Some(Chain::Ethereum))
            .await;
        engine
            .check(
                "0xAAA0000000000000000000000000000000000001",
                Some(&["LayerZero".to_string()]),
                Some(Chain::Ethereum),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsupported_chain_campaign_stays_unknown() {
        // No clients at all: the Jupiter claiming campaign has no
        // supported-chain match and must come back unknown, not eligible.
        let clients = Arc::new(ChainClients::from_clients(Vec::<Arc<dyn ChainClient>>::new()));
        let engine = EligibilityEngine::new(clients);

        let check = engine
            .check(
                "0xAAA0000000000000000000000000000000000001",
                Some(&["Jupiter".to_string()]),
                None,
            )
            .await;

        assert_eq!(check.results.len(), 1);
        assert_eq!(check.results[0].status, AirdropStatus::Unknown);
        assert_eq!(check.total_potential_value, 0.0);
    }

    #[tokio::test]
    async fn test_activity_failure_degrades_single_campaign() {
        let mut client = MockChainClient::new();
        client.expect_chain().return_const(Chain::Ethereum);
        client
            .expect_transaction_count()
            .returning(|_| Err(ChainError::unavailable(Chain::Ethereum, "timeout")));
        let clients = Arc::new(ChainClients::from_clients([
            Arc::new(client) as Arc<dyn ChainClient>
        ]));
        let engine = EligibilityEngine::new(clients);

        let check = engine
            .check("0xAAA0000000000000000000000000000000000001", None, None)
            .await;

        // Every campaign still reports; nothing aborted the evaluation.
        assert_eq!(check.results.len(), CAMPAIGNS.len());
        let scroll = check
            .results
            .iter()
            .find(|r| r.protocol == "Scroll")
            .unwrap();
        assert_eq!(scroll.status, AirdropStatus::Claimed);
        let layerzero = check
            .results
            .iter()
            .find(|r| r.protocol == "LayerZero")
            .unwrap();
        assert_eq!(layerzero.status, AirdropStatus::Unknown);
    }

    #[tokio::test]
    async fn test_total_potential_value_sums_eligible_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with_eth_count(50, calls);

        let check = engine
            .check("0xAAA0000000000000000000000000000000000001", None, Some(Chain::Ethereum))
            .await;

        // 50 transactions: LayerZero (120) and Blast (60) become eligible,
        // Scroll is claimed, Linea eligible but unestimated, EigenLayer
        // only pending (no transaction-count requirement to satisfy).
        let eligible: Vec<_> = check
            .results
            .iter()
            .filter(|r| r.status == AirdropStatus::Eligible)
            .collect();
        assert!(eligible.iter().any(|r| r.protocol == "LayerZero"));
        assert!(eligible.iter().any(|r| r.protocol == "Blast"));
        assert_eq!(check.total_potential_value, 120.0 + 60.0);
    }
}

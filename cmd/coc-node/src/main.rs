mod cli;
mod initializers;

use std::fs;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use coc_config::NodeConfig;
use coc_settlement::{NodeScore, Relayer};

use crate::cli::Options;

const CONFIG_INVALID: u8 = 1;
const STORAGE_CORRUPTION: u8 = 2;
const LISTEN_FAILURE: u8 = 3;

fn load_config(opts: &Options) -> Result<NodeConfig, String> {
    let raw = fs::read_to_string(&opts.config).map_err(|e| format!("failed to read {}: {e}", opts.config.display()))?;
    let parsed = if opts.config.extension().and_then(|e| e.to_str()) == Some("json") {
        NodeConfig::from_json_str(&raw)
    } else {
        NodeConfig::from_toml_str(&raw)
    };
    parsed.map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Options::parse();
    initializers::init_tracing(&opts);

    let config = match load_config(&opts) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(CONFIG_INVALID);
        }
    };

    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            error!(%issue, "configuration issue");
        }
        return ExitCode::from(CONFIG_INVALID);
    }

    let handles = match initializers::build_node(&config, &opts).await {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "failed to open the store");
            return ExitCode::from(STORAGE_CORRUPTION);
        }
    };

    let tracker = TaskTracker::new();
    let cancel_token = CancellationToken::new();

    // JSON-RPC + WebSocket + PoSe HTTP server.
    {
        let rpc_ctx = handles.rpc_ctx.clone();
        let rpc_addr = handles.rpc_addr;
        let cancel = cancel_token.clone();
        let listener = match tokio::net::TcpListener::bind(rpc_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(%rpc_addr, error = %e, "failed to bind the rpc listener");
                return ExitCode::from(LISTEN_FAILURE);
            }
        };
        info!(%rpc_addr, "rpc server listening");
        let app = coc_rpc::build_router(rpc_ctx);
        tracker.spawn(async move {
            let serve = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>());
            tokio::select! {
                result = serve => {
                    if let Err(e) = result {
                        error!(error = %e, "rpc server stopped unexpectedly");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("rpc server shutting down");
                }
            }
        });
    }

    // Block proposer loop: this node proposes whenever it's its own turn,
    // ticking once per `blockTimeMs` the way a fixed-interval BFT round
    // would, without implementing consensus itself (§4.7, Non-goals).
    {
        let chain = handles.chain.clone();
        let max_tx_per_block = handles.max_tx_per_block;
        let block_time_ms = handles.block_time_ms;
        let p2p = handles.p2p.clone();
        let cancel = cancel_token.clone();
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(block_time_ms));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let next_height = chain.height() + 1;
                        if chain.expected_proposer(next_height) != chain.self_node_id() {
                            continue;
                        }
                        match chain.propose_next_block(max_tx_per_block, |_| None).await {
                            Ok(block) => {
                                if let Some(p2p) = &p2p {
                                    p2p.broadcast_block(block);
                                }
                            }
                            Err(e) => warn!(error = %e, "block proposal failed"),
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            info!("proposer loop stopped");
        });
    }

    // Aggregator/relayer loop: every epoch, folds the previous epoch's
    // accepted receipts into a batch and finalizes epochs past their
    // dispute window (§4.12).
    if opts.aggregator {
        if let Some((slasher_address, _slasher_key)) = initializers::aggregator_identity(true) {
            let settlement = handles.settlement.clone();
            let accepted_receipts = handles.accepted_receipts.clone();
            let self_node_id = handles.self_node_id;
            let cancel = cancel_token.clone();
            settlement.set_slasher(slasher_address, true);
            tracker.spawn(async move {
                let relayer = Relayer::new(slasher_address);
                let mut interval = tokio::time::interval(Duration::from_secs(coc_common::EPOCH_SECONDS));
                let mut last_aggregated_epoch: Option<u64> = None;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let now = std::time::SystemTime::now()
                                .duration_since(std::time::UNIX_EPOCH)
                                .unwrap_or_default()
                                .as_secs();
                            let current_epoch = coc_common::current_epoch(now);
                            if current_epoch == 0 {
                                continue;
                            }
                            let epoch_to_aggregate = current_epoch - 1;
                            if last_aggregated_epoch != Some(epoch_to_aggregate) {
                                let receipts = accepted_receipts.receipts_for_epoch(epoch_to_aggregate);
                                if !receipts.is_empty() {
                                    match coc_settlement::build_and_submit_batch(
                                        &settlement,
                                        &receipts,
                                        epoch_to_aggregate,
                                        self_node_id,
                                        current_epoch,
                                    ) {
                                        Ok(batch_id) => info!(epoch = epoch_to_aggregate, ?batch_id, "submitted settlement batch"),
                                        Err(e) => warn!(epoch = epoch_to_aggregate, error = %e, "failed to submit settlement batch"),
                                    }
                                }
                                last_aggregated_epoch = Some(epoch_to_aggregate);
                            }

                            if current_epoch >= coc_common::DISPUTE_WINDOW_EPOCHS {
                                let finalizable_epoch = current_epoch - coc_common::DISPUTE_WINDOW_EPOCHS;
                                if let Err(e) = relayer.try_finalize_epoch(&settlement, finalizable_epoch, current_epoch) {
                                    warn!(epoch = finalizable_epoch, error = %e, "epoch finalization failed");
                                }
                                let scores: Vec<NodeScore> = Vec::new();
                                relayer.dispatch_liveness_slashes(&settlement, &scores);
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
                info!("aggregator loop stopped");
            });
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping listeners");
        }
    }
    cancel_token.cancel();
    tracker.close();
    tracker.wait().await;
    info!("node shut down cleanly");
    ExitCode::SUCCESS
}

// Example driving an `Allocator` against a static, in-memory conference.
//
// Demonstrates wiring: endpoint supplier, allocation settings, and a
// bandwidth estimate fed in from the command line.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sfu_bwe_allocator::allocator::Allocator;
use sfu_bwe_allocator::config::AllocatorConfig;
use sfu_bwe_allocator::endpoint::{AlwaysTrustBwe, StaticEndpoint, StaticEndpointSupplier};
use sfu_bwe_allocator::predictor::NoPredictor;
use sfu_bwe_allocator::{init_logging, AllocationSettings, EndpointId, LayerDesc, MediaSourceDesc};

/// Allocator demo: computes one allocation cycle for a static conference.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Receiver's available bandwidth estimate, in bits per second.
    #[clap(short, long, default_value = "1500000")]
    bwe_bps: i64,

    /// Source name to treat as on-stage.
    #[clap(short, long, default_value = "alice-video")]
    on_stage: String,
}

fn three_layer_source(name: &str, endpoint_id: &str) -> MediaSourceDesc {
    MediaSourceDesc::new(
        name,
        endpoint_id,
        vec![
            LayerDesc { index: 0, temporal_id: 0, spatial_id: 0, height: 180, frame_rate: 15.0, bitrate_bps: 150_000 },
            LayerDesc { index: 1, temporal_id: 0, spatial_id: 1, height: 360, frame_rate: 30.0, bitrate_bps: 500_000 },
            LayerDesc { index: 2, temporal_id: 0, spatial_id: 2, height: 720, frame_rate: 30.0, bitrate_bps: 2_000_000 },
        ],
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();

    let sources = vec![
        three_layer_source("alice-video", "ep-alice"),
        three_layer_source("bob-video", "ep-bob"),
        three_layer_source("carol-video", "ep-carol"),
    ];

    let endpoints = sources
        .into_iter()
        .map(|source| {
            let endpoint_id = source.owner_endpoint_id.clone();
            Arc::new(StaticEndpoint { id: endpoint_id, sources: vec![source], stats: Default::default() })
                as Arc<dyn sfu_bwe_allocator::endpoint::ConferenceEndpoint>
        })
        .collect();

    let settings = AllocationSettings { on_stage_sources: vec![args.on_stage.into()], ..Default::default() };

    let allocator = Allocator::new(
        AllocatorConfig::default(),
        EndpointId::new("receiver"),
        settings,
        Arc::new(StaticEndpointSupplier { endpoints }),
        Arc::new(AlwaysTrustBwe),
        Arc::new(NoPredictor),
    );

    allocator.bandwidth_changed(args.bwe_bps).await;

    let allocation = allocator.get_allocation().await;
    println!("oversending: {}", allocation.oversending);
    println!("target_bps: {}", allocation.target_bps());
    println!("ideal_bps: {}", allocation.ideal_bps());
    for single in &allocation.allocations {
        let target = single.target_layer.map(|l| l.height).unwrap_or(0);
        println!("{} ({}): target height {}p", single.source_name, single.endpoint_id, target);
    }

    Ok(())
}

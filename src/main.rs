use std::path::PathBuf;

use clap::Parser;
use log::info;
use ringtlb::base::behavior::Ticking;
use ringtlb::sim::config::{Config, GmmuConfig, SimConfig, TlbConfig};
use ringtlb::sim::engine::SerialEngine;
use ringtlb::sim::top::{RingTlbTop, RingTlbTopConfig};
use ringtlb::tlb::TlbStats;
use ringtlb::traffic::{TrafficConfig, TranslationTraffic};

#[derive(Parser)]
#[command(version, about)]
struct RingTlbArgs {
    /// TOML config with [sim], [tlb], [gmmu] and [traffic] sections.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    num_ses: Option<usize>,
    #[arg(long)]
    requests: Option<usize>,
    #[arg(long)]
    timeout: Option<u64>,
}

pub fn main() {
    env_logger::init();
    let argv = RingTlbArgs::parse();

    let doc = argv.config.as_ref().map(|path| {
        let text = std::fs::read_to_string(path).expect("cannot read config file");
        text.parse::<toml::Value>().expect("cannot parse config file")
    });
    let section = |name: &str| doc.as_ref().and_then(|doc| doc.get(name));

    let mut sim_config = SimConfig::from_section(section("sim"));
    let tlb_config = TlbConfig::from_section(section("tlb"));
    let gmmu_config = GmmuConfig::from_section(section("gmmu"));
    let mut traffic_config = TrafficConfig::from_section(section("traffic"));

    sim_config.num_ses = argv.num_ses.unwrap_or(sim_config.num_ses);
    sim_config.timeout = argv.timeout.unwrap_or(sim_config.timeout);
    traffic_config.requests = argv.requests.unwrap_or(traffic_config.requests);

    let mut top = RingTlbTop::new(&RingTlbTopConfig {
        sim: sim_config,
        tlb: tlb_config,
        gmmu: gmmu_config,
    });
    let mut traffic = TranslationTraffic::new(traffic_config);

    let mut engine = SerialEngine::new();
    let timeout = top.timeout;
    let outcome = engine.run_with(timeout, |now| {
        let mut made_progress = traffic.tick(now, &mut top.rings);
        made_progress |= top.tick(now);
        made_progress
    });

    traffic.report(outcome.cycles);

    let mut l1 = TlbStats::default();
    for ring in &top.rings {
        for id in 0..ringtlb::tlb::TLBS_PER_RING {
            l1.merge(&ring.tlb(id).tlb.stats);
        }
    }
    info!(
        "l1: {} hits, {} misses ({} coalesced), {} probe fills, {} bottom fills, {} escalations",
        l1.hits, l1.misses, l1.coalesced, l1.probe_fills, l1.bottom_fills, l1.escalations
    );
    let gmmu = &top.gmmu.stats;
    info!(
        "gmmu: {} requests, {} fast hits, {} walks, {} remote fetches, {} false positives",
        gmmu.translations,
        gmmu.fast_hits,
        gmmu.walks_started,
        gmmu.remote_fetches,
        gmmu.filter_false_positives
    );
    if !outcome.quiesced {
        info!("timed out after {} cycles", outcome.cycles);
    }
}

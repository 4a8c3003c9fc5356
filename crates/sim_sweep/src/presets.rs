//! Built-in experiment definitions.
//!
//! Ready-to-run sweeps for the packet-queue simulator (`main.c` and friends,
//! compiled per configuration) and the token-bucket simulators (`q3.c`,
//! `q3_b.c`, compiled once and driven by run arguments). Each preset is also a
//! template for custom JSON definitions (`sim-sweep show <id>`).

use std::path::PathBuf;

use crate::aggregate::Reduction;
use crate::builder::SourceSelector;
use crate::definition::{BuildDefinition, ExperimentDefinition, MetricDefinition, RunDefinition};
use crate::parameters::{Injection, ParameterSpace, TrialPlan, Values};
use crate::plot::ChartSpec;
use crate::sweep::BuildPolicy;

/// Simulated seconds per run of the packet-queue simulator; counts over a run
/// divided by this give rates.
const RUN_LENGTH: f64 = 100.0;

/// Seeds shared by the token-bucket experiments.
const TOKEN_BUCKET_SEEDS: [u64; 4] = [333333, 4444444, 5555555, 400383048];

/// Every preset, in listing order.
pub fn all() -> Vec<ExperimentDefinition> {
    vec![
        buffer_size(),
        link_bit_rate(),
        bit_rate(),
        clock_period(),
        token_bucket_size(),
        data_bucket_size(),
        token_rate(),
        bit_token_rate(),
    ]
}

pub fn find(id: &str) -> Option<ExperimentDefinition> {
    all().into_iter().find(|definition| definition.id == id)
}

fn packet_queue(id: &str, description: &str, space: ParameterSpace) -> ExperimentDefinition {
    ExperimentDefinition {
        id: id.to_string(),
        description: description.to_string(),
        build: BuildDefinition::new(SourceSelector::pattern(".", "*.c")),
        run: RunDefinition::default(),
        space,
        trials: None,
        metrics: Vec::new(),
        reduction: Reduction::Mean,
        charts: Vec::new(),
        results_file: PathBuf::from(format!("{id}.csv")),
    }
}

/// Rejected and transmitted arrival counts as the buffer size `B` grows.
pub fn buffer_size() -> ExperimentDefinition {
    let mut definition = packet_queue(
        "buffer-size",
        "Rejected and transmitted arrivals versus buffer size B",
        ParameterSpace::grid().sweep("B", Values::range(1, 5, 1), Injection::Define),
    );
    definition.metrics = vec![
        MetricDefinition::label("Rejected", "Rejected arrival count"),
        MetricDefinition::label("Transmitted", "Transmitted arrival count"),
    ];
    definition.charts = vec![
        ChartSpec::new("buffer-size-rejected.svg", "B", "Rejected")
            .title("Rejected arrivals vs B")
            .labels("B (buffer size)", "Rejected arrival count"),
        ChartSpec::new("buffer-size-transmitted.svg", "B", "Transmitted")
            .title("Transmitted arrivals vs B")
            .labels("B (buffer size)", "Transmitted arrival count"),
    ];
    definition
}

/// Packet rates as the link rate `R` varies.
pub fn link_bit_rate() -> ExperimentDefinition {
    let mut definition = packet_queue(
        "link-bit-rate",
        "Rejected and output packet rates versus link rate",
        ParameterSpace::grid().sweep("LINK_BIT_RATE", Values::range(20, 401, 20), Injection::Define),
    );
    definition.metrics = vec![
        MetricDefinition::label("RejectedRate", "Rejected arrival count").scaled(RUN_LENGTH),
        MetricDefinition::label("TransmittedRate", "Transmitted arrival count").scaled(RUN_LENGTH),
    ];
    definition.charts = vec![
        ChartSpec::new("link-bit-rate-rejected.svg", "LINK_BIT_RATE", "RejectedRate")
            .title("Rejected packet rate vs R")
            .labels("R (packets/sec)", "Rejected packet rate (packets/sec)"),
        ChartSpec::new("link-bit-rate-transmitted.svg", "LINK_BIT_RATE", "TransmittedRate")
            .title("Output/Processed packet rate vs R")
            .labels("R (packets/sec)", "Output/Processed packet rate (packets/sec)"),
    ];
    definition
}

fn bit_rate_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::label("RejectedRate", "Average Rejected bit count").scaled(RUN_LENGTH),
        MetricDefinition::label("TransmittedRate", "Average Transmitted bit count").scaled(RUN_LENGTH),
    ]
}

/// Bit rates as `N` grows with a fixed packet transmission time.
pub fn bit_rate() -> ExperimentDefinition {
    let mut definition = packet_queue(
        "bit-rate",
        "Rejected and output bit rates versus N with PACKET_XMT_TIME = 0.1",
        ParameterSpace::grid()
            .fixed("PACKET_XMT_TIME", 0.1, Injection::Define)
            .sweep("N", Values::range(3000, 30001, 1000), Injection::Define),
    );
    definition.metrics = bit_rate_metrics();
    definition.charts = vec![
        ChartSpec::new("bit-rate-rejected.svg", "N", "RejectedRate")
            .title("Rejected bit rate vs N (PACKET_XMT_TIME = 0.1)")
            .labels("N", "Rejected bit rate (bps)"),
        ChartSpec::new("bit-rate-output.svg", "N", "TransmittedRate")
            .title("Output data rate vs N (PACKET_XMT_TIME = 0.1)")
            .labels("N", "Output data rate (bps)"),
    ];
    definition
}

/// Bit rates as `N` grows with the transmission time tracking `N / 1e6`.
pub fn clock_period() -> ExperimentDefinition {
    let mut definition = packet_queue(
        "clock-period",
        "Rejected and output bit rates versus N with PACKET_XMT_TIME = N / 1e6",
        ParameterSpace::grid()
            .sweep("N", Values::range(10000, 1000001, 20000), Injection::Define)
            .derived("PACKET_XMT_TIME", "N", 1.0, 1_000_000.0, Injection::Define),
    );
    definition.metrics = bit_rate_metrics();
    definition.charts = vec![
        ChartSpec::new("clock-period-rejected.svg", "N", "RejectedRate")
            .title("Rejected bit rate vs N (PACKET_XMT_TIME = N / 1e6)")
            .labels("N", "Rejected bit rate (bps)"),
        ChartSpec::new("clock-period-output.svg", "N", "TransmittedRate")
            .title("Output data rate vs N (PACKET_XMT_TIME = N / 1e6)")
            .labels("N", "Output data rate (bps)"),
    ];
    definition
}

/// Token-bucket simulator: positional `bt bd rate seed`, prints `loss,output`.
fn token_bucket(
    id: &str,
    description: &str,
    source: &str,
    artifact: &str,
    space: ParameterSpace,
    chart: ChartSpec,
) -> ExperimentDefinition {
    let mut build = BuildDefinition::new(SourceSelector::files([source, "simlib.c"]));
    build.flags = Vec::new();
    build.artifact = PathBuf::from(artifact);
    build.policy = BuildPolicy::Once;

    ExperimentDefinition {
        id: id.to_string(),
        description: description.to_string(),
        build,
        run: RunDefinition::default(),
        space,
        trials: Some(TrialPlan::seeds(TOKEN_BUCKET_SEEDS)),
        metrics: vec![
            MetricDefinition::column("loss_rate", 0),
            MetricDefinition::column("output_rate", 1),
        ],
        reduction: Reduction::Mean,
        charts: vec![chart],
        results_file: PathBuf::from(format!("{id}.csv")),
    }
}

pub fn token_bucket_size() -> ExperimentDefinition {
    token_bucket(
        "token-bucket-size",
        "Loss and output rate versus token bucket size (bd = 10, rate = 90)",
        "q3.c",
        "token_sim",
        ParameterSpace::grid()
            .sweep("bt", Values::range(1, 51, 1), Injection::Arg)
            .fixed("bd", 10, Injection::Arg)
            .fixed("rate", 90.0, Injection::Arg),
        ChartSpec::new("token-bucket-size.svg", "bt", "loss_rate")
            .title("Varying token bucket (bt)")
            .labels("token bucket size", "loss rate")
            .secondary("output_rate", "output rate (pps)"),
    )
}

pub fn data_bucket_size() -> ExperimentDefinition {
    token_bucket(
        "data-bucket-size",
        "Loss and output rate versus data bucket size (bt = 10, rate = 90)",
        "q3.c",
        "token_sim",
        ParameterSpace::grid()
            .fixed("bt", 10, Injection::Arg)
            .sweep("bd", Values::range(1, 51, 1), Injection::Arg)
            .fixed("rate", 90.0, Injection::Arg),
        ChartSpec::new("data-bucket-size.svg", "bd", "loss_rate")
            .title("Varying data bucket (bd)")
            .labels("data bucket size", "loss rate")
            .secondary("output_rate", "output rate (pps)"),
    )
}

pub fn token_rate() -> ExperimentDefinition {
    token_bucket(
        "token-rate",
        "Loss and output rate versus token rate (bt = 10, bd = 10)",
        "q3.c",
        "token_sim",
        ParameterSpace::grid()
            .fixed("bt", 10, Injection::Arg)
            .fixed("bd", 10, Injection::Arg)
            .sweep("rate", Values::float_range(50.0, 155.0, 5.0), Injection::Arg),
        ChartSpec::new("token-rate.svg", "rate", "loss_rate")
            .title("Varying token rate")
            .labels("token rate (pps)", "loss rate")
            .secondary("output_rate", "output rate (pps)"),
    )
}

/// Bit-based token bucket: sizes in bits, rates in bits per second.
pub fn bit_token_rate() -> ExperimentDefinition {
    token_bucket(
        "bit-token-rate",
        "Bit-based loss and output rate versus token rate (bt = 10000 bits, bd = 50)",
        "q3_b.c",
        "q3_b_sim",
        ParameterSpace::grid()
            .fixed("bt", 10000, Injection::Arg)
            .fixed("bd", 50, Injection::Arg)
            .sweep("rate", Values::float_range(50000.0, 260000.0, 10000.0), Injection::Arg),
        ChartSpec::new("bit-token-rate.svg", "rate", "loss_rate")
            .title("Bit-based performance")
            .labels("token rate (bps)", "loss rate")
            .secondary("output_rate", "output rate (bps)"),
    )
}

use anyhow::{Context, Result};
use log::debug;

use pnss::config::ExplorerConfig;
use pnss::explorer::StateSpaceExplorer;
use pnss::net::read_net;
use pnss::options::Options;
use pnss::store::GraphOptions;

fn main() {
    if std::env::var("PNSS_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PNSS_LOG")
            .write_style("PNSS_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match Options::parse_from_args(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    debug!("pnss options: {:?}", options);

    if let Err(err) = run(&options) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<()> {
    let mut config = ExplorerConfig::load_from_file(&options.config)?;
    options.apply(&mut config);
    config.validate().context("Invalid exploration options")?;
    debug!("exploration config: {:?}", config);

    let net = read_net(&options.net)
        .with_context(|| format!("Failed to load net: {:?}", options.net))?;
    let explored = StateSpaceExplorer::from_config(&net, &config)
        .and_then(StateSpaceExplorer::explore)
        .with_context(|| format!("Exploration of {:?} failed", options.net))?;

    println!(
        "Results: {} states and {} transitions",
        explored.results.number_of_states, explored.results.processed_transitions
    );

    explored
        .store
        .save(&options.output)
        .with_context(|| format!("Failed to write state space to {:?}", options.output))?;

    if let Some(dot) = &options.dot {
        let graph_options = GraphOptions {
            max_states: config.display_max_states,
        };
        explored
            .store
            .write_dot(dot, graph_options)
            .with_context(|| format!("Failed to write DOT file: {:?}", dot))?;
    }
    Ok(())
}

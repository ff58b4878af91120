//! Parsing Options.
//! `pnss <NET> [-c pnss.toml] [-m mode] [-j threads] [-o dir] [--dot file]`,
//! flags override the values of the config file.

use clap::{value_parser, Arg, Command};
use std::error::Error;
use std::path::PathBuf;

use crate::config::ExplorerConfig;
use crate::explorer::{ConflictPolicy, ExplorationMode, VanishingStrategy};

fn make_options_parser() -> clap::Command {
    let parser = Command::new("pnss")
        .no_binary_name(true)
        .about("Explores the reachability or coverability graph of a Petri net")
        .version("v0.1.0")
        .arg(
            Arg::new("net")
                .value_name("NET")
                .help("Net document (.json or .ron)")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML exploration config, defaults apply when missing")
                .default_value("pnss.toml")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .help("Exploration strategy")
                .value_parser(["bounded", "unbounded", "coverability"]),
        )
        .arg(
            Arg::new("max-states")
                .long("max-states")
                .help("State ceiling of bounded exploration")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("vanishing")
                .long("vanishing")
                .help("Vanishing state handling")
                .value_parser(["simple", "on-the-fly", "no-op"]),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .help("Conflict resolution between immediate transitions")
                .value_parser(["weight", "uniform"]),
        )
        .arg(
            Arg::new("threads")
                .short('j')
                .long("threads")
                .help("Exploration workers, 1 gives deterministic state ids")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory receiving states.bin and transitions.bin")
                .default_value("statespace")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Also write the graph as Graphviz DOT")
                .value_parser(value_parser!(PathBuf)),
        );
    parser
}

#[derive(Debug, Default, PartialEq)]
pub struct Overrides {
    pub mode: Option<ExplorationMode>,
    pub max_states: Option<usize>,
    pub vanishing: Option<VanishingStrategy>,
    pub conflict_policy: Option<ConflictPolicy>,
    pub threads: Option<usize>,
}

#[derive(Debug)]
pub struct Options {
    pub net: PathBuf,
    pub config: PathBuf,
    pub output: PathBuf,
    pub dot: Option<PathBuf>,
    pub overrides: Overrides,
}

impl Options {
    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let mode = match matches.get_one::<String>("mode").map(String::as_str) {
            Some("bounded") => Some(ExplorationMode::Bounded),
            Some("unbounded") => Some(ExplorationMode::Unbounded),
            Some("coverability") => Some(ExplorationMode::Coverability),
            Some(_) => return Err("UnsupportedExplorationMode")?,
            None => None,
        };
        let vanishing = match matches.get_one::<String>("vanishing").map(String::as_str) {
            Some("simple") => Some(VanishingStrategy::Simple),
            Some("on-the-fly") => Some(VanishingStrategy::OnTheFly),
            Some("no-op") => Some(VanishingStrategy::NoOp),
            Some(_) => return Err("UnsupportedVanishingStrategy")?,
            None => None,
        };
        let conflict_policy = match matches.get_one::<String>("policy").map(String::as_str) {
            Some("weight") => Some(ConflictPolicy::WeightProportional),
            Some("uniform") => Some(ConflictPolicy::Uniform),
            Some(_) => return Err("UnsupportedConflictPolicy")?,
            None => None,
        };

        let net = matches
            .get_one::<PathBuf>("net")
            .cloned()
            .ok_or("missing net document")?;
        let config = matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("pnss.toml"));
        let output = matches
            .get_one::<PathBuf>("output")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("statespace"));

        Ok(Options {
            net,
            config,
            output,
            dot: matches.get_one::<PathBuf>("dot").cloned(),
            overrides: Overrides {
                mode,
                max_states: matches.get_one::<usize>("max-states").copied(),
                vanishing,
                conflict_policy,
                threads: matches.get_one::<usize>("threads").copied(),
            },
        })
    }

    /// Config file values with the command line flags applied on top.
    pub fn apply(&self, config: &mut ExplorerConfig) {
        let overrides = &self.overrides;
        if let Some(mode) = overrides.mode {
            config.mode = mode;
        }
        if let Some(max_states) = overrides.max_states {
            config.max_states = max_states;
        }
        if let Some(vanishing) = overrides.vanishing {
            config.vanishing = vanishing;
        }
        if let Some(policy) = overrides.conflict_policy {
            config.conflict_policy = policy;
        }
        if let Some(threads) = overrides.threads {
            config.threads = threads;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn test_parse_from_args_err() {
        let options = Options::parse_from_args(&args("net.json -m sideways"));
        assert!(options.is_err());
        assert!(Options::parse_from_args(&[]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let options =
            Options::parse_from_args(&args("net.ron -m coverability -j 4 --vanishing no-op"))
                .unwrap();
        assert_eq!(options.net, PathBuf::from("net.ron"));
        assert_eq!(options.output, PathBuf::from("statespace"));
        assert!(options.dot.is_none());

        let mut config = ExplorerConfig::default();
        options.apply(&mut config);
        assert_eq!(config.mode, ExplorationMode::Coverability);
        assert_eq!(config.threads, 4);
        assert_eq!(config.vanishing, VanishingStrategy::NoOp);
        assert_eq!(config.max_states, 10_000);
    }
}

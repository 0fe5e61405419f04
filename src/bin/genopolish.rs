use std::path::PathBuf;
use std::process;

use genopolish::cli::{build_cli, set_log_level};
use genopolish::engine::{self, EngineConfig};
use genopolish::params::Params;

fn main() {
    let matches = build_cli().get_matches();

    if let Some(m) = matches.subcommand_matches("shell-completion") {
        set_log_level(m, true);
        generate_completion(m);
        return;
    }

    set_log_level(&matches, true);

    let threads: usize = matches
        .get_one::<String>("threads")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    if rayon::ThreadPoolBuilder::new().num_threads(threads).build_global().is_err() {
        log::warn!("global thread pool was already initialised; ignoring --threads");
    }

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    };

    match engine::run(config) {
        Ok(()) => log::info!("polishing complete"),
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    }
}

fn load_config(matches: &clap::ArgMatches) -> genopolish::errors::PolishResult<EngineConfig> {
    let mut params = match matches.get_one::<String>("params") {
        Some(path) => Params::load(path)?,
        None => Params::default(),
    };
    if let Some(&depth) = matches.get_one::<u32>("override-depth") {
        params.max_depth = depth;
    }
    params.validate()?;

    Ok(EngineConfig {
        reference_path: PathBuf::from(matches.get_one::<String>("reference").unwrap()),
        alignment_path: PathBuf::from(matches.get_one::<String>("bam-file").unwrap()),
        output_prefix: PathBuf::from(matches.get_one::<String>("output").unwrap()),
        region: matches.get_one::<String>("region").cloned(),
        diploid: matches.get_flag("diploid"),
        params,
        dump_dir: matches.get_one::<String>("dump-dir").map(PathBuf::from),
    })
}

fn generate_completion(matches: &clap::ArgMatches) {
    use clap_complete::{generate, Shell};

    let output_path = matches.get_one::<String>("output-file").unwrap();
    let mut file = std::fs::File::create(output_path).expect("failed to open completion output file");
    if let Some(shell) = matches.get_one::<Shell>("shell").copied() {
        let mut cmd = build_cli();
        let name = cmd.get_name().to_string();
        log::info!("generating completion script for shell {shell}");
        generate(shell, &mut cmd, name, &mut file);
    }
}

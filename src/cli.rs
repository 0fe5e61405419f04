//! Command-line surface (§6 external interface): a single `polish` action
//! plus a `shell-completion` helper, built with `clap`'s builder API to
//! match the rest of the tool's dependency stack.

use clap::{crate_version, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("genopolish")
        .version(crate_version!())
        .about("Long-read genome assembly polisher: POA consensus, RLE homopolymer re-estimation, and diploid phasing")
        .arg(
            Arg::new("reference")
                .short('r')
                .long("reference")
                .help("Indexed reference FASTA (requires a .fai alongside it)")
                .required(true),
        )
        .arg(
            Arg::new("bam-file")
                .short('b')
                .long("bam-file")
                .help("Indexed BAM/CRAM of reads aligned to --reference")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Output path prefix: <prefix>.fa (haploid) or <prefix>.h1.fa/<prefix>.h2.fa (diploid)")
                .required(true),
        )
        .arg(
            Arg::new("params")
                .long("params")
                .help("JSON parameter document (defaults in its absence, §6)"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .help("Restrict polishing to contig[:start-end]; defaults to every indexed contig"),
        )
        .arg(
            Arg::new("diploid")
                .long("diploid")
                .help("Phase reads into two haplotypes and emit a pair of FASTAs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("override-depth")
                .long("override-depth")
                .help("Override the parameter document's maxDepth; 0 disables downsampling")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("dump-dir")
                .long("dump-dir")
                .help("Write per-chunk diagnostics (POA graphs, repeat counts, phase labels, feature tensors) under this directory"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .help("Size of the rayon worker pool")
                .default_value("1"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .conflicts_with("quiet"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("shell-completion")
                .about("Generate a shell completion script")
                .arg(
                    Arg::new("shell")
                        .long("shell")
                        .value_parser(clap::value_parser!(clap_complete::Shell))
                        .required(true),
                )
                .arg(
                    Arg::new("output-file")
                        .long("output-file")
                        .required(true),
                ),
        )
}

/// Mirrors the teacher's log-setup convention: `-v`/`-q` pick the filter
/// level, `RUST_LOG` overrides it, and `is_last` (the final call on the
/// matches chain) also logs the crate version as a startup banner.
pub fn set_log_level(matches: &clap::ArgMatches, is_last: bool) {
    let mut log_level = log::LevelFilter::Info;
    let mut specified = false;
    if matches.get_flag("verbose") {
        specified = true;
        log_level = log::LevelFilter::Debug;
    }
    if matches.get_flag("quiet") {
        specified = true;
        log_level = log::LevelFilter::Error;
    }
    if specified || is_last {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(log_level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        if builder.try_init().is_err() {
            log::warn!("log level requested more than once; keeping the first one");
        }
    }
    if is_last {
        log::info!("genopolish version {}", crate_version!());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_arguments_are_enforced() {
        let result = build_cli().try_get_matches_from(["genopolish"]);
        assert!(result.is_err());
    }

    #[test]
    fn minimal_invocation_parses() {
        let matches = build_cli()
            .try_get_matches_from(["genopolish", "-r", "ref.fa", "-b", "reads.bam", "-o", "out"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("reference").map(String::as_str), Some("ref.fa"));
        assert!(!matches.get_flag("diploid"));
    }

    #[test]
    fn diploid_flag_is_recognised() {
        let matches = build_cli()
            .try_get_matches_from(["genopolish", "-r", "ref.fa", "-b", "reads.bam", "-o", "out", "--diploid"])
            .unwrap();
        assert!(matches.get_flag("diploid"));
    }

    #[test]
    fn override_depth_parses_as_u32() {
        let matches = build_cli()
            .try_get_matches_from(["genopolish", "-r", "ref.fa", "-b", "reads.bam", "-o", "out", "--override-depth", "40"])
            .unwrap();
        assert_eq!(matches.get_one::<u32>("override-depth").copied(), Some(40));
    }
}

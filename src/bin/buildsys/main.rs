use std::env;
use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::debug;

use buildsys::core::World;
use buildsys::BuildsysResult;

fn cli() -> Command {
    Command::new("buildsys")
        .about("Meta build orchestrator driven by declarative package manifests")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .required(true)
                .help("Base package manifest"),
        )
        .arg(
            Arg::new("selectors")
                .value_name("SELECTOR")
                .num_args(0..)
                .help("key=value feature settings and forced package names"),
        )
        .arg(
            Arg::new("clean")
                .long("clean")
                .action(ArgAction::SetTrue)
                .help("Remove build and staging directories before building"),
        )
        .arg(
            Arg::new("skip-configure")
                .long("skip-configure")
                .action(ArgAction::SetTrue)
                .help("Queue autoreconf/configure commands as no-ops"),
        )
        .arg(
            Arg::new("nop")
                .long("nop")
                .action(ArgAction::SetTrue)
                .help("Do not prefix forwarded command output with the package name"),
        )
        .arg(
            Arg::new("fetch-from")
                .long("ff")
                .value_name("SOURCE")
                .help("Fetch source forwarded to recursive invocations"),
        )
        .arg(
            Arg::new("extract-only")
                .long("extract-only")
                .action(ArgAction::SetTrue)
                .help("Stop each package build after source extraction"),
        )
        .arg(
            Arg::new("parse-only")
                .long("parse-only")
                .action(ArgAction::SetTrue)
                .help("Stop after discovery and cycle checking"),
        )
        .arg(
            Arg::new("keep-going")
                .long("keep-going")
                .action(ArgAction::SetTrue)
                .help("After a failure, keep building packages that do not depend on it"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Maximum concurrent package builds, 0 for unbounded"),
        )
        .arg(
            Arg::new("dump-namespaces")
                .long("dump-namespaces")
                .action(ArgAction::SetTrue)
                .help("Print the namespace list after the run"),
        )
        .arg(
            Arg::new("target-args")
                .value_name("TARGET_ARGS")
                .num_args(0..)
                .last(true)
                .help("Arguments forwarded to recursive invocations"),
        )
}

fn main() {
    env_logger::init();
    let matches = cli().get_matches();
    match real_main(&matches) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            process::exit(101);
        }
    }
}

fn real_main(matches: &ArgMatches) -> BuildsysResult<bool> {
    let pwd = env::current_dir()?;
    let mut world = World::new(pwd);
    if let Some(argv0) = env::args().next() {
        world.set_app_name(argv0);
    }
    world.set_cleaning(matches.get_flag("clean"));
    world.set_skip_configure(matches.get_flag("skip-configure"));
    world.set_output_prefix(!matches.get_flag("nop"));
    world.set_extract_only(matches.get_flag("extract-only"));
    world.set_parse_only(matches.get_flag("parse-only"));
    world.set_keep_going(matches.get_flag("keep-going"));
    world.set_threads_limit(*matches.get_one::<usize>("threads").unwrap());
    if let Some(source) = matches.get_one::<String>("fetch-from") {
        world.set_fetch_from(source.clone());
    }

    if let Some(selectors) = matches.get_many::<String>("selectors") {
        for selector in selectors {
            if selector.contains('=') {
                world.set_feature_spec(selector)?;
            } else {
                world.add_forced(selector.clone());
            }
        }
    }
    if let Some(target_args) = matches.get_many::<String>("target-args") {
        // accepted for recursive invocations; the core has no use for them
        debug!(
            "ignoring target args: {:?}",
            target_args.collect::<Vec<_>>()
        );
    }

    let file = PathBuf::from(matches.get_one::<String>("file").unwrap());
    let ok = world.base_package(&file)?;
    if matches.get_flag("dump-namespaces") {
        world.print_namespaces();
    }
    Ok(ok)
}

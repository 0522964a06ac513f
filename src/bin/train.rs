use std::process::exit;
use std::time::Duration;

use clap::{App, Arg, SubCommand};

use intent_engine::{IntentContainer, RegistrationCall, TrainOptions};

/// Exit codes reported back to the parent container: success, timeout, or
/// unusable arguments. Anything else is a plain failure.
const EXIT_OK: i32 = 0;
const EXIT_TIMEOUT: i32 = 10;
const EXIT_BAD_ARGS: i32 = 2;

fn main() {
    env_logger::init();

    let matches = App::new("intent-engine-train")
        .about("Out-of-process training for an intent container")
        .subcommand(
            SubCommand::with_name("train")
                .arg(
                    Arg::with_name("CACHE_DIR")
                        .required(true)
                        .takes_value(true)
                        .index(1)
                        .help("cache directory the trained models are written to"),
                )
                .arg(
                    Arg::with_name("data")
                        .short("d")
                        .long("data")
                        .required(true)
                        .takes_value(true)
                        .help("JSON list of the recorded registration calls to replay"),
                )
                .arg(
                    Arg::with_name("timeout")
                        .long("timeout")
                        .takes_value(true)
                        .help("seconds before training is abandoned"),
                )
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .help("train even when every cached model is up to date"),
                )
                .arg(
                    Arg::with_name("single_thread")
                        .long("single-thread")
                        .help("train sequentially in-process"),
                ),
        )
        .get_matches_safe()
        .unwrap_or_else(|err| {
            eprintln!("{}", err.message);
            exit(EXIT_BAD_ARGS);
        });

    let matches = match matches.subcommand_matches("train") {
        Some(matches) => matches,
        None => exit(EXIT_BAD_ARGS),
    };

    let cache_dir = matches.value_of("CACHE_DIR").unwrap_or_else(|| exit(EXIT_BAD_ARGS));
    let calls: Vec<RegistrationCall> = match matches
        .value_of("data")
        .and_then(|data| serde_json::from_str(data).ok())
    {
        Some(calls) => calls,
        None => exit(EXIT_BAD_ARGS),
    };
    let timeout = matches
        .value_of("timeout")
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(20);

    let options = TrainOptions {
        debug: true,
        single_thread: matches.is_present("single_thread"),
        timeout: Duration::from_secs(timeout),
    };

    let finished = IntentContainer::new(cache_dir)
        .and_then(|mut container| {
            container.apply_training_args(calls)?;
            container.train(matches.is_present("force"), options)
        })
        .unwrap_or_else(|err| {
            eprintln!("Training failed: {}", err);
            exit(1);
        });

    exit(if finished { EXIT_OK } else { EXIT_TIMEOUT });
}

use clap::{App, Arg};
use log::{error, info};

use skein::config::SchedulerConfig;
use skein::logging::init_log;
use skein::net;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    init_log();

    let args = App::new("skein")
        .version(VERSION)
        .about("Task scheduler for a distributed computation cluster")
        .arg(
            Arg::with_name("LISTEN_ADDRESS")
                .short("l")
                .long("listen")
                .value_name("ADDRESS")
                .help("Listening port/address/address:port (default 0.0.0.0:8786)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("STRICT")
                .long("strict")
                .help("Run a full consistency check after every graph mutation (also SKEIN_STRICT_MODE=1)"),
        )
        .get_matches();

    let config = SchedulerConfig::from_args(&args);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    info!("starting skein {} at {}", VERSION, config.listen_address);
    if let Err(e) = runtime.block_on(net::serve(config.listen_address, config.strict)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

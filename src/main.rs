use clap::Parser;
use jiaz::cli::Cli;
use jiaz::error::{JiazError, Outcome};
use jiaz::router::route_command;
use log::LevelFilter;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match route_command(cli).await {
        Ok(Outcome::Completed) => {}
        Ok(Outcome::Aborted(message)) => println!("{}", message),
        Err(JiazError::Other(e)) => {
            eprintln!("Error: {:?}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

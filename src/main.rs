use clap::Parser;
use portfolio_forecast::api::{Cli, Command, run_calculate, run_http_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portfolio_forecast=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => {
            let calculator = match args.engine.build_calculator() {
                Ok(calculator) => calculator,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = run_http_server(args.port, calculator).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Calculate(args) => match run_calculate(&args) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                println!("{}", serde_json::json!({ "error": e }));
                std::process::exit(1);
            }
        },
    }
}

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = fleetcmd::cli::Cli::parse();
    match fleetcmd::app::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fleetcmd: {}", err);
            if let Some(hint) = err.hint.as_deref() {
                eprintln!("hint: {}", hint);
            }
            std::process::exit(1);
        }
    }
}

use backseat::cli;
use backseat::core::terminal;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_main().await {
        terminal::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

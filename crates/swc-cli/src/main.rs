//! Binary entrypoint for the swc command-line tools.

#[tokio::main]
async fn main() {
    let exit_code = swc_cli::run().await;
    std::process::exit(exit_code);
}

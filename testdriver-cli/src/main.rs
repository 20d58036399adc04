use clap::Parser;
use testdriver_cli::cli::Cli;

#[tokio::main]
async fn main() {
    testdriver_cli::init_process();

    let cli = Cli::parse();
    let exit_on_finish = cli.exit;
    let request = testdriver_cli::to_run_request(cli);

    let result = testdriver::start(request).await;
    let code = match &result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            1
        }
    };

    if exit_on_finish || code != 0 {
        std::process::exit(code);
    }
}

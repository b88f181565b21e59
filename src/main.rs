use std::{
    io::{self, Write},
    process,
};

use trellis::{
    application::{AppError, Runtime},
    config::{self, Command},
    infra::telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let runtime = Runtime::from_settings(&settings).await?;
    let mut stdout = io::stdout().lock();

    match cli_args.command {
        Command::Render(args) => {
            let document = runtime.render(&args).await?;
            stdout.write_all(document.as_bytes())?;
        }
        Command::Inspect(args) => {
            let report = runtime.inspect(&args.template).await?;
            let encoded = serde_json::to_string_pretty(&report)
                .map_err(|err| AppError::unexpected(format!("failed to encode report: {err}")))?;
            writeln!(stdout, "{encoded}")?;
        }
        Command::Asset(args) => {
            let (_, body) = runtime.asset(&args.route).await?;
            stdout.write_all(&body)?;
        }
    }
    stdout.flush()?;
    Ok(())
}
